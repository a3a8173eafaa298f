//! Application configuration structures.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};

/// Root application configuration.
///
/// Built once at process start and handed to each component at
/// construction time.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// HTTP behavior for the source fetch
    pub fetcher: FetcherConfig,

    /// The single source this deployment watches
    pub source: SourceConfig,

    /// Extraction strategy for the source payload
    pub extractor: ExtractorConfig,

    /// Identity and derived-field rules for records
    pub record: RecordConfig,

    /// Text preprocessing settings
    pub cleaning: CleaningConfig,

    /// Inclusion filter (watch list and recency)
    pub filter: FilterConfig,

    /// State window rollover policy
    pub window: WindowPolicy,

    /// Persisted state location and limits
    pub state: StateConfig,

    /// Push endpoint settings
    pub notifier: NotifierConfig,

    /// Outbound message templates
    pub message: MessageConfig,

    /// Optional language-model summary
    pub summarizer: SummarizerConfig,

    /// Local UTC offset used for dates, weekdays and window markers
    pub timezone_offset_hours: i32,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Load configuration, or defaults when the file does not exist.
    ///
    /// Any other read or parse failure is returned.
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self> {
        match Self::load(&path) {
            Err(AppError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                log::warn!("No config at {:?}. Using defaults.", path.as_ref());
                Ok(Self::default())
            }
            other => other,
        }
    }

    /// Override secrets and targets from the environment.
    ///
    /// `lookup` is `std::env::var(..).ok()` in production; tests pass a map.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        let first = |names: &[&str]| {
            names
                .iter()
                .find_map(|name| lookup(*name).filter(|v| !v.trim().is_empty()))
        };

        if let Some(token) = first(&["PUSHWATCH_APP_TOKEN", "APP_TOKEN", "WXPUSHER_APP_TOKEN"]) {
            self.notifier.app_token = token.trim().to_string();
        }
        if let Some(ids) = first(&["PUSHWATCH_TOPIC_IDS", "TARGET_TOPIC_ID", "WXPUSHER_TOPIC_IDS"]) {
            self.notifier.topic_ids = parse_topic_ids(&ids)?;
        }
        if let Some(key) = first(&["PUSHWATCH_LLM_API_KEY", "DEEPSEEK_API_KEY"]) {
            self.summarizer.api_key = key.trim().to_string();
        }
        if let Some(path) = first(&["PUSHWATCH_STATE_PATH"]) {
            self.state.path = PathBuf::from(path);
        }
        if let Some(url) = first(&["PUSHWATCH_SOURCE_URL"]) {
            self.source.url = url;
        }
        Ok(())
    }

    /// Validate configuration values for basic sanity.
    pub fn validate(&self) -> Result<()> {
        if self.source.name.trim().is_empty() {
            return Err(AppError::validation("source.name is empty"));
        }
        if self.source.url.trim().is_empty() {
            return Err(AppError::validation("source.url is empty"));
        }
        url::Url::parse(&self.source.url)?;
        if self.fetcher.user_agent.trim().is_empty() {
            return Err(AppError::validation("fetcher.user_agent is empty"));
        }
        if self.fetcher.timeout_secs == 0 {
            return Err(AppError::validation("fetcher.timeout_secs must be > 0"));
        }
        if !(1..=5).contains(&self.fetcher.max_attempts) {
            return Err(AppError::validation("fetcher.max_attempts must be within 1..=5"));
        }
        if let Some(paging) = &self.source.paging {
            if paging.expected_pages == 0 {
                return Err(AppError::validation("source.paging.expected_pages must be > 0"));
            }
            if paging.request_cap() < paging.expected_pages {
                return Err(AppError::validation(
                    "source.paging.max_pages must be >= expected_pages",
                ));
            }
        }
        if self.record.identity_fields.is_empty() {
            return Err(AppError::validation("record.identity_fields is empty"));
        }
        if self.record.weekday_names.len() != 7 {
            return Err(AppError::validation("record.weekday_names must have 7 entries"));
        }
        if let WindowPolicy::Rolling { days } = self.window {
            if days == 0 {
                return Err(AppError::validation("window.days must be > 0"));
            }
        }
        if self.state.path.as_os_str().is_empty() {
            return Err(AppError::validation("state.path is empty"));
        }
        if self.state.max_records == 0 {
            return Err(AppError::validation("state.max_records must be > 0"));
        }
        if self.message.max_records == 0 {
            return Err(AppError::validation("message.max_records must be > 0"));
        }
        if self.message.max_chars < 64 {
            return Err(AppError::validation("message.max_chars must be >= 64"));
        }
        if !(-12..=14).contains(&self.timezone_offset_hours) {
            return Err(AppError::validation("timezone_offset_hours out of range"));
        }
        Ok(())
    }

    /// Check the settings that only matter when a message is actually sent.
    pub fn validate_delivery(&self) -> Result<()> {
        if self.notifier.endpoint.trim().is_empty() {
            return Err(AppError::config("notifier.endpoint is empty"));
        }
        if self.notifier.app_token.trim().is_empty() {
            return Err(AppError::config(
                "notifier.app_token is empty (set PUSHWATCH_APP_TOKEN)",
            ));
        }
        if self.notifier.topic_ids.is_empty() {
            return Err(AppError::config("notifier.topic_ids is empty"));
        }
        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            fetcher: FetcherConfig::default(),
            source: SourceConfig::default(),
            extractor: ExtractorConfig::default(),
            record: RecordConfig::default(),
            cleaning: CleaningConfig::default(),
            filter: FilterConfig::default(),
            window: WindowPolicy::default(),
            state: StateConfig::default(),
            notifier: NotifierConfig::default(),
            message: MessageConfig::default(),
            summarizer: SummarizerConfig::default(),
            timezone_offset_hours: defaults::timezone_offset_hours(),
        }
    }
}

/// Parse a comma separated list of topic ids.
fn parse_topic_ids(raw: &str) -> Result<Vec<u64>> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<u64>()
                .map_err(|_| AppError::config(format!("invalid topic id '{s}'")))
        })
        .collect()
}

/// HTTP client and retry behavior.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetcherConfig {
    /// User-Agent header for HTTP requests
    #[serde(default = "defaults::user_agent")]
    pub user_agent: String,

    /// Request timeout in seconds
    #[serde(default = "defaults::timeout")]
    pub timeout_secs: u64,

    /// Attempts per request, including the first
    #[serde(default = "defaults::max_attempts")]
    pub max_attempts: u32,

    /// Base delay between attempts in milliseconds
    #[serde(default = "defaults::retry_delay")]
    pub retry_delay_ms: u64,

    /// How the delay grows between attempts
    #[serde(default)]
    pub backoff: Backoff,

    /// Pause between paged requests in milliseconds
    #[serde(default = "defaults::page_delay")]
    pub page_delay_ms: u64,
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            user_agent: defaults::user_agent(),
            timeout_secs: defaults::timeout(),
            max_attempts: defaults::max_attempts(),
            retry_delay_ms: defaults::retry_delay(),
            backoff: Backoff::default(),
            page_delay_ms: defaults::page_delay(),
        }
    }
}

/// Delay growth between retry attempts.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Backoff {
    Fixed,
    #[default]
    Linear,
}

/// HTTP method for the source request.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    #[default]
    Get,
    Post,
}

/// Describes the one external source of a deployment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Name used in logs and messages
    #[serde(default = "defaults::source_name")]
    pub name: String,

    /// Endpoint or page URL
    #[serde(default)]
    pub url: String,

    #[serde(default)]
    pub method: HttpMethod,

    /// Extra request headers (Referer, Accept-Language, ...)
    #[serde(default)]
    pub headers: BTreeMap<String, String>,

    /// Fixed query parameters
    #[serde(default)]
    pub query: BTreeMap<String, String>,

    /// JSON body for POST sources
    #[serde(default)]
    pub body: Option<serde_json::Value>,

    /// Paging descriptor; absent for single-page sources
    #[serde(default)]
    pub paging: Option<PagingConfig>,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            name: defaults::source_name(),
            url: String::new(),
            method: HttpMethod::default(),
            headers: BTreeMap::new(),
            query: BTreeMap::new(),
            body: None,
            paging: None,
        }
    }
}

/// Query-parameter paging.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PagingConfig {
    /// Query parameter carrying the page number
    #[serde(default = "defaults::page_param")]
    pub param: String,

    /// First page number
    #[serde(default = "defaults::first_page")]
    pub start: u32,

    /// Number of pages the source normally has
    #[serde(default = "defaults::expected_pages")]
    pub expected_pages: u32,

    /// Hard cap on requests; defaults to three times `expected_pages`
    #[serde(default)]
    pub max_pages: Option<u32>,

    /// Last page to request even if more exist
    #[serde(default)]
    pub last_page: Option<u32>,

    /// Optional page size parameter and value
    #[serde(default)]
    pub size_param: Option<String>,
    #[serde(default)]
    pub size: Option<u32>,

    /// JSON pointer to a boolean "more pages" flag
    #[serde(default)]
    pub has_more_pointer: Option<String>,
}

impl PagingConfig {
    /// Maximum number of requests one paged fetch may issue.
    pub fn request_cap(&self) -> u32 {
        self.max_pages
            .unwrap_or_else(|| self.expected_pages.saturating_mul(3))
            .max(1)
    }
}

impl Default for PagingConfig {
    fn default() -> Self {
        Self {
            param: defaults::page_param(),
            start: defaults::first_page(),
            expected_pages: defaults::expected_pages(),
            max_pages: None,
            last_page: None,
            size_param: None,
            size: None,
            has_more_pointer: None,
        }
    }
}

/// Extraction strategy, selected by `kind`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ExtractorConfig {
    Html(HtmlExtractorConfig),
    Json(JsonExtractorConfig),
    Text(TextExtractorConfig),
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self::Json(JsonExtractorConfig::default())
    }
}

/// CSS selectors for list pages.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HtmlExtractorConfig {
    /// Selector for one item row
    pub row_selector: String,

    /// Field name -> selector (relative to the row) whose text is the value
    pub fields: BTreeMap<String, String>,

    /// Selector for the link element; the `title` field element is used if absent
    #[serde(default)]
    pub link_selector: Option<String>,

    /// HTML attribute for link extraction
    #[serde(default = "defaults::link_attr")]
    pub link_attr: String,
}

/// JSON pointers for API payloads.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonExtractorConfig {
    /// Pointer to the item array ("" for the document root)
    #[serde(default)]
    pub items_pointer: String,

    /// Field name -> pointer relative to one item
    #[serde(default = "defaults::json_fields")]
    pub fields: BTreeMap<String, String>,

    /// Strip a JSONP wrapper `callback(...)` before parsing
    #[serde(default)]
    pub jsonp: bool,
}

impl Default for JsonExtractorConfig {
    fn default() -> Self {
        Self {
            items_pointer: String::new(),
            fields: defaults::json_fields(),
            jsonp: false,
        }
    }
}

/// Regex extraction over document text.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TextExtractorConfig {
    /// Pattern with named groups; each group becomes a field
    pub pattern: String,

    /// Optional pattern searched after each match; its match becomes `link`
    #[serde(default)]
    pub link_pattern: Option<String>,

    /// Characters removed from the text before matching
    #[serde(default)]
    pub squash_pattern: Option<String>,

    /// Treat the payload as HTML and match over its visible text
    #[serde(default = "defaults::yes")]
    pub html: bool,
}

/// Identity and derived-field rules.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordConfig {
    /// Fields joined (in order) into the identity key
    #[serde(default = "defaults::identity_fields")]
    pub identity_fields: Vec<String>,

    /// Field holding the item's date, if any
    #[serde(default = "defaults::date_field")]
    pub date_field: String,

    /// chrono format of the date field
    #[serde(default = "defaults::date_format")]
    pub date_format: String,

    /// Monday-first weekday names for the `weekday` display field
    #[serde(default = "defaults::weekday_names")]
    pub weekday_names: Vec<String>,
}

impl Default for RecordConfig {
    fn default() -> Self {
        Self {
            identity_fields: defaults::identity_fields(),
            date_field: defaults::date_field(),
            date_format: defaults::date_format(),
            weekday_names: defaults::weekday_names(),
        }
    }
}

/// Text cleaning/preprocessing settings.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CleaningConfig {
    /// Patterns to remove from titles
    #[serde(default)]
    pub title_remove_patterns: Vec<String>,

    /// Patterns to remove from dates
    #[serde(default)]
    pub date_remove_patterns: Vec<String>,

    /// Text replacements to apply to dates
    #[serde(default)]
    pub date_replacements: Vec<Replacement>,
}

impl CleaningConfig {
    /// Clean text by removing patterns and applying replacements.
    fn clean(&self, text: &str, patterns: &[String], replacements: &[Replacement]) -> String {
        let mut result = Self::normalize_whitespace(text);

        for pattern in patterns {
            result = result.replace(pattern, "");
        }

        for r in replacements {
            result = result.replace(&r.from, &r.to);
        }

        result.trim().to_string()
    }

    /// Clean one named field.
    pub fn clean_field(&self, field: &str, text: &str, date_field: &str) -> String {
        if field == "title" {
            self.clean(text, &self.title_remove_patterns, &[])
        } else if field == date_field {
            self.clean(text, &self.date_remove_patterns, &self.date_replacements)
        } else {
            self.clean(text, &[], &[])
        }
    }

    /// Collapse whitespace runs and drop zero-width characters.
    pub fn normalize_whitespace(s: &str) -> String {
        s.chars()
            .filter(|c| !matches!(c, '\u{200b}' | '\u{200c}' | '\u{200d}' | '\u{2060}' | '\u{feff}'))
            .collect::<String>()
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// A text replacement rule.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Replacement {
    pub from: String,
    pub to: String,
}

/// Inclusion filter configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilterConfig {
    /// Accept titles containing any of these
    #[serde(default)]
    pub keywords: Vec<String>,

    /// Accept titles equal to any of these
    #[serde(default)]
    pub exact_titles: Vec<String>,

    /// Field the watch list is matched against
    #[serde(default = "defaults::title_field")]
    pub title_field: String,

    /// Only accept items dated within this many days (today counts as day 0)
    #[serde(default)]
    pub max_age_days: Option<u32>,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            keywords: Vec::new(),
            exact_titles: Vec::new(),
            title_field: defaults::title_field(),
            max_age_days: None,
        }
    }
}

/// When previously seen keys are discarded.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "policy", rename_all = "snake_case")]
pub enum WindowPolicy {
    /// New window at the start of every ISO week
    IsoWeek,
    /// New window every calendar day
    Daily,
    /// Keys expire individually after `days`
    Rolling { days: u32 },
}

impl Default for WindowPolicy {
    fn default() -> Self {
        Self::IsoWeek
    }
}

/// Persisted state settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateConfig {
    /// Path of the JSON state document
    #[serde(default = "defaults::state_path")]
    pub path: PathBuf,

    /// Maximum keys kept; the oldest are dropped first
    #[serde(default = "defaults::state_max_records")]
    pub max_records: usize,
}

impl Default for StateConfig {
    fn default() -> Self {
        Self {
            path: defaults::state_path(),
            max_records: defaults::state_max_records(),
        }
    }
}

/// Push endpoint settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotifierConfig {
    #[serde(default = "defaults::notifier_endpoint")]
    pub endpoint: String,

    /// Application token; usually supplied through the environment
    #[serde(default)]
    pub app_token: String,

    #[serde(default)]
    pub topic_ids: Vec<u64>,

    /// 1 = text, 2 = html, 3 = markdown
    #[serde(default = "defaults::content_type")]
    pub content_type: u8,

    /// Application-level code signalling success
    #[serde(default = "defaults::success_code")]
    pub success_code: i64,

    #[serde(default = "defaults::timeout")]
    pub timeout_secs: u64,
}

impl Default for NotifierConfig {
    fn default() -> Self {
        Self {
            endpoint: defaults::notifier_endpoint(),
            app_token: String::new(),
            topic_ids: Vec::new(),
            content_type: defaults::content_type(),
            success_code: defaults::success_code(),
            timeout_secs: defaults::timeout(),
        }
    }
}

/// Which records a notification displays.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DisplayPolicy {
    /// Only records not seen before
    #[default]
    Delta,
    /// Every current record
    Full,
}

/// Outbound message templates.
///
/// Placeholders: `{title}`, `{key}`, `{source}`, `{now}`, `{count}` and any
/// display field name such as `{link}`, `{date}`, `{weekday}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageConfig {
    #[serde(default)]
    pub display: DisplayPolicy,

    #[serde(default = "defaults::header")]
    pub header: String,

    #[serde(default = "defaults::line")]
    pub line: String,

    /// Line template for records dated today
    #[serde(default)]
    pub line_today: Option<String>,

    #[serde(default)]
    pub footer: String,

    /// Short summary shown in the push list
    #[serde(default)]
    pub summary: Option<String>,

    /// Records rendered before the rest is summarized
    #[serde(default = "defaults::max_records")]
    pub max_records: usize,

    /// Hard cap on message length in characters
    #[serde(default = "defaults::max_chars")]
    pub max_chars: usize,

    /// Appended when records are left out; `{count}` is the number left out
    #[serde(default = "defaults::overflow")]
    pub overflow: String,
}

impl Default for MessageConfig {
    fn default() -> Self {
        Self {
            display: DisplayPolicy::default(),
            header: defaults::header(),
            line: defaults::line(),
            line_today: None,
            footer: String::new(),
            summary: None,
            max_records: defaults::max_records(),
            max_chars: defaults::max_chars(),
            overflow: defaults::overflow(),
        }
    }
}

/// Chat-completion summarizer settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SummarizerConfig {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default = "defaults::llm_endpoint")]
    pub endpoint: String,

    #[serde(default)]
    pub api_key: String,

    #[serde(default = "defaults::llm_model")]
    pub model: String,

    #[serde(default = "defaults::system_prompt")]
    pub system_prompt: String,

    #[serde(default = "defaults::temperature")]
    pub temperature: f32,

    #[serde(default = "defaults::max_tokens")]
    pub max_tokens: u32,

    #[serde(default = "defaults::llm_timeout")]
    pub timeout_secs: u64,

    /// Text used when no summary could be produced
    #[serde(default = "defaults::placeholder")]
    pub placeholder: String,
}

impl Default for SummarizerConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            endpoint: defaults::llm_endpoint(),
            api_key: String::new(),
            model: defaults::llm_model(),
            system_prompt: defaults::system_prompt(),
            temperature: defaults::temperature(),
            max_tokens: defaults::max_tokens(),
            timeout_secs: defaults::llm_timeout(),
            placeholder: defaults::placeholder(),
        }
    }
}

mod defaults {
    use std::collections::BTreeMap;
    use std::path::PathBuf;

    pub fn yes() -> bool {
        true
    }
    pub fn timezone_offset_hours() -> i32 {
        8
    }

    // Fetcher defaults
    pub fn user_agent() -> String {
        "Mozilla/5.0 (compatible; pushwatch/0.1)".into()
    }
    pub fn timeout() -> u64 {
        10
    }
    pub fn max_attempts() -> u32 {
        3
    }
    pub fn retry_delay() -> u64 {
        2000
    }
    pub fn page_delay() -> u64 {
        500
    }

    // Source defaults
    pub fn source_name() -> String {
        "source".into()
    }
    pub fn page_param() -> String {
        "page".into()
    }
    pub fn first_page() -> u32 {
        1
    }
    pub fn expected_pages() -> u32 {
        5
    }

    // Extractor defaults
    pub fn link_attr() -> String {
        "href".into()
    }
    pub fn json_fields() -> BTreeMap<String, String> {
        BTreeMap::from([("title".to_string(), "/title".to_string())])
    }

    // Record defaults
    pub fn identity_fields() -> Vec<String> {
        vec!["title".into(), "episode".into()]
    }
    pub fn date_field() -> String {
        "date".into()
    }
    pub fn date_format() -> String {
        "%Y-%m-%d".into()
    }
    pub fn weekday_names() -> Vec<String> {
        ["Mon", "Tue", "Wed", "Thu", "Fri", "Sat", "Sun"]
            .iter()
            .map(|s| s.to_string())
            .collect()
    }
    pub fn title_field() -> String {
        "title".into()
    }

    // State defaults
    pub fn state_path() -> PathBuf {
        PathBuf::from("data/state.json")
    }
    pub fn state_max_records() -> usize {
        500
    }

    // Notifier defaults
    pub fn notifier_endpoint() -> String {
        "https://wxpusher.zjiecode.com/api/send/message".into()
    }
    pub fn content_type() -> u8 {
        3
    }
    pub fn success_code() -> i64 {
        1000
    }

    // Message defaults
    pub fn header() -> String {
        "## {source}: {count} update(s)\n\n".into()
    }
    pub fn line() -> String {
        "- [{title}]({link}) {episode} {date}\n".into()
    }
    pub fn max_records() -> usize {
        30
    }
    pub fn max_chars() -> usize {
        20_000
    }
    pub fn overflow() -> String {
        "\n... and {count} more\n".into()
    }

    // Summarizer defaults
    pub fn llm_endpoint() -> String {
        "https://api.deepseek.com/v1/chat/completions".into()
    }
    pub fn llm_model() -> String {
        "deepseek-chat".into()
    }
    pub fn system_prompt() -> String {
        "Write a short digest of the following updates.".into()
    }
    pub fn temperature() -> f32 {
        0.5
    }
    pub fn max_tokens() -> u32 {
        2000
    }
    pub fn llm_timeout() -> u64 {
        60
    }
    pub fn placeholder() -> String {
        "(summary unavailable)".into()
    }
}
