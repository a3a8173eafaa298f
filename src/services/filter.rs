//! Inclusion filters applied to normalized records.

use chrono::NaiveDate;

use crate::models::{FilterConfig, RecordConfig, UpdateRecord};

/// Decides whether a record is worth announcing.
///
/// `Err` carries a reason when the record cannot be judged at all (for
/// example an unparseable date), which the normalizer counts as a skip.
pub trait RecordFilter: Send + Sync {
    fn accept(&self, record: &UpdateRecord, today: NaiveDate) -> std::result::Result<bool, String>;
}

/// Watch list plus an optional recency window.
///
/// A record passes when its title contains any keyword or equals an exact
/// title (an empty watch list accepts everything), and, if `max_age_days`
/// is set, its date lies between `today - max_age_days` and `today`.
#[derive(Debug, Clone)]
pub struct InclusionFilter {
    keywords: Vec<String>,
    exact_titles: Vec<String>,
    title_field: String,
    max_age_days: Option<u32>,
    date_field: String,
    date_format: String,
}

impl InclusionFilter {
    pub fn new(filter: &FilterConfig, record: &RecordConfig) -> Self {
        Self {
            keywords: filter.keywords.clone(),
            exact_titles: filter.exact_titles.clone(),
            title_field: filter.title_field.clone(),
            max_age_days: filter.max_age_days,
            date_field: record.date_field.clone(),
            date_format: record.date_format.clone(),
        }
    }

    fn on_watch_list(&self, title: &str) -> bool {
        if self.keywords.is_empty() && self.exact_titles.is_empty() {
            return true;
        }
        self.exact_titles.iter().any(|t| t == title)
            || self.keywords.iter().any(|k| title.contains(k.as_str()))
    }
}

impl RecordFilter for InclusionFilter {
    fn accept(&self, record: &UpdateRecord, today: NaiveDate) -> std::result::Result<bool, String> {
        let title = record.field(&self.title_field).unwrap_or_default();
        if !self.on_watch_list(title) {
            return Ok(false);
        }

        let Some(max_age) = self.max_age_days else {
            return Ok(true);
        };
        let raw = record
            .field(&self.date_field)
            .ok_or_else(|| format!("missing `{}` for the recency filter", self.date_field))?;
        let date = NaiveDate::parse_from_str(raw, &self.date_format)
            .map_err(|e| format!("unparseable date `{raw}`: {e}"))?;

        let age = (today - date).num_days();
        Ok((0..=i64::from(max_age)).contains(&age))
    }
}
