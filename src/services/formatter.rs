//! Renders records into an outbound message.

use chrono::{DateTime, FixedOffset, Utc};

use crate::models::{Message, MessageConfig, UpdateRecord, fingerprint};

/// Template-driven message builder.
pub struct MessageFormatter {
    config: MessageConfig,
    source_name: String,
    offset: FixedOffset,
}

impl MessageFormatter {
    pub fn new(config: &MessageConfig, source_name: &str, offset: FixedOffset) -> Self {
        Self {
            config: config.clone(),
            source_name: source_name.to_string(),
            offset,
        }
    }

    /// Build the message announcing `records`.
    ///
    /// At most `max_records` lines are rendered; the rest are counted in the
    /// overflow line. The idempotence key covers every record, rendered or
    /// not.
    pub fn format(&self, records: &[UpdateRecord], summary: Option<&str>, now: DateTime<Utc>) -> Message {
        let now = now.with_timezone(&self.offset).format("%Y-%m-%d %H:%M").to_string();
        let count = records.len().to_string();
        let expand = |template: &str| {
            template
                .replace("{source}", &self.source_name)
                .replace("{count}", &count)
                .replace("{now}", &now)
        };

        let mut content = expand(&self.config.header);
        for record in records.iter().take(self.config.max_records) {
            let template = match &self.config.line_today {
                Some(today) if record.field("is_today") == Some("true") => today,
                _ => &self.config.line,
            };
            content.push_str(&record.format(&expand(template)));
        }

        let hidden = records.len().saturating_sub(self.config.max_records);
        if hidden > 0 {
            content.push_str(&self.config.overflow.replace("{count}", &hidden.to_string()));
        }

        if let Some(text) = summary {
            content.push_str("\n\n");
            content.push_str(text.trim());
            content.push('\n');
        }
        content.push_str(&expand(&self.config.footer));

        Message {
            summary: self.config.summary.as_deref().map(|s| truncate(&expand(s), 100)),
            content: truncate(&content, self.config.max_chars),
            idempotence_key: fingerprint(records.iter().map(|r| r.identity_key.as_str())),
            record_count: records.len(),
        }
    }

    /// Plain-text context handed to the summarizer.
    pub fn summary_context(&self, records: &[UpdateRecord]) -> String {
        records
            .iter()
            .map(|r| {
                r.display_fields
                    .iter()
                    .filter(|(name, _)| name.as_str() != "link")
                    .map(|(name, value)| format!("{name}: {value}"))
                    .collect::<Vec<_>>()
                    .join("; ")
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Cut `text` to at most `max` characters, marking the cut with an ellipsis.
fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let mut out: String = text.chars().take(max.saturating_sub(1)).collect();
    out.push('…');
    out
}
