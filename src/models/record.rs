//! Update record data structure.

use std::borrow::Cow;
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Separator between identity parts, e.g. `仙逆||5`.
///
/// A `|` or `\` inside a part is escaped with `\`, so distinct parts
/// never collide on the joined key.
pub const KEY_SEPARATOR: &str = "||";

/// Named fields extracted from one raw item, before identity is assigned.
pub type RawItem = BTreeMap<String, String>;

/// One observed unit of new information (an episode, an upload, a row).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UpdateRecord {
    /// Deterministic key built only from the identity fields
    pub identity_key: String,

    /// Every field available for formatting and filtering
    pub display_fields: BTreeMap<String, String>,
}

impl UpdateRecord {
    /// Build a record from cleaned fields.
    ///
    /// Returns the name of the first identity field that is missing or
    /// empty.
    pub fn from_fields(
        fields: BTreeMap<String, String>,
        identity_fields: &[String],
    ) -> std::result::Result<Self, String> {
        let mut parts = Vec::with_capacity(identity_fields.len());
        for name in identity_fields {
            match fields.get(name) {
                Some(value) if !value.is_empty() => parts.push(value.as_str()),
                _ => return Err(name.clone()),
            }
        }

        Ok(Self {
            identity_key: identity_key(parts),
            display_fields: fields,
        })
    }

    /// Get a display field.
    pub fn field(&self, name: &str) -> Option<&str> {
        self.display_fields.get(name).map(String::as_str)
    }

    /// Display title, falling back to the identity key.
    pub fn title(&self) -> &str {
        self.field("title").unwrap_or(&self.identity_key)
    }

    /// Format the record using a template.
    ///
    /// `{key}` expands to the identity key, every display field `{name}`
    /// expands to its value and unknown placeholders are left as is.
    /// Substituted values are never expanded again.
    pub fn format(&self, template: &str) -> String {
        let mut result = String::with_capacity(template.len());
        let mut rest = template;

        while let Some(open) = rest.find('{') {
            result.push_str(&rest[..open]);
            let tail = &rest[open + 1..];
            let Some(close) = tail.find('}') else {
                rest = &rest[open..];
                break;
            };

            let name = &tail[..close];
            if name.contains('{') {
                result.push('{');
                rest = tail;
                continue;
            }
            match self.placeholder(name) {
                Some(value) => result.push_str(value),
                None => {
                    result.push('{');
                    result.push_str(name);
                    result.push('}');
                }
            }
            rest = &tail[close + 1..];
        }

        result.push_str(rest);
        result
    }

    fn placeholder(&self, name: &str) -> Option<&str> {
        match name {
            "key" => Some(self.identity_key.as_str()),
            "title" => Some(self.title()),
            _ => self.field(name),
        }
    }
}

/// Join identity parts into a key.
pub fn identity_key<'a>(parts: impl IntoIterator<Item = &'a str>) -> String {
    parts
        .into_iter()
        .map(escape_part)
        .collect::<Vec<_>>()
        .join(KEY_SEPARATOR)
}

fn escape_part(part: &str) -> Cow<'_, str> {
    if part.contains(['|', '\\']) {
        Cow::Owned(part.replace('\\', "\\\\").replace('|', "\\|"))
    } else {
        Cow::Borrowed(part)
    }
}
