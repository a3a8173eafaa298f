//! JSON-pointer extraction for API payloads.

use serde_json::Value;

use crate::error::{AppError, Result};
use crate::models::{JsonExtractorConfig, RawItem};
use crate::services::fetcher::RawPage;
use crate::utils::http::strip_jsonp;

/// Reads an item array and maps each item's fields through JSON pointers.
pub struct JsonExtractor {
    config: JsonExtractorConfig,
    source_name: String,
}

impl JsonExtractor {
    pub fn new(config: &JsonExtractorConfig, source_name: &str) -> Self {
        Self {
            config: config.clone(),
            source_name: source_name.to_string(),
        }
    }

    fn parse_item(&self, index: usize, item: &Value) -> Result<RawItem> {
        if !item.is_object() && !item.is_array() {
            return Err(AppError::partial(index, format!("expected an object, got {item}")));
        }

        let mut fields = RawItem::new();
        for (name, pointer) in &self.config.fields {
            match item.pointer(pointer) {
                None | Some(Value::Null) => {}
                Some(Value::String(s)) => {
                    fields.insert(name.clone(), s.clone());
                }
                Some(v @ (Value::Number(_) | Value::Bool(_))) => {
                    fields.insert(name.clone(), v.to_string());
                }
                Some(other) => {
                    return Err(AppError::partial(
                        index,
                        format!("field `{name}` at `{pointer}` is not a scalar: {other}"),
                    ));
                }
            }
        }
        Ok(fields)
    }
}

impl super::Extractor for JsonExtractor {
    fn extract(&self, page: &RawPage) -> Result<Vec<Result<RawItem>>> {
        let body = if self.config.jsonp {
            strip_jsonp(&page.body)
        } else {
            page.body.trim()
        };

        let document: Value = serde_json::from_str(body)
            .map_err(|e| AppError::shape(&self.source_name, format!("invalid JSON: {e}")))?;

        let items = document
            .pointer(&self.config.items_pointer)
            .and_then(Value::as_array)
            .ok_or_else(|| {
                AppError::shape(
                    &self.source_name,
                    format!("no array at `{}`", self.config.items_pointer),
                )
            })?;

        Ok(items
            .iter()
            .enumerate()
            .map(|(index, item)| self.parse_item(index, item))
            .collect())
    }
}
