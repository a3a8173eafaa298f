//! Extraction strategies.
//!
//! Each strategy turns one raw page into named fields per item. Parsing
//! rules live entirely in configuration, so a broken selector or pattern is
//! fixed without touching the pipeline.

mod html;
mod json;
mod text;

pub use html::HtmlExtractor;
pub use json::JsonExtractor;
pub use text::TextExtractor;

use crate::error::Result;
use crate::models::{ExtractorConfig, RawItem};
use crate::services::fetcher::RawPage;

/// Pluggable extraction strategy.
pub trait Extractor: Send + Sync {
    /// Items found on one page.
    ///
    /// The outer error means the page as a whole is unreadable; an inner
    /// error marks a single malformed item that the caller skips.
    fn extract(&self, page: &RawPage) -> Result<Vec<Result<RawItem>>>;

    /// Number of items on a page, used to detect the end of paged sources.
    fn page_len(&self, page: &RawPage) -> Result<usize> {
        Ok(self.extract(page)?.len())
    }
}

/// Build the strategy described by `config`.
pub fn build_extractor(config: &ExtractorConfig, source_name: &str) -> Result<Box<dyn Extractor>> {
    let extractor: Box<dyn Extractor> = match config {
        ExtractorConfig::Html(c) => Box::new(HtmlExtractor::new(c)?),
        ExtractorConfig::Json(c) => Box::new(JsonExtractor::new(c, source_name)),
        ExtractorConfig::Text(c) => Box::new(TextExtractor::new(c)?),
    };
    Ok(extractor)
}
