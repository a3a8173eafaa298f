//! Service layer.
//!
//! - Fetching a source with retries and paging (`HttpFetcher`)
//! - Extraction strategies (`Extractor`)
//! - Normalization and filtering (`Normalizer`, `RecordFilter`)
//! - Message rendering (`MessageFormatter`)
//! - Delivery (`Notifier`) and optional summaries (`Summarizer`)

pub mod extract;
pub mod fetcher;
pub mod filter;
mod formatter;
pub mod normalizer;
pub mod notifier;
pub mod summarizer;

pub use extract::{Extractor, build_extractor};
pub use fetcher::{HttpFetcher, RawPage, RawPayload};
pub use filter::{InclusionFilter, RecordFilter};
pub use formatter::MessageFormatter;
pub use normalizer::{NormalizeOutcome, Normalizer};
pub use notifier::{Notifier, NotifyResult, WxPusherNotifier};
pub use summarizer::{ChatSummarizer, Summarizer};
