// src/models/mod.rs

//! Domain models for pushwatch.
//!
//! This module contains all data structures used throughout the pipeline,
//! organized by their primary purpose.

mod config;
mod message;
mod record;
mod state;

// Re-export all public types
pub use config::{
    Backoff, CleaningConfig, Config, DisplayPolicy, ExtractorConfig, FetcherConfig, FilterConfig,
    HtmlExtractorConfig, HttpMethod, JsonExtractorConfig, MessageConfig, NotifierConfig,
    PagingConfig, RecordConfig, Replacement, SourceConfig, StateConfig, SummarizerConfig,
    TextExtractorConfig, WindowPolicy,
};
pub use message::{Message, fingerprint};
pub use record::{KEY_SEPARATOR, RawItem, UpdateRecord, identity_key};
pub use state::{ObservedRecord, PersistedState};
