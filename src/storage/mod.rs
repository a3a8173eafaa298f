//! Persistence for deduplication state.
//!
//! The pipeline only ever sees `StateStore`; the JSON file backend is the
//! one shipped implementation.

pub mod local;

use async_trait::async_trait;

use crate::error::Result;
use crate::models::PersistedState;

pub use local::JsonStateStore;

/// Load/save seam for the single persisted entity.
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Load the last committed state, `None` on first run.
    async fn load(&self) -> Result<Option<PersistedState>>;

    /// Replace the stored state. Must be atomic: a reader sees either the
    /// old or the new state, never a mix.
    async fn save(&self, state: &PersistedState) -> Result<()>;

    /// Human-readable location for logs.
    fn location(&self) -> String;
}
