//! Persisted deduplication state.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One identity key that has been announced.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ObservedRecord {
    pub identity_key: String,
    pub observed_at: DateTime<Utc>,
}

/// The only durable entity: keys from the last successful notification.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PersistedState {
    /// Window this state belongs to (e.g. `2026-W43`)
    pub period_marker: String,

    /// When the window's state was first written
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,

    #[serde(default)]
    pub records: Vec<ObservedRecord>,
}

impl PersistedState {
    /// A fresh state for `period_marker`.
    pub fn new(period_marker: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            period_marker: period_marker.into(),
            created_at: now,
            records: Vec::new(),
        }
    }

    /// State used when nothing has been persisted yet.
    pub fn empty(now: DateTime<Utc>) -> Self {
        Self::new(String::new(), now)
    }

    /// Set of observed identity keys.
    pub fn keys(&self) -> HashSet<&str> {
        self.records.iter().map(|r| r.identity_key.as_str()).collect()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.records.iter().any(|r| r.identity_key == key)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Drop records observed before `cutoff`. Returns how many were dropped.
    pub fn prune_before(&mut self, cutoff: DateTime<Utc>) -> usize {
        let before = self.records.len();
        self.records.retain(|r| r.observed_at >= cutoff);
        before - self.records.len()
    }

    /// Keep at most `max` records, evicting the oldest first.
    ///
    /// Keys in `keep` are never evicted, even if that leaves more than
    /// `max` records. Returns how many were dropped.
    pub fn cap(&mut self, max: usize, keep: &HashSet<&str>) -> usize {
        if self.records.len() <= max {
            return 0;
        }
        self.records.sort_by(|a, b| {
            let kept_a = keep.contains(a.identity_key.as_str());
            let kept_b = keep.contains(b.identity_key.as_str());
            kept_b
                .cmp(&kept_a)
                .then_with(|| b.observed_at.cmp(&a.observed_at))
                .then_with(|| a.identity_key.cmp(&b.identity_key))
        });

        let pinned = self
            .records
            .iter()
            .filter(|r| keep.contains(r.identity_key.as_str()))
            .count();
        let limit = max.max(pinned);
        let dropped = self.records.len() - limit;
        self.records.truncate(limit);
        dropped
    }
}
