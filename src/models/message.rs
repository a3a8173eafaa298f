//! Outbound message.

use sha2::{Digest, Sha256};

/// A formatted push message, ready for a notifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// Short summary shown in the push list
    pub summary: Option<String>,

    /// Body in the notifier's content type
    pub content: String,

    /// Hex SHA-256 over the sorted identity keys being announced
    pub idempotence_key: String,

    /// Number of records announced (including any left out of `content`)
    pub record_count: usize,
}

/// Fingerprint a set of identity keys independent of order.
pub fn fingerprint<'a>(keys: impl IntoIterator<Item = &'a str>) -> String {
    let mut keys: Vec<&str> = keys.into_iter().collect();
    keys.sort_unstable();
    keys.dedup();

    let mut hasher = Sha256::new();
    for key in keys {
        hasher.update(key.as_bytes());
        hasher.update([0u8]);
    }
    hex::encode(hasher.finalize())
}
