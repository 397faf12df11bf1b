//! Storage backends for mnemo sessions, chat messages and notes.
//!
//! Both backends implement `mnemo_core::SessionStore` and
//! `mnemo_core::NoteStore`:
//! - [`SqliteStore`]: the durable default
//! - [`InMemoryStore`]: for tests and throwaway runs

pub mod in_memory;
#[cfg(feature = "sqlite")]
pub mod sqlite;

pub use in_memory::InMemoryStore;
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteStore;

use chrono::{DateTime, Utc};

/// Milliseconds since the epoch, the on-disk timestamp format.
pub(crate) fn to_millis(ts: DateTime<Utc>) -> i64 {
    ts.timestamp_millis()
}

pub(crate) fn from_millis(ms: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(ms).unwrap_or_default()
}

/// Normalize a requested session title: blank means the default.
pub(crate) fn session_title(title: Option<String>) -> String {
    title
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| mnemo_core::DEFAULT_SESSION_TITLE.to_string())
}
