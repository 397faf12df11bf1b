//! Chat session and persisted message types, plus the `SessionStore` trait.
//!
//! A session is owned by exactly one user. Its messages are append-only
//! except during compaction, when a contiguous prefix is dropped and folded
//! into the session's running summary.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::UserId;
use crate::error::StoreError;
use crate::message::Role;

/// Title given to sessions created without one.
pub const DEFAULT_SESSION_TITLE: &str = "New Chat";

/// A conversation thread.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    /// Storage row id
    pub id: i64,

    /// Short public identifier used in URLs
    pub uid: String,

    /// The owning user
    pub creator_id: UserId,

    pub title: String,

    /// Accumulated summary of compacted history (empty initially)
    pub summary: String,

    pub created_ts: DateTime<Utc>,
    pub updated_ts: DateTime<Utc>,
}

impl Session {
    /// Generate a fresh 8-character session uid.
    pub fn generate_uid() -> String {
        Uuid::new_v4().simple().to_string()[..8].to_string()
    }

    pub fn is_owned_by(&self, user_id: UserId) -> bool {
        self.creator_id == user_id
    }

    pub fn has_default_title(&self) -> bool {
        self.title == DEFAULT_SESSION_TITLE
    }
}

/// A message persisted in a session.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub id: i64,
    pub session_id: i64,
    pub role: Role,
    pub content: String,

    /// Set if and only if `role` is `Tool`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_name: Option<String>,

    /// Approximate size, `chars / 4`
    pub token_count: i32,

    pub created_ts: DateTime<Utc>,
}

/// Payload for appending a message to a session.
#[derive(Debug, Clone)]
pub struct NewChatMessage {
    pub session_id: i64,
    pub role: Role,
    pub content: String,
    pub tool_name: Option<String>,
}

impl NewChatMessage {
    pub fn user(session_id: i64, content: impl Into<String>) -> Self {
        Self {
            session_id,
            role: Role::User,
            content: content.into(),
            tool_name: None,
        }
    }

    pub fn assistant(session_id: i64, content: impl Into<String>) -> Self {
        Self {
            session_id,
            role: Role::Assistant,
            content: content.into(),
            tool_name: None,
        }
    }

    pub fn tool(session_id: i64, tool_name: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            session_id,
            role: Role::Tool,
            content: content.into(),
            tool_name: Some(tool_name.into()),
        }
    }

    /// Check the tool-name invariant before it reaches storage.
    pub fn validate(&self) -> std::result::Result<(), StoreError> {
        let has_name = self.tool_name.as_deref().is_some_and(|n| !n.is_empty());
        match (self.role == Role::Tool, has_name) {
            (true, false) => Err(StoreError::Storage(
                "tool messages require a tool name".into(),
            )),
            (false, true) => Err(StoreError::Storage(format!(
                "{} messages must not carry a tool name",
                self.role
            ))),
            _ => Ok(()),
        }
    }

    /// Approximate token count: four characters per token.
    pub fn token_count(&self) -> i32 {
        estimate_tokens(&self.content)
    }
}

/// Four-characters-per-token heuristic.
pub fn estimate_tokens(content: &str) -> i32 {
    i32::try_from(content.chars().count() / 4).unwrap_or(i32::MAX)
}

/// Durable storage of sessions and their messages.
///
/// Implementations: SQLite, in-memory (for testing).
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Create a session. A `None` or blank title becomes `"New Chat"`.
    async fn create_session(
        &self,
        creator_id: UserId,
        title: Option<String>,
    ) -> std::result::Result<Session, StoreError>;

    async fn get_session(&self, uid: &str) -> std::result::Result<Option<Session>, StoreError>;

    /// All sessions of a user, most recently updated first.
    async fn list_sessions(&self, creator_id: UserId) -> std::result::Result<Vec<Session>, StoreError>;

    async fn update_title(&self, uid: &str, title: &str) -> std::result::Result<Session, StoreError>;

    /// Bump `updated_ts` without touching title or summary.
    async fn touch_session(&self, uid: &str) -> std::result::Result<(), StoreError>;

    /// Delete a session and all its messages. Returns whether it existed.
    async fn delete_session(&self, uid: &str) -> std::result::Result<bool, StoreError>;

    async fn append_message(&self, message: NewChatMessage) -> std::result::Result<ChatMessage, StoreError>;

    /// Messages of a session in insertion order.
    async fn list_messages(&self, session_id: i64) -> std::result::Result<Vec<ChatMessage>, StoreError>;

    /// Atomically delete every message of the session with id up to and
    /// including `drop_through_message_id` and replace the session summary.
    async fn compact(
        &self,
        session_id: i64,
        summary: &str,
        drop_through_message_id: i64,
    ) -> std::result::Result<(), StoreError>;
}
