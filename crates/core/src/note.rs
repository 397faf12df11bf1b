//! Notes: the user documents the agent's tools read and mutate.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use crate::UserId;
use crate::error::StoreError;

/// Lifecycle state of a note row.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RowStatus {
    #[default]
    Normal,
    Archived,
}

impl RowStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RowStatus::Normal => "NORMAL",
            RowStatus::Archived => "ARCHIVED",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "ARCHIVED" => RowStatus::Archived,
            _ => RowStatus::Normal,
        }
    }
}

/// A user's note.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Note {
    pub id: i64,

    /// Stable public identifier; also the document id in the vector index
    pub uid: String,

    pub creator_id: UserId,
    pub content: String,
    pub row_status: RowStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Note {
    pub fn generate_uid() -> String {
        Uuid::new_v4().simple().to_string()[..22].to_string()
    }

    /// Hashtags found in the content, in order of first appearance.
    pub fn tags(&self) -> Vec<String> {
        extract_tags(&self.content)
    }
}

/// Collect `#tag` tokens from markdown text, deduplicated.
pub fn extract_tags(content: &str) -> Vec<String> {
    let mut tags: Vec<String> = Vec::new();
    for word in content.split_whitespace() {
        let Some(rest) = word.strip_prefix('#') else {
            continue;
        };
        let name: String = rest
            .chars()
            .take_while(|c| c.is_alphanumeric() || matches!(c, '_' | '-' | '/'))
            .collect();
        if name.is_empty() {
            continue;
        }
        let tag = format!("#{name}");
        if !tags.contains(&tag) {
            tags.push(tag);
        }
    }
    tags
}

/// Filter for listing notes. Every filter is scoped to one creator.
#[derive(Debug, Clone)]
pub struct NoteFilter {
    pub creator_id: UserId,

    /// Literal substring the content must contain
    pub content_contains: Option<String>,

    /// Inclusive lower bound on creation time
    pub created_from: Option<DateTime<Utc>>,

    /// Inclusive upper bound on creation time
    pub created_to: Option<DateTime<Utc>>,

    pub row_status: Option<RowStatus>,
}

impl NoteFilter {
    pub fn for_user(creator_id: UserId) -> Self {
        Self {
            creator_id,
            content_contains: None,
            created_from: None,
            created_to: None,
            row_status: None,
        }
    }

    pub fn containing(mut self, text: impl Into<String>) -> Self {
        self.content_contains = Some(text.into());
        self
    }

    pub fn created_between(
        mut self,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
    ) -> Self {
        self.created_from = from;
        self.created_to = to;
        self
    }

    pub fn with_status(mut self, status: RowStatus) -> Self {
        self.row_status = Some(status);
        self
    }

    /// Whether a note satisfies this filter.
    pub fn matches(&self, note: &Note) -> bool {
        note.creator_id == self.creator_id
            && self
                .content_contains
                .as_deref()
                .is_none_or(|needle| note.content.contains(needle))
            && self.created_from.is_none_or(|from| note.created_at >= from)
            && self.created_to.is_none_or(|to| note.created_at <= to)
            && self.row_status.is_none_or(|status| note.row_status == status)
    }
}

/// The note CRUD collaborator the tools act through.
///
/// Implementations do not check ownership; the tools do.
#[async_trait]
pub trait NoteStore: Send + Sync {
    async fn create_note(&self, creator_id: UserId, content: &str) -> std::result::Result<Note, StoreError>;

    async fn get_note(&self, uid: &str) -> std::result::Result<Option<Note>, StoreError>;

    async fn update_note_content(&self, uid: &str, content: &str) -> std::result::Result<Note, StoreError>;

    /// Permanently delete a note. Returns whether it existed.
    async fn delete_note(&self, uid: &str) -> std::result::Result<bool, StoreError>;

    /// Notes matching the filter, newest first.
    async fn list_notes(&self, filter: &NoteFilter) -> std::result::Result<Vec<Note>, StoreError>;

    async fn count_notes(&self, filter: &NoteFilter) -> std::result::Result<usize, StoreError> {
        Ok(self.list_notes(filter).await?.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn note(content: &str) -> Note {
        Note {
            id: 1,
            uid: "n1".into(),
            creator_id: 7,
            content: content.into(),
            row_status: RowStatus::Normal,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn extracts_hashtags() {
        let tags = extract_tags("Rust notes #dev #journal, more #dev and # alone #a/b.");
        assert_eq!(tags, vec!["#dev", "#journal", "#a/b"]);
    }

    #[test]
    fn filter_scopes_to_creator() {
        let n = note("hello world");
        assert!(NoteFilter::for_user(7).matches(&n));
        assert!(!NoteFilter::for_user(8).matches(&n));
    }

    #[test]
    fn filter_content_and_status() {
        let n = note("meeting with Alice");
        assert!(NoteFilter::for_user(7).containing("Alice").matches(&n));
        assert!(!NoteFilter::for_user(7).containing("Bob").matches(&n));
        assert!(!NoteFilter::for_user(7).with_status(RowStatus::Archived).matches(&n));
    }

    #[test]
    fn filter_date_bounds_are_inclusive() {
        let n = note("x");
        let at = n.created_at;
        assert!(NoteFilter::for_user(7).created_between(Some(at), Some(at)).matches(&n));
        let later = at + chrono::Duration::seconds(1);
        assert!(!NoteFilter::for_user(7).created_between(Some(later), None).matches(&n));
    }
}
