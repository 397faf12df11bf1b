//! Note tools for the mnemo agent.
//!
//! Tools give the agent the ability to work with the user's notes:
//! semantic search, exact and date-range queries, create, append, rewrite,
//! tag, delete, statistics and tag listing.
//!
//! Every tool is built per request from a [`NoteToolContext`] that carries
//! the authenticated user, so a tool can never touch another user's notes.

pub mod append_to_note;
pub mod create_note;
pub mod delete_note;
pub mod list_notes_by_tag;
pub mod query_notes;
pub mod search_notes;
pub mod update_note;
pub mod update_note_tags;
pub mod user_stats;

use std::collections::HashMap;
use std::sync::Arc;

use mnemo_core::UserId;
use mnemo_core::note::{Note, NoteFilter, NoteStore, RowStatus, extract_tags};
use mnemo_core::tool::{ToolRegistry, ToolResult};
use mnemo_vectorstore::VectorStore;
use serde::de::DeserializeOwned;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

pub use append_to_note::AppendToNoteTool;
pub use create_note::CreateNoteTool;
pub use delete_note::DeleteNoteTool;
pub use list_notes_by_tag::ListNotesByTagTool;
pub use query_notes::QueryNotesTool;
pub use search_notes::SearchNotesTool;
pub use update_note::UpdateNoteTool;
pub use update_note_tags::UpdateNoteTagsTool;
pub use user_stats::UserStatsTool;

const PARSE_ERROR: &str = "Error: failed to parse input JSON.";
const NOT_FOUND: &str = "Error: note not found.";

/// Everything a note tool needs, bound to one user for one request.
#[derive(Clone)]
pub struct NoteToolContext {
    pub user_id: UserId,
    pub notes: Arc<dyn NoteStore>,

    /// `None` when no vector index is configured
    pub index: Option<Arc<VectorStore>>,

    /// Cancelled when the request that owns these tools goes away
    pub cancel: CancellationToken,
}

impl NoteToolContext {
    pub fn new(user_id: UserId, notes: Arc<dyn NoteStore>) -> Self {
        Self {
            user_id,
            notes,
            index: None,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_index(mut self, index: Arc<VectorStore>) -> Self {
        self.index = Some(index);
        self
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Fetch a note the caller owns, or the result text to hand back.
    async fn owned_note(&self, uid: &str, unauthorized: &str) -> Result<Note, ToolResult> {
        match self.notes.get_note(uid).await {
            Ok(Some(note)) if note.creator_id == self.user_id => Ok(note),
            Ok(Some(_)) => Err(ToolResult::failure(unauthorized)),
            Ok(None) | Err(_) => Err(ToolResult::failure(NOT_FOUND)),
        }
    }

    /// Bring the vector index in line with a note's current content.
    /// Failures are logged; the store write already succeeded.
    async fn reindex(&self, note: &Note) {
        let Some(index) = &self.index else {
            return;
        };
        if let Err(e) = index
            .upsert(self.user_id, &note.uid, &note.content, note_metadata(note))
            .await
        {
            warn!(note = %note.uid, error = %e, "Failed to index note");
        }
    }

    async fn unindex(&self, uid: &str) {
        let Some(index) = &self.index else {
            return;
        };
        if let Err(e) = index.delete(self.user_id, uid).await {
            warn!(note = %uid, error = %e, "Failed to remove note from index");
        }
    }
}

/// Index metadata for a note: its hashtags, space-joined.
pub fn note_metadata(note: &Note) -> HashMap<String, String> {
    HashMap::from([("tags".to_string(), extract_tags(&note.content).join(" "))])
}

/// Rebuild a user's collection from the note store.
///
/// Drops everything indexed for the user, then indexes every active note in
/// one batch. Returns the number of notes indexed.
pub async fn rebuild_index(
    notes: &dyn NoteStore,
    index: &VectorStore,
    user_id: UserId,
) -> mnemo_core::Result<usize> {
    let filter = NoteFilter::for_user(user_id).with_status(RowStatus::Normal);
    let active = notes.list_notes(&filter).await?;
    index.clear(user_id).await?;
    let docs: Vec<_> = active
        .iter()
        .map(|n| (n.uid.clone(), n.content.clone(), note_metadata(n)))
        .collect();
    index.upsert_many(user_id, docs).await?;
    info!(user = user_id, notes = active.len(), "Note index rebuilt");
    Ok(active.len())
}

/// Build the full set of note tools for one request.
///
/// `tag_filter` restricts semantic search hits to notes carrying that tag.
pub fn note_registry(ctx: NoteToolContext, tag_filter: Option<String>) -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    registry.register(Box::new(SearchNotesTool::new(ctx.clone(), tag_filter)));
    registry.register(Box::new(QueryNotesTool::new(ctx.clone())));
    registry.register(Box::new(CreateNoteTool::new(ctx.clone())));
    registry.register(Box::new(AppendToNoteTool::new(ctx.clone())));
    registry.register(Box::new(UpdateNoteTool::new(ctx.clone())));
    registry.register(Box::new(UpdateNoteTagsTool::new(ctx.clone())));
    registry.register(Box::new(DeleteNoteTool::new(ctx.clone())));
    registry.register(Box::new(UserStatsTool::new(ctx.clone())));
    registry.register(Box::new(ListNotesByTagTool::new(ctx)));
    registry
}

/// Decode tool arguments, or the parse-error result text.
fn parse_args<T: DeserializeOwned>(arguments: &str) -> Result<T, ToolResult> {
    serde_json::from_str(arguments).map_err(|_| ToolResult::failure(PARSE_ERROR))
}

/// The first `max` characters of `content`, with `...` if anything was cut.
fn preview(content: &str, max: usize) -> String {
    match content.char_indices().nth(max) {
        Some((cut, _)) => format!("{}...", &content[..cut]),
        None => content.to_string(),
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use mnemo_store::InMemoryStore;
    use mnemo_vectorstore::HashingEmbedder;

    pub struct Fixture {
        pub store: InMemoryStore,
        pub index: Arc<VectorStore>,
        _dir: tempfile::TempDir,
    }

    impl Fixture {
        pub async fn new() -> Self {
            let dir = tempfile::tempdir().unwrap();
            let index = VectorStore::open(
                dir.path().join("vectorstore"),
                Arc::new(HashingEmbedder::default()),
            )
            .await
            .unwrap();
            Self {
                store: InMemoryStore::new(),
                index: Arc::new(index),
                _dir: dir,
            }
        }

        pub fn ctx(&self, user_id: UserId) -> NoteToolContext {
            NoteToolContext::new(user_id, Arc::new(self.store.clone())).with_index(self.index.clone())
        }
    }
}
