//! In-memory backend, for tests and ephemeral sessions.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mnemo_core::UserId;
use mnemo_core::error::StoreError;
use mnemo_core::note::{Note, NoteFilter, NoteStore, RowStatus};
use mnemo_core::session::{ChatMessage, NewChatMessage, Session, SessionStore};
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::session_title;

#[derive(Default)]
struct Tables {
    sessions: Vec<Session>,
    messages: Vec<ChatMessage>,
    notes: Vec<Note>,
    next_session_id: i64,
    next_message_id: i64,
    next_note_id: i64,
}

/// Stores sessions, messages and notes in process memory.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    tables: Arc<RwLock<Tables>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a note with an explicit creation time.
    pub async fn insert_note_at(
        &self,
        creator_id: UserId,
        content: &str,
        created_at: DateTime<Utc>,
    ) -> Note {
        let mut t = self.tables.write().await;
        t.next_note_id += 1;
        let note = Note {
            id: t.next_note_id,
            uid: Note::generate_uid(),
            creator_id,
            content: content.to_string(),
            row_status: RowStatus::Normal,
            created_at,
            updated_at: created_at,
        };
        t.notes.push(note.clone());
        note
    }
}

#[async_trait]
impl SessionStore for InMemoryStore {
    async fn create_session(&self, creator_id: UserId, title: Option<String>) -> Result<Session, StoreError> {
        let mut t = self.tables.write().await;
        t.next_session_id += 1;
        let now = Utc::now();
        let session = Session {
            id: t.next_session_id,
            uid: Session::generate_uid(),
            creator_id,
            title: session_title(title),
            summary: String::new(),
            created_ts: now,
            updated_ts: now,
        };
        t.sessions.push(session.clone());
        Ok(session)
    }

    async fn get_session(&self, uid: &str) -> Result<Option<Session>, StoreError> {
        let t = self.tables.read().await;
        Ok(t.sessions.iter().find(|s| s.uid == uid).cloned())
    }

    async fn list_sessions(&self, creator_id: UserId) -> Result<Vec<Session>, StoreError> {
        let t = self.tables.read().await;
        let mut sessions: Vec<Session> = t
            .sessions
            .iter()
            .filter(|s| s.creator_id == creator_id)
            .cloned()
            .collect();
        sessions.sort_by(|a, b| b.updated_ts.cmp(&a.updated_ts).then(b.id.cmp(&a.id)));
        Ok(sessions)
    }

    async fn update_title(&self, uid: &str, title: &str) -> Result<Session, StoreError> {
        let mut t = self.tables.write().await;
        let session = t
            .sessions
            .iter_mut()
            .find(|s| s.uid == uid)
            .ok_or_else(|| StoreError::NotFound(format!("session {uid}")))?;
        session.title = title.to_string();
        session.updated_ts = Utc::now();
        Ok(session.clone())
    }

    async fn touch_session(&self, uid: &str) -> Result<(), StoreError> {
        let mut t = self.tables.write().await;
        let session = t
            .sessions
            .iter_mut()
            .find(|s| s.uid == uid)
            .ok_or_else(|| StoreError::NotFound(format!("session {uid}")))?;
        session.updated_ts = Utc::now();
        Ok(())
    }

    async fn delete_session(&self, uid: &str) -> Result<bool, StoreError> {
        let mut t = self.tables.write().await;
        let Some(pos) = t.sessions.iter().position(|s| s.uid == uid) else {
            return Ok(false);
        };
        let session = t.sessions.remove(pos);
        t.messages.retain(|m| m.session_id != session.id);
        Ok(true)
    }

    async fn append_message(&self, message: NewChatMessage) -> Result<ChatMessage, StoreError> {
        message.validate()?;
        let mut t = self.tables.write().await;
        if !t.sessions.iter().any(|s| s.id == message.session_id) {
            return Err(StoreError::NotFound(format!("session id {}", message.session_id)));
        }
        t.next_message_id += 1;
        let token_count = message.token_count();
        let stored = ChatMessage {
            id: t.next_message_id,
            session_id: message.session_id,
            role: message.role,
            content: message.content,
            tool_name: message.tool_name,
            token_count,
            created_ts: Utc::now(),
        };
        t.messages.push(stored.clone());
        Ok(stored)
    }

    async fn list_messages(&self, session_id: i64) -> Result<Vec<ChatMessage>, StoreError> {
        let t = self.tables.read().await;
        Ok(t.messages
            .iter()
            .filter(|m| m.session_id == session_id)
            .cloned()
            .collect())
    }

    async fn compact(&self, session_id: i64, summary: &str, drop_through_message_id: i64) -> Result<(), StoreError> {
        let mut t = self.tables.write().await;
        let session = t
            .sessions
            .iter_mut()
            .find(|s| s.id == session_id)
            .ok_or_else(|| StoreError::NotFound(format!("session id {session_id}")))?;
        session.summary = summary.to_string();
        t.messages
            .retain(|m| m.session_id != session_id || m.id > drop_through_message_id);
        Ok(())
    }
}

#[async_trait]
impl NoteStore for InMemoryStore {
    async fn create_note(&self, creator_id: UserId, content: &str) -> Result<Note, StoreError> {
        Ok(self.insert_note_at(creator_id, content, Utc::now()).await)
    }

    async fn get_note(&self, uid: &str) -> Result<Option<Note>, StoreError> {
        let t = self.tables.read().await;
        Ok(t.notes.iter().find(|n| n.uid == uid).cloned())
    }

    async fn update_note_content(&self, uid: &str, content: &str) -> Result<Note, StoreError> {
        let mut t = self.tables.write().await;
        let note = t
            .notes
            .iter_mut()
            .find(|n| n.uid == uid)
            .ok_or_else(|| StoreError::NotFound(format!("note {uid}")))?;
        note.content = content.to_string();
        note.updated_at = Utc::now();
        Ok(note.clone())
    }

    async fn delete_note(&self, uid: &str) -> Result<bool, StoreError> {
        let mut t = self.tables.write().await;
        let before = t.notes.len();
        t.notes.retain(|n| n.uid != uid);
        Ok(t.notes.len() < before)
    }

    async fn list_notes(&self, filter: &NoteFilter) -> Result<Vec<Note>, StoreError> {
        let t = self.tables.read().await;
        let mut notes: Vec<Note> = t.notes.iter().filter(|n| filter.matches(n)).cloned().collect();
        notes.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(notes)
    }
}
