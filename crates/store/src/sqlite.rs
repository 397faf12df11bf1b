//! SQLite backend.
//!
//! Uses a single SQLite database file with three tables:
//! - `ai_chat_session`: chat sessions with their running summary
//! - `ai_chat_message`: messages, cascading on session delete
//! - `note`: the user's notes
//!
//! Timestamps are stored as integer milliseconds since the epoch.

use async_trait::async_trait;
use chrono::Utc;
use mnemo_core::UserId;
use mnemo_core::error::StoreError;
use mnemo_core::message::Role;
use mnemo_core::note::{Note, NoteFilter, NoteStore, RowStatus};
use mnemo_core::session::{ChatMessage, NewChatMessage, Session, SessionStore};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{QueryBuilder, Row, Sqlite, SqlitePool};
use std::str::FromStr;
use tracing::{debug, info};

use crate::{from_millis, session_title, to_millis};

/// A SQLite-backed session, message and note store.
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (or create) the database at `path`.
    ///
    /// Pass `":memory:"` for an in-process ephemeral database; it is served by
    /// a single connection so every query sees the same data.
    pub async fn new(path: &str) -> Result<Self, StoreError> {
        let in_memory = path.contains(":memory:");
        let url = if path.starts_with("sqlite:") {
            path.to_string()
        } else {
            format!("sqlite:{path}")
        };
        let options = SqliteConnectOptions::from_str(&url)
            .map_err(|e| StoreError::Storage(format!("Invalid SQLite path: {e}")))?
            .create_if_missing(true)
            .journal_mode(if in_memory {
                SqliteJournalMode::Memory
            } else {
                SqliteJournalMode::Wal
            })
            .synchronous(SqliteSynchronous::Normal)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(if in_memory { 1 } else { 4 })
            .connect_with(options)
            .await
            .map_err(|e| StoreError::Storage(format!("Failed to open SQLite: {e}")))?;

        let store = Self { pool };
        store.run_migrations().await?;
        info!("SQLite store initialized at {path}");
        Ok(store)
    }

    /// Create from an existing pool (useful for testing).
    pub async fn from_pool(pool: SqlitePool) -> Result<Self, StoreError> {
        let store = Self { pool };
        store.run_migrations().await?;
        Ok(store)
    }

    /// Run schema migrations: creates tables and indexes.
    async fn run_migrations(&self) -> Result<(), StoreError> {
        let statements = [
            (
                "ai_chat_session table",
                r#"
                CREATE TABLE IF NOT EXISTS ai_chat_session (
                    id          INTEGER PRIMARY KEY AUTOINCREMENT,
                    uid         TEXT NOT NULL UNIQUE,
                    creator_id  INTEGER NOT NULL,
                    title       TEXT NOT NULL DEFAULT '',
                    summary     TEXT NOT NULL DEFAULT '',
                    created_ts  INTEGER NOT NULL,
                    updated_ts  INTEGER NOT NULL
                )
                "#,
            ),
            (
                "ai_chat_message table",
                r#"
                CREATE TABLE IF NOT EXISTS ai_chat_message (
                    id           INTEGER PRIMARY KEY AUTOINCREMENT,
                    session_id   INTEGER NOT NULL REFERENCES ai_chat_session(id) ON DELETE CASCADE,
                    role         TEXT NOT NULL,
                    content      TEXT NOT NULL,
                    tool_name    TEXT,
                    token_count  INTEGER NOT NULL DEFAULT 0,
                    created_ts   INTEGER NOT NULL
                )
                "#,
            ),
            (
                "note table",
                r#"
                CREATE TABLE IF NOT EXISTS note (
                    id          INTEGER PRIMARY KEY AUTOINCREMENT,
                    uid         TEXT NOT NULL UNIQUE,
                    creator_id  INTEGER NOT NULL,
                    content     TEXT NOT NULL,
                    row_status  TEXT NOT NULL DEFAULT 'NORMAL',
                    created_ts  INTEGER NOT NULL,
                    updated_ts  INTEGER NOT NULL
                )
                "#,
            ),
            (
                "session creator index",
                "CREATE INDEX IF NOT EXISTS idx_ai_chat_session_creator ON ai_chat_session(creator_id, updated_ts DESC)",
            ),
            (
                "message session index",
                "CREATE INDEX IF NOT EXISTS idx_ai_chat_message_session ON ai_chat_message(session_id, id)",
            ),
            (
                "note creator index",
                "CREATE INDEX IF NOT EXISTS idx_note_creator_created ON note(creator_id, created_ts DESC)",
            ),
        ];

        for (what, sql) in statements {
            sqlx::query(sql)
                .execute(&self.pool)
                .await
                .map_err(|e| StoreError::MigrationFailed(format!("{what}: {e}")))?;
        }

        debug!("SQLite migrations complete");
        Ok(())
    }

    fn row_to_session(row: &sqlx::sqlite::SqliteRow) -> Result<Session, StoreError> {
        let get = |col: &str| StoreError::QueryFailed(format!("{col} column"));
        Ok(Session {
            id: row.try_get("id").map_err(|_| get("id"))?,
            uid: row.try_get("uid").map_err(|_| get("uid"))?,
            creator_id: row.try_get("creator_id").map_err(|_| get("creator_id"))?,
            title: row.try_get("title").map_err(|_| get("title"))?,
            summary: row.try_get("summary").map_err(|_| get("summary"))?,
            created_ts: from_millis(row.try_get("created_ts").map_err(|_| get("created_ts"))?),
            updated_ts: from_millis(row.try_get("updated_ts").map_err(|_| get("updated_ts"))?),
        })
    }

    fn row_to_message(row: &sqlx::sqlite::SqliteRow) -> Result<ChatMessage, StoreError> {
        let get = |col: &str| StoreError::QueryFailed(format!("{col} column"));
        let role: String = row.try_get("role").map_err(|_| get("role"))?;
        Ok(ChatMessage {
            id: row.try_get("id").map_err(|_| get("id"))?,
            session_id: row.try_get("session_id").map_err(|_| get("session_id"))?,
            role: Role::parse(&role)
                .ok_or_else(|| StoreError::QueryFailed(format!("unknown role '{role}'")))?,
            content: row.try_get("content").map_err(|_| get("content"))?,
            tool_name: row.try_get("tool_name").map_err(|_| get("tool_name"))?,
            token_count: row.try_get("token_count").map_err(|_| get("token_count"))?,
            created_ts: from_millis(row.try_get("created_ts").map_err(|_| get("created_ts"))?),
        })
    }

    fn row_to_note(row: &sqlx::sqlite::SqliteRow) -> Result<Note, StoreError> {
        let get = |col: &str| StoreError::QueryFailed(format!("{col} column"));
        let status: String = row.try_get("row_status").map_err(|_| get("row_status"))?;
        Ok(Note {
            id: row.try_get("id").map_err(|_| get("id"))?,
            uid: row.try_get("uid").map_err(|_| get("uid"))?,
            creator_id: row.try_get("creator_id").map_err(|_| get("creator_id"))?,
            content: row.try_get("content").map_err(|_| get("content"))?,
            row_status: RowStatus::parse(&status),
            created_at: from_millis(row.try_get("created_ts").map_err(|_| get("created_ts"))?),
            updated_at: from_millis(row.try_get("updated_ts").map_err(|_| get("updated_ts"))?),
        })
    }

    async fn session_by_uid(&self, uid: &str) -> Result<Option<Session>, StoreError> {
        let row = sqlx::query("SELECT * FROM ai_chat_session WHERE uid = ?")
            .bind(uid)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StoreError::QueryFailed(format!("get session: {e}")))?;
        row.as_ref().map(Self::row_to_session).transpose()
    }

    async fn note_by_uid(&self, uid: &str) -> Result<Option<Note>, StoreError> {
        let row = sqlx::query("SELECT * FROM note WHERE uid = ?")
            .bind(uid)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StoreError::QueryFailed(format!("get note: {e}")))?;
        row.as_ref().map(Self::row_to_note).transpose()
    }
}

#[async_trait]
impl SessionStore for SqliteStore {
    async fn create_session(&self, creator_id: UserId, title: Option<String>) -> Result<Session, StoreError> {
        let now = to_millis(Utc::now());
        let uid = Session::generate_uid();
        let row = sqlx::query(
            "INSERT INTO ai_chat_session (uid, creator_id, title, summary, created_ts, updated_ts)
             VALUES (?, ?, ?, '', ?, ?) RETURNING *",
        )
        .bind(&uid)
        .bind(creator_id)
        .bind(session_title(title))
        .bind(now)
        .bind(now)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| StoreError::Storage(format!("create session: {e}")))?;
        Self::row_to_session(&row)
    }

    async fn get_session(&self, uid: &str) -> Result<Option<Session>, StoreError> {
        self.session_by_uid(uid).await
    }

    async fn list_sessions(&self, creator_id: UserId) -> Result<Vec<Session>, StoreError> {
        let rows = sqlx::query(
            "SELECT * FROM ai_chat_session WHERE creator_id = ? ORDER BY updated_ts DESC, id DESC",
        )
        .bind(creator_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StoreError::QueryFailed(format!("list sessions: {e}")))?;
        rows.iter().map(Self::row_to_session).collect()
    }

    async fn update_title(&self, uid: &str, title: &str) -> Result<Session, StoreError> {
        let row = sqlx::query(
            "UPDATE ai_chat_session SET title = ?, updated_ts = ? WHERE uid = ? RETURNING *",
        )
        .bind(title)
        .bind(to_millis(Utc::now()))
        .bind(uid)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StoreError::Storage(format!("update title: {e}")))?;
        match row {
            Some(row) => Self::row_to_session(&row),
            None => Err(StoreError::NotFound(format!("session {uid}"))),
        }
    }

    async fn touch_session(&self, uid: &str) -> Result<(), StoreError> {
        let result = sqlx::query("UPDATE ai_chat_session SET updated_ts = ? WHERE uid = ?")
            .bind(to_millis(Utc::now()))
            .bind(uid)
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::Storage(format!("touch session: {e}")))?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!("session {uid}")));
        }
        Ok(())
    }

    async fn delete_session(&self, uid: &str) -> Result<bool, StoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| StoreError::Storage(format!("begin: {e}")))?;

        sqlx::query(
            "DELETE FROM ai_chat_message WHERE session_id IN (SELECT id FROM ai_chat_session WHERE uid = ?)",
        )
        .bind(uid)
        .execute(&mut *tx)
        .await
        .map_err(|e| StoreError::Storage(format!("delete messages: {e}")))?;

        let result = sqlx::query("DELETE FROM ai_chat_session WHERE uid = ?")
            .bind(uid)
            .execute(&mut *tx)
            .await
            .map_err(|e| StoreError::Storage(format!("delete session: {e}")))?;

        tx.commit()
            .await
            .map_err(|e| StoreError::Storage(format!("commit: {e}")))?;
        Ok(result.rows_affected() > 0)
    }

    async fn append_message(&self, message: NewChatMessage) -> Result<ChatMessage, StoreError> {
        message.validate()?;
        let token_count = message.token_count();
        let row = sqlx::query(
            "INSERT INTO ai_chat_message (session_id, role, content, tool_name, token_count, created_ts)
             VALUES (?, ?, ?, ?, ?, ?) RETURNING *",
        )
        .bind(message.session_id)
        .bind(message.role.as_str())
        .bind(&message.content)
        .bind(&message.tool_name)
        .bind(token_count)
        .bind(to_millis(Utc::now()))
        .fetch_one(&self.pool)
        .await
        .map_err(|e| StoreError::Storage(format!("append message: {e}")))?;
        Self::row_to_message(&row)
    }

    async fn list_messages(&self, session_id: i64) -> Result<Vec<ChatMessage>, StoreError> {
        let rows = sqlx::query("SELECT * FROM ai_chat_message WHERE session_id = ? ORDER BY id ASC")
            .bind(session_id)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StoreError::QueryFailed(format!("list messages: {e}")))?;
        rows.iter().map(Self::row_to_message).collect()
    }

    async fn compact(&self, session_id: i64, summary: &str, drop_through_message_id: i64) -> Result<(), StoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| StoreError::Storage(format!("begin: {e}")))?;

        let updated = sqlx::query("UPDATE ai_chat_session SET summary = ? WHERE id = ?")
            .bind(summary)
            .bind(session_id)
            .execute(&mut *tx)
            .await
            .map_err(|e| StoreError::Storage(format!("store summary: {e}")))?;
        if updated.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!("session id {session_id}")));
        }

        sqlx::query("DELETE FROM ai_chat_message WHERE session_id = ? AND id <= ?")
            .bind(session_id)
            .bind(drop_through_message_id)
            .execute(&mut *tx)
            .await
            .map_err(|e| StoreError::Storage(format!("drop compacted messages: {e}")))?;

        tx.commit()
            .await
            .map_err(|e| StoreError::Storage(format!("commit: {e}")))?;
        Ok(())
    }
}

#[async_trait]
impl NoteStore for SqliteStore {
    async fn create_note(&self, creator_id: UserId, content: &str) -> Result<Note, StoreError> {
        let now = to_millis(Utc::now());
        let row = sqlx::query(
            "INSERT INTO note (uid, creator_id, content, row_status, created_ts, updated_ts)
             VALUES (?, ?, ?, 'NORMAL', ?, ?) RETURNING *",
        )
        .bind(Note::generate_uid())
        .bind(creator_id)
        .bind(content)
        .bind(now)
        .bind(now)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| StoreError::Storage(format!("create note: {e}")))?;
        Self::row_to_note(&row)
    }

    async fn get_note(&self, uid: &str) -> Result<Option<Note>, StoreError> {
        self.note_by_uid(uid).await
    }

    async fn update_note_content(&self, uid: &str, content: &str) -> Result<Note, StoreError> {
        let row = sqlx::query("UPDATE note SET content = ?, updated_ts = ? WHERE uid = ? RETURNING *")
            .bind(content)
            .bind(to_millis(Utc::now()))
            .bind(uid)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StoreError::Storage(format!("update note: {e}")))?;
        match row {
            Some(row) => Self::row_to_note(&row),
            None => Err(StoreError::NotFound(format!("note {uid}"))),
        }
    }

    async fn delete_note(&self, uid: &str) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM note WHERE uid = ?")
            .bind(uid)
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::Storage(format!("delete note: {e}")))?;
        Ok(result.rows_affected() > 0)
    }

    async fn list_notes(&self, filter: &NoteFilter) -> Result<Vec<Note>, StoreError> {
        let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new("SELECT * FROM note WHERE creator_id = ");
        qb.push_bind(filter.creator_id);
        if let Some(text) = &filter.content_contains {
            qb.push(" AND instr(content, ").push_bind(text.clone()).push(") > 0");
        }
        if let Some(from) = filter.created_from {
            qb.push(" AND created_ts >= ").push_bind(to_millis(from));
        }
        if let Some(to) = filter.created_to {
            qb.push(" AND created_ts <= ").push_bind(to_millis(to));
        }
        if let Some(status) = filter.row_status {
            qb.push(" AND row_status = ").push_bind(status.as_str());
        }
        qb.push(" ORDER BY created_ts DESC, id DESC");

        let rows = qb
            .build()
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StoreError::QueryFailed(format!("list notes: {e}")))?;
        rows.iter().map(Self::row_to_note).collect()
    }

    async fn count_notes(&self, filter: &NoteFilter) -> Result<usize, StoreError> {
        if filter.content_contains.is_some() || filter.created_from.is_some() || filter.created_to.is_some() {
            return Ok(self.list_notes(filter).await?.len());
        }
        let status = filter.row_status.map(|s| s.as_str());
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM note WHERE creator_id = ? AND (? IS NULL OR row_status = ?)",
        )
        .bind(filter.creator_id)
        .bind(status)
        .bind(status)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| StoreError::QueryFailed(format!("count notes: {e}")))?;
        Ok(usize::try_from(count).unwrap_or(0))
    }
}
