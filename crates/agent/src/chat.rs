//! The chat service: session management plus the full request pipeline for
//! one chat turn (compaction, agent loop, persistence, citations).

use std::sync::Arc;
use std::time::Duration;

use chrono::Local;
use mnemo_config::AgentConfig;
use mnemo_core::UserId;
use mnemo_core::error::StoreError;
use mnemo_core::message::{Message, Role};
use mnemo_core::note::NoteStore;
use mnemo_core::provider::{Provider, ProviderRequest};
use mnemo_core::session::{ChatMessage, NewChatMessage, Session, SessionStore};
use mnemo_tools::{NoteToolContext, note_registry};
use mnemo_vectorstore::VectorStore;
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::compaction::Compactor;
use crate::loop_runner::{AgentLoop, TurnOutcome, TurnStatus};
use crate::prompt::{system_prompt, title_prompt};
use crate::stream_event::{ChatEvent, Emitter};

/// Characters of a cited note sent with each `source` event.
const SNIPPET_CHARS: usize = 200;

#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    #[error("AI chat is not configured (missing OPENROUTER_API_KEY)")]
    NotConfigured,

    #[error("content required")]
    EmptyContent,

    #[error("session not found")]
    SessionNotFound,

    #[error("title required")]
    TitleRequired,

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Body of a chat request.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    #[serde(default)]
    pub content: String,

    /// Restrict semantic search hits to notes with this tag
    #[serde(default)]
    pub tag_filter: Option<String>,
}

impl ChatRequest {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            tag_filter: None,
        }
    }

    pub fn with_tag_filter(mut self, tag: impl Into<String>) -> Self {
        self.tag_filter = Some(tag.into());
        self
    }
}

/// A validated chat turn, ready to run.
///
/// Produced by [`ChatService::prepare_chat`] so request errors surface
/// before any event stream is opened.
pub struct PreparedTurn {
    user_id: UserId,
    provider: Arc<dyn Provider>,
    session: Session,
    history: Vec<ChatMessage>,
    content: String,
    tag_filter: Option<String>,
}

impl PreparedTurn {
    pub fn session(&self) -> &Session {
        &self.session
    }
}

pub struct ChatService {
    provider: Option<Arc<dyn Provider>>,
    sessions: Arc<dyn SessionStore>,
    notes: Arc<dyn NoteStore>,
    index: Option<Arc<VectorStore>>,
    model: String,
    config: AgentConfig,
}

impl ChatService {
    pub fn new(
        sessions: Arc<dyn SessionStore>,
        notes: Arc<dyn NoteStore>,
        model: impl Into<String>,
        config: AgentConfig,
    ) -> Self {
        Self {
            provider: None,
            sessions,
            notes,
            index: None,
            model: model.into(),
            config,
        }
    }

    pub fn with_provider(mut self, provider: Arc<dyn Provider>) -> Self {
        self.provider = Some(provider);
        self
    }

    pub fn with_index(mut self, index: Arc<VectorStore>) -> Self {
        self.index = Some(index);
        self
    }

    /// Whether an LLM provider is available for chat.
    pub fn is_configured(&self) -> bool {
        self.provider.is_some()
    }

    async fn owned_session(&self, user_id: UserId, uid: &str) -> Result<Session, ChatError> {
        match self.sessions.get_session(uid).await? {
            Some(session) if session.is_owned_by(user_id) => Ok(session),
            _ => Err(ChatError::SessionNotFound),
        }
    }

    pub async fn create_session(&self, user_id: UserId, title: Option<String>) -> Result<Session, ChatError> {
        let session = self.sessions.create_session(user_id, title).await?;
        debug!(session = %session.uid, user = user_id, "Session created");
        Ok(session)
    }

    pub async fn list_sessions(&self, user_id: UserId) -> Result<Vec<Session>, ChatError> {
        Ok(self.sessions.list_sessions(user_id).await?)
    }

    pub async fn rename_session(&self, user_id: UserId, uid: &str, title: &str) -> Result<Session, ChatError> {
        self.owned_session(user_id, uid).await?;
        let title = title.trim();
        if title.is_empty() {
            return Err(ChatError::TitleRequired);
        }
        Ok(self.sessions.update_title(uid, title).await?)
    }

    pub async fn delete_session(&self, user_id: UserId, uid: &str) -> Result<(), ChatError> {
        self.owned_session(user_id, uid).await?;
        self.sessions.delete_session(uid).await?;
        debug!(session = %uid, "Session deleted");
        Ok(())
    }

    pub async fn list_messages(&self, user_id: UserId, uid: &str) -> Result<Vec<ChatMessage>, ChatError> {
        let session = self.owned_session(user_id, uid).await?;
        Ok(self.sessions.list_messages(session.id).await?)
    }

    /// Validate a chat request and load the session it targets.
    pub async fn prepare_chat(
        &self,
        user_id: UserId,
        uid: &str,
        request: ChatRequest,
    ) -> Result<PreparedTurn, ChatError> {
        let provider = self.provider.clone().ok_or(ChatError::NotConfigured)?;
        let content = request.content.trim().to_string();
        if content.is_empty() {
            return Err(ChatError::EmptyContent);
        }
        let session = self.owned_session(user_id, uid).await?;
        let history = self.sessions.list_messages(session.id).await?;
        let tag_filter = request
            .tag_filter
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty());

        Ok(PreparedTurn {
            user_id,
            provider,
            session,
            history,
            content,
            tag_filter,
        })
    }

    /// Prepare and run a turn in one step.
    pub async fn chat(
        &self,
        user_id: UserId,
        uid: &str,
        request: ChatRequest,
        emitter: &Emitter,
    ) -> Result<TurnOutcome, ChatError> {
        let turn = self.prepare_chat(user_id, uid, request).await?;
        Ok(self.run_turn(turn, emitter).await)
    }

    /// Run a prepared turn to completion, streaming progress to `emitter`.
    ///
    /// Failures past this point are reported as events or logged; the
    /// client always gets a closing `done` unless it has disconnected.
    pub async fn run_turn(&self, turn: PreparedTurn, emitter: &Emitter) -> TurnOutcome {
        let PreparedTurn {
            user_id,
            provider,
            mut session,
            mut history,
            content,
            tag_filter,
        } = turn;
        let cancel = emitter.cancellation().clone();

        let compactor = Compactor::new(
            provider.clone(),
            self.model.clone(),
            self.config.compact_threshold_chars,
            self.config.keep_recent_messages,
        );
        match compactor
            .compact(self.sessions.as_ref(), &session, &history, &cancel)
            .await
        {
            Ok(Some(compacted)) => {
                history = compacted.messages;
                session = compacted.session;
            }
            Ok(None) => {}
            Err(e) => warn!(session = %session.uid, error = %e, "Context compaction failed"),
        }

        if let Err(e) = self
            .sessions
            .append_message(NewChatMessage::user(session.id, content.clone()))
            .await
        {
            warn!(session = %session.uid, error = %e, "Failed to persist user message");
        }

        if history.is_empty() && session.has_default_title() {
            tokio::spawn(generate_title(
                provider.clone(),
                self.sessions.clone(),
                self.model.clone(),
                session.uid.clone(),
                content.clone(),
            ));
        }

        let mut ctx = NoteToolContext::new(user_id, self.notes.clone()).with_cancel(cancel.clone());
        if let Some(index) = &self.index {
            ctx = ctx.with_index(index.clone());
        }
        let tools = note_registry(ctx, tag_filter);

        let mut messages = Vec::with_capacity(history.len() + 2);
        messages.push(Message::system(system_prompt(&session.summary, Local::now())));
        messages.extend(history.iter().filter_map(|m| match m.role {
            Role::User => Some(Message::user(&m.content)),
            Role::Assistant => Some(Message::assistant(&m.content)),
            _ => None,
        }));
        messages.push(Message::user(&content));

        let agent = AgentLoop::new(provider, self.model.clone())
            .with_max_rounds(self.config.max_rounds)
            .with_token_delay(Duration::from_millis(self.config.token_delay_ms));
        let outcome = agent.run(messages, &tools, emitter).await;

        if outcome.status == TurnStatus::Cancelled {
            info!(session = %session.uid, "Chat turn cancelled");
            return outcome;
        }

        if self.config.persist_tool_messages {
            for trace in &outcome.tool_results {
                let msg = NewChatMessage::tool(session.id, &trace.name, &trace.output);
                if let Err(e) = self.sessions.append_message(msg).await {
                    warn!(session = %session.uid, tool = %trace.name, error = %e, "Failed to persist tool message");
                }
            }
        }
        if !outcome.answer.is_empty() {
            if let Err(e) = self
                .sessions
                .append_message(NewChatMessage::assistant(session.id, outcome.answer.clone()))
                .await
            {
                warn!(session = %session.uid, error = %e, "Failed to persist assistant message");
            }
        }

        self.emit_sources(user_id, &content, emitter).await;

        if let Err(e) = self.sessions.touch_session(&session.uid).await {
            warn!(session = %session.uid, error = %e, "Failed to update session");
        }

        emitter.emit(ChatEvent::done(&session.uid)).await;
        outcome
    }

    /// Cite the notes closest to the question, independent of tool use.
    async fn emit_sources(&self, user_id: UserId, query: &str, emitter: &Emitter) {
        let Some(index) = &self.index else {
            return;
        };
        let hits = match index
            .search(user_id, query, self.config.source_count, emitter.cancellation())
            .await
        {
            Ok(hits) => hits,
            Err(e) => {
                debug!(error = %e, "Source lookup failed");
                return;
            }
        };
        for hit in hits {
            let snippet: String = hit.content.chars().take(SNIPPET_CHARS).collect();
            if !emitter.emit(ChatEvent::source(hit.id, snippet)).await {
                return;
            }
        }
    }
}

/// Name a new session after its first message. Best effort.
async fn generate_title(
    provider: Arc<dyn Provider>,
    sessions: Arc<dyn SessionStore>,
    model: String,
    uid: String,
    first_message: String,
) {
    let request = ProviderRequest::new(model, vec![Message::user(title_prompt(&first_message))]);
    let title = match provider.complete(request).await {
        Ok(response) => response.message.content.trim().trim_matches('"').trim().to_string(),
        Err(e) => {
            debug!(session = %uid, error = %e, "Title generation failed");
            return;
        }
    };
    if title.is_empty() {
        return;
    }
    match sessions.update_title(&uid, &title).await {
        Ok(_) => debug!(session = %uid, title = %title, "Session titled"),
        Err(e) => debug!(session = %uid, error = %e, "Failed to store generated title"),
    }
}
