//! Chat streaming events and the emitter that pushes them to a client.
//!
//! Every event serializes to `{"type": ..., "content"?: ..., "payload"?: ...}`.
//! The gateway frames each one as an SSE `data:` line.

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Events emitted while a chat turn runs.
///
/// - `tool_call`: the agent is invoking a tool
/// - `source`: a note cited alongside the answer
/// - `token`: one word of the final answer, plus a trailing space
/// - `error`: the turn was aborted
/// - `done`: terminal; carries the session uid
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChatEvent {
    ToolCall { payload: ToolCallPayload },
    Source { payload: SourcePayload },
    Token { content: String },
    Error { content: String },
    Done { content: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallPayload {
    pub name: String,

    /// Raw argument string as the model produced it
    pub input: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourcePayload {
    pub note_uid: String,
    pub snippet: String,
}

impl ChatEvent {
    pub fn tool_call(name: impl Into<String>, input: impl Into<String>) -> Self {
        Self::ToolCall {
            payload: ToolCallPayload {
                name: name.into(),
                input: input.into(),
            },
        }
    }

    pub fn source(note_uid: impl Into<String>, snippet: impl Into<String>) -> Self {
        Self::Source {
            payload: SourcePayload {
                note_uid: note_uid.into(),
                snippet: snippet.into(),
            },
        }
    }

    pub fn token(content: impl Into<String>) -> Self {
        Self::Token { content: content.into() }
    }

    pub fn error(content: impl Into<String>) -> Self {
        Self::Error { content: content.into() }
    }

    pub fn done(session_uid: impl Into<String>) -> Self {
        Self::Done { content: session_uid.into() }
    }

    /// Event kind as it appears in the `type` field.
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::ToolCall { .. } => "tool_call",
            Self::Source { .. } => "source",
            Self::Token { .. } => "token",
            Self::Error { .. } => "error",
            Self::Done { .. } => "done",
        }
    }

    pub fn to_json(&self) -> String {
        // Every field is a plain string, so serialization cannot fail.
        serde_json::to_string(self).unwrap_or_default()
    }
}

/// Sends chat events to one client.
///
/// Cloning shares the channel and the request's cancellation token. When the
/// receiving side is gone the token is cancelled, so in-flight upstream work
/// stops instead of running with no listener.
#[derive(Clone)]
pub struct Emitter {
    tx: mpsc::Sender<ChatEvent>,
    cancel: CancellationToken,
}

impl Emitter {
    /// A new emitter and the receiving half of its channel.
    pub fn channel(buffer: usize) -> (Self, mpsc::Receiver<ChatEvent>) {
        let (tx, rx) = mpsc::channel(buffer.max(1));
        (
            Self {
                tx,
                cancel: CancellationToken::new(),
            },
            rx,
        )
    }

    /// The cancellation token shared by everything this request does.
    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Send one event. Returns `false` once the client has gone away.
    pub async fn emit(&self, event: ChatEvent) -> bool {
        if self.cancel.is_cancelled() {
            return false;
        }
        if self.tx.send(event).await.is_err() {
            debug!("Chat client disconnected, cancelling request");
            self.cancel.cancel();
            return false;
        }
        true
    }
}
