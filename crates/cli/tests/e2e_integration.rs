//! End-to-end integration tests for the mnemo chat pipeline.
//!
//! These tests run full chat turns against the SQLite store and an on-disk
//! vector index, with only the LLM scripted: compaction, tool dispatch,
//! index maintenance, persistence and the streamed events.

use std::sync::{Arc, Mutex};

use mnemo_agent::{ChatEvent, ChatRequest, ChatService, Emitter, TurnStatus};
use mnemo_config::AgentConfig;
use mnemo_core::error::ProviderError;
use mnemo_core::message::{Message, MessageToolCall, Role};
use mnemo_core::note::NoteStore;
use mnemo_core::provider::{Provider, ProviderRequest, ProviderResponse, Usage};
use mnemo_core::session::{NewChatMessage, SessionStore};
use mnemo_store::SqliteStore;
use mnemo_vectorstore::{HashingEmbedder, VectorStore};
use tokio::sync::mpsc;

// ── Mock Provider ────────────────────────────────────────────────────────

/// A mock provider that returns scripted responses in sequence.
struct ScriptedProvider {
    responses: Mutex<Vec<ProviderResponse>>,
    requests: Mutex<Vec<ProviderRequest>>,
}

impl ScriptedProvider {
    fn new(responses: Vec<ProviderResponse>) -> Self {
        Self {
            responses: Mutex::new(responses),
            requests: Mutex::new(Vec::new()),
        }
    }

    fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    fn request(&self, n: usize) -> ProviderRequest {
        self.requests.lock().unwrap()[n].clone()
    }
}

#[async_trait::async_trait]
impl Provider for ScriptedProvider {
    fn name(&self) -> &str {
        "e2e_mock"
    }

    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        let mut requests = self.requests.lock().unwrap();
        let mut responses = self.responses.lock().unwrap();
        if responses.is_empty() {
            panic!("ScriptedProvider exhausted: call #{}", requests.len());
        }
        requests.push(request);
        Ok(responses.remove(0))
    }
}

fn text_response(text: &str) -> ProviderResponse {
    ProviderResponse {
        message: Message::assistant(text),
        usage: Some(Usage {
            prompt_tokens: 10,
            completion_tokens: 5,
            total_tokens: 15,
        }),
        model: "mock".into(),
    }
}

fn tool_response(tool_calls: Vec<MessageToolCall>) -> ProviderResponse {
    ProviderResponse {
        message: Message::assistant("").with_tool_calls(tool_calls),
        usage: None,
        model: "mock".into(),
    }
}

fn make_tool_call(id: &str, name: &str, args: serde_json::Value) -> MessageToolCall {
    MessageToolCall {
        id: id.to_string(),
        name: name.to_string(),
        arguments: args.to_string(),
    }
}

// ── Harness ──────────────────────────────────────────────────────────────

struct Stack {
    store: SqliteStore,
    index: Arc<VectorStore>,
    _dir: tempfile::TempDir,
}

impl Stack {
    async fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join("mnemo.db");
        let store = SqliteStore::new(&db.to_string_lossy()).await.unwrap();
        let index = VectorStore::open(dir.path().join("vectorstore"), Arc::new(HashingEmbedder::default()))
            .await
            .unwrap();
        Self {
            store,
            index: Arc::new(index),
            _dir: dir,
        }
    }

    fn chat(&self, provider: Arc<ScriptedProvider>, config: AgentConfig) -> ChatService {
        ChatService::new(
            Arc::new(self.store.clone()),
            Arc::new(self.store.clone()),
            "mock",
            config,
        )
        .with_provider(provider)
        .with_index(self.index.clone())
    }
}

fn fast_config() -> AgentConfig {
    AgentConfig {
        token_delay_ms: 0,
        ..AgentConfig::default()
    }
}

fn drain(rx: &mut mpsc::Receiver<ChatEvent>) -> Vec<ChatEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

fn tool_outputs(request: &ProviderRequest) -> Vec<String> {
    request
        .messages
        .iter()
        .filter(|m| m.role == Role::Tool)
        .map(|m| m.content.clone())
        .collect()
}

// ── E2E scenarios ────────────────────────────────────────────────────────

#[tokio::test]
async fn e2e_date_query_with_no_notes() {
    let stack = Stack::new().await;
    let session = stack.store.create_session(1, Some("Journal".into())).await.unwrap();
    let provider = Arc::new(ScriptedProvider::new(vec![
        tool_response(vec![make_tool_call(
            "call_1",
            "query_notes",
            serde_json::json!({"date_start": "2024-01-26", "date_end": "2024-01-26"}),
        )]),
        text_response("I found no notes from 2024-01-26."),
    ]));
    let chat = stack.chat(provider.clone(), fast_config());
    let (emitter, mut rx) = Emitter::channel(256);

    let outcome = chat
        .chat(1, &session.uid, ChatRequest::new("What did I write on 2024-01-26?"), &emitter)
        .await
        .unwrap();

    assert_eq!(outcome.status, TurnStatus::Answered);
    assert_eq!(
        tool_outputs(&provider.request(1)),
        vec!["No notes found matching those criteria."]
    );

    let events = drain(&mut rx);
    assert_eq!(events[0].event_type(), "tool_call");
    assert_eq!(events.last().unwrap(), &ChatEvent::done(&session.uid));
}

#[tokio::test]
async fn e2e_created_note_is_indexed_and_cited() {
    let stack = Stack::new().await;
    let session = stack.store.create_session(1, Some("Ideas".into())).await.unwrap();
    let provider = Arc::new(ScriptedProvider::new(vec![
        tool_response(vec![make_tool_call(
            "call_1",
            "create_note",
            serde_json::json!({"content": "Try sourdough baking this weekend #cooking"}),
        )]),
        text_response("Saved your sourdough idea."),
        text_response("You wanted to try sourdough baking."),
    ]));
    let chat = stack.chat(provider.clone(), fast_config());

    let (emitter, _rx) = Emitter::channel(256);
    chat.chat(1, &session.uid, ChatRequest::new("Remember to try sourdough baking"), &emitter)
        .await
        .unwrap();

    let notes = stack
        .store
        .list_notes(&mnemo_core::note::NoteFilter::for_user(1))
        .await
        .unwrap();
    assert_eq!(notes.len(), 1);
    assert!(tool_outputs(&provider.request(1))[0].starts_with("Note successfully created with UID: "));
    assert_eq!(stack.index.count(1).await.unwrap(), 1);

    let (emitter, mut rx) = Emitter::channel(256);
    chat.chat(1, &session.uid, ChatRequest::new("sourdough baking plans?"), &emitter)
        .await
        .unwrap();
    let cited: Vec<String> = drain(&mut rx)
        .into_iter()
        .filter_map(|e| match e {
            ChatEvent::Source { payload } => Some(payload.note_uid),
            _ => None,
        })
        .collect();
    assert_eq!(cited, vec![notes[0].uid.clone()]);

    // user + assistant per turn
    assert_eq!(stack.store.list_messages(session.id).await.unwrap().len(), 4);
}

#[tokio::test]
async fn e2e_cross_user_update_is_refused() {
    let stack = Stack::new().await;
    let note = stack.store.create_note(1, "private plans").await.unwrap();
    let session = stack.store.create_session(2, Some("Mallory".into())).await.unwrap();
    let provider = Arc::new(ScriptedProvider::new(vec![
        tool_response(vec![make_tool_call(
            "call_1",
            "update_note",
            serde_json::json!({"uid": note.uid, "content": "defaced"}),
        )]),
        text_response("I can't change that note."),
    ]));
    let chat = stack.chat(provider.clone(), fast_config());
    let (emitter, _rx) = Emitter::channel(256);

    chat.chat(2, &session.uid, ChatRequest::new("rewrite that note"), &emitter)
        .await
        .unwrap();

    assert_eq!(
        tool_outputs(&provider.request(1)),
        vec!["Error: unauthorized to update this note."]
    );
    let unchanged = stack.store.get_note(&note.uid).await.unwrap().unwrap();
    assert_eq!(unchanged.content, "private plans");
}

#[tokio::test]
async fn e2e_round_cap_is_a_soft_stop() {
    let stack = Stack::new().await;
    let session = stack.store.create_session(1, Some("Loop".into())).await.unwrap();
    let responses = (0..6)
        .map(|i| {
            tool_response(vec![make_tool_call(
                &format!("call_{i}"),
                "get_user_stats",
                serde_json::json!({}),
            )])
        })
        .collect();
    let provider = Arc::new(ScriptedProvider::new(responses));
    let chat = stack.chat(provider.clone(), fast_config());
    let (emitter, mut rx) = Emitter::channel(256);

    let outcome = chat
        .chat(1, &session.uid, ChatRequest::new("stats please"), &emitter)
        .await
        .unwrap();

    assert_eq!(outcome.status, TurnStatus::RoundLimit);
    assert!(outcome.answer.is_empty());
    assert_eq!(provider.calls(), 6);

    let events = drain(&mut rx);
    assert_eq!(events.iter().filter(|e| e.event_type() == "tool_call").count(), 6);
    assert_eq!(events.last().unwrap(), &ChatEvent::done(&session.uid));

    let stored = stack.store.list_messages(session.id).await.unwrap();
    assert_eq!(stored.len(), 1);
}

#[tokio::test]
async fn e2e_compaction_on_sqlite() {
    let stack = Stack::new().await;
    let session = stack.store.create_session(1, Some("Long".into())).await.unwrap();
    for i in 0..20 {
        let content = format!("message {i} {}", "lorem ipsum ".repeat(20));
        let msg = if i % 2 == 0 {
            NewChatMessage::user(session.id, content)
        } else {
            NewChatMessage::assistant(session.id, content)
        };
        stack.store.append_message(msg).await.unwrap();
    }

    let provider = Arc::new(ScriptedProvider::new(vec![
        text_response("The user wrote twenty long messages."),
        text_response("Hello again."),
    ]));
    let config = AgentConfig {
        compact_threshold_chars: 2_000,
        keep_recent_messages: 10,
        ..fast_config()
    };
    let chat = stack.chat(provider.clone(), config);
    let (emitter, _rx) = Emitter::channel(256);

    chat.chat(1, &session.uid, ChatRequest::new("hi"), &emitter)
        .await
        .unwrap();

    let reloaded = stack.store.get_session(&session.uid).await.unwrap().unwrap();
    assert_eq!(reloaded.summary, "The user wrote twenty long messages.");

    let stored = stack.store.list_messages(session.id).await.unwrap();
    assert_eq!(stored.len(), 12);
    assert!(stored[0].content.starts_with("message 10 "));

    let summarize = provider.request(0);
    assert!(summarize.tools.is_empty());
    assert!(summarize.messages[0].content.contains("user: message 0 "));
}
