//! The agent reasoning loop implementation.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use mnemo_core::error::{ProviderError, ToolError};
use mnemo_core::message::Message;
use mnemo_core::provider::{Provider, ProviderRequest};
use mnemo_core::tool::{ToolCall, ToolRegistry};
use tracing::{debug, info, warn};

use crate::stream_event::{ChatEvent, Emitter};
use crate::token::stream_answer;

/// How a turn ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnStatus {
    /// The model produced a turn with no tool calls.
    Answered,
    /// Every round was spent on tool calls.
    RoundLimit,
    /// The provider call failed or could not be decoded.
    Failed,
    /// The request was cancelled, usually by a client disconnect.
    Cancelled,
}

/// One executed tool call and the text fed back to the model.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolTrace {
    pub name: String,
    pub output: String,
}

#[derive(Debug, Clone)]
pub struct TurnOutcome {
    /// The final answer, empty when none was reached
    pub answer: String,
    pub rounds: usize,
    pub tool_results: Vec<ToolTrace>,
    pub status: TurnStatus,
}

impl TurnOutcome {
    fn new(status: TurnStatus, rounds: usize, tool_results: Vec<ToolTrace>) -> Self {
        Self {
            answer: String::new(),
            rounds,
            tool_results,
            status,
        }
    }
}

/// The core agent loop that orchestrates LLM calls and tool execution.
pub struct AgentLoop {
    /// The LLM provider to use
    provider: Arc<dyn Provider>,

    /// The model to use
    model: String,

    /// Hard cap on provider round-trips per turn
    max_rounds: usize,

    /// Pause between simulated answer tokens
    token_delay: Duration,
}

impl AgentLoop {
    pub fn new(provider: Arc<dyn Provider>, model: impl Into<String>) -> Self {
        Self {
            provider,
            model: model.into(),
            max_rounds: 6,
            token_delay: Duration::from_millis(8),
        }
    }

    pub fn with_max_rounds(mut self, max: usize) -> Self {
        self.max_rounds = max;
        self
    }

    pub fn with_token_delay(mut self, delay: Duration) -> Self {
        self.token_delay = delay;
        self
    }

    /// Run one chat turn.
    ///
    /// `messages` is the full prompt: system instruction, prior turns and the
    /// new user message. Each round calls the provider with every tool
    /// declared; a turn without tool calls is the final answer, which is then
    /// streamed to the client word by word. Progress goes out through
    /// `emitter`, whose cancellation token aborts any in-flight call.
    pub async fn run(&self, mut messages: Vec<Message>, tools: &ToolRegistry, emitter: &Emitter) -> TurnOutcome {
        let definitions = tools.definitions();
        let cancel = emitter.cancellation().clone();
        let mut traces = Vec::new();

        info!(model = %self.model, tools = definitions.len(), "Agent init");

        for round in 1..=self.max_rounds {
            debug!(round, messages = messages.len(), "Agent round");

            let request = ProviderRequest::new(self.model.clone(), messages.clone())
                .with_tools(definitions.clone());
            let response = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    return TurnOutcome::new(TurnStatus::Cancelled, round, traces);
                }
                response = self.provider.complete(request) => response,
            };

            let response = match response {
                Ok(r) => r,
                Err(ProviderError::Cancelled) => {
                    return TurnOutcome::new(TurnStatus::Cancelled, round, traces);
                }
                Err(e) => {
                    warn!(round, error = %e, "LLM call failed, aborting turn");
                    let text = match e {
                        ProviderError::InvalidResponse(_) => "failed to decode LLM response".to_string(),
                        other => format!("LLM request failed: {other}"),
                    };
                    emitter.emit(ChatEvent::error(text)).await;
                    return TurnOutcome::new(TurnStatus::Failed, round, traces);
                }
            };

            if response.message.tool_calls.is_empty() {
                let answer = response.message.content;
                info!(round, answer_len = answer.len(), "Agent finish");
                stream_answer(emitter, &answer, self.token_delay).await;
                return TurnOutcome {
                    answer,
                    rounds: round,
                    tool_results: traces,
                    status: TurnStatus::Answered,
                };
            }

            let tool_calls = response.message.tool_calls.clone();
            messages.push(response.message);

            // Some providers repeat a call id within one turn; run it once.
            let mut seen = HashSet::new();
            for tc in tool_calls {
                if !seen.insert(tc.id.clone()) {
                    debug!(call_id = %tc.id, "Skipping duplicate tool call");
                    continue;
                }

                info!(tool = %tc.name, input = %tc.arguments, "Tool call");
                emitter.emit(ChatEvent::tool_call(&tc.name, &tc.arguments)).await;

                let call = ToolCall {
                    id: tc.id.clone(),
                    name: tc.name.clone(),
                    arguments: tc.arguments.clone(),
                };
                let result = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => {
                        return TurnOutcome::new(TurnStatus::Cancelled, round, traces);
                    }
                    result = tools.execute(&call) => result,
                };

                let output = match result {
                    Ok(r) => r.output,
                    Err(ToolError::Cancelled(_)) => {
                        return TurnOutcome::new(TurnStatus::Cancelled, round, traces);
                    }
                    Err(e) => {
                        warn!(tool = %tc.name, error = %e, "Tool execution failed");
                        format!("Error: {e}")
                    }
                };
                info!(tool = %tc.name, result = %output, "Tool result");

                messages.push(Message::tool_result(&tc.id, &output));
                traces.push(ToolTrace {
                    name: tc.name,
                    output,
                });
            }
        }

        warn!(rounds = self.max_rounds, "Round limit reached without a final answer");
        TurnOutcome::new(TurnStatus::RoundLimit, self.max_rounds, traces)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::*;
    use mnemo_core::message::Role;
    use std::sync::atomic::Ordering;
    use tokio::sync::mpsc;

    fn agent(provider: Arc<dyn Provider>) -> AgentLoop {
        AgentLoop::new(provider, "mock-model").with_token_delay(Duration::ZERO)
    }

    fn prompt(text: &str) -> Vec<Message> {
        vec![Message::system("system"), Message::user(text)]
    }

    async fn drain(mut rx: mpsc::Receiver<ChatEvent>) -> Vec<ChatEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    #[tokio::test]
    async fn simple_text_response() {
        let provider = Arc::new(SequentialMockProvider::single_text("Hello! How can I help?"));
        let (emitter, rx) = Emitter::channel(64);

        let outcome = agent(provider.clone())
            .run(prompt("Hello!"), &ToolRegistry::new(), &emitter)
            .await;

        assert_eq!(outcome.status, TurnStatus::Answered);
        assert_eq!(outcome.answer, "Hello! How can I help?");
        assert_eq!(outcome.rounds, 1);
        assert_eq!(
            drain(rx).await,
            vec![
                ChatEvent::token("Hello! "),
                ChatEvent::token("How "),
                ChatEvent::token("can "),
                ChatEvent::token("I "),
                ChatEvent::token("help? "),
            ]
        );
    }

    #[tokio::test]
    async fn tool_result_fed_back_to_model() {
        let provider = Arc::new(SequentialMockProvider::from_responses(vec![
            make_tool_call_response(
                vec![make_tool_call("call_1", "counter", serde_json::json!({"q": 1}))],
                "",
            ),
            make_text_response("done"),
        ]));
        let (tool, calls) = CountingTool::new("counter");
        let mut tools = ToolRegistry::new();
        tools.register(Box::new(tool));
        let (emitter, rx) = Emitter::channel(64);

        let outcome = agent(provider.clone()).run(prompt("count"), &tools, &emitter).await;

        assert_eq!(outcome.answer, "done");
        assert_eq!(outcome.rounds, 2);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(outcome.tool_results[0].output, r#"echo: {"q":1}"#);

        let second = &provider.requests()[1];
        assert!(!second.tools.is_empty());
        let last = second.messages.last().unwrap();
        assert_eq!(last.role, Role::Tool);
        assert_eq!(last.tool_call_id.as_deref(), Some("call_1"));
        let assistant = &second.messages[second.messages.len() - 2];
        assert_eq!(assistant.tool_calls.len(), 1);

        let events = drain(rx).await;
        assert_eq!(events[0], ChatEvent::tool_call("counter", r#"{"q":1}"#));
        assert_eq!(events[1], ChatEvent::token("done "));
    }

    #[tokio::test]
    async fn duplicate_call_ids_run_once() {
        let call = make_tool_call("dup", "counter", serde_json::json!({}));
        let provider = Arc::new(SequentialMockProvider::from_responses(vec![
            make_tool_call_response(vec![call.clone(), call], ""),
            make_text_response("ok"),
        ]));
        let (tool, calls) = CountingTool::new("counter");
        let mut tools = ToolRegistry::new();
        tools.register(Box::new(tool));
        let (emitter, rx) = Emitter::channel(64);

        agent(provider).run(prompt("go"), &tools, &emitter).await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        let tool_events = drain(rx)
            .await
            .into_iter()
            .filter(|e| e.event_type() == "tool_call")
            .count();
        assert_eq!(tool_events, 1);
    }

    #[tokio::test]
    async fn stops_after_max_rounds() {
        let call = make_tool_call("c", "counter", serde_json::json!({}));
        let provider = Arc::new(SequentialMockProvider::always_tool(call, 6));
        let (tool, calls) = CountingTool::new("counter");
        let mut tools = ToolRegistry::new();
        tools.register(Box::new(tool));
        let (emitter, rx) = Emitter::channel(64);

        let outcome = agent(provider.clone())
            .with_max_rounds(6)
            .run(prompt("loop forever"), &tools, &emitter)
            .await;

        assert_eq!(outcome.status, TurnStatus::RoundLimit);
        assert_eq!(outcome.answer, "");
        assert_eq!(provider.call_count(), 6);
        assert_eq!(calls.load(Ordering::SeqCst), 6);
        assert!(drain(rx).await.iter().all(|e| e.event_type() == "tool_call"));
    }

    #[tokio::test]
    async fn transport_failure_aborts_with_error_event() {
        let provider = Arc::new(SequentialMockProvider::new(vec![Err(ProviderError::Network(
            "connection refused".into(),
        ))]));
        let (emitter, rx) = Emitter::channel(64);

        let outcome = agent(provider).run(prompt("hi"), &ToolRegistry::new(), &emitter).await;

        assert_eq!(outcome.status, TurnStatus::Failed);
        assert!(outcome.answer.is_empty());
        let events = drain(rx).await;
        assert_eq!(events.len(), 1);
        match &events[0] {
            ChatEvent::Error { content } => {
                assert!(content.starts_with("LLM request failed: "));
                assert!(content.contains("connection refused"));
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[tokio::test]
    async fn undecodable_response_reported() {
        let provider = Arc::new(SequentialMockProvider::new(vec![Err(
            ProviderError::InvalidResponse("no choices".into()),
        )]));
        let (emitter, rx) = Emitter::channel(64);

        agent(provider).run(prompt("hi"), &ToolRegistry::new(), &emitter).await;

        assert_eq!(drain(rx).await, vec![ChatEvent::error("failed to decode LLM response")]);
    }

    #[tokio::test]
    async fn tool_errors_become_result_text() {
        let provider = Arc::new(SequentialMockProvider::from_responses(vec![
            make_tool_call_response(vec![make_tool_call("b", "broken", serde_json::json!({}))], ""),
            make_text_response("sorry"),
        ]));
        let mut tools = ToolRegistry::new();
        tools.register(Box::new(BrokenTool));
        let (emitter, _rx) = Emitter::channel(64);

        let outcome = agent(provider.clone()).run(prompt("x"), &tools, &emitter).await;

        assert_eq!(outcome.answer, "sorry");
        assert!(outcome.tool_results[0].output.starts_with("Error: "));
        let fed_back = provider.requests()[1].messages.last().unwrap().content.clone();
        assert!(fed_back.contains("backend unreachable"));
    }

    #[tokio::test]
    async fn unknown_tool_reported_to_model() {
        let provider = Arc::new(SequentialMockProvider::from_responses(vec![
            make_tool_call_response(vec![make_tool_call("u", "nope", serde_json::json!({}))], ""),
            make_text_response("ok"),
        ]));
        let (emitter, _rx) = Emitter::channel(64);

        let outcome = agent(provider).run(prompt("x"), &ToolRegistry::new(), &emitter).await;
        assert_eq!(outcome.tool_results[0].output, "Unknown tool: nope");
    }

    #[tokio::test]
    async fn cancellation_aborts_inflight_call() {
        let (emitter, _rx) = Emitter::channel(64);
        let token = emitter.cancellation().clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            token.cancel();
        });

        let outcome = agent(Arc::new(HangingProvider))
            .run(prompt("x"), &ToolRegistry::new(), &emitter)
            .await;
        assert_eq!(outcome.status, TurnStatus::Cancelled);
        assert!(outcome.answer.is_empty());
    }
}
