//! Context compaction.
//!
//! When a session's stored history grows past a character budget, the older
//! messages are summarized by the model and replaced by the session's running
//! summary. The newest `keep_recent` messages always stay verbatim.

use std::sync::Arc;

use mnemo_core::error::{ProviderError, StoreError};
use mnemo_core::message::Message;
use mnemo_core::provider::{Provider, ProviderRequest};
use mnemo_core::session::{ChatMessage, Session, SessionStore};
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::prompt::summary_prompt;

#[derive(Debug, thiserror::Error)]
pub enum CompactionError {
    #[error("summarization failed: {0}")]
    Provider(#[from] ProviderError),

    #[error("model returned an empty summary")]
    EmptySummary,

    #[error("failed to store compacted history: {0}")]
    Store(#[from] StoreError),
}

/// History after a compaction.
#[derive(Debug, Clone)]
pub struct Compacted {
    /// The retained recent messages
    pub messages: Vec<ChatMessage>,

    /// The session with its accumulated summary
    pub session: Session,
}

pub struct Compactor {
    provider: Arc<dyn Provider>,
    model: String,
    threshold_chars: usize,
    keep_recent: usize,
}

/// Index splitting `messages` into an old prefix and a kept suffix, or
/// `None` when the history is within budget or too short to split.
pub fn split_point(messages: &[ChatMessage], threshold_chars: usize, keep_recent: usize) -> Option<usize> {
    let total: usize = messages.iter().map(|m| m.content.chars().count()).sum();
    if total <= threshold_chars || messages.len() <= keep_recent {
        return None;
    }
    Some(messages.len() - keep_recent)
}

/// Append a new summary to the existing one, separated by a blank line.
pub fn merge_summaries(existing: &str, new: &str) -> String {
    if existing.is_empty() {
        new.to_string()
    } else {
        format!("{existing}\n\n{new}")
    }
}

impl Compactor {
    pub fn new(provider: Arc<dyn Provider>, model: impl Into<String>, threshold_chars: usize, keep_recent: usize) -> Self {
        Self {
            provider,
            model: model.into(),
            threshold_chars,
            keep_recent,
        }
    }

    /// Compact the session's history if it is over budget.
    ///
    /// Returns `Ok(None)` when nothing needed doing. On error nothing has
    /// been changed in storage and the caller keeps the original history.
    pub async fn compact(
        &self,
        store: &dyn SessionStore,
        session: &Session,
        messages: &[ChatMessage],
        cancel: &CancellationToken,
    ) -> Result<Option<Compacted>, CompactionError> {
        let Some(cut) = split_point(messages, self.threshold_chars, self.keep_recent) else {
            return Ok(None);
        };
        let (old, recent) = messages.split_at(cut);

        let request = ProviderRequest::new(self.model.clone(), vec![Message::user(summary_prompt(old))]);
        let response = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(ProviderError::Cancelled.into()),
            response = self.provider.complete(request) => response?,
        };
        let summary = response.message.content.trim().to_string();
        if summary.is_empty() {
            return Err(CompactionError::EmptySummary);
        }

        let full_summary = merge_summaries(&session.summary, &summary);
        let drop_through = old.last().map(|m| m.id).unwrap_or_default();
        store.compact(session.id, &full_summary, drop_through).await?;

        info!(
            session = %session.uid,
            summary_len = full_summary.len(),
            kept_messages = recent.len(),
            "Context compacted"
        );

        let mut session = session.clone();
        session.summary = full_summary;
        Ok(Some(Compacted {
            messages: recent.to_vec(),
            session,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::*;
    use mnemo_core::session::NewChatMessage;
    use mnemo_store::InMemoryStore;

    async fn seeded(store: &InMemoryStore, count: usize, size: usize) -> (Session, Vec<ChatMessage>) {
        let session = store.create_session(1, None).await.unwrap();
        for i in 0..count {
            let content = format!("{i:03}{}", "x".repeat(size.saturating_sub(3)));
            let msg = if i % 2 == 0 {
                NewChatMessage::user(session.id, content)
            } else {
                NewChatMessage::assistant(session.id, content)
            };
            store.append_message(msg).await.unwrap();
        }
        let messages = store.list_messages(session.id).await.unwrap();
        (session, messages)
    }

    #[test]
    fn split_point_rules() {
        let msg = |content: &str| ChatMessage {
            id: 1,
            session_id: 1,
            role: mnemo_core::message::Role::User,
            content: content.into(),
            tool_name: None,
            token_count: 0,
            created_ts: chrono::Utc::now(),
        };
        let history: Vec<ChatMessage> = (0..5).map(|_| msg("abcd")).collect();
        assert_eq!(split_point(&history, 100, 2), None);
        assert_eq!(split_point(&history, 20, 2), None);
        assert_eq!(split_point(&history, 19, 2), Some(3));
        assert_eq!(split_point(&history, 0, 5), None);
    }

    #[test]
    fn summaries_accumulate() {
        assert_eq!(merge_summaries("", "first"), "first");
        assert_eq!(merge_summaries("first", "second"), "first\n\nsecond");
    }

    #[tokio::test]
    async fn under_threshold_is_a_noop() {
        let store = InMemoryStore::new();
        let (session, messages) = seeded(&store, 12, 10).await;
        let provider = Arc::new(SequentialMockProvider::new(vec![]));
        let compactor = Compactor::new(provider.clone(), "m", 1_000, 10);

        let result = compactor
            .compact(&store, &session, &messages, &CancellationToken::new())
            .await
            .unwrap();
        assert!(result.is_none());
        assert_eq!(provider.call_count(), 0);
        assert_eq!(store.list_messages(session.id).await.unwrap().len(), 12);
    }

    #[tokio::test]
    async fn over_threshold_keeps_recent_and_summarizes() {
        let store = InMemoryStore::new();
        let (session, messages) = seeded(&store, 14, 100).await;
        let provider = Arc::new(SequentialMockProvider::single_text("first summary"));
        let compactor = Compactor::new(provider.clone(), "m", 1_000, 10);

        let compacted = compactor
            .compact(&store, &session, &messages, &CancellationToken::new())
            .await
            .unwrap()
            .unwrap();

        assert_eq!(compacted.messages.len(), 10);
        assert_eq!(compacted.messages[0].content, messages[4].content);
        assert_eq!(compacted.session.summary, "first summary");

        let stored = store.list_messages(session.id).await.unwrap();
        assert_eq!(stored.len(), 10);
        assert_eq!(stored[0].id, messages[4].id);
        let reloaded = store.get_session(&session.uid).await.unwrap().unwrap();
        assert_eq!(reloaded.summary, "first summary");

        let prompt = &provider.requests()[0].messages[0].content;
        assert!(prompt.contains("user: 000"));
        assert!(prompt.contains("assistant: 003"));
        assert!(!prompt.contains("004"));
    }

    #[tokio::test]
    async fn repeated_compaction_concatenates_summaries() {
        let store = InMemoryStore::new();
        let (session, messages) = seeded(&store, 14, 100).await;
        let provider = Arc::new(SequentialMockProvider::from_responses(vec![
            make_text_response("first summary"),
            make_text_response("second summary"),
        ]));
        let compactor = Compactor::new(provider, "m", 1_000, 10);
        let cancel = CancellationToken::new();

        let first = compactor
            .compact(&store, &session, &messages, &cancel)
            .await
            .unwrap()
            .unwrap();

        for _ in 0..4 {
            store
                .append_message(NewChatMessage::user(session.id, "y".repeat(100)))
                .await
                .unwrap();
        }
        let messages = store.list_messages(session.id).await.unwrap();
        let second = compactor
            .compact(&store, &first.session, &messages, &cancel)
            .await
            .unwrap()
            .unwrap();

        assert_eq!(second.session.summary, "first summary\n\nsecond summary");
        assert_eq!(store.list_messages(session.id).await.unwrap().len(), 10);
    }

    #[tokio::test]
    async fn provider_failure_leaves_history_untouched() {
        let store = InMemoryStore::new();
        let (session, messages) = seeded(&store, 14, 100).await;
        let provider = Arc::new(SequentialMockProvider::new(vec![Err(ProviderError::Timeout(
            "slow".into(),
        ))]));
        let compactor = Compactor::new(provider, "m", 1_000, 10);

        let err = compactor
            .compact(&store, &session, &messages, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, CompactionError::Provider(_)));
        assert_eq!(store.list_messages(session.id).await.unwrap().len(), 14);
        let reloaded = store.get_session(&session.uid).await.unwrap().unwrap();
        assert!(reloaded.summary.is_empty());
    }

    #[tokio::test]
    async fn blank_summary_rejected() {
        let store = InMemoryStore::new();
        let (session, messages) = seeded(&store, 14, 100).await;
        let provider = Arc::new(SequentialMockProvider::single_text("   "));
        let compactor = Compactor::new(provider, "m", 1_000, 10);

        let err = compactor
            .compact(&store, &session, &messages, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, CompactionError::EmptySummary));
    }
}
