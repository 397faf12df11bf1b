//! Simulated incremental delivery of a buffered answer.
//!
//! The model's final turn arrives whole; it is replayed to the client one
//! word at a time with a short pause between words.

use std::time::Duration;

use crate::stream_event::{ChatEvent, Emitter};

/// Whitespace-delimited words, each followed by a single space.
pub fn split_tokens(answer: &str) -> Vec<String> {
    answer.split_whitespace().map(|w| format!("{w} ")).collect()
}

/// Emit `answer` as token events, pausing `delay` between them.
///
/// Stops early once the client has gone away.
pub async fn stream_answer(emitter: &Emitter, answer: &str, delay: Duration) {
    for token in split_tokens(answer) {
        if !emitter.emit(ChatEvent::token(token)).await {
            return;
        }
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }
}
