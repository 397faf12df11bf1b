//! The conversational agent behind mnemo's AI chat.
//!
//! A chat turn runs in one task:
//!
//! 1. **Compact** the session history if it has outgrown its budget
//! 2. **Build context** (system prompt + summary + prior turns + question)
//! 3. **Send to LLM** with every note tool declared
//! 4. **If tool calls**: execute them, append results, loop back to step 3
//! 5. **If text response**: stream it to the client word by word
//!
//! The loop stops at the first tool-free answer or after a fixed number of
//! rounds, whichever comes first.

pub mod chat;
pub mod compaction;
pub mod loop_runner;
pub mod prompt;
pub mod stream_event;
pub mod token;

#[cfg(test)]
mod test_helpers;

pub use chat::{ChatError, ChatRequest, ChatService, PreparedTurn};
pub use compaction::{Compacted, CompactionError, Compactor};
pub use loop_runner::{AgentLoop, ToolTrace, TurnOutcome, TurnStatus};
pub use stream_event::{ChatEvent, Emitter, SourcePayload, ToolCallPayload};
