//! # mnemo core
//!
//! Domain types, traits, and error definitions for the mnemo notes agent.
//! This crate has **zero framework dependencies**; it defines the domain model
//! that all other crates implement against.
//!
//! ## Design Philosophy
//!
//! Every subsystem is defined as a trait here. Implementations live in their
//! respective crates. This enables:
//! - Swapping implementations via configuration
//! - Easy testing with mock/stub implementations
//! - Clean dependency graph (all crates depend inward on core)

pub mod error;
pub mod message;
pub mod note;
pub mod provider;
pub mod session;
pub mod tool;

/// Identifier of an authenticated user. Every tool, collection and session is
/// scoped to exactly one of these.
pub type UserId = i32;

// Re-export key types at crate root for ergonomics
pub use error::{Error, ProviderError, Result, StoreError, ToolError, VectorError};
pub use message::{Message, MessageToolCall, Role};
pub use note::{Note, NoteFilter, NoteStore, RowStatus, extract_tags};
pub use provider::{
    EmbeddingRequest, EmbeddingResponse, Provider, ProviderRequest, ProviderResponse, ToolDefinition,
    Usage,
};
pub use session::{
    ChatMessage, DEFAULT_SESSION_TITLE, NewChatMessage, Session, SessionStore, estimate_tokens,
};
pub use tool::{Tool, ToolCall, ToolRegistry, ToolResult};
