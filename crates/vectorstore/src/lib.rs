//! Vector index for mnemo.
//!
//! One isolated, persistent collection per user. Documents are keyed by the
//! caller's id (a note uid), embedded through a single shared
//! [`EmbeddingFunction`], and ranked by cosine similarity.
//!
//! Storage location: `<data_dir>/vectorstore/user_<id>_notes.jsonl`

pub mod collection;
pub mod embedding;
pub mod similarity;
pub mod store;

pub use collection::{Collection, Document, SearchResult};
pub use embedding::{EmbeddingFunction, HashingEmbedder, ProviderEmbedder};
pub use store::{VectorStore, collection_name, step_down_attempts};
