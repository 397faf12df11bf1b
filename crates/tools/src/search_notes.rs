//! Semantic search over the user's notes through the vector index.

use async_trait::async_trait;
use mnemo_core::error::{ToolError, VectorError};
use mnemo_core::tool::{Tool, ToolResult};
use mnemo_vectorstore::SearchResult;
use std::fmt::Write;

use crate::{NoteToolContext, preview};

/// Hits returned to the model.
const TOP_K: usize = 5;

/// Over-fetch factor when a tag filter will discard some hits.
const FILTER_OVERFETCH: usize = 4;

const PREVIEW_CHARS: usize = 400;

pub struct SearchNotesTool {
    ctx: NoteToolContext,
    tag_filter: Option<String>,
}

impl SearchNotesTool {
    pub fn new(ctx: NoteToolContext, tag_filter: Option<String>) -> Self {
        let tag_filter = tag_filter
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty());
        Self { ctx, tag_filter }
    }

    fn passes_filter(&self, hit: &SearchResult) -> bool {
        let Some(tag) = &self.tag_filter else {
            return true;
        };
        hit.metadata
            .get("tags")
            .is_some_and(|tags| tags.split_whitespace().any(|t| t == tag))
            || hit.content.contains(tag.as_str())
    }
}

/// The query text: `{"query": "..."}` or, failing that, the raw input.
fn query_text(arguments: &str) -> String {
    match serde_json::from_str::<serde_json::Value>(arguments) {
        Ok(serde_json::Value::Object(map)) => map
            .get("query")
            .and_then(|q| q.as_str())
            .unwrap_or_default()
            .to_string(),
        Ok(serde_json::Value::String(s)) => s,
        _ => arguments.to_string(),
    }
}

#[async_trait]
impl Tool for SearchNotesTool {
    fn name(&self) -> &str {
        "search_notes"
    }

    fn description(&self) -> &str {
        "Search through the user's personal notes for relevant information by meaning. \
         Input is a natural-language search query."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "What to look for in the user's notes"
                }
            },
            "required": ["query"]
        })
    }

    async fn execute(&self, arguments: &str) -> Result<ToolResult, ToolError> {
        let Some(index) = &self.ctx.index else {
            return Ok(ToolResult::failure("Vector store not available."));
        };

        let query = query_text(arguments);
        if query.trim().is_empty() {
            return Ok(ToolResult::failure(crate::PARSE_ERROR));
        }

        let k = if self.tag_filter.is_some() {
            TOP_K * FILTER_OVERFETCH
        } else {
            TOP_K
        };
        let hits = match index.search(self.ctx.user_id, &query, k, &self.ctx.cancel).await {
            Ok(hits) => hits,
            Err(VectorError::Cancelled) => return Err(ToolError::Cancelled(self.name().into())),
            Err(e) => {
                return Err(ToolError::ExecutionFailed {
                    tool_name: self.name().into(),
                    reason: e.to_string(),
                });
            }
        };

        let hits: Vec<SearchResult> = hits
            .into_iter()
            .filter(|h| self.passes_filter(h))
            .take(TOP_K)
            .collect();
        if hits.is_empty() {
            return Ok(ToolResult::ok("No relevant notes found."));
        }

        let mut out = String::new();
        for (i, hit) in hits.iter().enumerate() {
            let _ = write!(
                out,
                "[{}] Note {} (score {:.2}):\n{}\n\n",
                i + 1,
                hit.id,
                hit.score,
                preview(&hit.content, PREVIEW_CHARS)
            );
        }
        Ok(ToolResult::ok(out))
    }
}
