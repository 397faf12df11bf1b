use async_trait::async_trait;
use mnemo_core::error::ToolError;
use mnemo_core::note::NoteFilter;
use mnemo_core::tool::{Tool, ToolResult};
use serde::Deserialize;
use std::fmt::Write;

use crate::{NoteToolContext, parse_args, preview};

const MAX_RESULTS: usize = 10;
const PREVIEW_CHARS: usize = 300;

/// Literal tag lookup, for when semantic search is too fuzzy.
pub struct ListNotesByTagTool {
    ctx: NoteToolContext,
}

impl ListNotesByTagTool {
    pub fn new(ctx: NoteToolContext) -> Self {
        Self { ctx }
    }
}

#[derive(Deserialize)]
struct Args {
    tag: String,
}

#[async_trait]
impl Tool for ListNotesByTagTool {
    fn name(&self) -> &str {
        "list_notes_by_tag"
    }

    fn description(&self) -> &str {
        "List the notes that contain a specific tag. Useful when semantic search isn't explicit enough."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "tag": {
                    "type": "string",
                    "description": "The tag including the hash, e.g. '#ideas'"
                }
            },
            "required": ["tag"]
        })
    }

    async fn execute(&self, arguments: &str) -> Result<ToolResult, ToolError> {
        let args: Args = match parse_args(arguments) {
            Ok(a) => a,
            Err(result) => return Ok(result),
        };

        let filter = NoteFilter::for_user(self.ctx.user_id).containing(args.tag.clone());
        let notes = match self.ctx.notes.list_notes(&filter).await {
            Ok(notes) => notes,
            Err(e) => return Ok(ToolResult::failure(format!("Error searching tags: {e}"))),
        };
        if notes.is_empty() {
            return Ok(ToolResult::ok(format!("No notes found with the tag {}.", args.tag)));
        }

        let mut out = String::new();
        for (i, note) in notes.iter().take(MAX_RESULTS).enumerate() {
            let _ = write!(
                out,
                "[{}] Note {}:\n{}\n\n",
                i + 1,
                note.uid,
                preview(&note.content, PREVIEW_CHARS)
            );
        }
        if notes.len() > MAX_RESULTS {
            let _ = write!(out, "... and {} more tagged notes.", notes.len() - MAX_RESULTS);
        }
        Ok(ToolResult::ok(out))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::Fixture;
    use mnemo_core::note::NoteStore;

    #[tokio::test]
    async fn lists_tagged_notes_with_overflow() {
        let fx = Fixture::new().await;
        for i in 0..12 {
            fx.store.create_note(1, &format!("idea {i} #ideas")).await.unwrap();
        }
        fx.store.create_note(1, "no tag here").await.unwrap();

        let tool = ListNotesByTagTool::new(fx.ctx(1));
        let result = tool.execute(r##"{"tag": "#ideas"}"##).await.unwrap();
        assert_eq!(result.output.matches("] Note ").count(), 10);
        assert!(result.output.ends_with("... and 2 more tagged notes."));
        assert!(!result.output.contains("no tag here"));
    }

    #[tokio::test]
    async fn no_matches() {
        let fx = Fixture::new().await;
        let tool = ListNotesByTagTool::new(fx.ctx(1));
        let result = tool.execute(r##"{"tag": "#travel"}"##).await.unwrap();
        assert_eq!(result.output, "No notes found with the tag #travel.");
    }
}
