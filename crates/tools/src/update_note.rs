use async_trait::async_trait;
use mnemo_core::error::ToolError;
use mnemo_core::tool::{Tool, ToolResult};
use serde::Deserialize;

use crate::{NoteToolContext, parse_args};

/// Replaces the whole content of an existing note.
pub struct UpdateNoteTool {
    ctx: NoteToolContext,
}

impl UpdateNoteTool {
    pub fn new(ctx: NoteToolContext) -> Self {
        Self { ctx }
    }
}

#[derive(Deserialize)]
struct Args {
    uid: String,
    content: String,
}

#[async_trait]
impl Tool for UpdateNoteTool {
    fn name(&self) -> &str {
        "update_note"
    }

    fn description(&self) -> &str {
        "Rewrite an existing note. The given content fully replaces the old content."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "uid": { "type": "string", "description": "UID of the note to rewrite" },
                "content": { "type": "string", "description": "The complete new content" }
            },
            "required": ["uid", "content"]
        })
    }

    async fn execute(&self, arguments: &str) -> Result<ToolResult, ToolError> {
        let args: Args = match parse_args(arguments) {
            Ok(a) => a,
            Err(result) => return Ok(result),
        };
        let note = match self
            .ctx
            .owned_note(&args.uid, "Error: unauthorized to update this note.")
            .await
        {
            Ok(note) => note,
            Err(result) => return Ok(result),
        };

        match self.ctx.notes.update_note_content(&note.uid, &args.content).await {
            Ok(updated) => {
                self.ctx.reindex(&updated).await;
                Ok(ToolResult::ok("Note successfully updated."))
            }
            Err(e) => Ok(ToolResult::failure(format!("Error: {e}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::Fixture;
    use mnemo_core::note::NoteStore;
    use tokio_util::sync::CancellationToken;

    #[tokio::test]
    async fn rewrites_and_reindexes() {
        let fx = Fixture::new().await;
        let tool_ctx = fx.ctx(1);
        let note = fx.store.create_note(1, "old words").await.unwrap();
        tool_ctx.reindex(&note).await;

        let tool = UpdateNoteTool::new(tool_ctx);
        let args = serde_json::json!({ "uid": note.uid, "content": "fresh text #new" }).to_string();
        let result = tool.execute(&args).await.unwrap();
        assert_eq!(result.output, "Note successfully updated.");

        let stored = fx.store.get_note(&note.uid).await.unwrap().unwrap();
        assert_eq!(stored.content, "fresh text #new");

        let hits = fx
            .index
            .search(1, "fresh text", 1, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(hits[0].content, "fresh text #new");
        assert_eq!(hits[0].metadata["tags"], "#new");
    }

    #[tokio::test]
    async fn refuses_other_users_note() {
        let fx = Fixture::new().await;
        let note = fx.store.create_note(2, "mine").await.unwrap();
        let tool = UpdateNoteTool::new(fx.ctx(1));
        let args = serde_json::json!({ "uid": note.uid, "content": "gone" }).to_string();
        let result = tool.execute(&args).await.unwrap();
        assert_eq!(result.output, "Error: unauthorized to update this note.");
        assert_eq!(fx.store.get_note(&note.uid).await.unwrap().unwrap().content, "mine");
    }
}
