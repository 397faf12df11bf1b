use async_trait::async_trait;
use mnemo_core::error::ToolError;
use mnemo_core::tool::{Tool, ToolResult};
use serde::Deserialize;

use crate::{NoteToolContext, parse_args};

/// Adds text to the bottom of an existing note, separated by a blank line.
pub struct AppendToNoteTool {
    ctx: NoteToolContext,
}

impl AppendToNoteTool {
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
impl Tool for AppendToNoteTool {
    fn name(&self) -> &str {
        "append_to_note"
    }

    fn description(&self) -> &str {
        "Add a new thought or bullet point to the bottom of an existing note instead of overwriting it."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "uid": { "type": "string", "description": "UID of the note to extend" },
                "content": { "type": "string", "description": "Text to append" }
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
            .owned_note(&args.uid, "Error: unauthorized to modify this note.")
            .await
        {
            Ok(note) => note,
            Err(result) => return Ok(result),
        };

        let content = format!("{}\n\n{}", note.content, args.content);
        match self.ctx.notes.update_note_content(&note.uid, &content).await {
            Ok(updated) => {
                self.ctx.reindex(&updated).await;
                Ok(ToolResult::ok("Content successfully appended to note."))
            }
            Err(e) => Ok(ToolResult::failure(format!("Error appending to note: {e}"))),
        }
    }
}
