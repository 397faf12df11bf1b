use async_trait::async_trait;
use mnemo_core::error::ToolError;
use mnemo_core::tool::{Tool, ToolResult};
use serde::Deserialize;
use tracing::info;

use crate::{NoteToolContext, parse_args};

/// Permanently removes a note and its index entry.
pub struct DeleteNoteTool {
    ctx: NoteToolContext,
}

impl DeleteNoteTool {
    pub fn new(ctx: NoteToolContext) -> Self {
        Self { ctx }
    }
}

#[derive(Deserialize)]
struct Args {
    uid: String,
}

#[async_trait]
impl Tool for DeleteNoteTool {
    fn name(&self) -> &str {
        "delete_note"
    }

    fn description(&self) -> &str {
        "Permanently delete a specific note."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "uid": { "type": "string", "description": "UID of the note to delete" }
            },
            "required": ["uid"]
        })
    }

    async fn execute(&self, arguments: &str) -> Result<ToolResult, ToolError> {
        let args: Args = match parse_args(arguments) {
            Ok(a) => a,
            Err(result) => return Ok(result),
        };
        let note = match self
            .ctx
            .owned_note(&args.uid, "Error: unauthorized to access this note.")
            .await
        {
            Ok(note) => note,
            Err(result) => return Ok(result),
        };

        match self.ctx.notes.delete_note(&note.uid).await {
            Ok(_) => {
                info!(note = %note.uid, user_id = self.ctx.user_id, "Note deleted by agent");
                self.ctx.unindex(&note.uid).await;
                Ok(ToolResult::ok("Note successfully and permanently deleted."))
            }
            Err(e) => Ok(ToolResult::failure(format!("Error deleting note: {e}"))),
        }
    }
}
