use async_trait::async_trait;
use mnemo_core::error::ToolError;
use mnemo_core::tool::{Tool, ToolResult};
use serde::Deserialize;
use tracing::debug;

use crate::{NoteToolContext, parse_args};

/// Saves a brand new note owned by the calling user.
pub struct CreateNoteTool {
    ctx: NoteToolContext,
}

impl CreateNoteTool {
    pub fn new(ctx: NoteToolContext) -> Self {
        Self { ctx }
    }
}

#[derive(Deserialize)]
struct Args {
    content: String,
}

#[async_trait]
impl Tool for CreateNoteTool {
    fn name(&self) -> &str {
        "create_note"
    }

    fn description(&self) -> &str {
        "Draft and save a brand new note for the user."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "content": {
                    "type": "string",
                    "description": "Markdown body of the new note"
                }
            },
            "required": ["content"]
        })
    }

    async fn execute(&self, arguments: &str) -> Result<ToolResult, ToolError> {
        let args: Args = match parse_args(arguments) {
            Ok(a) => a,
            Err(result) => return Ok(result),
        };

        match self.ctx.notes.create_note(self.ctx.user_id, &args.content).await {
            Ok(note) => {
                debug!(note = %note.uid, user_id = self.ctx.user_id, "Note created");
                self.ctx.reindex(&note).await;
                Ok(ToolResult::ok(format!(
                    "Note successfully created with UID: {}",
                    note.uid
                )))
            }
            Err(e) => Ok(ToolResult::failure(format!("Error creating note: {e}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::Fixture;
    use mnemo_core::note::{NoteFilter, NoteStore};

    #[tokio::test]
    async fn creates_and_indexes() {
        let fx = Fixture::new().await;
        let tool = CreateNoteTool::new(fx.ctx(4));
        let result = tool
            .execute(r#"{"content": "call the plumber #home"}"#)
            .await
            .unwrap();
        assert!(result.success);

        let notes = fx.store.list_notes(&NoteFilter::for_user(4)).await.unwrap();
        assert_eq!(notes.len(), 1);
        assert_eq!(
            result.output,
            format!("Note successfully created with UID: {}", notes[0].uid)
        );
        assert_eq!(fx.index.count(4).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn missing_content_is_parse_error() {
        let fx = Fixture::new().await;
        let tool = CreateNoteTool::new(fx.ctx(4));
        let result = tool.execute("{}").await.unwrap();
        assert_eq!(result.output, "Error: failed to parse input JSON.");
        assert!(!result.success);
    }
}
