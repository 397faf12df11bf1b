use async_trait::async_trait;
use mnemo_core::error::ToolError;
use mnemo_core::tool::{Tool, ToolResult};
use serde::Deserialize;

use crate::{NoteToolContext, parse_args};

/// Appends hashtags to the body of an existing note.
///
/// Tags are appended as literal text. Adding a tag the note already has
/// duplicates it.
pub struct UpdateNoteTagsTool {
    ctx: NoteToolContext,
}

impl UpdateNoteTagsTool {
    pub fn new(ctx: NoteToolContext) -> Self {
        Self { ctx }
    }
}

#[derive(Deserialize)]
struct Args {
    uid: String,
    new_tags: Vec<String>,
}

#[async_trait]
impl Tool for UpdateNoteTagsTool {
    fn name(&self) -> &str {
        "update_note_tags"
    }

    fn description(&self) -> &str {
        "Add hashtags to an existing note's markdown body."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "uid": { "type": "string", "description": "UID of the note to tag" },
                "new_tags": {
                    "type": "array",
                    "items": { "type": "string" },
                    "description": "Tags including the hash, e.g. [\"#dev\", \"#journal\"]"
                }
            },
            "required": ["uid", "new_tags"]
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

        let content = format!("{}\n\n{}", note.content, args.new_tags.join(" "));
        match self.ctx.notes.update_note_content(&note.uid, &content).await {
            Ok(updated) => {
                self.ctx.reindex(&updated).await;
                Ok(ToolResult::ok("Tags successfully added to the note body."))
            }
            Err(e) => Ok(ToolResult::failure(format!("Error appending tags: {e}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::Fixture;
    use mnemo_core::note::NoteStore;

    #[tokio::test]
    async fn appends_tags_verbatim_each_time() {
        let fx = Fixture::new().await;
        let note = fx.store.create_note(1, "release checklist").await.unwrap();
        let tool = UpdateNoteTagsTool::new(fx.ctx(1));
        let args = serde_json::json!({ "uid": note.uid, "new_tags": ["#dev", "#release"] }).to_string();

        assert_eq!(
            tool.execute(&args).await.unwrap().output,
            "Tags successfully added to the note body."
        );
        tool.execute(&args).await.unwrap();

        let stored = fx.store.get_note(&note.uid).await.unwrap().unwrap();
        assert_eq!(
            stored.content,
            "release checklist\n\n#dev #release\n\n#dev #release"
        );
    }

    #[tokio::test]
    async fn foreign_note_is_left_untouched() {
        let fx = Fixture::new().await;
        let note = fx.store.create_note(1, "alice's groceries").await.unwrap();
        let tool = UpdateNoteTagsTool::new(fx.ctx(2));
        let args = serde_json::json!({ "uid": note.uid, "new_tags": ["#mine"] }).to_string();

        let result = tool.execute(&args).await.unwrap();
        assert_eq!(result.output, "Error: unauthorized to modify this note.");

        let stored = fx.store.get_note(&note.uid).await.unwrap().unwrap();
        assert_eq!(stored.content, "alice's groceries");
    }

    #[tokio::test]
    async fn tags_must_be_an_array() {
        let fx = Fixture::new().await;
        let tool = UpdateNoteTagsTool::new(fx.ctx(1));
        let result = tool
            .execute(r##"{"uid": "x", "new_tags": "#dev"}"##)
            .await
            .unwrap();
        assert_eq!(result.output, "Error: failed to parse input JSON.");
    }
}
