use async_trait::async_trait;
use mnemo_core::error::ToolError;
use mnemo_core::note::{NoteFilter, RowStatus};
use mnemo_core::tool::{Tool, ToolResult};

use crate::NoteToolContext;

/// Aggregate counts over the user's notes. Takes no arguments.
pub struct UserStatsTool {
    ctx: NoteToolContext,
}

impl UserStatsTool {
    pub fn new(ctx: NoteToolContext) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl Tool for UserStatsTool {
    fn name(&self) -> &str {
        "get_user_stats"
    }

    fn description(&self) -> &str {
        "Get general statistics about the user's account, like the total number of active notes."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {}
        })
    }

    async fn execute(&self, _arguments: &str) -> Result<ToolResult, ToolError> {
        let filter = NoteFilter::for_user(self.ctx.user_id).with_status(RowStatus::Normal);
        match self.ctx.notes.count_notes(&filter).await {
            Ok(total) => Ok(ToolResult::ok(format!(
                "User Statistics:\nTotal Active Notes: {total}"
            ))),
            Err(e) => Ok(ToolResult::failure(format!("Error retrieving stats: {e}"))),
        }
    }
}
