//! Exact keyword and date-range search over the note store.

use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use mnemo_core::error::ToolError;
use mnemo_core::note::NoteFilter;
use mnemo_core::tool::{Tool, ToolResult};
use serde::Deserialize;
use std::fmt::Write;

use crate::{NoteToolContext, parse_args, preview};

const MAX_RESULTS: usize = 5;
const PREVIEW_CHARS: usize = 400;

pub struct QueryNotesTool {
    ctx: NoteToolContext,
}

impl QueryNotesTool {
    pub fn new(ctx: NoteToolContext) -> Self {
        Self { ctx }
    }
}

#[derive(Deserialize)]
struct Args {
    #[serde(default)]
    text_search: String,
    #[serde(default)]
    date_start: String,
    #[serde(default)]
    date_end: String,
}

/// Parse a bound. A bare day is midnight UTC; an end day is pushed 24h
/// forward so the whole day is included. Unparseable input is ignored.
fn parse_bound(input: &str, is_end: bool) -> Option<DateTime<Utc>> {
    let input = input.trim();
    if input.is_empty() {
        return None;
    }
    if let Ok(day) = NaiveDate::parse_from_str(input, "%Y-%m-%d") {
        let start = day.and_hms_opt(0, 0, 0)?.and_utc();
        return Some(if is_end { start + Duration::hours(24) } else { start });
    }
    DateTime::parse_from_rfc3339(input)
        .ok()
        .map(|t| t.with_timezone(&Utc))
}

#[async_trait]
impl Tool for QueryNotesTool {
    fn name(&self) -> &str {
        "query_notes"
    }

    fn description(&self) -> &str {
        "Search the user's notes using exact text matches and specific date ranges. \
         All keys are optional: text_search (exact keyword or phrase), date_start and \
         date_end (YYYY-MM-DD, end day inclusive). Prefer this over search_notes when the \
         user asks about notes from specific dates (e.g. \"what did I write on Jan 26\")."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "text_search": {
                    "type": "string",
                    "description": "Exact keyword or phrase the note must contain"
                },
                "date_start": {
                    "type": "string",
                    "description": "Earliest creation date, YYYY-MM-DD"
                },
                "date_end": {
                    "type": "string",
                    "description": "Latest creation date, YYYY-MM-DD (inclusive)"
                }
            }
        })
    }

    async fn execute(&self, arguments: &str) -> Result<ToolResult, ToolError> {
        let args: Args = match parse_args(arguments) {
            Ok(a) => a,
            Err(result) => return Ok(result),
        };

        let mut filter = NoteFilter::for_user(self.ctx.user_id).created_between(
            parse_bound(&args.date_start, false),
            parse_bound(&args.date_end, true),
        );
        if !args.text_search.is_empty() {
            filter = filter.containing(args.text_search);
        }

        let notes = match self.ctx.notes.list_notes(&filter).await {
            Ok(notes) => notes,
            Err(e) => return Ok(ToolResult::failure(format!("Error searching database: {e}"))),
        };
        if notes.is_empty() {
            return Ok(ToolResult::ok("No notes found matching those criteria."));
        }

        let mut out = String::new();
        for (i, note) in notes.iter().take(MAX_RESULTS).enumerate() {
            let _ = write!(
                out,
                "[{}] Note {} (Created: {}):\n{}\n\n",
                i + 1,
                note.uid,
                note.created_at.format("%Y-%m-%d %H:%M"),
                preview(&note.content, PREVIEW_CHARS)
            );
        }
        if notes.len() > MAX_RESULTS {
            let _ = write!(out, "... and {} more notes skipped.", notes.len() - MAX_RESULTS);
        }
        Ok(ToolResult::ok(out))
    }
}
