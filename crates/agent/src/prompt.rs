//! Prompt text sent to the model.

use chrono::{DateTime, TimeZone};
use mnemo_core::session::ChatMessage;
use std::fmt::Display;

/// The system instruction for a chat turn.
///
/// Embeds the current local time and, when present, the session's running
/// summary of compacted history.
pub fn system_prompt<Tz>(summary: &str, now: DateTime<Tz>) -> String
where
    Tz: TimeZone,
    Tz::Offset: Display,
{
    let mut prompt = format!(
        "You are an AI assistant for the user's personal knowledge base of notes.
Today's local date: {}.

You have access to tools that let you read and change the user's notes. YOU CURRENTLY HAVE ZERO KNOWLEDGE OF THE USER'S NOTES.
CRITICAL INSTRUCTIONS:
1. YOU MUST ALWAYS USE A TOOL to look up notes. NEVER answer questions about the user's notes from your own memory.
2. For questions about a SPECIFIC DATE or exact keyword, YOU MUST use \"query_notes\".
3. For general conceptual questions, use \"search_notes\".
4. To create, append, rewrite, tag, or delete notes, use the respective tools.
5. NEVER invent note content. If a tool returns no results, tell the user exactly that.",
        now.format("%Y-%m-%d %H:%M:%S")
    );
    if !summary.is_empty() {
        prompt.push_str("\n\nSummary of earlier conversation:\n");
        prompt.push_str(summary);
    }
    prompt
}

/// Ask the model to fold older messages into a summary.
pub fn summary_prompt(messages: &[ChatMessage]) -> String {
    let mut prompt = String::from(
        "Summarise this conversation concisely, preserving key facts and decisions:\n\n",
    );
    for m in messages {
        prompt.push_str(m.role.as_str());
        prompt.push_str(": ");
        prompt.push_str(&m.content);
        prompt.push('\n');
    }
    prompt
}

/// Ask the model for a short session title.
pub fn title_prompt(first_message: &str) -> String {
    format!(
        "Generate a short (5-7 word) title for a chat that starts with:\n\"{first_message}\"\nReturn only the title, no quotes."
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use mnemo_core::message::Role;

    fn msg(role: Role, content: &str) -> ChatMessage {
        ChatMessage {
            id: 1,
            session_id: 1,
            role,
            content: content.into(),
            tool_name: None,
            token_count: 0,
            created_ts: Utc::now(),
        }
    }

    #[test]
    fn system_prompt_has_date_and_summary() {
        let now = Utc.with_ymd_and_hms(2024, 1, 26, 9, 30, 0).unwrap();
        let prompt = system_prompt("user likes tea", now);
        assert!(prompt.contains("Today's local date: 2024-01-26 09:30:00."));
        assert!(prompt.ends_with("Summary of earlier conversation:\nuser likes tea"));
    }

    #[test]
    fn system_prompt_without_summary() {
        let prompt = system_prompt("", Utc::now());
        assert!(!prompt.contains("Summary of earlier conversation"));
        assert!(prompt.contains("query_notes"));
    }

    #[test]
    fn summary_prompt_lists_roles() {
        let prompt = summary_prompt(&[msg(Role::User, "hi"), msg(Role::Assistant, "hello")]);
        assert!(prompt.ends_with("user: hi\nassistant: hello\n"));
    }

    #[test]
    fn title_prompt_quotes_message() {
        assert!(title_prompt("plan my trip").contains("\"plan my trip\""));
    }
}
