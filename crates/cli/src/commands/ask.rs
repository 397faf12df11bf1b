//! `mnemo ask`: one question, answered in the terminal.

use std::io::Write;
use std::path::Path;

use anyhow::{Context, bail};
use mnemo_agent::{ChatEvent, ChatRequest, Emitter, TurnStatus};
use mnemo_config::AppConfig;
use mnemo_core::UserId;

use super::runtime::Runtime;

pub async fn run(
    config_path: Option<&Path>,
    user_id: UserId,
    session: Option<String>,
    tag: Option<String>,
    message: String,
) -> anyhow::Result<()> {
    let runtime = Runtime::open(config_path).await?;
    if runtime.provider.is_none() {
        eprintln!();
        eprintln!("  ERROR: No API key configured!");
        eprintln!();
        eprintln!("  Set OPENROUTER_API_KEY (or MNEMO_API_KEY), or add api_key to:");
        eprintln!("    {}", AppConfig::config_dir().join("config.toml").display());
        eprintln!();
        bail!("no API key found");
    }

    let chat = runtime.chat_service();
    let uid = match session {
        Some(uid) => uid,
        None => chat.create_session(user_id, None).await?.uid,
    };

    let mut request = ChatRequest::new(message);
    if let Some(tag) = tag {
        request = request.with_tag_filter(tag);
    }

    let (emitter, mut rx) = Emitter::channel(64);
    let printer = tokio::spawn(async move {
        let mut stdout = std::io::stdout();
        while let Some(event) = rx.recv().await {
            match event {
                ChatEvent::ToolCall { payload } => {
                    eprintln!("  [tool] {}({})", payload.name, payload.input);
                }
                ChatEvent::Token { content } => {
                    print!("{content}");
                    let _ = stdout.flush();
                }
                ChatEvent::Source { payload } => {
                    println!();
                    println!("  [source {}] {}", payload.note_uid, payload.snippet.replace('\n', " "));
                }
                ChatEvent::Error { content } => eprintln!("  [Error] {content}"),
                ChatEvent::Done { content } => {
                    println!();
                    eprintln!("  session: {content}");
                }
            }
        }
    });

    let outcome = chat
        .chat(user_id, &uid, request, &emitter)
        .await
        .context("chat request failed")?;
    drop(emitter);
    printer.await.context("output task failed")?;

    if outcome.status == TurnStatus::RoundLimit {
        eprintln!("  (stopped after {} tool rounds)", outcome.rounds);
    }
    Ok(())
}
