//! `mnemo reindex`: rebuild a user's vector index from their notes.

use std::path::Path;

use anyhow::Context;
use mnemo_core::UserId;

use super::runtime::Runtime;

pub async fn run(config_path: Option<&Path>, user_id: UserId) -> anyhow::Result<()> {
    let runtime = Runtime::open(config_path).await?;
    let count = mnemo_tools::rebuild_index(runtime.notes.as_ref(), &runtime.index, user_id)
        .await
        .with_context(|| format!("failed to reindex notes of user {user_id}"))?;
    println!("Indexed {count} notes for user {user_id}");
    Ok(())
}
