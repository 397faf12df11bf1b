//! `mnemo serve`: start the HTTP API server.

use std::path::Path;
use std::sync::Arc;

use super::runtime::Runtime;

pub async fn run(config_path: Option<&Path>, port_override: Option<u16>) -> anyhow::Result<()> {
    let mut runtime = Runtime::open(config_path).await?;
    if let Some(port) = port_override {
        runtime.config.gateway.port = port;
    }

    let chat = Arc::new(runtime.chat_service());
    mnemo_gateway::start(&runtime.config, chat).await?;
    Ok(())
}
