//! LLM Provider implementations for mnemo.
//!
//! All providers implement the `mnemo_core::Provider` trait. A single
//! OpenAI-compatible client covers OpenRouter (the default) and any other
//! endpoint speaking the same protocol.

pub mod openai_compat;

pub use openai_compat::OpenAiCompatProvider;

use std::sync::Arc;
use mnemo_core::error::ProviderError;
use mnemo_core::provider::Provider;

/// Build the configured provider.
///
/// Fails with `NotConfigured` when no API key is available; callers that can
/// run degraded (the gateway's session CRUD) check `has_api_key` first.
pub fn build_from_config(
    config: &mnemo_config::AppConfig,
) -> std::result::Result<Arc<dyn Provider>, ProviderError> {
    let api_key = config
        .api_key
        .clone()
        .filter(|k| !k.is_empty())
        .ok_or_else(|| ProviderError::NotConfigured("no API key configured".into()))?;

    let name = if config.api_url.contains("openrouter.ai") {
        "openrouter"
    } else {
        "openai-compatible"
    };

    tracing::debug!(provider = name, url = %config.api_url, "Building provider");
    Ok(Arc::new(OpenAiCompatProvider::new(name, &config.api_url, api_key)?))
}
