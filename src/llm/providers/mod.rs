//! LLM provider implementations.
//!
//! `build(config, api_key, offline)` is the factory — called when a session
//! starts, so bad endpoint settings surface as session failures.
//! Adding a new backend = new module + new match arm.

pub mod dummy;
pub mod openai_compatible;

use std::net::IpAddr;

use tracing::debug;

use crate::config::LlmConfig;
use crate::llm::{LlmProvider, ProviderError};

/// Construct a `LlmProvider` from config and an optional API key.
///
/// `api_key` is sourced from `LLM_API_KEY` env (never TOML) and is `None`
/// for keyless local models. With `offline` set, only loopback endpoints
/// are accepted.
pub fn build(
    config: &LlmConfig,
    api_key: Option<String>,
    offline: bool,
) -> Result<LlmProvider, ProviderError> {
    match config.provider.as_str() {
        "dummy" => Ok(LlmProvider::Dummy(dummy::DummyProvider)),
        "openai" | "openai-compatible" => {
            let endpoint = openai_compatible::chat_completions_url(&config.api_base);
            if offline && !is_loopback_endpoint(&endpoint)? {
                return Err(ProviderError::Offline(endpoint));
            }
            let p = openai_compatible::OpenAiCompatibleProvider::new(config, api_key)?;
            debug!(endpoint = %p.endpoint(), model = %p.model(), "llm provider built");
            Ok(LlmProvider::OpenAiCompatible(p))
        }
        _ => Err(ProviderError::UnknownProvider(config.provider.clone())),
    }
}

fn is_loopback_endpoint(endpoint: &str) -> Result<bool, ProviderError> {
    let url = reqwest::Url::parse(endpoint)
        .map_err(|e| ProviderError::Config(format!("invalid endpoint '{endpoint}': {e}")))?;
    let host = url.host_str().unwrap_or_default();
    if host.eq_ignore_ascii_case("localhost") {
        return Ok(true);
    }
    let host = host.trim_start_matches('[').trim_end_matches(']');
    Ok(host.parse::<IpAddr>().map(|ip| ip.is_loopback()).unwrap_or(false))
}
