//! Public configuration types.
//!
//! These are the resolved structs the rest of the crate consumes. They are
//! built by [`load`](super::load) from the raw TOML shapes in `raw`.

use std::collections::BTreeMap;
use std::path::PathBuf;

/// LLM endpoint configuration.
/// Populated from `[llm]` in the TOML.
#[derive(Debug, Clone)]
pub struct LlmConfig {
    /// Which provider is active (`"openai-compatible"`, `"openai"`, `"dummy"`).
    pub provider: String,
    /// Base URL; requests go to `{api_base}/chat/completions`.
    pub api_base: String,
    /// Model name passed in the request body.
    pub model: String,
    /// Sampling temperature.
    pub temperature: f32,
    /// Per-request HTTP timeout in seconds.
    pub timeout_seconds: u64,
    /// Prompt budget in tokens, including `max_tokens` reserved for the reply.
    pub context_window: usize,
    /// Upper bound on reply tokens, sent as `max_tokens`.
    pub max_tokens: usize,
    /// Extra headers sent on every request (`[llm.headers]`).
    pub headers: BTreeMap<String, String>,
    /// Prepended to every request; never stored in the transcript.
    pub system_message: Option<String>,
}

/// Behaviour switches for the chat session (`[interpreter]`).
#[derive(Debug, Clone)]
pub struct InterpreterConfig {
    /// Run generated actions without asking for confirmation.
    pub auto_run: bool,
    /// Refuse to contact anything but a loopback endpoint.
    pub offline: bool,
}

/// Fully-resolved application configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub log_level: String,
    /// Optional log file (already expanded, no `~`). Logs go to stderr when unset.
    pub log_file: Option<PathBuf>,
    pub llm: LlmConfig,
    pub interpreter: InterpreterConfig,
    /// API key from `LLM_API_KEY` env var — `None` for keyless local models.
    /// Never sourced from TOML.
    pub llm_api_key: Option<String>,
}
