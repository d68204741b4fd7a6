//! Raw TOML deserialization types.
//!
//! These structs mirror the TOML file shape and use `serde` defaults.
//! The `load` module converts them into the public `types` structs.

use std::collections::BTreeMap;

use serde::Deserialize;

// ── Top-level ────────────────────────────────────────────────────────────────

/// Raw TOML shape — serde target before resolution.
#[derive(Deserialize, Default)]
pub(super) struct RawConfig {
    #[serde(default)]
    pub app: RawApp,
    #[serde(default)]
    pub llm: RawLlm,
    #[serde(default)]
    pub interpreter: RawInterpreter,
}

#[derive(Deserialize)]
pub(super) struct RawApp {
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub log_file: Option<String>,
}

impl Default for RawApp {
    fn default() -> Self {
        Self { log_level: default_log_level(), log_file: None }
    }
}

// ── LLM ─────────────────────────────────────────────────────────────────────

#[derive(Deserialize)]
pub(super) struct RawLlm {
    #[serde(default = "default_llm_provider")]
    pub provider: String,
    #[serde(default = "default_api_base")]
    pub api_base: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default)]
    pub temperature: f32,
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
    #[serde(default = "default_context_window")]
    pub context_window: usize,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: usize,
    #[serde(default = "default_headers")]
    pub headers: BTreeMap<String, String>,
    #[serde(default)]
    pub system_message: Option<String>,
}

impl Default for RawLlm {
    fn default() -> Self {
        Self {
            provider: default_llm_provider(),
            api_base: default_api_base(),
            model: default_model(),
            temperature: 0.0,
            timeout_seconds: default_timeout_seconds(),
            context_window: default_context_window(),
            max_tokens: default_max_tokens(),
            headers: default_headers(),
            system_message: None,
        }
    }
}

// ── Interpreter ──────────────────────────────────────────────────────────────

#[derive(Deserialize)]
pub(super) struct RawInterpreter {
    #[serde(default = "default_true")]
    pub auto_run: bool,
    #[serde(default = "default_false")]
    pub offline: bool,
}

impl Default for RawInterpreter {
    fn default() -> Self {
        Self { auto_run: true, offline: false }
    }
}

// ── Defaults ─────────────────────────────────────────────────────────────────

pub(super) fn default_true() -> bool {
    true
}

pub(super) fn default_false() -> bool {
    false
}

pub(super) fn default_log_level() -> String {
    "warn".to_string()
}

pub(super) fn default_llm_provider() -> String {
    "openai-compatible".to_string()
}

pub(super) fn default_api_base() -> String {
    "https://openrouter.ai/api/v1".to_string()
}

pub(super) fn default_model() -> String {
    "baidu/ernie-4.5-300b-a47b".to_string()
}

pub(super) fn default_timeout_seconds() -> u64 {
    120
}

pub(super) fn default_context_window() -> usize {
    128_000
}

pub(super) fn default_max_tokens() -> usize {
    4096
}

/// OpenRouter uses these for app attribution.
pub(super) fn default_headers() -> BTreeMap<String, String> {
    BTreeMap::from([
        ("HTTP-Referer".to_string(), "http://localhost:3000".to_string()),
        ("X-Title".to_string(), "My Open Interpreter".to_string()),
    ])
}
