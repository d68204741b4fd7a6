//! Configuration loading with env-var overrides.
//!
//! Reads `config/default.toml` relative to the current working directory
//! (or the file given with `-f`), then applies `CHATKEEP_LOG_LEVEL`.
//! Missing file means built-in defaults.
//!
//! # Module layout
//!
//! - **types** — Public configuration structs (`Config`, `LlmConfig`,
//!   `InterpreterConfig`).
//! - **raw** — Raw TOML deserialization types. These mirror the file shape
//!   and use serde defaults; kept private.
//! - **load** — Loading logic: `merge_toml`, `load_raw_merged`, `load`,
//!   `load_from`, `expand_home`.

mod load;
mod raw;
mod types;

pub use load::{DEFAULT_CONFIG_PATH, defaults, expand_home, load, load_from};
pub use types::*;

#[cfg(test)]
impl Config {
    /// Safe `Config` for unit tests — dummy LLM, no API keys, no external calls.
    pub fn test_default() -> Self {
        Self {
            log_level: "info".into(),
            log_file: None,
            llm: LlmConfig {
                provider: "dummy".into(),
                api_base: "http://localhost:0/v1".into(),
                model: "test-model".into(),
                temperature: 0.0,
                timeout_seconds: 1,
                context_window: 8192,
                max_tokens: 512,
                headers: Default::default(),
                system_message: None,
            },
            interpreter: InterpreterConfig { auto_run: false, offline: true },
            llm_api_key: None,
        }
    }
}
