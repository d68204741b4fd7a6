//! Chat session contract.
//!
//! A [`Session`] owns all user interaction while it runs: given its
//! settings and the transcript, it runs until the user is done and leaves
//! the updated messages in the transcript. It may also fail partway, in
//! which case the transcript holds whatever was exchanged before the
//! failure. The run wrapper depends only on this trait, so tests can drive
//! it with scripted sessions.

pub mod console;
pub mod context;
pub mod input;

use std::backtrace::Backtrace;
use std::fmt;

use thiserror::Error;

use crate::config::{Config, LlmConfig};
use crate::llm::ProviderError;
use crate::subsystems::memory::Transcript;

pub use console::ConsoleSession;
pub use input::ConsoleInput;

/// Each variant records the stack at the point it was converted from its
/// source, so a crash report shows where the failure surfaced.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("llm provider error: {source}")]
    Provider {
        source: ProviderError,
        trace: Box<Backtrace>,
    },

    #[error("console io error: {source}")]
    Io {
        source: std::io::Error,
        trace: Box<Backtrace>,
    },
}

impl SessionError {
    pub fn backtrace(&self) -> &Backtrace {
        match self {
            SessionError::Provider { trace, .. } | SessionError::Io { trace, .. } => trace.as_ref(),
        }
    }
}

impl From<ProviderError> for SessionError {
    fn from(source: ProviderError) -> Self {
        SessionError::Provider { source, trace: Box::new(Backtrace::capture()) }
    }
}

impl From<std::io::Error> for SessionError {
    fn from(source: std::io::Error) -> Self {
        SessionError::Io { source, trace: Box::new(Backtrace::capture()) }
    }
}

/// Everything a session needs to talk to the model, resolved once at startup.
#[derive(Clone)]
pub struct SessionSettings {
    pub llm: LlmConfig,
    pub api_key: Option<String>,
    pub auto_run: bool,
    pub offline: bool,
}

impl SessionSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            llm: config.llm.clone(),
            api_key: config.llm_api_key.clone(),
            auto_run: config.interpreter.auto_run,
            offline: config.interpreter.offline,
        }
    }
}

impl fmt::Debug for SessionSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionSettings")
            .field("llm", &self.llm)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("auto_run", &self.auto_run)
            .field("offline", &self.offline)
            .finish()
    }
}

/// An interactive chat loop.
#[allow(async_fn_in_trait)]
pub trait Session {
    /// Short name for logs.
    fn name(&self) -> &str;

    /// Run until the user ends the conversation.
    async fn run(&mut self, transcript: &mut Transcript) -> Result<(), SessionError>;
}
