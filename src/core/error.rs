//! Application-wide error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("config error: {0}")]
    Config(String),

    #[error("logger error: {0}")]
    Logger(String),

    #[error("memory error: {0}")]
    Memory(String),

    #[error("crash log error: {0}")]
    CrashLog(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
