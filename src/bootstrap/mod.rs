//! Bootstrap layer — modules that run before the chat session starts.
//!
//! - **logger** — tracing-subscriber initialisation.

pub mod logger;
