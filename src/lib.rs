// Library root — exposes internals for integration tests.
// The binary entry point is src/main.rs.

pub mod bootstrap;
pub mod core;
pub mod llm;
pub mod subsystems;
pub mod supervisor;

pub use crate::bootstrap::logger;
pub use crate::core::{config, error};
