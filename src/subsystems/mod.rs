//! Building blocks the supervisor composes.
//!
//! - **memory** — transcript type and its JSON file.
//! - **session** — the interactive chat loop.
//! - **crash** — crash reports and the append-only crash log.

pub mod crash;
pub mod memory;
pub mod session;
