//! Logging setup and line-oriented output.

mod format;

pub use format::{ProcessLine, StructuredLogger};
