//! procview: live, sorted registry of running processes.
//!
//! Modular structure:
//! - [`os`]: Platform process queries behind the [`os::ProcessQuery`] seam
//! - [`resolver`]: Best-effort per-process metadata (architecture, path, sandbox, integrity)
//! - [`enumerator`]: Point-in-time snapshot of all processes
//! - [`watcher`]: Creation/deletion events marshalled to a single owner thread
//! - [`registry`]: Sorted process list with binary-search insert
//! - [`logging`]: Structured logging and JSON line output

pub mod config;
pub mod enumerator;
pub mod error;
pub mod logging;
pub mod os;
pub mod process;
pub mod registry;
pub mod resolver;
pub mod watcher;

pub use config::ViewerConfig;
pub use enumerator::Enumerator;
pub use error::{Error, Result};
pub use logging::StructuredLogger;
pub use os::PlatformQuery;
pub use process::{Architecture, IntegrityLevel, Process, ProcessType};
pub use registry::{SortAttribute, SortDirection, SortState, SortedRegistry};
pub use resolver::MetadataResolver;
pub use watcher::{Dispatcher, ProcessWatcher};
