//! OS query seam. Every privileged or platform-specific call the resolver,
//! enumerator and polling source make goes through [`ProcessQuery`].
//!
//! - `win32`: Win32 implementation (handles, tokens, Toolhelp snapshots)
//! - `portable`: `sysinfo`-backed fallback for other hosts

#[cfg(windows)]
mod win32;
#[cfg(not(windows))]
mod portable;

#[cfg(test)]
pub(crate) mod fake;

use std::fmt;
use thiserror::Error;

#[cfg(windows)]
pub(crate) use win32::os_error;
#[cfg(windows)]
pub use win32::Win32Query as PlatformQuery;
#[cfg(not(windows))]
pub use portable::PortableQuery as PlatformQuery;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OsErrorKind {
    /// The OS rejected an argument; for a pid this means it is gone
    InvalidParameter,
    PermissionDenied,
    /// The platform has no way to answer this query
    Unsupported,
    Other,
}

impl fmt::Display for OsErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            OsErrorKind::InvalidParameter => "invalid parameter",
            OsErrorKind::PermissionDenied => "access denied",
            OsErrorKind::Unsupported => "unsupported",
            OsErrorKind::Other => "os error",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Error)]
#[error("{operation}: {kind} ({message}, code {code:#010x})")]
pub struct OsError {
    pub operation: &'static str,
    pub kind: OsErrorKind,
    pub code: u32,
    pub message: String,
}

impl OsError {
    pub fn new(operation: &'static str, kind: OsErrorKind, code: u32, message: impl Into<String>) -> Self {
        Self {
            operation,
            kind,
            code,
            message: message.into(),
        }
    }

    /// The one condition that truncates best-effort resolution: the caller
    /// lacks access to this datum, and the remaining steps share that boundary.
    pub fn is_permission_error(&self) -> bool {
        matches!(self.kind, OsErrorKind::PermissionDenied | OsErrorKind::Unsupported)
    }

    pub fn is_invalid_parameter(&self) -> bool {
        self.kind == OsErrorKind::InvalidParameter
    }
}

/// One row of a process snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessEntry {
    pub pid: u32,
    pub name: String,
}

/// Machine values reported for a process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MachineTypes {
    /// Emulated machine, unknown (0) when the process runs natively
    pub process: u16,
    /// Host machine
    pub native: u16,
}

impl MachineTypes {
    pub fn effective(&self) -> u16 {
        if self.process != crate::process::IMAGE_FILE_MACHINE_UNKNOWN {
            self.process
        } else {
            self.native
        }
    }
}

/// Blocking OS queries, callable from any thread.
pub trait ProcessQuery: Send + Sync {
    type Handle;
    type Token;

    /// Point-in-time list of all processes.
    fn list_processes(&self) -> Result<Vec<ProcessEntry>, OsError>;

    /// Open `pid` with limited query rights.
    fn open_process(&self, pid: u32) -> Result<Self::Handle, OsError>;

    fn machine_types(&self, process: &Self::Handle) -> Result<MachineTypes, OsError>;

    fn image_path(&self, process: &Self::Handle) -> Result<String, OsError>;

    fn open_token(&self, process: &Self::Handle) -> Result<Self::Token, OsError>;

    fn is_app_container(&self, token: &Self::Token) -> Result<bool, OsError>;

    /// Last sub-authority of the token's mandatory label SID.
    fn integrity_rid(&self, token: &Self::Token) -> Result<u32, OsError>;
}
