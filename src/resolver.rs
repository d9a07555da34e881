//! Best-effort metadata resolution for one pid.
//!
//! The query chain runs in a fixed order (handle, machine type, image path,
//! token, sandbox flag, integrity label). The first no-access failure stops
//! the chain and the record keeps whatever was filled in so far.

use crate::error::{Error, Result};
use crate::os::{OsError, ProcessQuery};
use crate::process::{IntegrityLevel, Process, ProcessType};
use std::sync::Arc;
use tracing::{debug, trace};

/// Anything that can turn a (pid, name) pair into a record. The watcher
/// holds one of these on its delivery thread.
pub trait Resolve: Send + Sync {
    /// `Ok(None)`: the pid no longer exists.
    fn resolve(&self, pid: u32, name: &str) -> Result<Option<Process>>;
}

pub struct MetadataResolver<Q> {
    query: Arc<Q>,
}

impl<Q: ProcessQuery> MetadataResolver<Q> {
    pub fn new(query: Arc<Q>) -> Self {
        Self { query }
    }

    pub fn query(&self) -> &Arc<Q> {
        &self.query
    }

    pub fn resolve(&self, pid: u32, name: &str) -> Result<Option<Process>> {
        let mut process = Process::unresolved(pid, name);

        let handle = match self.query.open_process(pid) {
            Ok(h) => h,
            Err(e) if e.is_invalid_parameter() => {
                trace!(pid, name, "stale pid");
                return Ok(None);
            }
            Err(e) => return self.truncated(process, e),
        };

        match self.fill(&handle, &mut process) {
            Ok(()) => Ok(Some(process)),
            Err(e) => self.truncated(process, e),
        }
    }

    fn fill(&self, handle: &Q::Handle, process: &mut Process) -> std::result::Result<(), OsError> {
        process.architecture_raw = self.query.machine_types(handle)?.effective();
        process.executable_path = self.query.image_path(handle)?;

        let token = self.query.open_token(handle)?;
        process.process_type = Some(if self.query.is_app_container(&token)? {
            ProcessType::Sandboxed
        } else {
            ProcessType::Legacy
        });
        process.integrity_level = IntegrityLevel::from_rid(self.query.integrity_rid(&token)?);
        Ok(())
    }

    fn truncated(&self, process: Process, err: OsError) -> Result<Option<Process>> {
        if err.is_permission_error() {
            debug!(pid = process.pid, name = %process.name, error = %err, "partial metadata");
            Ok(Some(process))
        } else {
            Err(Error::Resolve {
                pid: process.pid,
                source: err,
            })
        }
    }
}

impl<Q: ProcessQuery> Resolve for MetadataResolver<Q> {
    fn resolve(&self, pid: u32, name: &str) -> Result<Option<Process>> {
        MetadataResolver::resolve(self, pid, name)
    }
}
