//! Full point-in-time enumeration of processes.

use crate::error::{Error, Result};
use crate::os::ProcessQuery;
use crate::process::{Architecture, Process};
use crate::resolver::MetadataResolver;
use std::sync::Arc;
use tracing::debug;

pub struct Enumerator<Q> {
    resolver: Arc<MetadataResolver<Q>>,
}

impl<Q: ProcessQuery> Enumerator<Q> {
    pub fn new(resolver: Arc<MetadataResolver<Q>>) -> Self {
        Self { resolver }
    }

    /// Resolve every process in a fresh OS snapshot. Stale pids are dropped;
    /// with `include_inaccessible == false`, so are records whose
    /// architecture could not be read. Order is unspecified.
    pub fn snapshot(&self, include_inaccessible: bool) -> Result<Vec<Process>> {
        let entries = self
            .resolver
            .query()
            .list_processes()
            .map_err(Error::Snapshot)?;
        let listed = entries.len();

        let mut out = Vec::with_capacity(listed);
        for entry in entries {
            let Some(process) = self.resolver.resolve(entry.pid, &entry.name)? else {
                continue;
            };
            if include_inaccessible || process.architecture() != Architecture::Unknown {
                out.push(process);
            }
        }
        debug!(listed, kept = out.len(), include_inaccessible, "process snapshot");
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::os::fake::{FakeProcess, FakeQuery, Step};
    use crate::os::OsErrorKind;
    use crate::process::IMAGE_FILE_MACHINE_AMD64;

    fn enumerator(query: FakeQuery) -> Enumerator<FakeQuery> {
        Enumerator::new(Arc::new(MetadataResolver::new(Arc::new(query))))
    }

    fn sample() -> FakeQuery {
        FakeQuery::new()
            .with(4, FakeProcess::new("System", IMAGE_FILE_MACHINE_AMD64).denied_at(Step::Open))
            .with(100, FakeProcess::new("explorer.exe", IMAGE_FILE_MACHINE_AMD64))
            .with(200, FakeProcess::new("svchost.exe", IMAGE_FILE_MACHINE_AMD64).denied_at(Step::Token))
    }

    #[test]
    fn keeps_inaccessible_when_asked() {
        let mut pids: Vec<u32> = enumerator(sample())
            .snapshot(true)
            .unwrap()
            .iter()
            .map(|p| p.pid)
            .collect();
        pids.sort_unstable();
        assert_eq!(pids, vec![4, 100, 200]);
    }

    #[test]
    fn drops_unknown_architecture_otherwise() {
        let mut pids: Vec<u32> = enumerator(sample())
            .snapshot(false)
            .unwrap()
            .iter()
            .map(|p| p.pid)
            .collect();
        pids.sort_unstable();
        assert_eq!(pids, vec![100, 200]);
    }

    #[test]
    fn listing_failure_is_snapshot_error() {
        let q = sample();
        q.fail_listing(OsErrorKind::Other);
        assert!(matches!(enumerator(q).snapshot(true), Err(Error::Snapshot(_))));
    }

    #[test]
    fn unexpected_resolve_error_fails_snapshot() {
        let q = sample().with(
            300,
            FakeProcess::new("broken.exe", IMAGE_FILE_MACHINE_AMD64).failing_at(Step::Machine, OsErrorKind::Other),
        );
        assert!(matches!(enumerator(q).snapshot(true), Err(Error::Resolve { pid: 300, .. })));
    }
}
