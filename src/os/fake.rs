//! In-memory `ProcessQuery` for unit tests.

use super::{MachineTypes, OsError, OsErrorKind, ProcessEntry, ProcessQuery};
use std::collections::BTreeMap;
use std::sync::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Open,
    Machine,
    Path,
    Token,
    AppContainer,
    Integrity,
}

#[derive(Debug, Clone)]
pub struct FakeProcess {
    pub name: String,
    pub machines: MachineTypes,
    pub path: String,
    pub app_container: bool,
    pub rid: u32,
    pub fail: Option<(Step, OsErrorKind)>,
}

impl FakeProcess {
    pub fn new(name: &str, native: u16) -> Self {
        Self {
            name: name.to_string(),
            machines: MachineTypes { process: 0, native },
            path: format!("C:\\Windows\\System32\\{name}"),
            app_container: false,
            rid: 0x2000,
            fail: None,
        }
    }

    pub fn emulated(mut self, machine: u16) -> Self {
        self.machines.process = machine;
        self
    }

    pub fn sandboxed(mut self) -> Self {
        self.app_container = true;
        self
    }

    pub fn rid(mut self, rid: u32) -> Self {
        self.rid = rid;
        self
    }

    pub fn denied_at(self, step: Step) -> Self {
        self.failing_at(step, OsErrorKind::PermissionDenied)
    }

    pub fn failing_at(mut self, step: Step, kind: OsErrorKind) -> Self {
        self.fail = Some((step, kind));
        self
    }
}

#[derive(Default)]
pub struct FakeQuery {
    procs: Mutex<BTreeMap<u32, FakeProcess>>,
    calls: Mutex<Vec<(u32, Step)>>,
    listing_error: Mutex<Option<OsErrorKind>>,
}

pub struct FakeHandle {
    pid: u32,
    process: FakeProcess,
}

impl FakeQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(self, pid: u32, process: FakeProcess) -> Self {
        self.insert(pid, process);
        self
    }

    pub fn insert(&self, pid: u32, process: FakeProcess) {
        self.procs.lock().unwrap().insert(pid, process);
    }

    pub fn remove(&self, pid: u32) {
        self.procs.lock().unwrap().remove(&pid);
    }

    pub fn fail_listing(&self, kind: OsErrorKind) {
        *self.listing_error.lock().unwrap() = Some(kind);
    }

    pub fn calls_for(&self, pid: u32) -> Vec<Step> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(p, _)| *p == pid)
            .map(|(_, s)| *s)
            .collect()
    }

    fn step(&self, handle: &FakeHandle, step: Step) -> Result<(), OsError> {
        self.calls.lock().unwrap().push((handle.pid, step));
        match handle.process.fail {
            Some((at, kind)) if at == step => Err(OsError::new("fake", kind, 5, "injected")),
            _ => Ok(()),
        }
    }
}

impl ProcessQuery for FakeQuery {
    type Handle = FakeHandle;
    type Token = FakeHandle;

    fn list_processes(&self) -> Result<Vec<ProcessEntry>, OsError> {
        if let Some(kind) = *self.listing_error.lock().unwrap() {
            return Err(OsError::new("list_processes", kind, 1, "injected"));
        }
        Ok(self
            .procs
            .lock()
            .unwrap()
            .iter()
            .map(|(pid, p)| ProcessEntry {
                pid: *pid,
                name: p.name.clone(),
            })
            .collect())
    }

    fn open_process(&self, pid: u32) -> Result<FakeHandle, OsError> {
        let process = self
            .procs
            .lock()
            .unwrap()
            .get(&pid)
            .cloned()
            .ok_or_else(|| OsError::new("open_process", OsErrorKind::InvalidParameter, 87, "gone"))?;
        let handle = FakeHandle { pid, process };
        self.step(&handle, Step::Open)?;
        Ok(handle)
    }

    fn machine_types(&self, process: &FakeHandle) -> Result<MachineTypes, OsError> {
        self.step(process, Step::Machine)?;
        Ok(process.process.machines)
    }

    fn image_path(&self, process: &FakeHandle) -> Result<String, OsError> {
        self.step(process, Step::Path)?;
        Ok(process.process.path.clone())
    }

    fn open_token(&self, process: &FakeHandle) -> Result<FakeHandle, OsError> {
        self.step(process, Step::Token)?;
        Ok(FakeHandle {
            pid: process.pid,
            process: process.process.clone(),
        })
    }

    fn is_app_container(&self, token: &FakeHandle) -> Result<bool, OsError> {
        self.step(token, Step::AppContainer)?;
        Ok(token.process.app_container)
    }

    fn integrity_rid(&self, token: &FakeHandle) -> Result<u32, OsError> {
        self.step(token, Step::Integrity)?;
        Ok(token.process.rid)
    }
}
