//! Portable backend over `sysinfo`. No access tokens exist here, so the
//! resolver's token steps report `Unsupported` and truncate.

use super::{MachineTypes, OsError, OsErrorKind, ProcessEntry, ProcessQuery};
use crate::process::Architecture;
use std::sync::{Mutex, MutexGuard};
use sysinfo::{Pid, System};

pub struct PortableQuery {
    sys: Mutex<System>,
}

pub struct PortableHandle {
    exe: Option<String>,
}

pub struct NoToken;

impl Default for PortableQuery {
    fn default() -> Self {
        Self::new()
    }
}

impl PortableQuery {
    pub fn new() -> Self {
        Self {
            sys: Mutex::new(System::new()),
        }
    }

    fn lock(&self, operation: &'static str) -> Result<MutexGuard<'_, System>, OsError> {
        self.sys
            .lock()
            .map_err(|_| OsError::new(operation, OsErrorKind::Other, 0, "process table lock poisoned"))
    }
}

impl ProcessQuery for PortableQuery {
    type Handle = PortableHandle;
    type Token = NoToken;

    fn list_processes(&self) -> Result<Vec<ProcessEntry>, OsError> {
        let mut sys = self.lock("list_processes")?;
        sys.refresh_processes();
        Ok(sys
            .processes()
            .iter()
            .map(|(pid, p)| ProcessEntry {
                pid: pid.as_u32(),
                name: p.name().to_string(),
            })
            .collect())
    }

    fn open_process(&self, pid: u32) -> Result<PortableHandle, OsError> {
        let mut sys = self.lock("open_process")?;
        let spid = Pid::from_u32(pid);
        if !sys.refresh_process(spid) {
            return Err(OsError::new(
                "open_process",
                OsErrorKind::InvalidParameter,
                0,
                format!("no process with pid {pid}"),
            ));
        }
        let exe = sys
            .process(spid)
            .and_then(|p| p.exe())
            .map(|p| p.to_string_lossy().into_owned());
        Ok(PortableHandle { exe })
    }

    fn machine_types(&self, _process: &PortableHandle) -> Result<MachineTypes, OsError> {
        Ok(MachineTypes {
            process: crate::process::IMAGE_FILE_MACHINE_UNKNOWN,
            native: Architecture::machine_for_target(std::env::consts::ARCH),
        })
    }

    fn image_path(&self, process: &PortableHandle) -> Result<String, OsError> {
        process.exe.clone().ok_or_else(|| {
            OsError::new("image_path", OsErrorKind::PermissionDenied, 0, "executable path not readable")
        })
    }

    fn open_token(&self, _process: &PortableHandle) -> Result<NoToken, OsError> {
        Err(OsError::new(
            "open_token",
            OsErrorKind::Unsupported,
            0,
            "access tokens are not available on this platform",
        ))
    }

    fn is_app_container(&self, _token: &NoToken) -> Result<bool, OsError> {
        Err(OsError::new("is_app_container", OsErrorKind::Unsupported, 0, "no access token"))
    }

    fn integrity_rid(&self, _token: &NoToken) -> Result<u32, OsError> {
        Err(OsError::new("integrity_rid", OsErrorKind::Unsupported, 0, "no access token"))
    }
}
