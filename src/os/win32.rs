//! Win32 backend: limited-query process handles, `IsWow64Process2`, access
//! token queries and Toolhelp snapshots.

use super::{MachineTypes, OsError, OsErrorKind, ProcessEntry, ProcessQuery};
use std::ffi::c_void;
use std::mem::size_of;
use windows::core::PWSTR;
use windows::Win32::Foundation::{
    CloseHandle, E_ACCESSDENIED, E_INVALIDARG, ERROR_INSUFFICIENT_BUFFER, ERROR_NO_MORE_FILES, HANDLE,
};
use windows::Win32::Security::{
    GetSidSubAuthority, GetSidSubAuthorityCount, GetTokenInformation, TokenIntegrityLevel,
    TokenIsAppContainer, TOKEN_MANDATORY_LABEL, TOKEN_QUERY,
};
use windows::Win32::System::Diagnostics::ToolHelp::{
    CreateToolhelp32Snapshot, Process32FirstW, Process32NextW, PROCESSENTRY32W, TH32CS_SNAPPROCESS,
};
use windows::Win32::System::SystemInformation::IMAGE_FILE_MACHINE;
use windows::Win32::System::Threading::{
    IsWow64Process2, OpenProcess, OpenProcessToken, QueryFullProcessImageNameW, PROCESS_NAME_WIN32,
    PROCESS_QUERY_LIMITED_INFORMATION,
};

/// Longest path `QueryFullProcessImageNameW` can return.
const MAX_IMAGE_PATH: usize = 32 * 1024;

/// Closes the wrapped handle on drop.
pub struct OwnedHandle(HANDLE);

impl Drop for OwnedHandle {
    fn drop(&mut self) {
        unsafe {
            let _ = CloseHandle(self.0);
        }
    }
}

pub(crate) fn os_error(operation: &'static str, err: windows::core::Error) -> OsError {
    let code = err.code();
    let kind = if code == E_INVALIDARG {
        OsErrorKind::InvalidParameter
    } else if code == E_ACCESSDENIED {
        OsErrorKind::PermissionDenied
    } else {
        OsErrorKind::Other
    };
    OsError::new(operation, kind, code.0 as u32, err.message().to_string())
}

fn wide_to_string(wide: &[u16]) -> String {
    let len = wide.iter().position(|&c| c == 0).unwrap_or(wide.len());
    String::from_utf16_lossy(&wide[..len])
}

#[derive(Debug, Default, Clone, Copy)]
pub struct Win32Query;

impl Win32Query {
    pub fn new() -> Self {
        Self
    }
}

impl ProcessQuery for Win32Query {
    type Handle = OwnedHandle;
    type Token = OwnedHandle;

    fn list_processes(&self) -> Result<Vec<ProcessEntry>, OsError> {
        let snapshot = unsafe { CreateToolhelp32Snapshot(TH32CS_SNAPPROCESS, 0) }
            .map_err(|e| os_error("CreateToolhelp32Snapshot", e))?;
        let snapshot = OwnedHandle(snapshot);

        let mut entry = PROCESSENTRY32W {
            dwSize: size_of::<PROCESSENTRY32W>() as u32,
            ..Default::default()
        };
        let mut out = Vec::new();
        let mut next = unsafe { Process32FirstW(snapshot.0, &mut entry) };
        loop {
            match next {
                Ok(()) => {
                    out.push(ProcessEntry {
                        pid: entry.th32ProcessID,
                        name: wide_to_string(&entry.szExeFile),
                    });
                    next = unsafe { Process32NextW(snapshot.0, &mut entry) };
                }
                Err(e) if e.code() == ERROR_NO_MORE_FILES.to_hresult() => break,
                Err(e) => return Err(os_error("Process32NextW", e)),
            }
        }
        Ok(out)
    }

    fn open_process(&self, pid: u32) -> Result<OwnedHandle, OsError> {
        let handle = unsafe { OpenProcess(PROCESS_QUERY_LIMITED_INFORMATION, false, pid) }
            .map_err(|e| os_error("OpenProcess", e))?;
        Ok(OwnedHandle(handle))
    }

    fn machine_types(&self, process: &OwnedHandle) -> Result<MachineTypes, OsError> {
        let mut emulated = IMAGE_FILE_MACHINE::default();
        let mut native = IMAGE_FILE_MACHINE::default();
        unsafe { IsWow64Process2(process.0, &mut emulated, Some(&mut native)) }
            .map_err(|e| os_error("IsWow64Process2", e))?;
        Ok(MachineTypes {
            process: emulated.0,
            native: native.0,
        })
    }

    fn image_path(&self, process: &OwnedHandle) -> Result<String, OsError> {
        let mut capacity = 1024usize;
        loop {
            let mut buf = vec![0u16; capacity];
            let mut len = buf.len() as u32;
            let result = unsafe {
                QueryFullProcessImageNameW(process.0, PROCESS_NAME_WIN32, PWSTR(buf.as_mut_ptr()), &mut len)
            };
            match result {
                Ok(()) => return Ok(String::from_utf16_lossy(&buf[..len as usize])),
                Err(e) if e.code() == ERROR_INSUFFICIENT_BUFFER.to_hresult() && capacity < MAX_IMAGE_PATH => {
                    capacity *= 2;
                }
                Err(e) => return Err(os_error("QueryFullProcessImageNameW", e)),
            }
        }
    }

    fn open_token(&self, process: &OwnedHandle) -> Result<OwnedHandle, OsError> {
        let mut token = HANDLE::default();
        unsafe { OpenProcessToken(process.0, TOKEN_QUERY, &mut token) }
            .map_err(|e| os_error("OpenProcessToken", e))?;
        Ok(OwnedHandle(token))
    }

    fn is_app_container(&self, token: &OwnedHandle) -> Result<bool, OsError> {
        let mut value: u32 = 0;
        let mut returned = 0u32;
        unsafe {
            GetTokenInformation(
                token.0,
                TokenIsAppContainer,
                Some(&mut value as *mut u32 as *mut c_void),
                size_of::<u32>() as u32,
                &mut returned,
            )
        }
        .map_err(|e| os_error("GetTokenInformation(TokenIsAppContainer)", e))?;
        Ok(value != 0)
    }

    fn integrity_rid(&self, token: &OwnedHandle) -> Result<u32, OsError> {
        let mut needed = 0u32;
        match unsafe { GetTokenInformation(token.0, TokenIntegrityLevel, None, 0, &mut needed) } {
            Ok(()) => {}
            Err(e) if e.code() == ERROR_INSUFFICIENT_BUFFER.to_hresult() => {}
            Err(e) => return Err(os_error("GetTokenInformation(TokenIntegrityLevel)", e)),
        }

        // u64 storage keeps the TOKEN_MANDATORY_LABEL header aligned.
        let mut buf = vec![0u64; (needed as usize).div_ceil(size_of::<u64>()).max(1)];
        unsafe {
            GetTokenInformation(
                token.0,
                TokenIntegrityLevel,
                Some(buf.as_mut_ptr() as *mut c_void),
                needed,
                &mut needed,
            )
        }
        .map_err(|e| os_error("GetTokenInformation(TokenIntegrityLevel)", e))?;

        let label = unsafe { &*(buf.as_ptr() as *const TOKEN_MANDATORY_LABEL) };
        let sid = label.Label.Sid;
        let count = unsafe { *GetSidSubAuthorityCount(sid) };
        if count == 0 {
            return Err(OsError::new(
                "GetSidSubAuthorityCount",
                OsErrorKind::Other,
                0,
                "integrity label SID has no sub-authorities",
            ));
        }
        Ok(unsafe { *GetSidSubAuthority(sid, u32::from(count) - 1) })
    }
}
