//! Process record and the decoded attribute enums (architecture, sandbox type, integrity).

use serde::{Deserialize, Serialize};
use std::fmt;

pub const IMAGE_FILE_MACHINE_UNKNOWN: u16 = 0x0000;
pub const IMAGE_FILE_MACHINE_I386: u16 = 0x014c;
pub const IMAGE_FILE_MACHINE_ARMNT: u16 = 0x01c4;
pub const IMAGE_FILE_MACHINE_AMD64: u16 = 0x8664;
pub const IMAGE_FILE_MACHINE_ARM64: u16 = 0xaa64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Architecture {
    Unknown,
    X86,
    X64,
    Arm,
    Arm64,
}

impl Architecture {
    /// Decode a PE machine code. Anything unrecognized is `Unknown`.
    pub fn from_machine(value: u16) -> Self {
        match value {
            IMAGE_FILE_MACHINE_I386 => Architecture::X86,
            IMAGE_FILE_MACHINE_AMD64 => Architecture::X64,
            IMAGE_FILE_MACHINE_ARMNT => Architecture::Arm,
            IMAGE_FILE_MACHINE_ARM64 => Architecture::Arm64,
            _ => Architecture::Unknown,
        }
    }

    /// Machine code for a Rust target arch name (`std::env::consts::ARCH`).
    pub fn machine_for_target(arch: &str) -> u16 {
        match arch {
            "x86" => IMAGE_FILE_MACHINE_I386,
            "x86_64" => IMAGE_FILE_MACHINE_AMD64,
            "arm" => IMAGE_FILE_MACHINE_ARMNT,
            "aarch64" => IMAGE_FILE_MACHINE_ARM64,
            _ => IMAGE_FILE_MACHINE_UNKNOWN,
        }
    }
}

impl fmt::Display for Architecture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Architecture::X86 => "x86",
            Architecture::X64 => "x64",
            Architecture::Arm => "ARM",
            Architecture::Arm64 => "ARM64",
            Architecture::Unknown => "Unknown",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessType {
    Legacy,
    Sandboxed,
}

impl fmt::Display for ProcessType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProcessType::Legacy => f.write_str("Legacy"),
            ProcessType::Sandboxed => f.write_str("Sandboxed"),
        }
    }
}

/// Mandatory integrity rank. Variant order is rank order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntegrityLevel {
    Untrusted,
    Low,
    Medium,
    MediumPlus,
    High,
    System,
    ProtectedProcess,
}

impl IntegrityLevel {
    /// Map the last sub-authority of a mandatory label SID.
    pub fn from_rid(rid: u32) -> Option<Self> {
        match rid {
            0x0000 => Some(IntegrityLevel::Untrusted),
            0x1000 => Some(IntegrityLevel::Low),
            0x2000 => Some(IntegrityLevel::Medium),
            0x2100 => Some(IntegrityLevel::MediumPlus),
            0x3000 => Some(IntegrityLevel::High),
            0x4000 => Some(IntegrityLevel::System),
            0x5000 => Some(IntegrityLevel::ProtectedProcess),
            _ => None,
        }
    }
}

impl fmt::Display for IntegrityLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            IntegrityLevel::Untrusted => "Untrusted",
            IntegrityLevel::Low => "Low",
            IntegrityLevel::Medium => "Medium",
            IntegrityLevel::MediumPlus => "Medium Plus",
            IntegrityLevel::High => "High",
            IntegrityLevel::System => "System",
            IntegrityLevel::ProtectedProcess => "Protected Process",
        };
        f.write_str(s)
    }
}

/// One tracked process. Never mutated once it reaches the registry; a change
/// means a new record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Process {
    pub pid: u32,
    pub name: String,
    /// Empty when the path query was not reached or was denied
    pub executable_path: String,
    /// `None`: could not be determined
    pub process_type: Option<ProcessType>,
    /// Raw machine code, kept for display when it does not decode
    pub architecture_raw: u16,
    /// `None`: unavailable or an unrecognized rank
    pub integrity_level: Option<IntegrityLevel>,
}

impl Process {
    /// A record with nothing resolved beyond what the caller already knows.
    pub fn unresolved(pid: u32, name: impl Into<String>) -> Self {
        Self {
            pid,
            name: name.into(),
            executable_path: String::new(),
            process_type: None,
            architecture_raw: IMAGE_FILE_MACHINE_UNKNOWN,
            integrity_level: None,
        }
    }

    pub fn architecture(&self) -> Architecture {
        Architecture::from_machine(self.architecture_raw)
    }

    /// `Unknown: 0x01f0` style label when the code does not decode.
    pub fn architecture_label(&self) -> String {
        let arch = self.architecture();
        if arch == Architecture::Unknown && self.architecture_raw > 0 {
            format!("{}: 0x{:04x}", arch, self.architecture_raw)
        } else {
            arch.to_string()
        }
    }

    pub fn process_type_label(&self) -> String {
        self.process_type
            .map(|t| t.to_string())
            .unwrap_or_else(|| "Unknown".to_string())
    }

    pub fn integrity_label(&self) -> String {
        self.integrity_level
            .map(|l| l.to_string())
            .unwrap_or_else(|| "Unknown".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_known_machine_codes() {
        assert_eq!(Architecture::from_machine(0x014c), Architecture::X86);
        assert_eq!(Architecture::from_machine(0x8664), Architecture::X64);
        assert_eq!(Architecture::from_machine(0x01c4), Architecture::Arm);
        assert_eq!(Architecture::from_machine(0xaa64), Architecture::Arm64);
        assert_eq!(Architecture::from_machine(0x0200), Architecture::Unknown);
    }

    #[test]
    fn unknown_architecture_label_keeps_raw_code() {
        let mut p = Process::unresolved(4, "ia64.exe");
        p.architecture_raw = 0x0200;
        assert_eq!(p.architecture_label(), "Unknown: 0x0200");

        let q = Process::unresolved(5, "denied.exe");
        assert_eq!(q.architecture_label(), "Unknown");
    }

    #[test]
    fn integrity_ranks_are_ordered() {
        assert_eq!(IntegrityLevel::from_rid(0x2100), Some(IntegrityLevel::MediumPlus));
        assert_eq!(IntegrityLevel::from_rid(0x2345), None);
        assert!(IntegrityLevel::Low < IntegrityLevel::Medium);
        assert!(IntegrityLevel::System < IntegrityLevel::ProtectedProcess);
    }

    #[test]
    fn unresolved_record_has_placeholder_labels() {
        let p = Process::unresolved(10, "x");
        assert_eq!(p.process_type_label(), "Unknown");
        assert_eq!(p.integrity_label(), "Unknown");
        assert!(p.executable_path.is_empty());
    }

    #[test]
    fn target_arch_maps_to_machine() {
        assert_eq!(Architecture::machine_for_target("x86_64"), IMAGE_FILE_MACHINE_AMD64);
        assert_eq!(Architecture::machine_for_target("riscv64"), IMAGE_FILE_MACHINE_UNKNOWN);
    }
}
