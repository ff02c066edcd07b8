//! Host facts used by validity checks, cache naming and verification
//!
//! Every function that needs to know about the host takes a [`HostFacts`]
//! value instead of reading the OS or CPU architecture ambiently. This keeps
//! the validity predicate and the identity derivation pure, so they can be
//! tested against any host without mocking process state.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

/// Operating-system family of the build host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Os {
    Linux,
    Darwin,
    Windows,
}

impl Os {
    /// Canonical OS name, matching what `platform.system()`-style probes
    /// report ("Linux", "Darwin", "Windows").
    pub fn name(self) -> &'static str {
        match self {
            Os::Linux => "Linux",
            Os::Darwin => "Darwin",
            Os::Windows => "Windows",
        }
    }

    /// Executable filename suffix on this OS.
    pub fn exe_suffix(self) -> &'static str {
        match self {
            Os::Windows => ".exe",
            _ => "",
        }
    }

    /// Environment variable holding the runtime library search path.
    pub fn library_path_var(self) -> &'static str {
        match self {
            Os::Linux => "LD_LIBRARY_PATH",
            Os::Darwin => "DYLD_LIBRARY_PATH",
            Os::Windows => "PATH",
        }
    }

    /// Separator used in the library search path variable.
    pub fn path_sep(self) -> char {
        match self {
            Os::Windows => ';',
            _ => ':',
        }
    }
}

impl std::fmt::Display for Os {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Facts about the build host that build validity and cache naming depend on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostFacts {
    /// OS family.
    pub os: Os,

    /// CPU architecture as reported by the platform (e.g. "x86_64",
    /// "aarch64").
    pub machine: String,

    /// Kernel release string. Used to recognize WSL hosts, which cannot
    /// build some configurations.
    pub release: String,
}

impl HostFacts {
    pub fn new(os: Os, machine: impl Into<String>, release: impl Into<String>) -> Self {
        Self {
            os,
            machine: machine.into(),
            release: release.into(),
        }
    }

    /// Detect the facts of the current host.
    ///
    /// Returns `None` on OS families this tool does not build shells for.
    pub fn detect() -> Option<Self> {
        let os = match std::env::consts::OS {
            "linux" => Os::Linux,
            "macos" => Os::Darwin,
            "windows" => Os::Windows,
            _ => return None,
        };
        let release = if os == Os::Linux {
            read_kernel_release(Path::new("/proc/sys/kernel/osrelease"))
        } else {
            String::new()
        };
        Some(Self {
            os,
            machine: std::env::consts::ARCH.to_string(),
            release,
        })
    }

    /// Whether this host is Windows Subsystem for Linux.
    pub fn is_wsl(&self) -> bool {
        self.os == Os::Linux && self.release.contains("Microsoft")
    }
}

fn read_kernel_release(path: &Path) -> String {
    fs::read_to_string(path)
        .map(|s| s.trim().to_string())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_os_names() {
        assert_eq!(Os::Linux.name(), "Linux");
        assert_eq!(Os::Darwin.name(), "Darwin");
        assert_eq!(Os::Windows.name(), "Windows");
    }

    #[test]
    fn test_exe_suffix_only_on_windows() {
        assert_eq!(Os::Windows.exe_suffix(), ".exe");
        assert_eq!(Os::Linux.exe_suffix(), "");
        assert_eq!(Os::Darwin.exe_suffix(), "");
    }

    #[test]
    fn test_library_path_vars() {
        assert_eq!(Os::Linux.library_path_var(), "LD_LIBRARY_PATH");
        assert_eq!(Os::Darwin.library_path_var(), "DYLD_LIBRARY_PATH");
        assert_eq!(Os::Windows.library_path_var(), "PATH");
        assert_eq!(Os::Windows.path_sep(), ';');
        assert_eq!(Os::Linux.path_sep(), ':');
    }

    #[test]
    fn test_wsl_detection() {
        let wsl = HostFacts::new(Os::Linux, "x86_64", "4.4.0-19041-Microsoft");
        assert!(wsl.is_wsl());

        let plain = HostFacts::new(Os::Linux, "x86_64", "6.8.0-45-generic");
        assert!(!plain.is_wsl());

        // The release string only matters on Linux.
        let win = HostFacts::new(Os::Windows, "x86_64", "Microsoft");
        assert!(!win.is_wsl());
    }

    #[test]
    fn test_detect_on_supported_hosts() {
        if matches!(std::env::consts::OS, "linux" | "macos" | "windows") {
            let facts = HostFacts::detect().unwrap();
            assert!(!facts.machine.is_empty());
        }
    }

    #[test]
    fn test_serialization_round_trip() {
        let facts = HostFacts::new(Os::Darwin, "aarch64", "");
        let json = serde_json::to_string(&facts).unwrap();
        let parsed: HostFacts = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, facts);
    }
}
