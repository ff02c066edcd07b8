//! Build metadata records
//!
//! Every cached shell is accompanied by a `.fuzzmanagerconf` file: an INI
//! record consumed by crash-reporting tooling, preceded by comment lines
//! that let a human rebuild the exact same shell.

use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::Path;

use crate::builder::ConfigureRecord;
use crate::host::{HostFacts, Os};
use crate::options::BuildOptions;

/// Platform string for the crash-reporting record.
///
/// 32-bit builds are fixed to x86 because 32-bit ARM hosts are not supported
/// for compilation.
pub fn fmconf_platform(opts: &BuildOptions, host: &HostFacts) -> String {
    if opts.enable_32 {
        "x86".to_string()
    } else if host.os == Os::Windows {
        if host.machine.eq_ignore_ascii_case("arm64") || host.machine == "aarch64" {
            "aarch64".to_string()
        } else {
            "x86_64".to_string()
        }
    } else {
        host.machine.clone()
    }
}

/// OS string for the crash-reporting record.
pub fn fmconf_os(os: Os) -> &'static str {
    match os {
        Os::Linux => "linux",
        Os::Darwin => "macosx",
        Os::Windows => "windows",
    }
}

/// Append the metadata record for one compiled shell.
#[allow(clippy::too_many_arguments)]
pub fn write_fuzzmanagerconf(
    path: &Path,
    opts: &BuildOptions,
    host: &HostFacts,
    repo_dir: &Path,
    revision: &str,
    version: &str,
    record: &ConfigureRecord,
) -> io::Result<()> {
    let repo_name = repo_dir
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("unknown-repo");
    let env_full: Vec<String> = record
        .env_full
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect();
    let major_version = version.split('.').next().unwrap_or(version);

    let mut f = OpenOptions::new().create(true).append(true).open(path)?;

    writeln!(f, "# Information about shell:")?;
    writeln!(f, "# ")?;
    writeln!(f, "# Create another shell in shell-cache like this one:")?;
    writeln!(f, "# shellforge -b \"{}\" -r {revision}", opts.raw)?;
    writeln!(f, "# ")?;
    writeln!(f, "# Full environment is:")?;
    writeln!(f, "# {}", env_full.join(" "))?;
    writeln!(f, "# ")?;
    writeln!(
        f,
        "# Full configuration command with needed environment variables is:"
    )?;
    writeln!(
        f,
        "# {} {}",
        record.env_added.join(" "),
        record.cfg_cmd.join(" ")
    )?;
    writeln!(f, "# ")?;
    writeln!(f)?;
    writeln!(f, "[Main]")?;
    writeln!(f, "platform = {}", fmconf_platform(opts, host))?;
    writeln!(f, "product = {repo_name}")?;
    writeln!(f, "product_version = {revision}")?;
    writeln!(f, "os = {}", fmconf_os(host.os))?;
    writeln!(f)?;
    writeln!(f, "[Metadata]")?;
    writeln!(f, "buildFlags = {}", opts.raw)?;
    writeln!(f, "majorVersion = {major_version}")?;
    writeln!(f, "pathPrefix = {}/", repo_dir.display())?;
    writeln!(f, "version = {version}")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::parse_flags;
    use std::fs;
    use tempfile::TempDir;

    fn linux() -> HostFacts {
        HostFacts::new(Os::Linux, "x86_64", "")
    }

    #[test]
    fn test_platform_strings() {
        let opts = parse_flags("--32 --enable-debug").unwrap();
        assert_eq!(fmconf_platform(&opts, &linux()), "x86");

        let opts = parse_flags("--enable-debug").unwrap();
        assert_eq!(fmconf_platform(&opts, &linux()), "x86_64");

        let win_arm = HostFacts::new(Os::Windows, "ARM64", "");
        assert_eq!(fmconf_platform(&opts, &win_arm), "aarch64");

        let win = HostFacts::new(Os::Windows, "AMD64", "");
        assert_eq!(fmconf_platform(&opts, &win), "x86_64");
    }

    #[test]
    fn test_os_strings() {
        assert_eq!(fmconf_os(Os::Linux), "linux");
        assert_eq!(fmconf_os(Os::Darwin), "macosx");
        assert_eq!(fmconf_os(Os::Windows), "windows");
    }

    #[test]
    fn test_record_contents() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("js-dbg-64-linux-x86_64-abc123.fuzzmanagerconf");
        let opts = parse_flags("--enable-debug --disable-optimize").unwrap();
        let record = ConfigureRecord {
            env_added: vec!["AR=ar".into()],
            cfg_cmd: vec!["sh".into(), "/repo/js/src/configure".into(), "--enable-debug".into()],
            env_full: Default::default(),
        };

        write_fuzzmanagerconf(
            &path,
            &opts,
            &linux(),
            Path::new("/home/user/trees/mozilla-central"),
            "abc123",
            "89.0a1",
            &record,
        )
        .unwrap();

        let text = fs::read_to_string(&path).unwrap();
        assert!(text.contains("[Main]"));
        assert!(text.contains("platform = x86_64"));
        assert!(text.contains("product = mozilla-central"));
        assert!(text.contains("product_version = abc123"));
        assert!(text.contains("os = linux"));
        assert!(text.contains("[Metadata]"));
        assert!(text.contains("buildFlags = --enable-debug --disable-optimize"));
        assert!(text.contains("majorVersion = 89"));
        assert!(text.contains("pathPrefix = /home/user/trees/mozilla-central/"));
        assert!(text.contains("version = 89.0a1"));
        assert!(text.contains("shellforge -b \"--enable-debug --disable-optimize\" -r abc123"));
    }
}
