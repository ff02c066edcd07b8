//! Compiled-shell verification
//!
//! A freshly compiled shell is not trusted until its observable properties
//! match the requested build options: word width as reported by `file(1)`,
//! and the flags the shell itself reports through
//! `getBuildConfiguration()`. Inspection goes through the [`Inspector`]
//! trait so verification logic can be tested against canned outputs.

use std::collections::BTreeMap;
use std::env;
use std::path::Path;
use std::process::Command;
use std::time::Duration;

use thiserror::Error;

use crate::builder::process::{run_captured, run_stdout_only};
use crate::builder::BuildToolError;
use crate::host::HostFacts;
use crate::options::BuildOptions;

/// Exit code ASan-instrumented shells are told to use on sanitizer errors.
pub const ASAN_ERROR_EXIT_CODE: i32 = 77;

const FILE_TIMEOUT: Duration = Duration::from_secs(99);
const INTROSPECTION_TIMEOUT: Duration = Duration::from_secs(999);

#[derive(Debug, Error)]
pub enum VerifyError {
    #[error("binary does not match requested configuration: {property} expected {expected}, got {actual}")]
    Mismatch {
        property: &'static str,
        expected: String,
        actual: String,
    },

    #[error("could not determine word width from file type {0:?}")]
    UnknownWordWidth(String),

    #[error("binary is not a native executable for this platform: {0:?}")]
    ForeignBinary(String),

    #[error("could not parse getBuildConfiguration output {output:?} for {param:?}")]
    BadIntrospection { param: String, output: String },

    #[error(transparent)]
    Inspect(#[from] BuildToolError),
}

/// How the verifier looks at a binary: its file type, and what the binary
/// prints when run with arguments.
pub trait Inspector {
    /// The `file(1)` description of the binary.
    fn file_type(&self, binary: &Path) -> Result<String, BuildToolError>;

    /// Run the binary with `args` and `env` on top of the ambient
    /// environment, returning stdout and the exit status.
    fn run_with_args(
        &self,
        binary: &Path,
        args: &[String],
        env: &BTreeMap<String, String>,
    ) -> Result<(String, Option<i32>), BuildToolError>;
}

/// Inspector backed by real subprocesses.
#[derive(Debug, Default)]
pub struct SystemInspector;

impl SystemInspector {
    pub fn new() -> Self {
        Self
    }
}

impl Inspector for SystemInspector {
    fn file_type(&self, binary: &Path) -> Result<String, BuildToolError> {
        let mut cmd = Command::new("file");
        cmd.arg(binary);
        let out = run_captured(cmd, "file", FILE_TIMEOUT)?;
        if !out.success() {
            return Err(BuildToolError::Failed {
                tool: "file".into(),
                status: out.status,
                output: out.text,
            });
        }
        Ok(out.text)
    }

    fn run_with_args(
        &self,
        binary: &Path,
        args: &[String],
        env: &BTreeMap<String, String>,
    ) -> Result<(String, Option<i32>), BuildToolError> {
        let mut cmd = Command::new(binary);
        cmd.args(args).envs(env);
        let out = run_stdout_only(cmd, "js shell", INTROSPECTION_TIMEOUT)?;
        Ok((out.text, out.status))
    }
}

/// Environment additions for running a cached shell: the directory holding
/// its runtime libraries is prepended to the platform library path, and
/// sanitizer options are set so ASan failures are distinguishable by exit
/// code.
pub fn shell_run_env(binary: &Path, opts: &BuildOptions, host: &HostFacts) -> BTreeMap<String, String> {
    let mut env_map = BTreeMap::new();

    let lib_var = host.os.library_path_var();
    let bin_dir = binary
        .parent()
        .map(|p| p.display().to_string())
        .unwrap_or_default();
    let value = match env::var(lib_var) {
        Ok(existing) if !existing.is_empty() => {
            format!("{bin_dir}{}{existing}", host.os.path_sep())
        }
        _ => bin_dir,
    };
    env_map.insert(lib_var.to_string(), value);

    let mut asan_options = format!("exitcode={ASAN_ERROR_EXIT_CODE}");
    // LSan is Linux-only and does not work under the ARM64 simulator.
    if host.os == crate::host::Os::Linux
        && !(opts.enable_address_sanitizer && opts.enable_simulator_arm64)
    {
        asan_options = format!("detect_leaks=1,{asan_options}");
        env_map.insert("LSAN_OPTIONS".into(), "max_leaks=1,".into());
    }
    env_map.insert("ASAN_OPTIONS".into(), asan_options);

    env_map
}

/// Classify a `file(1)` description as a 32-bit or 64-bit native binary.
pub fn word_width_of(file_type: &str, host: &HostFacts) -> Result<&'static str, VerifyError> {
    // file(1) prints "path: description"; only the description matters.
    let description = file_type.split_once(':').map_or(file_type, |(_, d)| d);

    if host.os == crate::host::Os::Windows {
        if !description.contains("MS Windows") {
            return Err(VerifyError::ForeignBinary(description.trim().to_string()));
        }
        return Ok(
            if description.contains("Intel 80386 32-bit") || description.contains("PE32 executable")
            {
                "32"
            } else {
                "64"
            },
        );
    }

    let is_32 = description.contains("32-bit") || description.contains("i386");
    let is_64 = description.contains("64-bit");
    match (is_32, is_64) {
        (true, false) => Ok("32"),
        (false, true) => Ok("64"),
        _ => Err(VerifyError::UnknownWordWidth(description.trim().to_string())),
    }
}

/// Ask a shell for one boolean field of its `getBuildConfiguration()`.
pub fn query_build_configuration(
    inspector: &dyn Inspector,
    binary: &Path,
    opts: &BuildOptions,
    host: &HostFacts,
    param: &str,
) -> Result<bool, VerifyError> {
    let args = vec![
        "-e".to_string(),
        format!("print(getBuildConfiguration()[\"{param}\"])"),
    ];
    let env_map = shell_run_env(binary, opts, host);
    let (out, _status) = inspector.run_with_args(binary, &args, &env_map)?;
    let normalized = out.trim().to_lowercase();
    serde_json::from_str(&normalized).map_err(|_| VerifyError::BadIntrospection {
        param: param.to_string(),
        output: out,
    })
}

fn check(property: &'static str, expected: bool, actual: bool) -> Result<(), VerifyError> {
    if expected == actual {
        Ok(())
    } else {
        Err(VerifyError::Mismatch {
            property,
            expected: expected.to_string(),
            actual: actual.to_string(),
        })
    }
}

/// Verify that the binary was compiled as requested.
pub fn verify_binary(
    inspector: &dyn Inspector,
    binary: &Path,
    opts: &BuildOptions,
    host: &HostFacts,
) -> Result<(), VerifyError> {
    let file_type = inspector.file_type(binary)?;
    let width = word_width_of(&file_type, host)?;
    let expected_width = if opts.enable_32 { "32" } else { "64" };
    if width != expected_width {
        return Err(VerifyError::Mismatch {
            property: "word width",
            expected: expected_width.to_string(),
            actual: width.to_string(),
        });
    }

    let query = |param| query_build_configuration(inspector, binary, opts, host, param);

    // Debug and optimize are independent axes, so debug is compared exactly
    // rather than inferred from the optimize flags.
    check("debug", opts.enable_debug, query("debug")?)?;
    check(
        "more-deterministic",
        opts.enable_more_deterministic,
        query("more-deterministic")?,
    )?;
    check("asan", opts.enable_address_sanitizer, query("asan")?)?;
    // Profiling reports inverted: older release branches always say false.
    check("profiling", !opts.disable_profiling, query("profiling")?)?;

    if host.machine == "x86_64" {
        check(
            "arm-simulator",
            opts.enable_simulator_arm32,
            query("arm-simulator")? && opts.enable_32,
        )?;
        check(
            "arm64-simulator",
            opts.enable_simulator_arm64,
            query("arm64-simulator")? && !opts.enable_32,
        )?;
    }

    Ok(())
}
