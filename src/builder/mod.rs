//! Build toolchain boundary
//!
//! The acquisition state machine drives a [`BuildStrategy`]: configure a
//! source tree into a build directory, compile it, and tell the machine where
//! the binary and runtime libraries land. Engine-specific knowledge (how the
//! configure command is assembled, what `make` is called) lives in strategy
//! implementations such as [`spidermonkey::SpiderMonkeyBuilder`]; the state
//! machine itself never touches a subprocess.

pub mod process;
pub mod spidermonkey;

use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::host::{HostFacts, Os};
use crate::options::BuildOptions;

/// Compiler messages that indicate the build died because the machine ran out
/// of memory. The compile step is retried once when one of these appears.
const COMPILER_OOM_MARKERS: &[&str] = &[
    // GCC running out of memory
    "internal compiler error: Killed (program cc1plus)",
    // Clang running out of memory
    "error: unable to execute command: Killed",
];

/// Combined stdout/stderr of an external tool, plus its exit status.
///
/// `status` is `None` when the process was terminated by a signal.
#[derive(Debug, Clone, Default)]
pub struct CapturedOutput {
    pub text: String,
    pub status: Option<i32>,
}

impl CapturedOutput {
    pub fn success(&self) -> bool {
        self.status == Some(0)
    }
}

/// Errors from launching or waiting on external build tools.
///
/// Note that a non-zero exit from the compile step is deliberately *not* an
/// error here: some toolchains report spurious non-zero codes on success, so
/// the real success criterion is whether the expected binary exists on disk
/// afterwards.
#[derive(Debug, thiserror::Error)]
pub enum BuildToolError {
    #[error("failed to launch {tool}: {source}")]
    Launch {
        tool: String,
        #[source]
        source: io::Error,
    },

    #[error("{tool} timed out after {seconds}s")]
    Timeout { tool: String, seconds: u64 },

    #[error("{tool} exited with {status:?}:\n{output}")]
    Failed {
        tool: String,
        status: Option<i32>,
        output: String,
    },

    #[error("required tool not found on PATH: {0}")]
    NotFound(String),

    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Record of what the configure step ran, persisted into build metadata.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigureRecord {
    /// Environment variables added on top of the inherited environment,
    /// rendered as `NAME=value`.
    pub env_added: Vec<String>,

    /// The configure command, excluding environment variables.
    pub cfg_cmd: Vec<String>,

    /// The full environment the configure and compile steps run with.
    pub env_full: BTreeMap<String, String>,
}

/// Everything a strategy needs to know about one build.
#[derive(Debug)]
pub struct BuildContext<'a> {
    pub opts: &'a BuildOptions,
    pub host: &'a HostFacts,
    /// Source tree being built.
    pub repo_dir: &'a Path,
    /// Build directory inside the cache entry.
    pub objdir: &'a Path,
    /// Worker count passed to the build tool.
    pub jobs: usize,
}

/// Capability interface between the acquisition state machine and a concrete
/// engine toolchain.
pub trait BuildStrategy {
    /// Prepare and run the configure step in `ctx.objdir`.
    fn configure(&self, ctx: &BuildContext) -> Result<ConfigureRecord, BuildToolError>;

    /// Run the compile step. Implementations must capture combined output and
    /// must not treat a non-zero exit as failure.
    fn compile(
        &self,
        ctx: &BuildContext,
        record: &ConfigureRecord,
    ) -> Result<CapturedOutput, BuildToolError>;

    /// Where the compiled binary lands when the compile step succeeds.
    fn compiled_binary_path(&self, ctx: &BuildContext) -> PathBuf;

    /// Runtime shared libraries to copy into the cache entry alongside the
    /// binary. Missing entries are skipped.
    fn runtime_libs(&self, ctx: &BuildContext) -> Vec<PathBuf>;

    /// The compiled product's self-reported version string, if available.
    fn product_version(&self, ctx: &BuildContext) -> Option<String>;
}

/// Whether captured compile output shows a known out-of-memory condition.
///
/// Only meaningful on hosts whose compilers emit these messages.
pub fn is_compiler_oom(host: &HostFacts, output: &str) -> bool {
    matches!(host.os, Os::Linux | Os::Darwin)
        && COMPILER_OOM_MARKERS.iter().any(|m| output.contains(m))
}

/// Names of the runtime shared libraries that must travel with the shell
/// binary on each OS. Windows additionally needs the ICU libraries, whose
/// filenames vary by ICU version and debug decoration.
pub fn runtime_lib_names(os: Os) -> Vec<String> {
    match os {
        Os::Linux => vec!["libmozglue.so".into()],
        Os::Darwin => vec!["libmozglue.dylib".into()],
        Os::Windows => {
            let mut libs: Vec<String> = ["mozglue.dll", "nspr4.dll", "plds4.dll", "plc4.dll", "testplug.dll"]
                .iter()
                .map(|s| s.to_string())
                .collect();
            // Known-working ICU major versions shipped by the engine. Debug
            // builds place the "d" decoration either before or after the
            // version, so both spellings are listed.
            const ICU_VERSIONS: &[u32] = &[62, 63, 64, 65, 66, 67];
            const ICU_STEMS: &[&str] = &["icuuc", "icuin", "icuio", "icudt", "icutest", "icutu"];
            for ver in ICU_VERSIONS {
                for stem in ICU_STEMS {
                    libs.push(format!("{stem}{ver}.dll"));
                    libs.push(format!("{stem}d{ver}.dll"));
                    libs.push(format!("{stem}{ver}d.dll"));
                }
            }
            libs
        }
    }
}
