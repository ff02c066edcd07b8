//! Test doubles for the acquisition pipeline
//!
//! A scripted build strategy and a canned inspector, so lifecycle tests can
//! drive `obtain_shell` end to end without a compiler, a Mercurial tree or a
//! real shell binary.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};

use shellforge::builder::{
    BuildContext, BuildStrategy, BuildToolError, CapturedOutput, ConfigureRecord,
};
use shellforge::host::{HostFacts, Os};
use shellforge::options::BuildOptions;
use shellforge::signal::CancelToken;
use shellforge::verify::Inspector;

pub const FAKE_BINARY: &[u8] = b"#!fake-js-shell";

/// Build strategy with scripted outcomes and call counting.
#[derive(Default)]
pub struct MockBuilder {
    pub configure_calls: AtomicUsize,
    pub compile_calls: AtomicUsize,
    /// Whether compiling produces the binary on disk.
    pub produce_binary: bool,
    /// Exit status the compile step reports.
    pub exit_status: i32,
    /// Captured output the compile step reports.
    pub output: String,
    pub version: Option<String>,
    /// First compile reports an out-of-memory failure, later ones succeed.
    pub oom_once: bool,
    /// Token cancelled during the compile step, simulating Ctrl-C mid-build.
    pub cancel_on_compile: Option<CancelToken>,
}

impl MockBuilder {
    pub fn succeeding() -> Self {
        Self {
            produce_binary: true,
            version: Some("89.0a1".to_string()),
            ..Default::default()
        }
    }

    pub fn broken(output: &str) -> Self {
        Self {
            exit_status: 2,
            output: output.to_string(),
            ..Default::default()
        }
    }

    fn write_binary(&self, ctx: &BuildContext) {
        let path = self.compiled_binary_path(ctx);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, FAKE_BINARY).unwrap();
    }
}

impl BuildStrategy for MockBuilder {
    fn configure(&self, _ctx: &BuildContext) -> Result<ConfigureRecord, BuildToolError> {
        self.configure_calls.fetch_add(1, Ordering::SeqCst);
        Ok(ConfigureRecord {
            env_added: vec!["AR=ar".to_string()],
            cfg_cmd: vec!["sh".to_string(), "configure".to_string()],
            env_full: BTreeMap::new(),
        })
    }

    fn compile(
        &self,
        ctx: &BuildContext,
        _record: &ConfigureRecord,
    ) -> Result<CapturedOutput, BuildToolError> {
        let call = self.compile_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(token) = &self.cancel_on_compile {
            token.cancel();
        }
        if self.oom_once && call == 0 {
            return Ok(CapturedOutput {
                text: "internal compiler error: Killed (program cc1plus)".to_string(),
                status: Some(2),
            });
        }
        if self.produce_binary {
            self.write_binary(ctx);
        }
        Ok(CapturedOutput {
            text: self.output.clone(),
            status: Some(self.exit_status),
        })
    }

    fn compiled_binary_path(&self, ctx: &BuildContext) -> PathBuf {
        ctx.objdir
            .join("dist")
            .join("bin")
            .join(format!("js{}", ctx.host.os.exe_suffix()))
    }

    fn runtime_libs(&self, _ctx: &BuildContext) -> Vec<PathBuf> {
        Vec::new()
    }

    fn product_version(&self, _ctx: &BuildContext) -> Option<String> {
        self.version.clone()
    }
}

/// Inspector answering `getBuildConfiguration` queries from a fixed table.
pub struct MockInspector {
    pub file_type: String,
    pub answers: Vec<(String, bool)>,
}

impl MockInspector {
    /// An inspector whose answers agree with the given options, as a
    /// correctly compiled shell would.
    pub fn matching(opts: &BuildOptions) -> Self {
        let file_type = if opts.enable_32 {
            "js: ELF 32-bit LSB executable, Intel 80386".to_string()
        } else {
            "js: ELF 64-bit LSB executable, x86-64".to_string()
        };
        Self {
            file_type,
            answers: vec![
                ("debug".to_string(), opts.enable_debug),
                (
                    "more-deterministic".to_string(),
                    opts.enable_more_deterministic,
                ),
                ("asan".to_string(), opts.enable_address_sanitizer),
                ("profiling".to_string(), !opts.disable_profiling),
                ("arm-simulator".to_string(), opts.enable_simulator_arm32),
                ("arm64-simulator".to_string(), opts.enable_simulator_arm64),
            ],
        }
    }

    /// Flip one answer, simulating a binary that came out wrong.
    pub fn with_answer(mut self, param: &str, value: bool) -> Self {
        self.answers.retain(|(p, _)| p != param);
        self.answers.push((param.to_string(), value));
        self
    }
}

impl Inspector for MockInspector {
    fn file_type(&self, _binary: &Path) -> Result<String, BuildToolError> {
        Ok(self.file_type.clone())
    }

    fn run_with_args(
        &self,
        _binary: &Path,
        args: &[String],
        _env: &BTreeMap<String, String>,
    ) -> Result<(String, Option<i32>), BuildToolError> {
        let expr = &args[1];
        let answer = self
            .answers
            .iter()
            .find(|(param, _)| expr.contains(&format!("[\"{param}\"]")))
            .map(|(_, v)| *v)
            .unwrap_or(false);
        Ok((format!("{answer}\n"), Some(0)))
    }
}

pub fn linux_host() -> HostFacts {
    HostFacts::new(Os::Linux, "x86_64", "6.8.0-45-generic")
}
