//! SpiderMonkey configure/compile strategy
//!
//! Platform-conditional assembly of the `configure` invocation and the
//! `make`/`mozmake` compile step. Command assembly is split out as a pure
//! function so the per-platform flag wiring is testable without a toolchain.

use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::path::PathBuf;
use std::process::Command;
use std::time::Duration;

use regex_lite::Regex;

use super::process::{run_captured, which};
use super::{BuildContext, BuildStrategy, BuildToolError, CapturedOutput, ConfigureRecord};
use crate::builder::runtime_lib_names;
use crate::host::Os;

/// Compiler flags forcing SSE2 code generation for 32-bit x86 builds.
const SSE2_FLAGS: &str = "-msse2 -mfpmath=sse";

const AUTOCONF_TIMEOUT: Duration = Duration::from_secs(300);
const CONFIGURE_TIMEOUT: Duration = Duration::from_secs(3600);
const COMPILE_TIMEOUT: Duration = Duration::from_secs(86_400);

/// Build strategy for SpiderMonkey shells.
#[derive(Debug, Default)]
pub struct SpiderMonkeyBuilder;

impl SpiderMonkeyBuilder {
    pub fn new() -> Self {
        Self
    }

    fn make_binary(os: Os) -> &'static str {
        if os == Os::Windows {
            "mozmake"
        } else {
            "make"
        }
    }

    /// Run the platform-appropriate autoconf 2.13 in `js/src`.
    fn run_autoconf(&self, ctx: &BuildContext) -> Result<(), BuildToolError> {
        let js_src = ctx.repo_dir.join("js").join("src");
        let candidates: &[&str] = match ctx.host.os {
            Os::Linux => &["autoconf2.13", "autoconf-2.13", "autoconf213"],
            Os::Darwin => &["autoconf213"],
            // Windows needs sh to be able to find autoconf.
            Os::Windows => &["sh"],
        };

        let (program, args): (&str, &[&str]) = match ctx.host.os {
            Os::Windows => ("sh", &["autoconf-2.13"]),
            _ => {
                let found = candidates
                    .iter()
                    .copied()
                    .find(|c| which(c).is_some())
                    .ok_or_else(|| BuildToolError::NotFound("autoconf 2.13".into()))?;
                (found, &[] as &[&str])
            }
        };

        let mut cmd = Command::new(program);
        cmd.args(args).current_dir(&js_src);
        let out = run_captured(cmd, "autoconf", AUTOCONF_TIMEOUT)?;
        if !out.success() {
            return Err(BuildToolError::Failed {
                tool: "autoconf".into(),
                status: out.status,
                output: out.text,
            });
        }
        Ok(())
    }
}

/// Assemble the configure command and the environment additions for it.
///
/// Pure over the build context; nothing here touches the filesystem or the
/// ambient environment.
pub fn assemble_configure(ctx: &BuildContext) -> (BTreeMap<String, String>, Vec<String>) {
    let opts = ctx.opts;
    let mut env_added = BTreeMap::new();
    let mut cfg: Vec<String> = Vec::new();
    let js_cfg_path = ctx
        .repo_dir
        .join("js")
        .join("src")
        .join("configure")
        .display()
        .to_string();

    if ctx.host.os != Os::Windows {
        env_added.insert("AR".into(), "ar".into());
    }

    if opts.enable_32 && ctx.host.os == Os::Linux {
        // 32-bit shell on 32/64-bit x86 Linux
        env_added.insert(
            "PKG_CONFIG_PATH".into(),
            "/usr/lib/x86_64-linux-gnu/pkgconfig".into(),
        );
        env_added.insert("CC".into(), format!("clang {SSE2_FLAGS}"));
        env_added.insert("CXX".into(), format!("clang++ {SSE2_FLAGS}"));
        cfg.push("sh".into());
        cfg.push(js_cfg_path);
        cfg.push("--host=x86_64-pc-linux-gnu".into());
        cfg.push("--target=i686-pc-linux".into());
        if opts.enable_simulator_arm32 {
            cfg.push("--enable-simulator=arm".into());
        }
    } else if ctx.host.os == Os::Darwin && !opts.enable_32 {
        cfg.push("sh".into());
        cfg.push(js_cfg_path);
        cfg.push("--target=x86_64-apple-darwin17.7.0".into());
        if opts.enable_simulator_arm64 {
            cfg.push("--enable-simulator=arm64".into());
        }
    } else if ctx.host.os == Os::Windows {
        // mozmake must be picked up by the build system itself
        env_added.insert("MAKE".into(), "mozmake".into());
        cfg.push("sh".into());
        cfg.push(js_cfg_path);
        cfg.push("--host=x86_64-pc-mingw32".into());
        if opts.enable_32 {
            cfg.push("--target=i686-pc-mingw32".into());
            if opts.enable_simulator_arm32 {
                cfg.push("--enable-simulator=arm".into());
            }
        } else {
            cfg.push("--target=x86_64-pc-mingw32".into());
            if opts.enable_simulator_arm64 {
                cfg.push("--enable-simulator=arm64".into());
            }
        }
    } else {
        cfg.push("sh".into());
        cfg.push(js_cfg_path);
        if opts.enable_simulator_arm64 {
            cfg.push("--enable-simulator=arm64".into());
        }
    }

    if opts.enable_debug {
        cfg.push("--enable-debug".into());
    } else if opts.disable_debug {
        cfg.push("--disable-debug".into());
    }

    if opts.enable_optimize {
        cfg.push(if opts.enable_valgrind {
            "--enable-optimize=-O1".into()
        } else {
            "--enable-optimize".into()
        });
    } else if opts.disable_optimize {
        cfg.push("--disable-optimize".into());
    }
    if opts.disable_profiling {
        cfg.push("--disable-profiling".into());
    }

    if opts.enable_more_deterministic {
        cfg.push("--enable-more-deterministic".into());
    }
    if opts.enable_oom_breakpoint {
        cfg.push("--enable-oom-breakpoint".into());
    }
    if opts.without_intl_api {
        cfg.push("--without-intl-api".into());
    }

    if opts.enable_address_sanitizer {
        cfg.push("--enable-address-sanitizer".into());
        cfg.push("--disable-jemalloc".into());
    }
    if opts.enable_valgrind {
        cfg.push("--enable-valgrind".into());
        cfg.push("--disable-jemalloc".into());
    }

    // Added to every build.
    if ctx.host.os != Os::Windows {
        cfg.push("--with-ccache".into());
    }
    cfg.push("--enable-gczeal".into());
    cfg.push("--enable-debug-symbols".into()); // gets debug symbols on opt shells
    cfg.push("--disable-tests".into());

    if ctx.host.os == Os::Windows {
        // The icu subconfigure likes forward slashes way better.
        cfg = cfg.iter().map(|entry| entry.replace('\\', "/")).collect();
    }

    (env_added, cfg)
}

fn render_env_added(env_added: &BTreeMap<String, String>) -> Vec<String> {
    env_added
        .iter()
        .map(|(name, value)| {
            if value.contains(' ') {
                format!("{name}=\"{value}\"")
            } else {
                format!("{name}={value}")
            }
        })
        .collect()
}

impl BuildStrategy for SpiderMonkeyBuilder {
    fn configure(&self, ctx: &BuildContext) -> Result<ConfigureRecord, BuildToolError> {
        self.run_autoconf(ctx)?;

        let (env_added, cfg_cmd) = assemble_configure(ctx);
        let mut env_full: BTreeMap<String, String> = env::vars().collect();
        env_full.extend(env_added.clone());

        let record = ConfigureRecord {
            env_added: render_env_added(&env_added),
            cfg_cmd: cfg_cmd.clone(),
            env_full,
        };

        let mut cmd = Command::new(&cfg_cmd[0]);
        cmd.args(&cfg_cmd[1..])
            .current_dir(ctx.objdir)
            .env_clear()
            .envs(&record.env_full);
        let out = run_captured(cmd, "configure", CONFIGURE_TIMEOUT)?;
        if !out.success() {
            return Err(BuildToolError::Failed {
                tool: "configure".into(),
                status: out.status,
                output: out.text,
            });
        }

        Ok(record)
    }

    fn compile(
        &self,
        ctx: &BuildContext,
        record: &ConfigureRecord,
    ) -> Result<CapturedOutput, BuildToolError> {
        let make = Self::make_binary(ctx.host.os);
        let mut cmd = Command::new(make);
        cmd.arg("-C")
            .arg(ctx.objdir)
            .arg(format!("-j{}", ctx.jobs))
            .arg("-s")
            .current_dir(ctx.objdir)
            .env_clear()
            .envs(&record.env_full);
        // Exit status is reported to the caller untouched: whether a shell
        // was actually produced is what decides success.
        run_captured(cmd, make, COMPILE_TIMEOUT)
    }

    fn compiled_binary_path(&self, ctx: &BuildContext) -> PathBuf {
        ctx.objdir
            .join("dist")
            .join("bin")
            .join(format!("js{}", ctx.host.os.exe_suffix()))
    }

    fn runtime_libs(&self, ctx: &BuildContext) -> Vec<PathBuf> {
        let bin_dir = ctx.objdir.join("dist").join("bin");
        runtime_lib_names(ctx.host.os)
            .into_iter()
            .map(|name| bin_dir.join(name))
            .collect()
    }

    fn product_version(&self, ctx: &BuildContext) -> Option<String> {
        // Sample line in js.pc: "Version: 47.0a2"
        let jspc = ctx
            .objdir
            .join("js")
            .join("src")
            .join("build")
            .join("js.pc");
        let text = fs::read_to_string(jspc).ok()?;
        let re = Regex::new(r"(?m)^Version:\s*(.+)$").ok()?;
        re.captures(&text)
            .map(|caps| caps[1].trim().to_string())
    }
}
