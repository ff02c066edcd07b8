//! Build option model
//!
//! Defines the recognized build flags, parses a flag string into a validated
//! [`BuildOptions`], and checks which flag combinations are contradictory or
//! invalid on a given host. Randomized generation of valid configurations
//! lives in [`random`].
//!
//! The flag grammar is a single string of space-separated long-option tokens,
//! each either a bare switch (`--enable-debug`) or a switch with an
//! `=`-joined value (`--enable-simulator=arm64`). Unrecognized tokens are a
//! hard parse error. A recognized-but-known-bad combination only produces a
//! warning in explicit mode: test infrastructure intentionally explores
//! combinations that are not well tested.

pub mod random;

use std::path::PathBuf;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::host::{HostFacts, Os};

/// Errors from flag-string parsing and randomized generation.
#[derive(Debug, thiserror::Error)]
pub enum OptionsError {
    /// A token that is not part of the recognized flag schema.
    #[error("unrecognized build flag: {0}")]
    UnrecognizedFlag(String),

    /// A flag that takes a value was given without one.
    #[error("missing value for {0}")]
    MissingValue(&'static str),

    /// `--enable-simulator=` with an architecture we do not know.
    #[error("unsupported simulator architecture: {0}")]
    UnknownSimulator(String),

    /// Rejection sampling never produced a valid configuration.
    #[error("gave up generating a valid random configuration after {0} attempts")]
    GenerationExhausted(usize),
}

/// Whether Valgrind builds are allowed by the validity predicate.
///
/// The upstream logic for Valgrind builds is permanently disabled behind an
/// unconditional rejection; the real checks survive behind [`ValgrindPolicy::Allow`]
/// so deployments that have working Valgrind setups can opt in.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValgrindPolicy {
    /// Reject every Valgrind configuration (upstream behavior).
    #[default]
    Disallow,
    /// Run the real per-platform Valgrind checks instead.
    Allow,
}

/// A parsed, immutable set of build flags.
///
/// Constructed once by [`parse_flags`] or [`random::generate_random`] and
/// never mutated afterwards. `raw` preserves the exact flag string the
/// options were specified with; it is written into the build metadata so a
/// cached shell can be reproduced.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildOptions {
    /// The flag string these options were parsed from.
    pub raw: String,

    /// Source repository, when given with `-R`/`--repodir`.
    pub repo_dir: Option<PathBuf>,

    /// `--random`: generate a sensible random configuration instead.
    pub enable_random: bool,

    /// `--32`: build a 32-bit shell (64-bit otherwise).
    pub enable_32: bool,
    /// `--enable-debug`
    pub enable_debug: bool,
    /// `--disable-debug`
    pub disable_debug: bool,
    /// `--enable-optimize`
    pub enable_optimize: bool,
    /// `--disable-optimize`
    pub disable_optimize: bool,
    /// `--disable-profiling`
    pub disable_profiling: bool,

    /// `--enable-address-sanitizer`
    pub enable_address_sanitizer: bool,
    /// `--enable-valgrind`
    pub enable_valgrind: bool,
    /// `--run-with-valgrind`: run the shell under Valgrind afterwards.
    pub run_with_valgrind: bool,

    /// `--enable-more-deterministic`
    pub enable_more_deterministic: bool,
    /// `--enable-oom-breakpoint`: extra debugging help for OOM assertions.
    pub enable_oom_breakpoint: bool,
    /// `--without-intl-api`: speeds up compilation but is non-default.
    pub without_intl_api: bool,
    /// `--enable-simulator=arm`: only applicable to 32-bit shells.
    pub enable_simulator_arm32: bool,
    /// `--enable-simulator=arm64`: only applicable to 64-bit shells.
    pub enable_simulator_arm64: bool,
}

/// Parse a flag string into a [`BuildOptions`].
///
/// Does not run the validity predicate; see [`parse_shell_opts`] for the
/// entry point that does.
pub fn parse_flags(raw: &str) -> Result<BuildOptions, OptionsError> {
    let mut opts = BuildOptions {
        raw: raw.trim().to_string(),
        ..Default::default()
    };

    let mut tokens = raw.split_whitespace().peekable();
    while let Some(token) = tokens.next() {
        match token {
            "--random" => opts.enable_random = true,
            "--32" => opts.enable_32 = true,
            "--enable-debug" => opts.enable_debug = true,
            "--disable-debug" => opts.disable_debug = true,
            "--enable-optimize" => opts.enable_optimize = true,
            "--disable-optimize" => opts.disable_optimize = true,
            "--disable-profiling" => opts.disable_profiling = true,
            "--enable-address-sanitizer" => opts.enable_address_sanitizer = true,
            "--enable-valgrind" => opts.enable_valgrind = true,
            "--run-with-valgrind" => opts.run_with_valgrind = true,
            "--enable-more-deterministic" => opts.enable_more_deterministic = true,
            "--enable-oom-breakpoint" => opts.enable_oom_breakpoint = true,
            "--without-intl-api" => opts.without_intl_api = true,
            "-R" | "--repodir" => {
                let value = tokens.next().ok_or(OptionsError::MissingValue("--repodir"))?;
                opts.repo_dir = Some(PathBuf::from(value));
            }
            _ => {
                if let Some(value) = token.strip_prefix("--repodir=") {
                    opts.repo_dir = Some(PathBuf::from(value));
                } else if let Some(arch) = token.strip_prefix("--enable-simulator=") {
                    match arch {
                        "arm" => opts.enable_simulator_arm32 = true,
                        "arm64" => opts.enable_simulator_arm64 = true,
                        other => return Err(OptionsError::UnknownSimulator(other.to_string())),
                    }
                } else {
                    return Err(OptionsError::UnrecognizedFlag(token.to_string()));
                }
            }
        }
    }

    Ok(opts)
}

/// Parse a flag string, handling `--random` and warning on untested
/// combinations.
///
/// This mirrors the explicit-mode contract: an invalid explicit configuration
/// is used anyway (the user's intent wins over the heuristic rules), with a
/// warning. In randomized mode, invalid candidates are silently discarded and
/// regenerated.
pub fn parse_shell_opts<R: Rng>(
    raw: &str,
    host: &HostFacts,
    policy: ValgrindPolicy,
    rng: &mut R,
) -> Result<BuildOptions, OptionsError> {
    let opts = parse_flags(raw)?;
    if opts.enable_random {
        return random::generate_random(host, policy, rng);
    }
    if let Err(reason) = check_validity(&opts, host, policy) {
        eprintln!("[options] WARNING: this set of build options is not tested well because: {reason}");
    }
    Ok(opts)
}

/// Check whether an option combination is buildable on the given host.
///
/// Pure over `(opts, host, policy)`. Rules are evaluated in a fixed order and
/// short-circuit on the first violation, returning a human-readable reason.
pub fn check_validity(
    opts: &BuildOptions,
    host: &HostFacts,
    policy: ValgrindPolicy,
) -> Result<(), String> {
    if opts.enable_debug && opts.disable_debug {
        return Err("Making a debug, non-debug build would be contradictory.".into());
    }
    if opts.enable_optimize && opts.disable_optimize {
        return Err("Making an optimized, non-optimized build would be contradictory.".into());
    }
    if !opts.enable_debug && opts.disable_optimize {
        return Err("Making a non-debug, non-optimized build would be kind of silly.".into());
    }

    if host.os == Os::Darwin && opts.enable_32 {
        return Err("We are no longer going to ship 32-bit Mac binaries.".into());
    }
    if host.machine == "aarch64" && opts.enable_32 {
        return Err("ARM64 systems cannot seem to compile 32-bit binaries properly.".into());
    }
    if host.is_wsl() && opts.enable_32 {
        return Err("WSL does not seem to support 32-bit Linux binaries yet.".into());
    }

    if opts.enable_valgrind {
        match policy {
            ValgrindPolicy::Disallow => {
                return Err(
                    "Valgrind builds are disabled: we need to set LD_LIBRARY_PATH first, \
                     else Valgrind segfaults."
                        .into(),
                );
            }
            ValgrindPolicy::Allow => {
                if !opts.enable_optimize {
                    return Err("Valgrind needs opt builds.".into());
                }
                if opts.enable_address_sanitizer {
                    return Err(
                        "One should not compile with both Valgrind flags and ASan flags.".into(),
                    );
                }
                if host.os == Os::Windows {
                    return Err("Valgrind does not work on Windows.".into());
                }
                if host.os == Os::Darwin {
                    return Err("Valgrind does not work well with Mac OS X.".into());
                }
            }
        }
    }

    if opts.run_with_valgrind && !opts.enable_valgrind {
        return Err("--run-with-valgrind needs --enable-valgrind.".into());
    }

    if opts.enable_address_sanitizer {
        if opts.enable_32 {
            return Err(
                "32-bit ASan builds fail due to https://github.com/google/sanitizers/issues/954."
                    .into(),
            );
        }
        if host.is_wsl() {
            return Err(
                "Linux ASan builds cannot yet work in WSL though there may be workarounds.".into(),
            );
        }
        if host.os == Os::Windows && opts.enable_32 {
            return Err("ASan is explicitly not supported in 32-bit Windows builds.".into());
        }
    }

    if opts.enable_simulator_arm32 || opts.enable_simulator_arm64 {
        if host.os == Os::Windows && opts.enable_simulator_arm32 {
            return Err("Nobody runs the ARM32 simulators on Windows.".into());
        }
        if host.os == Os::Windows && opts.enable_simulator_arm64 {
            return Err("Nobody runs the ARM64 simulators on Windows.".into());
        }
        if host.os == Os::Linux && host.machine == "aarch64" && opts.enable_simulator_arm32 {
            return Err("Nobody runs the ARM32 simulators on ARM64 Linux.".into());
        }
        if host.os == Os::Linux && host.machine == "aarch64" && opts.enable_simulator_arm64 {
            return Err("Nobody runs the ARM64 simulators on ARM64 Linux.".into());
        }
        if opts.enable_simulator_arm32 && !opts.enable_32 {
            return Err("The 32-bit ARM simulator builds are only for 32-bit binaries.".into());
        }
        if opts.enable_simulator_arm64 && opts.enable_32 {
            return Err("The 64-bit ARM simulator builds are only for 64-bit binaries.".into());
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn linux_x64() -> HostFacts {
        HostFacts::new(Os::Linux, "x86_64", "6.8.0-45-generic")
    }

    #[test]
    fn test_parse_empty_string_gives_defaults() {
        let opts = parse_flags("").unwrap();
        assert_eq!(opts, BuildOptions::default());
    }

    #[test]
    fn test_parse_basic_flags() {
        let opts = parse_flags("--enable-debug --disable-optimize").unwrap();
        assert!(opts.enable_debug);
        assert!(opts.disable_optimize);
        assert!(!opts.enable_32);
        assert_eq!(opts.raw, "--enable-debug --disable-optimize");
    }

    #[test]
    fn test_parse_simulator_values() {
        let opts = parse_flags("--32 --enable-simulator=arm").unwrap();
        assert!(opts.enable_simulator_arm32);
        assert!(!opts.enable_simulator_arm64);

        let opts = parse_flags("--enable-simulator=arm64").unwrap();
        assert!(opts.enable_simulator_arm64);

        let err = parse_flags("--enable-simulator=mips").unwrap_err();
        assert!(matches!(err, OptionsError::UnknownSimulator(_)));
    }

    #[test]
    fn test_parse_repodir_forms() {
        let opts = parse_flags("-R /home/user/trees/mozilla-central").unwrap();
        assert_eq!(
            opts.repo_dir.as_deref(),
            Some(std::path::Path::new("/home/user/trees/mozilla-central"))
        );

        let opts = parse_flags("--repodir=/tmp/tree --enable-debug").unwrap();
        assert_eq!(opts.repo_dir.as_deref(), Some(std::path::Path::new("/tmp/tree")));
        assert!(opts.enable_debug);

        let err = parse_flags("--repodir").unwrap_err();
        assert!(matches!(err, OptionsError::MissingValue(_)));
    }

    #[test]
    fn test_parse_unrecognized_flag_is_hard_error() {
        let err = parse_flags("--enable-debug --bogus").unwrap_err();
        match err {
            OptionsError::UnrecognizedFlag(flag) => assert_eq!(flag, "--bogus"),
            other => panic!("expected UnrecognizedFlag, got {other:?}"),
        }
    }

    #[test]
    fn test_contradictory_debug_flags() {
        let opts = parse_flags("--enable-debug --disable-debug").unwrap();
        let reason = check_validity(&opts, &linux_x64(), ValgrindPolicy::Disallow).unwrap_err();
        assert!(reason.contains("contradictory"));
    }

    #[test]
    fn test_contradictory_optimize_flags() {
        let opts = parse_flags("--enable-debug --enable-optimize --disable-optimize").unwrap();
        let reason = check_validity(&opts, &linux_x64(), ValgrindPolicy::Disallow).unwrap_err();
        assert!(reason.contains("contradictory"));
    }

    #[test]
    fn test_non_debug_non_optimized_is_invalid() {
        let opts = parse_flags("--disable-optimize").unwrap();
        let reason = check_validity(&opts, &linux_x64(), ValgrindPolicy::Disallow).unwrap_err();
        assert!(reason.contains("silly"));
    }

    #[test]
    fn test_32_bit_rejected_on_darwin() {
        // End-to-end scenario B.
        let opts = parse_flags("--32").unwrap();
        let host = HostFacts::new(Os::Darwin, "x86_64", "");
        let reason = check_validity(&opts, &host, ValgrindPolicy::Disallow).unwrap_err();
        assert!(reason.contains("32-bit Mac"));
    }

    #[test]
    fn test_32_bit_rejected_on_aarch64_and_wsl() {
        let opts = parse_flags("--32").unwrap();

        let arm = HostFacts::new(Os::Linux, "aarch64", "");
        assert!(check_validity(&opts, &arm, ValgrindPolicy::Disallow).is_err());

        let wsl = HostFacts::new(Os::Linux, "x86_64", "4.4.0-19041-Microsoft");
        assert!(check_validity(&opts, &wsl, ValgrindPolicy::Disallow).is_err());

        assert!(check_validity(&opts, &linux_x64(), ValgrindPolicy::Disallow).is_ok());
    }

    #[test]
    fn test_valgrind_disallowed_by_default() {
        let opts = parse_flags("--enable-valgrind").unwrap();
        let reason = check_validity(&opts, &linux_x64(), ValgrindPolicy::Disallow).unwrap_err();
        assert!(reason.contains("Valgrind"));
    }

    #[test]
    fn test_valgrind_allow_policy_runs_real_checks() {
        let host = linux_x64();

        let opts = parse_flags("--enable-valgrind").unwrap();
        let reason = check_validity(&opts, &host, ValgrindPolicy::Allow).unwrap_err();
        assert!(reason.contains("opt builds"));

        let opts =
            parse_flags("--enable-valgrind --enable-optimize --enable-address-sanitizer").unwrap();
        let reason = check_validity(&opts, &host, ValgrindPolicy::Allow).unwrap_err();
        assert!(reason.contains("ASan"));

        let opts = parse_flags("--enable-valgrind --enable-optimize").unwrap();
        assert!(check_validity(&opts, &host, ValgrindPolicy::Allow).is_ok());

        let win = HostFacts::new(Os::Windows, "x86_64", "");
        assert!(check_validity(&opts, &win, ValgrindPolicy::Allow).is_err());
    }

    #[test]
    fn test_run_with_valgrind_requires_enable_valgrind() {
        let opts = parse_flags("--run-with-valgrind").unwrap();
        let reason = check_validity(&opts, &linux_x64(), ValgrindPolicy::Disallow).unwrap_err();
        assert!(reason.contains("--enable-valgrind"));
    }

    #[test]
    fn test_asan_exclusions() {
        let opts = parse_flags("--32 --enable-address-sanitizer").unwrap();
        let reason = check_validity(&opts, &linux_x64(), ValgrindPolicy::Disallow).unwrap_err();
        assert!(reason.contains("32-bit ASan"));

        let opts = parse_flags("--enable-address-sanitizer").unwrap();
        let wsl = HostFacts::new(Os::Linux, "x86_64", "4.4.0-19041-Microsoft");
        assert!(check_validity(&opts, &wsl, ValgrindPolicy::Disallow).is_err());
        assert!(check_validity(&opts, &linux_x64(), ValgrindPolicy::Disallow).is_ok());
    }

    #[test]
    fn test_simulator_word_width_pairing() {
        let host = linux_x64();

        let opts = parse_flags("--enable-simulator=arm").unwrap();
        let reason = check_validity(&opts, &host, ValgrindPolicy::Disallow).unwrap_err();
        assert!(reason.contains("only for 32-bit"));

        let opts = parse_flags("--32 --enable-simulator=arm64").unwrap();
        let reason = check_validity(&opts, &host, ValgrindPolicy::Disallow).unwrap_err();
        assert!(reason.contains("only for 64-bit"));

        let opts = parse_flags("--32 --enable-simulator=arm").unwrap();
        assert!(check_validity(&opts, &host, ValgrindPolicy::Disallow).is_ok());
    }

    #[test]
    fn test_simulators_rejected_on_windows_and_arm64_linux() {
        let opts = parse_flags("--enable-simulator=arm64").unwrap();

        let win = HostFacts::new(Os::Windows, "x86_64", "");
        assert!(check_validity(&opts, &win, ValgrindPolicy::Disallow).is_err());

        let arm_linux = HostFacts::new(Os::Linux, "aarch64", "");
        assert!(check_validity(&opts, &arm_linux, ValgrindPolicy::Disallow).is_err());
    }

    #[test]
    fn test_explicit_invalid_combination_still_parses() {
        // Explicit mode warns but does not reject; the options come back
        // usable.
        let mut rng = rand::thread_rng();
        let opts = parse_shell_opts(
            "--disable-optimize",
            &linux_x64(),
            ValgrindPolicy::Disallow,
            &mut rng,
        )
        .unwrap();
        assert!(opts.disable_optimize);
    }
}
