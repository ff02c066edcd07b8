//! Shell identity derivation
//!
//! Renders a build configuration plus host facts into the canonical shell
//! type string, and appends the source revision to form the shell name that
//! keys the binary cache. The field order is fixed; determinism here is what
//! makes the cache work at all, and no two semantically different
//! configurations may collapse to the same name.

use crate::host::HostFacts;
use crate::options::BuildOptions;

/// Delimiter joining identity fields. No field may contain it or be empty.
const DELIMITER: &str = "-";

#[derive(Debug, thiserror::Error)]
pub enum IdentityError {
    /// A host fact rendered as the empty string; the identity would be
    /// ambiguous.
    #[error("shell identity field must not be empty (host facts: {0})")]
    EmptyField(String),
}

/// Render the shell type: every non-default flag in fixed order, then the
/// host OS and CPU architecture.
pub fn compute_shell_type(opts: &BuildOptions, host: &HostFacts) -> Result<String, IdentityError> {
    let mut parts: Vec<String> = vec!["js".into()];
    if opts.enable_debug {
        parts.push("dbg".into());
    }
    if opts.disable_optimize {
        parts.push("optDisabled".into());
    }
    parts.push(if opts.enable_32 { "32" } else { "64" }.into());
    if opts.disable_profiling {
        parts.push("profDisabled".into());
    }
    if opts.enable_more_deterministic {
        parts.push("dm".into());
    }
    if opts.enable_address_sanitizer {
        parts.push("asan".into());
    }
    if opts.enable_valgrind {
        parts.push("vg".into());
    }
    if opts.enable_oom_breakpoint {
        parts.push("oombp".into());
    }
    if opts.without_intl_api {
        parts.push("intlDisabled".into());
    }
    if opts.enable_simulator_arm32 {
        parts.push("armsim32".into());
    }
    if opts.enable_simulator_arm64 {
        parts.push("armsim64".into());
    }
    parts.push(host.os.name().to_lowercase());
    parts.push(host.machine.to_lowercase());

    if parts.iter().any(String::is_empty) {
        return Err(IdentityError::EmptyField(format!(
            "{} {}",
            host.os, host.machine
        )));
    }
    Ok(parts.join(DELIMITER))
}

/// The shell type together with the build revision: the cache key.
pub fn compute_shell_name(
    opts: &BuildOptions,
    host: &HostFacts,
    revision: &str,
) -> Result<String, IdentityError> {
    if revision.is_empty() {
        return Err(IdentityError::EmptyField("revision".into()));
    }
    Ok(format!(
        "{}{DELIMITER}{revision}",
        compute_shell_type(opts, host)?
    ))
}
