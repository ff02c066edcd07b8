//! Randomized generation of valid build configurations
//!
//! Each weighted flag is included with probability equal to its weight; the
//! whole candidate set is discarded and regenerated if the validity predicate
//! rejects it. Rejection sampling terminates almost surely because the empty
//! configuration is always valid, but the loop is still capped so a
//! pathological schema fails loudly instead of spinning.

use rand::Rng;

use crate::host::HostFacts;
use crate::options::{check_validity, parse_flags, BuildOptions, OptionsError, ValgrindPolicy};

/// Upper bound on regeneration attempts.
const MAX_ATTEMPTS: usize = 10_000;

/// Chance that a Valgrind build is also run under Valgrind.
const RUN_WITH_VALGRIND_WEIGHT: f64 = 0.95;

/// Flags eligible for random selection and their weights.
///
/// Flags with weight 0 stay listed so the schema is complete in one place;
/// they are never picked.
const WEIGHTED_FLAGS: &[(&str, f64)] = &[
    ("--32", 0.5),
    ("--enable-debug", 0.5),
    ("--disable-debug", 0.0),
    ("--enable-optimize", 0.0),
    ("--disable-optimize", 0.1),
    ("--disable-profiling", 0.5),
    ("--enable-address-sanitizer", 0.3),
    ("--enable-valgrind", 0.2),
    ("--enable-more-deterministic", 0.75),
    ("--enable-oom-breakpoint", 0.0),
    ("--without-intl-api", 0.0),
    ("--enable-simulator=arm", 0.3),
    ("--enable-simulator=arm64", 0.3),
];

/// Generate a random valid configuration for the given host.
pub fn generate_random<R: Rng>(
    host: &HostFacts,
    policy: ValgrindPolicy,
    rng: &mut R,
) -> Result<BuildOptions, OptionsError> {
    for _ in 0..MAX_ATTEMPTS {
        let mut flags: Vec<&str> = WEIGHTED_FLAGS
            .iter()
            .filter(|(_, weight)| rng.gen_bool(*weight))
            .map(|(flag, _)| *flag)
            .collect();
        if flags.contains(&"--enable-valgrind") && rng.gen_bool(RUN_WITH_VALGRIND_WEIGHT) {
            flags.push("--run-with-valgrind");
        }

        let raw = flags.join(" ");
        let mut opts = parse_flags(&raw)?;
        if check_validity(&opts, host, policy).is_ok() {
            // Mark the provenance; parse_shell_opts routed here because of
            // --random, and downstream consumers of `raw` need the concrete
            // flags, not the --random token.
            opts.enable_random = true;
            return Ok(opts);
        }
    }
    Err(OptionsError::GenerationExhausted(MAX_ATTEMPTS))
}
