//! shellforge - build orchestrator and binary cache for JS engine shells
//!
//! This crate turns a declarative set of build flags into a platform-specific
//! configure-and-compile run, keeps a content-addressed cache of compiled
//! shell binaries keyed by build configuration and source revision, and
//! verifies that the binaries it hands out actually have the properties that
//! were requested.

pub mod acquire;
pub mod builder;
pub mod cache;
pub mod config;
pub mod host;
pub mod identity;
pub mod metadata;
pub mod options;
pub mod signal;
pub mod vcs;
pub mod verify;

pub use acquire::{obtain_shell, AcquireError, Shell};
pub use builder::{BuildContext, BuildStrategy, CapturedOutput, ConfigureRecord};
pub use cache::{CacheEntry, LockDir, LockError};
pub use config::ForgeConfig;
pub use host::{HostFacts, Os};
pub use options::{BuildOptions, OptionsError, ValgrindPolicy};
pub use signal::CancelToken;
pub use verify::{Inspector, VerifyError};
