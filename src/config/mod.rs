//! Tool configuration
//!
//! Settings that do not belong on the command line: where source trees and
//! the shell cache live, how many compile jobs to run, and whether Valgrind
//! builds are permitted on this machine. Loaded from a TOML file, with every
//! field optional.

use std::env;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::thread;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::options::ValgrindPolicy;

/// Config filename looked up in the home directory when no explicit path is
/// given.
pub const DEFAULT_CONFIG_NAME: &str = ".shellforge.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("could not parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("could not determine a home directory")]
    NoHome,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ForgeConfig {
    /// Directory holding checked-out source trees. Defaults to `~/trees`.
    pub trees_dir: Option<PathBuf>,

    /// Directory the shell cache lives under. Defaults to the home directory
    /// (the cache itself is a `shell-cache` subdirectory of this).
    pub cache_base: Option<PathBuf>,

    /// Compile job count. Defaults to a value derived from the CPU count.
    pub compilation_jobs: Option<usize>,

    /// Whether `--enable-valgrind` / `--run-with-valgrind` builds are
    /// permitted on this machine.
    pub allow_valgrind: bool,

    /// Tree built when no repository is named on the command line.
    pub default_repo: String,
}

impl Default for ForgeConfig {
    fn default() -> Self {
        Self {
            trees_dir: None,
            cache_base: None,
            compilation_jobs: None,
            allow_valgrind: false,
            default_repo: "mozilla-central".to_string(),
        }
    }
}

impl ForgeConfig {
    /// Load from an explicit path. Missing or malformed files are errors.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Load from `path` if given, else from the home-directory config if one
    /// exists, else defaults.
    pub fn load_or_default(path: Option<&Path>, home: &Path) -> Result<Self, ConfigError> {
        match path {
            Some(p) => Self::load(p),
            None => {
                let candidate = home.join(DEFAULT_CONFIG_NAME);
                if candidate.is_file() {
                    Self::load(&candidate)
                } else {
                    Ok(Self::default())
                }
            }
        }
    }

    pub fn valgrind_policy(&self) -> ValgrindPolicy {
        if self.allow_valgrind {
            ValgrindPolicy::Allow
        } else {
            ValgrindPolicy::Disallow
        }
    }

    pub fn effective_jobs(&self) -> usize {
        self.compilation_jobs.unwrap_or_else(default_compilation_jobs)
    }

    pub fn cache_base(&self, home: &Path) -> PathBuf {
        self.cache_base.clone().unwrap_or_else(|| home.to_path_buf())
    }

    pub fn trees_dir(&self, home: &Path) -> PathBuf {
        self.trees_dir.clone().unwrap_or_else(|| home.join("trees"))
    }

    /// Resolve the repository directory to build from. An absolute request is
    /// taken as-is; a bare name is looked up under the trees directory; no
    /// request means the configured default repository.
    pub fn resolve_repo_dir(&self, requested: Option<&Path>, home: &Path) -> PathBuf {
        match requested {
            Some(p) if p.is_absolute() => p.to_path_buf(),
            Some(p) => self.trees_dir(home).join(p),
            None => self.trees_dir(home).join(&self.default_repo),
        }
    }
}

/// One job per CPU plus one, with a floor of three for small machines.
pub fn default_compilation_jobs() -> usize {
    match thread::available_parallelism() {
        Ok(n) if n.get() > 2 => n.get() + 1,
        _ => 3,
    }
}

/// Home directory from the environment.
pub fn home_dir() -> Result<PathBuf, ConfigError> {
    env::var_os("HOME")
        .or_else(|| env::var_os("USERPROFILE"))
        .map(PathBuf::from)
        .ok_or(ConfigError::NoHome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let cfg = ForgeConfig::default();
        assert_eq!(cfg.default_repo, "mozilla-central");
        assert_eq!(cfg.valgrind_policy(), ValgrindPolicy::Disallow);
        assert!(cfg.effective_jobs() >= 3);

        let home = Path::new("/home/user");
        assert_eq!(cfg.cache_base(home), home);
        assert_eq!(cfg.trees_dir(home), home.join("trees"));
    }

    #[test]
    fn test_load_partial_file() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("forge.toml");
        fs::write(&path, "allow_valgrind = true\ncompilation_jobs = 8\n").unwrap();

        let cfg = ForgeConfig::load(&path).unwrap();
        assert_eq!(cfg.valgrind_policy(), ValgrindPolicy::Allow);
        assert_eq!(cfg.effective_jobs(), 8);
        assert_eq!(cfg.default_repo, "mozilla-central");
    }

    #[test]
    fn test_load_rejects_unknown_keys() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("forge.toml");
        fs::write(&path, "no_such_key = 1\n").unwrap();
        assert!(matches!(
            ForgeConfig::load(&path),
            Err(ConfigError::Parse { .. })
        ));
    }

    #[test]
    fn test_missing_explicit_path_is_error() {
        let tmp = TempDir::new().unwrap();
        assert!(matches!(
            ForgeConfig::load_or_default(Some(&tmp.path().join("nope.toml")), tmp.path()),
            Err(ConfigError::Read { .. })
        ));
    }

    #[test]
    fn test_load_or_default_without_file() {
        let tmp = TempDir::new().unwrap();
        let cfg = ForgeConfig::load_or_default(None, tmp.path()).unwrap();
        assert_eq!(cfg, ForgeConfig::default());
    }

    #[test]
    fn test_resolve_repo_dir() {
        let cfg = ForgeConfig::default();
        let home = Path::new("/home/user");

        assert_eq!(
            cfg.resolve_repo_dir(None, home),
            Path::new("/home/user/trees/mozilla-central")
        );
        assert_eq!(
            cfg.resolve_repo_dir(Some(Path::new("mozilla-beta")), home),
            Path::new("/home/user/trees/mozilla-beta")
        );
        assert_eq!(
            cfg.resolve_repo_dir(Some(Path::new("/srv/trees/elm")), home),
            Path::new("/srv/trees/elm")
        );
    }
}
