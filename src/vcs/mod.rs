//! Version control boundary
//!
//! The acquisition pipeline needs two things from a source tree: the revision
//! currently checked out and the ability to update to a requested revision.
//! Both sit behind [`VersionControl`] so the pipeline can be driven in tests
//! without a real repository. [`HgVcs`] is the Mercurial implementation.
//!
//! A checked-out revision that is not on the default branch is a policy
//! question, not a hard error; what happens is decided by a
//! [`DecideOffDefault`] implementation supplied by the caller.

use std::path::Path;
use std::process::Command;
use std::time::Duration;

use thiserror::Error;

use crate::builder::process::run_captured;
use crate::builder::BuildToolError;

const HG_TIMEOUT: Duration = Duration::from_secs(9999);

/// A resolved source-tree revision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RevisionInfo {
    /// Short changeset hash, usable in shell names.
    pub hash: String,
    /// Repository-local numeric id.
    pub local_id: u64,
    /// Whether the revision sits on the default branch.
    pub on_default: bool,
}

/// What to do when the working directory is not on the default branch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RevisionDecision {
    /// Refuse to build.
    Abort,
    /// Update the tree to the default branch tip and build that.
    UpdateToDefault,
    /// Build whatever is checked out.
    UseCurrent,
}

/// Policy hook consulted when the tree is off the default branch.
pub trait DecideOffDefault {
    fn decide(&self, info: &RevisionInfo) -> RevisionDecision;
}

/// Default policy: an off-default tree aborts the acquisition.
#[derive(Debug, Default)]
pub struct AbortOffDefault;

impl DecideOffDefault for AbortOffDefault {
    fn decide(&self, _info: &RevisionInfo) -> RevisionDecision {
        RevisionDecision::Abort
    }
}

#[derive(Debug, Error)]
pub enum VcsError {
    #[error("tree {tree} is not on the default branch (at {revision})")]
    OffDefault { tree: String, revision: String },

    #[error("could not parse revision from vcs output: {0:?}")]
    BadOutput(String),

    #[error(transparent)]
    Tool(#[from] BuildToolError),
}

/// Capability interface over the source tree's version control system.
pub trait VersionControl {
    /// Resolve the revision currently checked out in `tree`, applying
    /// `decision` if the tree is off the default branch.
    fn current_revision(
        &self,
        tree: &Path,
        decision: &dyn DecideOffDefault,
    ) -> Result<RevisionInfo, VcsError>;

    /// Update `tree` to `revision`, discarding local changes.
    fn checkout(&self, tree: &Path, revision: &str) -> Result<(), VcsError>;
}

/// Mercurial implementation, shelling out to `hg`.
#[derive(Debug, Default)]
pub struct HgVcs;

impl HgVcs {
    pub fn new() -> Self {
        Self
    }

    fn log_template(&self, tree: &Path, revset: &str) -> Result<String, VcsError> {
        let mut cmd = Command::new("hg");
        cmd.arg("-R")
            .arg(tree)
            .arg("log")
            .arg("-r")
            .arg(revset)
            .arg("--template")
            .arg("{node|short} {rev}");
        let out = run_captured(cmd, "hg log", HG_TIMEOUT)?;
        if !out.success() {
            return Err(VcsError::Tool(BuildToolError::Failed {
                tool: "hg log".into(),
                status: out.status,
                output: out.text,
            }));
        }
        Ok(out.text)
    }

    fn query(&self, tree: &Path) -> Result<RevisionInfo, VcsError> {
        // Empty output for this revset means the parent is off default.
        let on_default_text = self.log_template(tree, "parents() and default")?;
        if let Some((hash, local_id)) = parse_log_line(&on_default_text) {
            return Ok(RevisionInfo {
                hash,
                local_id,
                on_default: true,
            });
        }

        let text = self.log_template(tree, "parents()")?;
        let (hash, local_id) =
            parse_log_line(&text).ok_or_else(|| VcsError::BadOutput(text.clone()))?;
        Ok(RevisionInfo {
            hash,
            local_id,
            on_default: false,
        })
    }
}

impl VersionControl for HgVcs {
    fn current_revision(
        &self,
        tree: &Path,
        decision: &dyn DecideOffDefault,
    ) -> Result<RevisionInfo, VcsError> {
        let info = self.query(tree)?;
        if info.on_default {
            return Ok(info);
        }
        match decision.decide(&info) {
            RevisionDecision::UseCurrent => Ok(info),
            RevisionDecision::UpdateToDefault => {
                eprintln!(
                    "[vcs] tree {} is off default at {}, updating to default tip",
                    tree.display(),
                    info.hash
                );
                self.checkout(tree, "default")?;
                self.query(tree)
            }
            RevisionDecision::Abort => Err(VcsError::OffDefault {
                tree: tree.display().to_string(),
                revision: info.hash,
            }),
        }
    }

    fn checkout(&self, tree: &Path, revision: &str) -> Result<(), VcsError> {
        let mut cmd = Command::new("hg");
        cmd.arg("-R")
            .arg(tree)
            .arg("update")
            .arg("-C")
            .arg("-r")
            .arg(revision);
        let out = run_captured(cmd, "hg update", HG_TIMEOUT)?;
        if !out.success() {
            return Err(VcsError::Tool(BuildToolError::Failed {
                tool: "hg update".into(),
                status: out.status,
                output: out.text,
            }));
        }
        Ok(())
    }
}

/// Parse one `{node|short} {rev}` template line into (hash, local id).
fn parse_log_line(text: &str) -> Option<(String, u64)> {
    let mut parts = text.split_whitespace();
    let hash = parts.next()?.to_string();
    let local_id = parts.next()?.parse().ok()?;
    Some((hash, local_id))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_log_line() {
        assert_eq!(
            parse_log_line("9f2a45b06e6f 412345"),
            Some(("9f2a45b06e6f".to_string(), 412345))
        );
        assert_eq!(
            parse_log_line("9f2a45b06e6f 412345\n"),
            Some(("9f2a45b06e6f".to_string(), 412345))
        );
        assert_eq!(parse_log_line(""), None);
        assert_eq!(parse_log_line("justonehash"), None);
        assert_eq!(parse_log_line("hash notanumber"), None);
    }

    #[test]
    fn test_abort_policy() {
        let info = RevisionInfo {
            hash: "abc123".into(),
            local_id: 1,
            on_default: false,
        };
        assert_eq!(AbortOffDefault.decide(&info), RevisionDecision::Abort);
    }
}
