//! Collaborators the store consults but does not own.
//!
//! - `DirectiveProvider` supplies the content of the read-only core catalog.
//! - `VcsCollaborator` answers version-control questions for project sync.
//!
//! `StaticDirectives` and `GitCli` are the stock implementations.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::process::Command;

/// One directive as delivered by a provider.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectiveEntry {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub guidance: Option<String>,
    #[serde(default)]
    pub categories: Vec<String>,
}

/// Source of directive content for the core catalog.
pub trait DirectiveProvider {
    /// Every directive the provider knows about.
    fn directives(&self) -> Result<Vec<DirectiveEntry>>;

    /// Guidance text for one directive.
    fn guidance(&self, name: &str) -> Result<Option<String>> {
        Ok(self
            .directives()?
            .into_iter()
            .find(|d| d.name == name)
            .and_then(|d| d.guidance))
    }
}

/// In-memory directive content, e.g. parsed from a bundled JSON file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StaticDirectives {
    pub entries: Vec<DirectiveEntry>,
}

impl StaticDirectives {
    pub fn new(entries: Vec<DirectiveEntry>) -> Self {
        Self { entries }
    }

    /// Parse a JSON array of directive entries.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(Self {
            entries: serde_json::from_str(json)?,
        })
    }
}

impl DirectiveProvider for StaticDirectives {
    fn directives(&self) -> Result<Vec<DirectiveEntry>> {
        Ok(self.entries.clone())
    }
}

/// Version-control questions asked during project sync.
pub trait VcsCollaborator {
    fn current_commit_hash(&self) -> Result<String>;

    fn current_branch(&self) -> Result<String>;

    /// Paths (relative to the repository root) changed since a commit.
    fn diff_since(&self, commit: &str) -> Result<Vec<String>>;
}

/// `VcsCollaborator` backed by the `git` command line.
pub struct GitCli {
    repo_path: PathBuf,
}

impl GitCli {
    pub fn new(repo_path: &Path) -> Self {
        Self {
            repo_path: repo_path.to_path_buf(),
        }
    }

    fn git(&self, args: &[&str]) -> Result<String> {
        let output = Command::new("git")
            .args(args)
            .current_dir(&self.repo_path)
            .output()?;
        if !output.status.success() {
            return Err(Error::PreconditionFailed(format!(
                "git {} failed: {}",
                args.join(" "),
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}

impl VcsCollaborator for GitCli {
    fn current_commit_hash(&self) -> Result<String> {
        self.git(&["rev-parse", "HEAD"])
    }

    fn current_branch(&self) -> Result<String> {
        self.git(&["rev-parse", "--abbrev-ref", "HEAD"])
    }

    fn diff_since(&self, commit: &str) -> Result<Vec<String>> {
        let out = self.git(&["diff", "--name-only", commit])?;
        Ok(out
            .lines()
            .filter(|l| !l.is_empty())
            .map(str::to_string)
            .collect())
    }
}

#[cfg(test)]
pub(crate) mod fakes {
    use super::*;

    /// Scripted VCS answers for tests.
    #[derive(Default)]
    pub struct FakeVcs {
        pub hash: String,
        pub branch: String,
        pub changed: Vec<String>,
    }

    impl VcsCollaborator for FakeVcs {
        fn current_commit_hash(&self) -> Result<String> {
            Ok(self.hash.clone())
        }

        fn current_branch(&self) -> Result<String> {
            Ok(self.branch.clone())
        }

        fn diff_since(&self, _commit: &str) -> Result<Vec<String>> {
            Ok(self.changed.clone())
        }
    }
}
