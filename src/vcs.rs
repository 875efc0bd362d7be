//! Versioned-storage collaborator.
//!
//! The engine never writes history itself. It asks a [`VersionStore`] to commit a set of
//! paths, to confirm that hashes quoted in Summary documents exist, and to manage
//! workstream branches. [`GitStore`] shells out to `git`; [`NullStore`] is used when no
//! repository is available and by tests.
use parking_lot::Mutex;
use serde::Serialize;
use std::{
    collections::BTreeSet,
    path::{Path, PathBuf},
    process::{Command, Output},
};

use crate::error::PlanError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum CommitOutcome {
    Committed { hash: String },
    NothingToCommit,
    Skipped { reason: String },
}

impl CommitOutcome {
    /// Terse form for `--raw` output.
    pub fn raw(&self) -> String {
        match self {
            CommitOutcome::Committed { hash } => hash.clone(),
            CommitOutcome::NothingToCommit => "nothing".to_string(),
            CommitOutcome::Skipped { .. } => "skipped".to_string(),
        }
    }
}

pub trait VersionStore: Send + Sync {
    /// Stage `paths` and commit them when the staged set differs from HEAD.
    fn commit(&self, message: &str, paths: &[PathBuf]) -> Result<CommitOutcome, PlanError>;
    fn commit_exists(&self, hash: &str) -> bool;
    fn is_ignored(&self, path: &Path) -> bool;
    fn branch_exists(&self, name: &str) -> bool;
    fn create_branch(&self, name: &str) -> Result<(), PlanError>;
}

pub struct GitStore {
    root: PathBuf,
}

impl GitStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        GitStore { root: root.into() }
    }

    fn git(&self, args: &[&str]) -> Result<Output, PlanError> {
        tracing::debug!("git {}", args.join(" "));
        Command::new("git")
            .current_dir(&self.root)
            .args(args)
            .output()
            .map_err(|e| PlanError::Vcs(format!("failed to run git: {e}")))
    }

    fn git_ok(&self, args: &[&str]) -> Result<Output, PlanError> {
        let output = self.git(args)?;
        if output.status.success() {
            Ok(output)
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let stdout = String::from_utf8_lossy(&output.stdout);
            Err(PlanError::Vcs(format!(
                "git {} failed: {}",
                args.join(" "),
                if stderr.trim().is_empty() {
                    stdout.trim().to_string()
                } else {
                    stderr.trim().to_string()
                }
            )))
        }
    }

    fn relative(&self, path: &Path) -> String {
        path.strip_prefix(&self.root)
            .unwrap_or(path)
            .to_string_lossy()
            .to_string()
    }
}

impl VersionStore for GitStore {
    fn commit(&self, message: &str, paths: &[PathBuf]) -> Result<CommitOutcome, PlanError> {
        let rels: Vec<String> = paths.iter().map(|p| self.relative(p)).collect();
        let mut add_args = vec!["add", "--"];
        add_args.extend(rels.iter().map(String::as_str));
        self.git_ok(&add_args)?;

        // `diff --cached --quiet` exits 0 when nothing is staged.
        let mut diff_args = vec!["diff", "--cached", "--quiet", "--"];
        diff_args.extend(rels.iter().map(String::as_str));
        if self.git(&diff_args)?.status.success() {
            tracing::info!("Nothing to commit for {:?}", rels);
            return Ok(CommitOutcome::NothingToCommit);
        }

        let mut commit_args = vec!["commit", "-m", message, "--"];
        commit_args.extend(rels.iter().map(String::as_str));
        self.git_ok(&commit_args)?;
        let head = self.git_ok(&["rev-parse", "--short", "HEAD"])?;
        let hash = String::from_utf8_lossy(&head.stdout).trim().to_string();
        tracing::info!("Committed {} ({})", hash, message);
        Ok(CommitOutcome::Committed { hash })
    }

    fn commit_exists(&self, hash: &str) -> bool {
        if !hash.chars().all(|c| c.is_ascii_hexdigit()) {
            return false;
        }
        let spec = format!("{hash}^{{commit}}");
        self.git(&["cat-file", "-e", &spec])
            .map(|o| o.status.success())
            .unwrap_or(false)
    }

    fn is_ignored(&self, path: &Path) -> bool {
        let rel = self.relative(path);
        self.git(&["check-ignore", "-q", "--", &rel])
            .map(|o| o.status.success())
            .unwrap_or(false)
    }

    fn branch_exists(&self, name: &str) -> bool {
        let reference = format!("refs/heads/{name}");
        self.git(&["show-ref", "--verify", "--quiet", &reference])
            .map(|o| o.status.success())
            .unwrap_or(false)
    }

    fn create_branch(&self, name: &str) -> Result<(), PlanError> {
        self.git_ok(&["branch", name])?;
        tracing::info!("Created branch {}", name);
        Ok(())
    }
}

/// In-process store with no history: records commits and branches in memory.
#[derive(Debug, Default)]
pub struct NullStore {
    ignored: bool,
    state: Mutex<NullState>,
}

#[derive(Debug, Default)]
struct NullState {
    commits: Vec<String>,
    branches: BTreeSet<String>,
    dirty: bool,
}

impl NullStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store that reports every path as ignored.
    pub fn ignoring_everything() -> Self {
        NullStore {
            ignored: true,
            ..Self::default()
        }
    }

    /// Seed a known commit hash.
    pub fn with_commit(self, hash: &str) -> Self {
        self.state.lock().commits.push(hash.to_string());
        self
    }

    /// Mark the tree as changed so the next commit records something.
    pub fn touch(&self) {
        self.state.lock().dirty = true;
    }

    pub fn branches(&self) -> Vec<String> {
        self.state.lock().branches.iter().cloned().collect()
    }
}

impl VersionStore for NullStore {
    fn commit(&self, message: &str, _paths: &[PathBuf]) -> Result<CommitOutcome, PlanError> {
        let mut state = self.state.lock();
        if !state.dirty {
            return Ok(CommitOutcome::NothingToCommit);
        }
        state.dirty = false;
        let hash = format!("{:07x}", state.commits.len() + 1);
        tracing::debug!("Recorded in-memory commit {} ({})", hash, message);
        state.commits.push(hash.clone());
        Ok(CommitOutcome::Committed { hash })
    }

    fn commit_exists(&self, hash: &str) -> bool {
        self.state
            .lock()
            .commits
            .iter()
            .any(|c| c.starts_with(hash) || hash.starts_with(c.as_str()))
    }

    fn is_ignored(&self, _path: &Path) -> bool {
        self.ignored
    }

    fn branch_exists(&self, name: &str) -> bool {
        self.state.lock().branches.contains(name)
    }

    fn create_branch(&self, name: &str) -> Result<(), PlanError> {
        if !self.state.lock().branches.insert(name.to_string()) {
            return Err(PlanError::Vcs(format!("branch {name} already exists")));
        }
        Ok(())
    }
}
