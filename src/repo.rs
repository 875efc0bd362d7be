//! The explicit repository object every component receives.
//!
//! A [`Repository`] names the project root, owns the filesystem handle and the
//! versioned-storage collaborator, and knows where each planning document lives. Nothing
//! else in the crate builds planning paths by hand.
use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use crate::{
    config::{ConfigProvider, PlanConfig},
    error::PlanError,
    fs::{DiskFs, PlanFs},
    vcs::{CommitOutcome, GitStore, VersionStore},
};

pub const PLANNING_DIR: &str = ".planning";
pub const UNITS_DIR: &str = "units";
pub const MILESTONES_DIR: &str = "milestones";
pub const ROADMAP_FILE: &str = "ROADMAP.md";
pub const STATE_FILE: &str = "STATE.md";
pub const PROJECT_FILE: &str = "PROJECT.md";
pub const REQUIREMENTS_FILE: &str = "REQUIREMENTS.md";
pub const MILESTONES_FILE: &str = "MILESTONES.md";
pub const CONFIG_FILE: &str = "config.toml";

#[derive(Clone)]
pub struct Repository {
    root: PathBuf,
    fs: Arc<dyn PlanFs>,
    store: Arc<dyn VersionStore>,
}

impl std::fmt::Debug for Repository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Repository").field("root", &self.root).finish()
    }
}

impl Repository {
    pub fn new(root: impl Into<PathBuf>, fs: Arc<dyn PlanFs>, store: Arc<dyn VersionStore>) -> Self {
        Repository {
            root: root.into(),
            fs,
            store,
        }
    }

    /// Repository on the local disk, backed by `git` in the project root.
    pub fn open(root: impl AsRef<Path>) -> Result<Self, PlanError> {
        let root = root.as_ref().canonicalize()?;
        Ok(Repository::new(
            root.clone(),
            Arc::new(DiskFs),
            Arc::new(GitStore::new(root)),
        ))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn fs(&self) -> &dyn PlanFs {
        self.fs.as_ref()
    }

    pub fn store(&self) -> &dyn VersionStore {
        self.store.as_ref()
    }

    pub fn planning_dir(&self) -> PathBuf {
        self.root.join(PLANNING_DIR)
    }

    pub fn units_dir(&self) -> PathBuf {
        self.planning_dir().join(UNITS_DIR)
    }

    pub fn milestones_dir(&self) -> PathBuf {
        self.planning_dir().join(MILESTONES_DIR)
    }

    pub fn roadmap_path(&self) -> PathBuf {
        self.planning_dir().join(ROADMAP_FILE)
    }

    pub fn state_path(&self) -> PathBuf {
        self.planning_dir().join(STATE_FILE)
    }

    pub fn project_path(&self) -> PathBuf {
        self.planning_dir().join(PROJECT_FILE)
    }

    pub fn requirements_path(&self) -> PathBuf {
        self.planning_dir().join(REQUIREMENTS_FILE)
    }

    pub fn milestones_log_path(&self) -> PathBuf {
        self.planning_dir().join(MILESTONES_FILE)
    }

    pub fn config_path(&self) -> PathBuf {
        self.planning_dir().join(CONFIG_FILE)
    }

    /// Resolve a user-supplied path against the project root.
    pub fn resolve(&self, path: impl AsRef<Path>) -> PathBuf {
        let path = path.as_ref();
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        }
    }

    /// Path relative to the project root, for reporting.
    pub fn display_path(&self, path: &Path) -> String {
        path.strip_prefix(&self.root)
            .unwrap_or(path)
            .to_string_lossy()
            .to_string()
    }

    /// Fails with [`PlanError::Structure`] when the planning root is absent.
    pub fn require_planning_dir(&self) -> Result<(), PlanError> {
        if self.fs.is_dir(&self.planning_dir()) {
            Ok(())
        } else {
            Err(PlanError::Structure(format!(
                "{} not found; no planning record in {}",
                PLANNING_DIR,
                self.root.display()
            )))
        }
    }

    pub fn config(&self) -> PlanConfig {
        ConfigProvider::new(self).effective_or_default()
    }

    pub fn read_roadmap(&self) -> Result<String, PlanError> {
        self.fs.read_to_string(&self.roadmap_path()).map_err(|e| match e {
            PlanError::NotFound(_) => PlanError::NotFound(format!(
                "{} not found",
                self.display_path(&self.roadmap_path())
            )),
            other => other,
        })
    }

    pub fn write_roadmap(&self, content: &str) -> Result<(), PlanError> {
        self.fs.write(&self.roadmap_path(), content)
    }

    /// Commit planning documents through the versioned-storage collaborator. Honors
    /// `commit_docs`; `paths` defaults to the whole planning root.
    pub fn commit(&self, message: &str, paths: &[PathBuf]) -> Result<CommitOutcome, PlanError> {
        let config = self.config();
        if !config.commit_docs {
            return Ok(CommitOutcome::Skipped {
                reason: "commit_docs is disabled".to_string(),
            });
        }
        if message.trim().is_empty() {
            return Err(PlanError::Command("commit message required".to_string()));
        }
        let targets: Vec<PathBuf> = if paths.is_empty() {
            vec![self.planning_dir()]
        } else {
            paths.iter().map(|p| self.resolve(p)).collect()
        };
        self.store.commit(message, &targets)
    }
}
