//! The planning configuration document (`.planning/config.toml`).
use serde::{Deserialize, Serialize};
use std::{fmt, path::PathBuf, str::FromStr};
use toml_edit::{value, DocumentMut, Item, Table};

use crate::{error::PlanError, repo::Repository};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BranchingStrategy {
    #[default]
    None,
    Unit,
    Milestone,
}

impl fmt::Display for BranchingStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BranchingStrategy::None => write!(f, "none"),
            BranchingStrategy::Unit => write!(f, "unit"),
            BranchingStrategy::Milestone => write!(f, "milestone"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkflowToggles {
    pub research: bool,
    pub job_checker: bool,
    pub verifier: bool,
}

impl Default for WorkflowToggles {
    fn default() -> Self {
        WorkflowToggles {
            research: true,
            job_checker: true,
            verifier: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlanConfig {
    /// Opaque tier selector passed through to the orchestrator.
    pub model_profile: String,
    pub commit_docs: bool,
    pub search_gitignored: bool,
    pub branching_strategy: BranchingStrategy,
    pub unit_branch_template: String,
    pub milestone_branch_template: String,
    pub workflow: WorkflowToggles,
    pub parallelization: bool,
}

impl Default for PlanConfig {
    fn default() -> Self {
        PlanConfig {
            model_profile: "balanced".to_string(),
            commit_docs: true,
            search_gitignored: false,
            branching_strategy: BranchingStrategy::None,
            unit_branch_template: "plan/unit-{unit}-{slug}".to_string(),
            milestone_branch_template: "plan/{milestone}-{slug}".to_string(),
            workflow: WorkflowToggles::default(),
            parallelization: true,
        }
    }
}

impl PlanConfig {
    pub fn unit_branch(&self, unit: &str, slug: &str) -> String {
        render_template(&self.unit_branch_template, unit, slug, "")
    }

    pub fn milestone_branch(&self, milestone: &str, slug: &str) -> String {
        render_template(&self.milestone_branch_template, "", slug, milestone)
    }

    pub fn to_toml(&self) -> Result<String, PlanError> {
        Ok(toml::to_string(self)?)
    }
}

fn render_template(template: &str, unit: &str, slug: &str, milestone: &str) -> String {
    template
        .replace("{unit}", unit)
        .replace("{slug}", slug)
        .replace("{milestone}", milestone)
}

/// Reads and writes the configuration document of one [`Repository`].
pub struct ConfigProvider<'a> {
    repo: &'a Repository,
}

impl<'a> ConfigProvider<'a> {
    pub fn new(repo: &'a Repository) -> Self {
        ConfigProvider { repo }
    }

    pub fn path(&self) -> PathBuf {
        self.repo.config_path()
    }

    /// Stored configuration. A missing document yields defaults; a malformed one is an
    /// error so callers can report it.
    pub fn stored(&self) -> Result<PlanConfig, PlanError> {
        let path = self.path();
        tracing::debug!("Attempting to read config from: {:?}", &path);
        if !self.repo.fs().exists(&path) {
            tracing::debug!("Config file not found, using defaults.");
            return Ok(PlanConfig::default());
        }
        let content = self.repo.fs().read_to_string(&path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Configuration with the auto-detection rules applied: `commit_docs` is forced off
    /// when the planning root is ignored by version control.
    pub fn effective(&self) -> Result<PlanConfig, PlanError> {
        let mut config = self.stored()?;
        if config.commit_docs && self.repo.store().is_ignored(&self.repo.planning_dir()) {
            tracing::debug!("Planning root is ignored by version control; commit_docs=false");
            config.commit_docs = false;
        }
        Ok(config)
    }

    /// Like [`Self::effective`] but falls back to defaults when the document is malformed.
    pub fn effective_or_default(&self) -> PlanConfig {
        match self.effective() {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!("Ignoring malformed config {:?}: {}", self.path(), e);
                PlanConfig::default()
            }
        }
    }

    pub fn save(&self, config: &PlanConfig) -> Result<(), PlanError> {
        tracing::debug!("Attempting to write config to: {:?}", self.path());
        self.repo.fs().write(&self.path(), &config.to_toml()?)
    }

    /// Create a default configuration. Refuses to overwrite an existing document.
    pub fn init(&self) -> Result<PlanConfig, PlanError> {
        if self.repo.fs().exists(&self.path()) {
            return Err(PlanError::Guard(format!(
                "{} already exists",
                self.path().display()
            )));
        }
        let config = PlanConfig::default();
        self.save(&config)?;
        Ok(config)
    }

    /// Read one dotted key (`workflow.research`) as JSON.
    pub fn get(&self, key: &str) -> Result<serde_json::Value, PlanError> {
        let json = serde_json::to_value(self.stored()?)?;
        let mut current = &json;
        for part in key.split('.') {
            current = current
                .get(part)
                .ok_or_else(|| PlanError::NotFound(format!("config key '{key}'")))?;
        }
        Ok(current.clone())
    }

    /// Set one dotted key, preserving the rest of the document's formatting and comments.
    /// The result must still deserialize into [`PlanConfig`].
    pub fn set(&self, key: &str, raw: &str) -> Result<PlanConfig, PlanError> {
        let path = self.path();
        let content = self.repo.fs().read_opt(&path).unwrap_or_default();
        let mut doc = DocumentMut::from_str(&content)?;
        let parts: Vec<&str> = key.split('.').filter(|p| !p.is_empty()).collect();
        let Some((leaf, tables)) = parts.split_last() else {
            return Err(PlanError::Command("empty config key".to_string()));
        };
        let mut table: &mut Table = doc.as_table_mut();
        for name in tables {
            let entry = table.entry(name).or_insert(Item::Table(Table::new()));
            table = entry.as_table_mut().ok_or_else(|| {
                PlanError::Command(format!("config key '{name}' is not a table"))
            })?;
        }
        table.insert(leaf, typed_value(raw));
        let updated = doc.to_string();
        let config: PlanConfig = toml::from_str(&updated)?;
        self.repo.fs().write(&path, &updated)?;
        tracing::info!("Set config {} = {}", key, raw);
        Ok(config)
    }
}

fn typed_value(raw: &str) -> Item {
    match raw {
        "true" => value(true),
        "false" => value(false),
        _ => match raw.parse::<i64>() {
            Ok(n) => value(n),
            Err(_) => value(raw),
        },
    }
}
