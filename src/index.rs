//! Document index: locate unit directories and the documents inside them.
//!
//! Lookups never fail on a missing unit. Callers probe for optional units routinely, so
//! absence is a [`UnitLookup`] with `found == false`. Only filesystem faults are errors.
use serde::Serialize;
use std::{
    collections::BTreeSet,
    path::{Path, PathBuf},
    str::FromStr,
};

use crate::{
    error::PlanError,
    ids::{parse_dir_name, parse_job_file, JobDocKind, JobId, UnitId},
    repo::Repository,
};

/// A unit directory on disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnitDir {
    pub id: UnitId,
    pub slug: String,
    /// Raw directory name.
    pub name: String,
    #[serde(skip)]
    pub path: PathBuf,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct UnitLookup {
    pub found: bool,
    pub directory: Option<String>,
    pub unit_id: Option<UnitId>,
    pub unit_name: Option<String>,
    pub slug: Option<String>,
    pub jobs: Vec<String>,
    pub summaries: Vec<String>,
    pub incomplete_jobs: Vec<String>,
    pub has_context: bool,
    pub has_research: bool,
    pub has_verification: bool,
    /// Milestone version when the unit was found in an archive.
    pub archived: Option<String>,
    #[serde(skip)]
    pub path: Option<PathBuf>,
}

impl UnitLookup {
    pub fn not_found(unit_id: Option<UnitId>) -> Self {
        UnitLookup {
            unit_id,
            ..Default::default()
        }
    }

    pub fn job_count(&self) -> usize {
        self.jobs.len()
    }

    pub fn summary_count(&self) -> usize {
        self.summaries.len()
    }

    /// At least one job, and every job has a summary.
    pub fn is_complete(&self) -> bool {
        !self.jobs.is_empty() && self.summaries.len() >= self.jobs.len()
    }
}

pub struct DocumentIndex<'a> {
    repo: &'a Repository,
}

impl<'a> DocumentIndex<'a> {
    pub fn new(repo: &'a Repository) -> Self {
        DocumentIndex { repo }
    }

    /// Raw names of every directory under `units/`.
    pub fn unit_dirs(&self) -> Result<Vec<String>, PlanError> {
        Ok(self
            .repo
            .fs()
            .list_dir(&self.repo.units_dir())?
            .into_iter()
            .filter(|e| e.is_dir)
            .map(|e| e.name)
            .collect())
    }

    /// Current unit directories with a well-formed name, sorted by numeric id.
    pub fn list_units(&self) -> Result<Vec<UnitDir>, PlanError> {
        self.units_in(&self.repo.units_dir())
    }

    /// Unit directories directly under `dir`, sorted by numeric id.
    pub fn units_in(&self, dir: &Path) -> Result<Vec<UnitDir>, PlanError> {
        let mut units = Vec::new();
        for entry in self.repo.fs().list_dir(dir)? {
            if !entry.is_dir {
                continue;
            }
            match parse_dir_name(&entry.name) {
                Some((id, slug)) => units.push(UnitDir {
                    id,
                    slug,
                    path: dir.join(&entry.name),
                    name: entry.name,
                }),
                None => tracing::debug!("Skipping non-unit directory {}", entry.name),
            }
        }
        units.sort_by(|a, b| a.id.cmp(&b.id).then_with(|| a.name.cmp(&b.name)));
        Ok(units)
    }

    /// Archived unit namespaces (`milestones/<version>-units/`), newest version first.
    pub fn archives(&self) -> Result<Vec<(String, PathBuf)>, PlanError> {
        let milestones = self.repo.milestones_dir();
        let mut archives: Vec<(String, PathBuf)> = self
            .repo
            .fs()
            .list_dir(&milestones)?
            .into_iter()
            .filter(|e| e.is_dir)
            .filter_map(|e| {
                e.name
                    .strip_suffix("-units")
                    .map(|version| (version.to_string(), milestones.join(&e.name)))
            })
            .collect();
        archives.sort_by(|a, b| version_key(&b.0).cmp(&version_key(&a.0)));
        Ok(archives)
    }

    /// Locate a unit by (possibly unpadded) id: current units first, then archives newest
    /// first.
    pub fn find_unit(&self, raw_id: &str) -> Result<UnitLookup, PlanError> {
        let Ok(id) = UnitId::from_str(raw_id) else {
            tracing::debug!("'{}' is not a unit id", raw_id);
            return Ok(UnitLookup::not_found(None));
        };
        if let Some(dir) = self.find_dir(&self.list_units()?, &id) {
            return self.inspect(&dir, None);
        }
        for (version, path) in self.archives()? {
            if let Some(dir) = self.find_dir(&self.units_in(&path)?, &id) {
                return self.inspect(&dir, Some(version));
            }
        }
        Ok(UnitLookup::not_found(Some(id)))
    }

    /// Locate a current (non-archived) unit directory.
    pub fn current_unit(&self, id: &UnitId) -> Result<Option<UnitDir>, PlanError> {
        Ok(self.find_dir(&self.list_units()?, id))
    }

    fn find_dir(&self, units: &[UnitDir], id: &UnitId) -> Option<UnitDir> {
        units.iter().find(|u| u.id == *id).cloned()
    }

    /// Describe the documents inside one unit directory.
    pub fn inspect(&self, dir: &UnitDir, archived: Option<String>) -> Result<UnitLookup, PlanError> {
        let mut jobs: Vec<(JobId, String)> = Vec::new();
        let mut summaries: Vec<(JobId, String)> = Vec::new();
        let mut lookup = UnitLookup {
            found: true,
            directory: Some(self.repo.display_path(&dir.path)),
            unit_id: Some(dir.id),
            unit_name: Some(dir.slug.replace('-', " ")),
            slug: Some(dir.slug.clone()),
            archived,
            path: Some(dir.path.clone()),
            ..Default::default()
        };
        let raw_prefix = format!("{}-", dir.name.split('-').next().unwrap_or_default());
        let prefix = format!("{}-", dir.id);
        for entry in self.repo.fs().list_dir(&dir.path)? {
            if entry.is_dir {
                continue;
            }
            if let Some((job, kind)) = parse_job_file(&entry.name) {
                match kind {
                    JobDocKind::Job => jobs.push((job, entry.name)),
                    JobDocKind::Summary => summaries.push((job, entry.name)),
                }
                continue;
            }
            let bare = entry
                .name
                .strip_prefix(&prefix)
                .or_else(|| entry.name.strip_prefix(&raw_prefix))
                .unwrap_or(&entry.name);
            match bare {
                "CONTEXT.md" => lookup.has_context = true,
                "RESEARCH.md" => lookup.has_research = true,
                "VERIFICATION.md" => lookup.has_verification = true,
                _ => {}
            }
        }
        jobs.sort();
        summaries.sort();
        let summarized: BTreeSet<JobId> = summaries.iter().map(|(id, _)| *id).collect();
        lookup.incomplete_jobs = jobs
            .iter()
            .filter(|(id, _)| !summarized.contains(id))
            .map(|(_, name)| name.clone())
            .collect();
        lookup.jobs = jobs.into_iter().map(|(_, name)| name).collect();
        lookup.summaries = summaries.into_iter().map(|(_, name)| name).collect();
        Ok(lookup)
    }

    /// Job ids present in a unit directory, as `(job, has_job_doc, has_summary)`.
    pub fn job_ids(&self, dir: &Path) -> Result<Vec<(JobId, bool, bool)>, PlanError> {
        let mut found: std::collections::BTreeMap<JobId, (bool, bool)> = Default::default();
        for entry in self.repo.fs().list_dir(dir)? {
            if let Some((job, kind)) = parse_job_file(&entry.name) {
                let slot = found.entry(job).or_default();
                match kind {
                    JobDocKind::Job => slot.0 = true,
                    JobDocKind::Summary => slot.1 = true,
                }
            }
        }
        Ok(found.into_iter().map(|(id, (j, s))| (id, j, s)).collect())
    }
}

/// Numeric components of a version label: `v1.10` sorts after `v1.9`.
pub fn version_key(version: &str) -> Vec<u64> {
    version
        .split(|c: char| !c.is_ascii_digit())
        .filter(|part| !part.is_empty())
        .filter_map(|part| part.parse::<u64>().ok())
        .collect()
}
