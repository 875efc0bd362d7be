//! Milestone completion: archive the roadmap, the requirements ledger and every unit
//! directory under `milestones/`, then log the milestone.
use serde::Serialize;
use std::{fmt::Write as _, path::Path};

use crate::{
    error::PlanError,
    frontmatter,
    index::DocumentIndex,
    repo::Repository,
    state::{self, StateDocument, UnitStatus},
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MilestoneOutcome {
    pub version: String,
    pub name: Option<String>,
    pub date: String,
    pub units: usize,
    pub jobs: usize,
    pub summaries: usize,
    pub archived_roadmap: String,
    pub archived_requirements: Option<String>,
    pub archived_units: String,
    pub accomplishments: Vec<String>,
    pub state_updated: bool,
}

/// One line describing a summary: its `one-liner` metadata, else the first prose line of
/// the body.
pub fn one_liner(content: &str) -> Option<String> {
    let meta = frontmatter::extract(content);
    if let Some(line) = meta.get_str("one-liner").or_else(|| meta.get_str("one_liner")) {
        if !line.trim().is_empty() {
            return Some(line.trim().to_string());
        }
    }
    frontmatter::body(content)
        .lines()
        .map(str::trim)
        .find(|l| !l.is_empty() && !l.starts_with('#') && !l.starts_with("---"))
        .map(|l| l.trim_matches('*').trim().to_string())
        .filter(|l| !l.is_empty())
}

fn archive_copy(repo: &Repository, from: &Path, to: &Path) -> Result<String, PlanError> {
    if repo.fs().exists(to) {
        return Err(PlanError::Guard(format!(
            "{} already exists",
            repo.display_path(to)
        )));
    }
    repo.fs().copy(from, to)?;
    tracing::info!("Archived {} to {}", repo.display_path(from), repo.display_path(to));
    Ok(repo.display_path(to))
}

pub fn complete(repo: &Repository, version: &str, name: Option<&str>) -> Result<MilestoneOutcome, PlanError> {
    repo.require_planning_dir()?;
    let version = version.trim();
    if version.is_empty() || version.contains(['/', '\\']) {
        return Err(PlanError::Command(format!("'{version}' is not a milestone version")));
    }
    let fs = repo.fs();
    let milestones = repo.milestones_dir();
    let units_archive = milestones.join(format!("{version}-units"));
    if fs.exists(&units_archive) {
        return Err(PlanError::Guard(format!(
            "milestone {version} is already archived at {}",
            repo.display_path(&units_archive)
        )));
    }
    if !fs.exists(&repo.roadmap_path()) {
        return Err(PlanError::NotFound("ROADMAP.md not found".to_string()));
    }

    // Gather before moving anything.
    let index = DocumentIndex::new(repo);
    let units = index.list_units()?;
    let mut jobs = 0;
    let mut summaries = 0;
    let mut accomplishments = Vec::new();
    for unit in &units {
        let lookup = index.inspect(unit, None)?;
        jobs += lookup.job_count();
        summaries += lookup.summary_count();
        for summary in &lookup.summaries {
            match fs.read_to_string(&unit.path.join(summary)) {
                Ok(content) => accomplishments.extend(one_liner(&content)),
                Err(e) => tracing::warn!("Skipping unreadable summary {}: {}", summary, e),
            }
        }
    }

    let archived_roadmap = archive_copy(
        repo,
        &repo.roadmap_path(),
        &milestones.join(format!("{version}-ROADMAP.md")),
    )?;
    let archived_requirements = if fs.exists(&repo.requirements_path()) {
        Some(archive_copy(
            repo,
            &repo.requirements_path(),
            &milestones.join(format!("{version}-REQUIREMENTS.md")),
        )?)
    } else {
        None
    };

    fs.create_dir_all(&units_archive)?;
    for unit in &units {
        fs.rename(&unit.path, &units_archive.join(&unit.name))?;
        tracing::debug!("Archived unit directory {}", unit.name);
    }

    let date = state::today();
    let log_path = repo.milestones_log_path();
    let mut log = fs
        .read_opt(&log_path)
        .unwrap_or_else(|| "# Milestones\n".to_string());
    if !log.ends_with('\n') {
        log.push('\n');
    }
    let title = match name {
        Some(n) if !n.trim().is_empty() => format!("{version} {}", n.trim()),
        _ => version.to_string(),
    };
    let _ = write!(
        log,
        "\n## {title} (Shipped: {date})\n\n**Units completed:** {} units, {jobs} jobs, {summaries} summaries\n\n**Key accomplishments:**\n",
        units.len()
    );
    if accomplishments.is_empty() {
        log.push_str("- None recorded\n");
    }
    for line in &accomplishments {
        let _ = writeln!(log, "- {line}");
    }
    fs.write(&log_path, &log)?;

    let state_updated = if fs.exists(&repo.state_path()) {
        let mut doc = StateDocument::load(repo)?;
        doc.set_field(state::STATUS, &UnitStatus::MilestoneComplete.to_string())?;
        doc.set_field(state::LAST_ACTIVITY, &date)?;
        doc.set_field(
            state::LAST_ACTIVITY_DESCRIPTION,
            &format!("Milestone {version} complete"),
        )?;
        doc.save(repo)?;
        true
    } else {
        false
    };
    tracing::info!("Completed milestone {} with {} units", version, units.len());

    Ok(MilestoneOutcome {
        version: version.to_string(),
        name: name.map(str::to_string),
        date,
        units: units.len(),
        jobs,
        summaries,
        archived_roadmap,
        archived_requirements,
        archived_units: repo.display_path(&units_archive),
        accomplishments,
        state_updated,
    })
}
