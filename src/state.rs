//! The state snapshot (`STATE.md`).
//!
//! Fields are `**Name:** value` lines. Every mutation is a narrow patch of one field line,
//! one list or one table; the only wholesale rewrite is [`regenerate`], which health repair
//! uses after backing up the old document.
use chrono::Local;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

use crate::{
    config::{ConfigProvider, PlanConfig},
    error::PlanError,
    ids::{JobId, UnitId},
    index::DocumentIndex,
    repo::Repository,
    roadmap::{Roadmap, RoadmapAnalysis},
    span::{lines, Span},
};

pub const CURRENT_UNIT: &str = "Current Unit";
pub const CURRENT_UNIT_NAME: &str = "Current Unit Name";
pub const TOTAL_UNITS: &str = "Total Units";
pub const CURRENT_JOB: &str = "Current Job";
pub const TOTAL_JOBS_IN_UNIT: &str = "Total Jobs in Unit";
pub const STATUS: &str = "Status";
pub const LAST_ACTIVITY: &str = "Last Activity";
pub const LAST_ACTIVITY_DESCRIPTION: &str = "Last Activity Description";
pub const PROGRESS: &str = "Progress";
pub const LAST_SESSION: &str = "Last Session";
pub const STOPPED_AT: &str = "Stopped At";
pub const RESUME_FILE: &str = "Resume File";

pub const DECISIONS: &str = "Decisions";
pub const BLOCKERS: &str = "Blockers/Concerns";
pub const METRICS: &str = "Performance Metrics";

const PLACEHOLDER: &str = "None yet.";

static JOB_REF: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\d+(?:\.\d+)?)-(\d+)").expect("static regex"));
static HEADING_LINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(#{1,6})\s+(.*?)\s*$").expect("static regex"));

pub fn today() -> String {
    Local::now().format("%Y-%m-%d").to_string()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnitStatus {
    ReadyToPlan,
    Planning,
    ReadyToExecute,
    InProgress,
    ReadyToVerify,
    UnitComplete,
    MilestoneComplete,
    Blocked,
    Other(String),
}

impl fmt::Display for UnitStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnitStatus::ReadyToPlan => write!(f, "Ready to plan"),
            UnitStatus::Planning => write!(f, "Planning"),
            UnitStatus::ReadyToExecute => write!(f, "Ready to execute"),
            UnitStatus::InProgress => write!(f, "In progress"),
            UnitStatus::ReadyToVerify => write!(f, "Ready to verify"),
            UnitStatus::UnitComplete => write!(f, "Unit complete"),
            UnitStatus::MilestoneComplete => write!(f, "Milestone complete"),
            UnitStatus::Blocked => write!(f, "Blocked"),
            UnitStatus::Other(s) => write!(f, "{s}"),
        }
    }
}

impl FromStr for UnitStatus {
    type Err = PlanError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.trim().to_ascii_lowercase().as_str() {
            "ready to plan" => UnitStatus::ReadyToPlan,
            "planning" => UnitStatus::Planning,
            "ready to execute" => UnitStatus::ReadyToExecute,
            "in progress" => UnitStatus::InProgress,
            "ready to verify" => UnitStatus::ReadyToVerify,
            "unit complete" => UnitStatus::UnitComplete,
            "milestone complete" => UnitStatus::MilestoneComplete,
            "blocked" => UnitStatus::Blocked,
            _ => UnitStatus::Other(s.trim().to_string()),
        })
    }
}

impl Serialize for UnitStatus {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metric {
    pub unit: String,
    pub job: String,
    pub duration: String,
    pub tasks: String,
    pub files: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Session {
    pub last_session: Option<String>,
    pub stopped_at: Option<String>,
    pub resume_file: Option<String>,
}

/// Structured parse of the whole snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StateSnapshot {
    pub current_unit: Option<String>,
    pub current_unit_name: Option<String>,
    pub total_units: Option<u32>,
    pub current_job: Option<String>,
    pub total_jobs_in_unit: Option<u32>,
    pub status: Option<UnitStatus>,
    pub last_activity: Option<String>,
    pub last_activity_description: Option<String>,
    pub progress: Option<String>,
    pub decisions: Vec<String>,
    pub blockers: Vec<String>,
    pub metrics: Vec<Metric>,
    pub session: Session,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StateLoad {
    pub config: PlanConfig,
    pub state_exists: bool,
    pub roadmap_exists: bool,
    pub project_exists: bool,
    pub requirements_exists: bool,
    pub config_exists: bool,
    pub snapshot: Option<StateSnapshot>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StateValue {
    pub key: Option<String>,
    pub found: bool,
    pub value: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PatchResult {
    pub updated: Vec<String>,
    pub not_found: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JobAdvance {
    pub previous: Option<String>,
    pub current: Option<String>,
    pub last_job: bool,
    pub status: UnitStatus,
}

fn field_pattern(name: &str) -> Result<Regex, PlanError> {
    Ok(Regex::new(&format!(
        r"(?mi)^\*\*{}(?::\*\*|\*\*:)[ \t]*(.*?)[ \t]*\r?$",
        regex::escape(name)
    ))?)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateDocument {
    text: String,
}

impl StateDocument {
    pub fn new(text: impl Into<String>) -> Self {
        StateDocument { text: text.into() }
    }

    pub fn load(repo: &Repository) -> Result<Self, PlanError> {
        repo.fs()
            .read_to_string(&repo.state_path())
            .map(StateDocument::new)
            .map_err(|e| match e {
                PlanError::NotFound(_) => PlanError::NotFound("STATE.md not found".to_string()),
                other => other,
            })
    }

    pub fn save(&self, repo: &Repository) -> Result<(), PlanError> {
        repo.fs().write(&repo.state_path(), &self.text)
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    fn field_span(&self, name: &str) -> Result<Option<Span>, PlanError> {
        Ok(field_pattern(name)?
            .captures(&self.text)
            .and_then(|c| c.get(1))
            .map(|m| Span::new(m.start(), m.end())))
    }

    pub fn field(&self, name: &str) -> Result<Option<String>, PlanError> {
        Ok(self
            .field_span(name)?
            .map(|span| span.slice(&self.text).to_string()))
    }

    /// Replace the value of an existing field line. Returns false when the field is absent;
    /// new fields are never invented.
    pub fn set_field(&mut self, name: &str, value: &str) -> Result<bool, PlanError> {
        match self.field_span(name)? {
            Some(span) => {
                self.text = span.replace(&self.text, value.trim());
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Body of a `##`/`###` section: the lines after its heading, up to the next heading.
    pub fn section(&self, name: &str) -> Option<Span> {
        let mut start: Option<usize> = None;
        for (span, line) in lines(&self.text) {
            let heading = HEADING_LINE.captures(line);
            match (start, heading) {
                (None, Some(caps)) if caps[2].eq_ignore_ascii_case(name) => {
                    start = Some(span.end);
                }
                (Some(s), Some(_)) => return Some(Span::new(s, span.start)),
                _ => {}
            }
        }
        start.map(|s| Span::new(s, self.text.len()))
    }

    pub fn section_text(&self, name: &str) -> Option<&str> {
        self.section(name).map(|s| s.slice(&self.text))
    }

    /// `- item` lines of a section.
    pub fn list_items(&self, name: &str) -> Vec<String> {
        self.section_text(name)
            .map(|body| {
                lines(body)
                    .filter_map(|(_, l)| l.trim_start().strip_prefix("- "))
                    .map(|item| item.trim().to_string())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Append `- item` to a section list, replacing the `None yet.` placeholder.
    pub fn add_list_item(&mut self, name: &str, item: &str) -> Result<(), PlanError> {
        let section = self
            .section(name)
            .ok_or_else(|| PlanError::NotFound(format!("section '{name}' in STATE.md")))?;
        let body = section.slice(&self.text);
        let entry = format!("- {}\n", item.trim());
        let placeholder = lines(body)
            .find(|(_, l)| is_placeholder(l))
            .map(|(span, _)| span);
        if let Some(span) = placeholder {
            let abs = Span::new(section.start + span.start, section.start + span.end);
            self.text = abs.replace(&self.text, &entry);
            return Ok(());
        }
        let last_item = lines(body)
            .filter(|(_, l)| l.trim_start().starts_with("- "))
            .last()
            .map(|(span, _)| section.start + span.end);
        let pos = match last_item {
            Some(pos) => pos,
            // Keep a blank line between the heading and the first item.
            None => {
                let leading_blank = lines(body)
                    .take_while(|(_, l)| l.trim().is_empty())
                    .last()
                    .map(|(span, _)| section.start + span.end);
                match leading_blank {
                    Some(pos) => pos,
                    None => {
                        self.text = Span::at(section.start).replace(&self.text, "\n");
                        section.start + 1
                    }
                }
            }
        };
        let insertion = if pos > 0 && !self.text[..pos].ends_with('\n') {
            format!("\n{entry}")
        } else {
            entry
        };
        self.text = Span::at(pos).replace(&self.text, &insertion);
        Ok(())
    }

    /// Remove the first list item containing `needle` (case-insensitive). The placeholder
    /// returns when the list becomes empty.
    pub fn remove_list_item(&mut self, name: &str, needle: &str) -> Result<Option<String>, PlanError> {
        let section = self
            .section(name)
            .ok_or_else(|| PlanError::NotFound(format!("section '{name}' in STATE.md")))?;
        let body = section.slice(&self.text);
        let needle = needle.trim().to_lowercase();
        let items: Vec<(Span, String)> = lines(body)
            .filter_map(|(span, l)| {
                l.trim_start()
                    .strip_prefix("- ")
                    .map(|item| (span, item.trim().to_string()))
            })
            .collect();
        let Some((span, item)) = items
            .iter()
            .find(|(_, item)| item.to_lowercase().contains(&needle))
            .cloned()
        else {
            return Ok(None);
        };
        let replacement = if items.len() == 1 {
            format!("{PLACEHOLDER}\n")
        } else {
            String::new()
        };
        let abs = Span::new(section.start + span.start, section.start + span.end);
        self.text = abs.replace(&self.text, &replacement);
        Ok(Some(item))
    }

    /// Append a row to the table in section `name`.
    pub fn append_table_row(&mut self, name: &str, row: &str) -> Result<(), PlanError> {
        let section = self
            .section(name)
            .ok_or_else(|| PlanError::NotFound(format!("section '{name}' in STATE.md")))?;
        let body = section.slice(&self.text);
        let last_row = lines(body)
            .filter(|(_, l)| l.trim_start().starts_with('|'))
            .last()
            .map(|(span, _)| section.start + span.end)
            .ok_or_else(|| PlanError::NotFound(format!("table in section '{name}'")))?;
        let insertion = if self.text[..last_row].ends_with('\n') {
            format!("{row}\n")
        } else {
            format!("\n{row}")
        };
        self.text = Span::at(last_row).replace(&self.text, &insertion);
        Ok(())
    }

    fn metrics(&self) -> Vec<Metric> {
        let Some(body) = self.section_text(METRICS) else {
            return Vec::new();
        };
        lines(body)
            .filter_map(|(_, l)| {
                let t = l.trim();
                if !t.starts_with('|') || t.contains("---") {
                    return None;
                }
                let cells: Vec<String> = t
                    .trim_matches('|')
                    .split('|')
                    .map(|c| c.trim().to_string())
                    .collect();
                if cells.len() < 5 || cells[0].eq_ignore_ascii_case("unit") {
                    return None;
                }
                Some(Metric {
                    unit: cells[0].clone(),
                    job: cells[1].clone(),
                    duration: cells[2].clone(),
                    tasks: cells[3].clone(),
                    files: cells[4].clone(),
                })
            })
            .collect()
    }

    pub fn snapshot(&self) -> Result<StateSnapshot, PlanError> {
        let number = |name: &str| -> Result<Option<u32>, PlanError> {
            Ok(self.field(name)?.and_then(|v| {
                v.split_whitespace()
                    .next()
                    .and_then(|n| n.parse::<u32>().ok())
            }))
        };
        let session_value = |name: &str| -> Result<Option<String>, PlanError> {
            Ok(self
                .field(name)?
                .filter(|v| !v.is_empty() && !v.eq_ignore_ascii_case("none")))
        };
        Ok(StateSnapshot {
            current_unit: self.field(CURRENT_UNIT)?,
            current_unit_name: self.field(CURRENT_UNIT_NAME)?,
            total_units: number(TOTAL_UNITS)?,
            current_job: self.field(CURRENT_JOB)?,
            total_jobs_in_unit: number(TOTAL_JOBS_IN_UNIT)?,
            status: self
                .field(STATUS)?
                .map(|s| UnitStatus::from_str(&s))
                .transpose()?,
            last_activity: self.field(LAST_ACTIVITY)?,
            last_activity_description: self.field(LAST_ACTIVITY_DESCRIPTION)?,
            progress: self.field(PROGRESS)?,
            decisions: self
                .list_items(DECISIONS)
                .into_iter()
                .filter(|d| !is_placeholder(d))
                .collect(),
            blockers: self
                .list_items(BLOCKERS)
                .into_iter()
                .filter(|d| !is_placeholder(d))
                .collect(),
            metrics: self.metrics(),
            session: Session {
                last_session: session_value(LAST_SESSION)?,
                stopped_at: session_value(STOPPED_AT)?,
                resume_file: session_value(RESUME_FILE)?,
            },
        })
    }
}

fn is_placeholder(line: &str) -> bool {
    let t = line.trim().trim_start_matches("- ").trim();
    t.eq_ignore_ascii_case(PLACEHOLDER) || t.eq_ignore_ascii_case("None") || t.eq_ignore_ascii_case("None.")
}

pub fn progress_bar(percent: u32) -> String {
    let filled = (percent.min(100) as usize) / 10;
    format!("[{}{}] {}%", "█".repeat(filled), "░".repeat(10 - filled), percent.min(100))
}

fn mutate<T>(
    repo: &Repository,
    f: impl FnOnce(&mut StateDocument) -> Result<T, PlanError>,
) -> Result<T, PlanError> {
    let mut doc = StateDocument::load(repo)?;
    let out = f(&mut doc)?;
    doc.save(repo)?;
    Ok(out)
}

fn touch_activity(doc: &mut StateDocument, description: &str) -> Result<(), PlanError> {
    doc.set_field(LAST_ACTIVITY, &today())?;
    doc.set_field(LAST_ACTIVITY_DESCRIPTION, description)?;
    Ok(())
}

/// Configuration, snapshot and document presence in one call.
pub fn load(repo: &Repository) -> Result<StateLoad, PlanError> {
    repo.require_planning_dir()?;
    let fs = repo.fs();
    let snapshot = match StateDocument::load(repo) {
        Ok(doc) => Some(doc.snapshot()?),
        Err(PlanError::NotFound(_)) => None,
        Err(e) => return Err(e),
    };
    Ok(StateLoad {
        config: ConfigProvider::new(repo).effective_or_default(),
        state_exists: snapshot.is_some(),
        roadmap_exists: fs.exists(&repo.roadmap_path()),
        project_exists: fs.exists(&repo.project_path()),
        requirements_exists: fs.exists(&repo.requirements_path()),
        config_exists: fs.exists(&repo.config_path()),
        snapshot,
    })
}

/// A field value, a section body, or (with no key) the whole document.
pub fn get(repo: &Repository, key: Option<&str>) -> Result<StateValue, PlanError> {
    let doc = StateDocument::load(repo)?;
    let Some(key) = key else {
        return Ok(StateValue {
            key: None,
            found: true,
            value: Some(doc.text().to_string()),
        });
    };
    let value = match doc.field(key)? {
        Some(v) => Some(v),
        None => doc.section_text(key).map(|s| s.trim().to_string()),
    };
    Ok(StateValue {
        key: Some(key.to_string()),
        found: value.is_some(),
        value,
    })
}

pub fn patch(repo: &Repository, fields: &[(String, String)]) -> Result<PatchResult, PlanError> {
    mutate(repo, |doc| {
        let mut result = PatchResult::default();
        for (name, value) in fields {
            if doc.set_field(name, value)? {
                result.updated.push(name.clone());
            } else {
                tracing::warn!("STATE.md has no field '{}'", name);
                result.not_found.push(name.clone());
            }
        }
        tracing::info!("Patched {} state field(s)", result.updated.len());
        Ok(result)
    })
}

/// Move `Current Job` to the next job of the current unit, or to `Ready to verify` after
/// the last one.
pub fn advance_job(repo: &Repository) -> Result<JobAdvance, PlanError> {
    mutate(repo, |doc| {
        let previous = doc.field(CURRENT_JOB)?;
        let total = doc
            .field(TOTAL_JOBS_IN_UNIT)?
            .and_then(|v| v.split_whitespace().next().and_then(|n| n.parse::<u32>().ok()))
            .unwrap_or(0);
        let unit = doc
            .field(CURRENT_UNIT)?
            .and_then(|u| u.split_whitespace().next().and_then(|u| UnitId::from_str(u).ok()));
        let current_job = previous.as_deref().and_then(|p| {
            JOB_REF.captures(p).and_then(|c| {
                let unit = UnitId::from_str(&c[1]).ok()?;
                let number = c[2].parse::<u32>().ok()?;
                Some(JobId::new(unit, number))
            })
        });
        let next = match (current_job, unit) {
            (Some(job), _) => Some(JobId::new(job.unit, job.number + 1)),
            (None, Some(unit)) => Some(JobId::new(unit, 1)),
            (None, None) => None,
        };
        let Some(next) = next else {
            return Err(PlanError::Parse(
                "STATE.md has neither a current job nor a current unit".to_string(),
            ));
        };
        if total > 0 && next.number > total {
            doc.set_field(STATUS, &UnitStatus::ReadyToVerify.to_string())?;
            touch_activity(doc, &format!("Executed final job {}", next.number - 1))?;
            return Ok(JobAdvance {
                previous,
                current: None,
                last_job: true,
                status: UnitStatus::ReadyToVerify,
            });
        }
        doc.set_field(CURRENT_JOB, &next.to_string())?;
        doc.set_field(STATUS, &UnitStatus::InProgress.to_string())?;
        touch_activity(doc, &format!("Started job {next}"))?;
        Ok(JobAdvance {
            previous,
            current: Some(next.to_string()),
            last_job: false,
            status: UnitStatus::InProgress,
        })
    })
}

pub fn record_metric(repo: &Repository, metric: &Metric) -> Result<(), PlanError> {
    mutate(repo, |doc| {
        doc.append_table_row(
            METRICS,
            &format!(
                "| {} | {} | {} | {} | {} |",
                metric.unit, metric.job, metric.duration, metric.tasks, metric.files
            ),
        )
    })
}

pub fn add_decision(repo: &Repository, unit: Option<&str>, text: &str) -> Result<(), PlanError> {
    let item = match unit {
        Some(unit) => format!("[Unit {unit}]: {}", text.trim()),
        None => text.trim().to_string(),
    };
    mutate(repo, |doc| doc.add_list_item(DECISIONS, &item))
}

pub fn add_blocker(repo: &Repository, text: &str) -> Result<(), PlanError> {
    mutate(repo, |doc| doc.add_list_item(BLOCKERS, text))
}

pub fn resolve_blocker(repo: &Repository, text: &str) -> Result<Option<String>, PlanError> {
    mutate(repo, |doc| doc.remove_list_item(BLOCKERS, text))
}

pub fn record_session(
    repo: &Repository,
    stopped_at: &str,
    resume_file: Option<&str>,
) -> Result<PatchResult, PlanError> {
    let fields = vec![
        (LAST_SESSION.to_string(), Local::now().format("%Y-%m-%d %H:%M").to_string()),
        (STOPPED_AT.to_string(), stopped_at.to_string()),
        (
            RESUME_FILE.to_string(),
            resume_file.unwrap_or("None").to_string(),
        ),
    ];
    patch(repo, &fields)
}

/// Recompute the progress bar from the roadmap and the unit tree.
pub fn update_progress(repo: &Repository) -> Result<u32, PlanError> {
    let analysis = Roadmap::load(repo)?.analyze(&DocumentIndex::new(repo))?;
    mutate(repo, |doc| {
        doc.set_field(PROGRESS, &progress_bar(analysis.progress_percent))?;
        Ok(analysis.progress_percent)
    })
}

pub fn snapshot(repo: &Repository) -> Result<StateSnapshot, PlanError> {
    StateDocument::load(repo)?.snapshot()
}

/// Minimal snapshot text derived from the roadmap analysis.
pub fn minimal_text(analysis: Option<&RoadmapAnalysis>) -> String {
    let current = analysis.and_then(|a| {
        a.current_unit
            .and_then(|id| a.units.iter().find(|u| u.id == id))
    });
    let (unit, name, jobs) = match current {
        Some(u) => (u.id.to_string(), u.name.clone(), u.jobs),
        None => ("None".to_string(), "None".to_string(), 0),
    };
    let total = analysis.map(|a| a.unit_count).unwrap_or(0);
    let percent = analysis.map(|a| a.progress_percent).unwrap_or(0);
    let date = today();
    format!(
        "# Project State\n\n## Current Position\n\n**{CURRENT_UNIT}:** {unit}\n**{CURRENT_UNIT_NAME}:** {name}\n**{TOTAL_UNITS}:** {total}\n**{CURRENT_JOB}:** Not started\n**{TOTAL_JOBS_IN_UNIT}:** {jobs}\n**{STATUS}:** {}\n**{LAST_ACTIVITY}:** {date}\n**{LAST_ACTIVITY_DESCRIPTION}:** State regenerated\n**{PROGRESS}:** {}\n\n## Accumulated Context\n\n### {DECISIONS}\n\n{PLACEHOLDER}\n\n### {BLOCKERS}\n\n{PLACEHOLDER}\n\n## {METRICS}\n\n| Unit | Job | Duration | Tasks | Files |\n|------|-----|----------|-------|-------|\n\n## Session Continuity\n\n**{LAST_SESSION}:** {date}\n**{STOPPED_AT}:** State regenerated\n**{RESUME_FILE}:** None\n",
        UnitStatus::ReadyToPlan,
        progress_bar(percent)
    )
}

/// Rewrite `STATE.md` from scratch, keeping the previous document as `STATE.md.bak`.
pub fn regenerate(repo: &Repository, analysis: Option<&RoadmapAnalysis>) -> Result<bool, PlanError> {
    let path = repo.state_path();
    let fs = repo.fs();
    let mut backed_up = false;
    if fs.exists(&path) {
        let backup = path.with_extension("md.bak");
        fs.copy(&path, &backup)?;
        backed_up = true;
        tracing::info!("Backed up STATE.md to {}", repo.display_path(&backup));
    }
    fs.write(&path, &minimal_text(analysis))?;
    tracing::info!("Regenerated STATE.md");
    Ok(backed_up)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::helpers::{mem_repo, seed_project, state_text, FixtureUnit};

    #[test]
    fn reads_fields_and_sections() {
        let doc = StateDocument::new(state_text("02", "Auth", 3));
        let snap = doc.snapshot().unwrap();
        assert_eq!(snap.current_unit.as_deref(), Some("02"));
        assert_eq!(snap.total_units, Some(3));
        assert_eq!(snap.status, Some(UnitStatus::ReadyToPlan));
        assert!(snap.decisions.is_empty());
        assert_eq!(snap.session.resume_file, None);
        assert_eq!(snap.session.stopped_at.as_deref(), Some("Project initialized"));
    }

    #[test]
    fn accepts_both_label_spellings() {
        let doc = StateDocument::new("**Status**: Blocked\n**Current Unit:** 04\n");
        assert_eq!(doc.field(STATUS).unwrap().as_deref(), Some("Blocked"));
        assert_eq!(doc.field(CURRENT_UNIT).unwrap().as_deref(), Some("04"));
        assert_eq!(doc.field("Nope").unwrap(), None);
    }

    #[test]
    fn set_field_is_a_narrow_patch() {
        let original = state_text("02", "Auth", 3);
        let mut doc = StateDocument::new(original.clone());
        assert!(doc.set_field(STATUS, "In progress").unwrap());
        assert!(!doc.set_field("Invented Field", "x").unwrap());
        let changed: Vec<(&str, &str)> = original
            .lines()
            .zip(doc.text().lines())
            .filter(|(a, b)| a != b)
            .collect();
        assert_eq!(changed, vec![("**Status:** Ready to plan", "**Status:** In progress")]);
    }

    #[test]
    fn lists_replace_placeholder_and_restore_it() {
        let mut doc = StateDocument::new(state_text("01", "Base", 1));
        doc.add_list_item(BLOCKERS, "Waiting on API keys").unwrap();
        doc.add_list_item(BLOCKERS, "Flaky CI").unwrap();
        assert_eq!(doc.list_items(BLOCKERS), vec!["Waiting on API keys", "Flaky CI"]);
        assert!(!doc.section_text(BLOCKERS).unwrap().contains(PLACEHOLDER));

        assert_eq!(
            doc.remove_list_item(BLOCKERS, "api keys").unwrap().as_deref(),
            Some("Waiting on API keys")
        );
        assert_eq!(doc.remove_list_item(BLOCKERS, "nothing like this").unwrap(), None);
        doc.remove_list_item(BLOCKERS, "flaky").unwrap();
        assert!(doc.section_text(BLOCKERS).unwrap().contains(PLACEHOLDER));
        assert!(doc.snapshot().unwrap().blockers.is_empty());
    }

    #[test]
    fn metrics_append_to_table() {
        let mut doc = StateDocument::new(state_text("01", "Base", 1));
        doc.append_table_row(METRICS, "| 01 | 01 | 5m | 3 | 4 |").unwrap();
        let snap = doc.snapshot().unwrap();
        assert_eq!(snap.metrics.len(), 1);
        assert_eq!(snap.metrics[0].duration, "5m");
        // Sections after the table are untouched.
        assert!(doc.text().contains("## Session Continuity"));
    }

    #[test]
    fn advance_job_walks_through_the_unit() {
        let repo = mem_repo();
        seed_project(&repo, &[FixtureUnit::new("1", "Base").jobs(2, 0)]);
        let first = advance_job(&repo).unwrap();
        assert_eq!(first.current.as_deref(), Some("01-01"));
        let second = advance_job(&repo).unwrap();
        assert_eq!(second.current.as_deref(), Some("01-02"));
        let done = advance_job(&repo).unwrap();
        assert!(done.last_job);
        assert_eq!(done.status, UnitStatus::ReadyToVerify);
        assert_eq!(
            snapshot(&repo).unwrap().status,
            Some(UnitStatus::ReadyToVerify)
        );
    }

    #[test]
    fn regenerate_backs_up_the_old_snapshot() {
        let repo = mem_repo();
        seed_project(&repo, &[FixtureUnit::new("1", "Base")]);
        assert!(regenerate(&repo, None).unwrap());
        let backup = repo.state_path().with_extension("md.bak");
        assert!(repo.fs().read_to_string(&backup).unwrap().contains("Project initialized"));
        let snap = snapshot(&repo).unwrap();
        assert_eq!(snap.status, Some(UnitStatus::ReadyToPlan));
    }

    #[test]
    fn update_progress_sets_bar() {
        let repo = mem_repo();
        seed_project(
            &repo,
            &[
                FixtureUnit::new("1", "Base").jobs(2, 2),
                FixtureUnit::new("2", "More").jobs(2, 0),
            ],
        );
        assert_eq!(update_progress(&repo).unwrap(), 50);
        assert_eq!(
            snapshot(&repo).unwrap().progress.as_deref(),
            Some("[█████░░░░░] 50%")
        );
    }
}
