//! The roadmap reflector.
//!
//! `ROADMAP.md` declares every unit twice: once as a checklist line
//! (`- [ ] **Unit 2: Auth** - ...`) and once as a detail section headed `### Unit 2: Auth`.
//! An optional progress table carries one row per unit. [`Roadmap`] reads all three
//! representations and rewrites them through [`Span`] edits so that bytes outside the
//! matched ranges never change.
//!
//! Detail headers are found with `pulldown_cmark`, so headings inside fenced code blocks do
//! not count. A section runs from its header to the next unit header, or to the next
//! heading of equal or higher rank, or to the end of the document.
use once_cell::sync::Lazy;
use pulldown_cmark::{
    Event as MdEvent, HeadingLevel, Options, Parser as MdParser, Tag as MdTag,
    TagEnd as MdTagEnd,
};
use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};
use std::{
    collections::{BTreeMap, BTreeSet},
    fmt::Write,
    str::FromStr,
};

use crate::{
    error::PlanError,
    ids::UnitId,
    index::{DocumentIndex, UnitLookup},
    repo::Repository,
    span::{apply_edits, line_at, lines, Span},
    state::progress_bar,
};

static UNIT_HEADING: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^Unit\s+(\d+(?:\.\d+)?)\s*:\s*(.*?)\s*$").expect("static regex")
});
static HEADER_ID: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"Unit\s+(\d+(?:\.\d+)?)").expect("static regex"));
static CHECKLIST: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*[-*] \[([ xX])\] \*\*Unit\s+(\d+(?:\.\d+)?)\s*:\s*(.*?)\*\*(.*)$")
        .expect("static regex")
});
static PROGRESS_CELL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*(\d+(?:\.\d+)?)\.\s*(.*?)\s*$").expect("static regex"));
static JOB_COUNT_CELL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*(\d+)\s*/\s*(\d+)\s*$").expect("static regex"));
static JOB_LINE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(\s*[-*] \[)([ xX])(\]\s+(\d+(?:\.\d+)?-\d+)-JOB\.md\b.*)$")
        .expect("static regex")
});
static SUCCESS_ITEM: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*\d+\.\s+(.*?)\s*$").expect("static regex"));
static NUMBER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(\d+(?:\.\d+)?)\b").expect("static regex"));
static COMPOUND_JOB_ID: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(\d{2,}(?:\.\d+)?)-(\d{2})\b").expect("static regex"));
static INSERTED_TAG: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\s*\(INSERTED\)\s*$").expect("static regex"));

static GOAL: Lazy<Regex> = Lazy::new(|| field_regex("Goal"));
static DEPENDS_ON: Lazy<Regex> = Lazy::new(|| field_regex("Depends on"));
static REQUIREMENTS: Lazy<Regex> = Lazy::new(|| field_regex("Requirements"));
static JOBS_FIELD: Lazy<Regex> = Lazy::new(|| field_regex("Jobs"));
static SUCCESS_CRITERIA: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?mi)^\*\*Success Criteria(?:\*\*|[^*\n]*\*\*)").expect("static regex")
});

/// `**Label**: value` or `**Label:** value`; group 1 is the value.
fn field_regex(label: &str) -> Regex {
    Regex::new(&format!(
        r"(?mi)^\*\*{}(?::\*\*|\*\*:)[ \t]*(.*?)[ \t]*\r?$",
        regex::escape(label)
    ))
    .expect("static regex")
}

fn heading_rank(level: HeadingLevel) -> u8 {
    match level {
        HeadingLevel::H1 => 1,
        HeadingLevel::H2 => 2,
        HeadingLevel::H3 => 3,
        HeadingLevel::H4 => 4,
        HeadingLevel::H5 => 5,
        HeadingLevel::H6 => 6,
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Heading {
    level: u8,
    text: String,
    span: Span,
    unit: Option<(UnitId, String)>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnitHeader {
    pub id: UnitId,
    pub name: String,
    pub level: u8,
    pub inserted: bool,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChecklistEntry {
    pub id: UnitId,
    pub name: String,
    pub checked: bool,
    pub description: String,
    pub span: Span,
    #[serde(skip)]
    mark: Span,
    #[serde(skip)]
    id_span: Span,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProgressRow {
    pub id: UnitId,
    pub name: String,
    pub done: u32,
    pub total: u32,
    pub status: String,
    pub completed: Option<String>,
    pub span: Span,
    #[serde(skip)]
    first_cell: String,
    #[serde(skip)]
    id_span: Span,
}

/// Result of [`Roadmap::get_unit`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct UnitDetails {
    pub found: bool,
    /// Listed in the checklist without a detail section.
    pub malformed: bool,
    pub unit_id: Option<UnitId>,
    pub name: Option<String>,
    pub goal: Option<String>,
    pub depends_on: Option<String>,
    pub depends_on_ids: Vec<UnitId>,
    pub requirements: Vec<String>,
    pub success_criteria: Vec<String>,
    pub inserted: bool,
    pub checklist_checked: Option<bool>,
    pub section: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DiskStatus {
    NoDirectory,
    Empty,
    Discussed,
    Researched,
    Planned,
    Partial,
    Complete,
}

impl DiskStatus {
    pub fn of(lookup: &UnitLookup) -> DiskStatus {
        if !lookup.found {
            DiskStatus::NoDirectory
        } else if lookup.is_complete() {
            DiskStatus::Complete
        } else if !lookup.summaries.is_empty() {
            DiskStatus::Partial
        } else if !lookup.jobs.is_empty() {
            DiskStatus::Planned
        } else if lookup.has_research {
            DiskStatus::Researched
        } else if lookup.has_context {
            DiskStatus::Discussed
        } else {
            DiskStatus::Empty
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnitAnalysis {
    pub id: UnitId,
    pub name: String,
    pub goal: Option<String>,
    pub depends_on: Vec<UnitId>,
    pub has_details: bool,
    pub in_checklist: bool,
    pub checklist_checked: bool,
    pub disk_status: DiskStatus,
    pub directory: Option<String>,
    pub jobs: usize,
    pub summaries: usize,
    pub has_context: bool,
    pub has_research: bool,
}

impl UnitAnalysis {
    /// Checked in the checklist, or every job on disk has a summary.
    pub fn completed(&self) -> bool {
        self.checklist_checked || self.disk_status == DiskStatus::Complete
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RoadmapAnalysis {
    pub units: Vec<UnitAnalysis>,
    pub unit_count: usize,
    pub completed_units: usize,
    pub total_jobs: usize,
    pub total_summaries: usize,
    pub progress_percent: u32,
    pub current_unit: Option<UnitId>,
    pub next_unit: Option<UnitId>,
    pub missing_details: Vec<UnitId>,
    pub missing_checklist: Vec<UnitId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProgressUpdate {
    pub unit_id: UnitId,
    pub updated: bool,
    pub jobs: usize,
    pub summaries: usize,
    pub status: String,
    pub complete: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProgressFormat {
    Json,
    Table,
    Bar,
}

impl FromStr for ProgressFormat {
    type Err = PlanError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(ProgressFormat::Json),
            "table" => Ok(ProgressFormat::Table),
            "bar" => Ok(ProgressFormat::Bar),
            other => Err(PlanError::Command(format!(
                "unknown progress format '{other}' (expected json, table or bar)"
            ))),
        }
    }
}

/// Parse the `Depends on` prose into unit ids. `Nothing`, `None`, `-` and `N/A` mean none.
pub fn parse_depends(text: &str) -> Vec<UnitId> {
    let lowered = text.trim().to_ascii_lowercase();
    if lowered.is_empty()
        || lowered == "-"
        || lowered.starts_with("nothing")
        || lowered.starts_with("none")
        || lowered.starts_with("n/a")
    {
        return Vec::new();
    }
    let mut seen = BTreeSet::new();
    NUMBER
        .captures_iter(text)
        .filter_map(|c| UnitId::from_str(&c[1]).ok())
        .filter(|id| seen.insert(*id))
        .collect()
}

/// Render a unit id in the same padding style as `original`.
fn render_like(original: &str, id: &UnitId) -> String {
    if original.starts_with('0') {
        id.to_string()
    } else {
        id.display_short()
    }
}

fn plural_jobs(n: usize) -> String {
    if n == 1 {
        "1 job".to_string()
    } else {
        format!("{n} jobs")
    }
}

/// Text of a new detail section.
pub fn section_text(id: &UnitId, name: &str, goal: &str, depends: &str, inserted: bool) -> String {
    let mut out = String::new();
    let tag = if inserted { " (INSERTED)" } else { "" };
    // Writing to a String cannot fail.
    let _ = writeln!(out, "### Unit {}: {}{}", id.display_short(), name, tag);
    let _ = writeln!(out, "**Goal**: {}", if goal.is_empty() { "[To be planned]" } else { goal });
    let _ = writeln!(out, "**Depends on**: {depends}");
    let _ = writeln!(out, "**Requirements**: TBD");
    let _ = writeln!(out, "**Jobs**: 0 jobs");
    out.push('\n');
    out.push_str("Jobs:\n");
    out.push_str("- [ ] TBD (run planning)\n\n");
    out
}

pub fn checklist_line(id: &UnitId, name: &str, description: &str, inserted: bool) -> String {
    let tag = if inserted { " (INSERTED)" } else { "" };
    if description.is_empty() {
        format!("- [ ] **Unit {}: {}**{}\n", id.display_short(), name, tag)
    } else {
        format!(
            "- [ ] **Unit {}: {}**{} - {}\n",
            id.display_short(),
            name,
            tag,
            description
        )
    }
}

pub fn progress_row_line(id: &UnitId, name: &str) -> String {
    format!("| {}. {} | 0/0 | Not started | - |\n", id.display_short(), name)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Roadmap {
    text: String,
}

impl Roadmap {
    pub fn new(text: impl Into<String>) -> Self {
        Roadmap { text: text.into() }
    }

    pub fn load(repo: &Repository) -> Result<Self, PlanError> {
        Ok(Roadmap::new(repo.read_roadmap()?))
    }

    pub fn save(&self, repo: &Repository) -> Result<(), PlanError> {
        tracing::debug!("Writing roadmap ({} bytes)", self.text.len());
        repo.write_roadmap(&self.text)
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn into_text(self) -> String {
        self.text
    }

    fn headings(&self) -> Vec<Heading> {
        let mut out = Vec::new();
        let mut current: Option<(u8, usize, String)> = None;
        let options = Options::ENABLE_TABLES | Options::ENABLE_TASKLISTS;
        for (event, range) in MdParser::new_ext(&self.text, options).into_offset_iter() {
            match event {
                MdEvent::Start(MdTag::Heading { level, .. }) => {
                    current = Some((heading_rank(level), range.start, String::new()));
                }
                MdEvent::Text(t) | MdEvent::Code(t) => {
                    if let Some((_, _, acc)) = current.as_mut() {
                        acc.push_str(&t);
                    }
                }
                MdEvent::End(MdTagEnd::Heading(_)) => {
                    if let Some((level, start, text)) = current.take() {
                        let text = text.trim().to_string();
                        let unit = UNIT_HEADING.captures(&text).and_then(|c| {
                            UnitId::from_str(&c[1])
                                .ok()
                                .map(|id| (id, c[2].to_string()))
                        });
                        out.push(Heading {
                            level,
                            text,
                            span: line_at(&self.text, start),
                            unit,
                        });
                    }
                }
                _ => {}
            }
        }
        out
    }

    /// Detail-section headers (levels 2 to 4) in document order.
    pub fn units(&self) -> Vec<UnitHeader> {
        self.headings()
            .into_iter()
            .filter(|h| (2..=4).contains(&h.level))
            .filter_map(|h| {
                let (id, raw_name) = h.unit?;
                let inserted = INSERTED_TAG.is_match(&raw_name);
                let name = INSERTED_TAG.replace(&raw_name, "").trim().to_string();
                Some(UnitHeader {
                    id,
                    name,
                    level: h.level,
                    inserted,
                    span: h.span,
                })
            })
            .collect()
    }

    /// Span of the detail section for `id`, header line included.
    pub fn section(&self, id: &UnitId) -> Option<Span> {
        let headings = self.headings();
        let start_idx = headings.iter().position(|h| {
            (2..=4).contains(&h.level) && h.unit.as_ref().is_some_and(|(uid, _)| uid == id)
        })?;
        let header = &headings[start_idx];
        let end = headings[start_idx + 1..]
            .iter()
            .find(|h| {
                h.level <= header.level
                    || ((2..=4).contains(&h.level) && h.unit.is_some())
            })
            .map(|h| h.span.start)
            .unwrap_or(self.text.len());
        Some(Span::new(header.span.start, end))
    }

    pub fn checklist(&self) -> Vec<ChecklistEntry> {
        let mut out = Vec::new();
        for (span, line) in lines(&self.text) {
            let Some(caps) = CHECKLIST.captures(line) else {
                continue;
            };
            let Ok(id) = UnitId::from_str(&caps[2]) else {
                continue;
            };
            let (Some(mark), Some(id_match)) = (caps.get(1), caps.get(2)) else {
                continue;
            };
            let raw_name = caps[3].trim();
            let name = INSERTED_TAG.replace(raw_name, "").trim().to_string();
            let tail = caps[4].trim();
            let tail = tail.strip_prefix("(INSERTED)").unwrap_or(tail);
            let description = tail
                .trim_start()
                .trim_start_matches(['-', ':', '\u{2013}', '\u{2014}'])
                .trim()
                .to_string();
            out.push(ChecklistEntry {
                id,
                name,
                checked: !caps[1].trim().is_empty(),
                description,
                span,
                mark: Span::new(span.start + mark.start(), span.start + mark.end()),
                id_span: Span::new(span.start + id_match.start(), span.start + id_match.end()),
            });
        }
        out
    }

    /// Rows of the progress table whose first cell reads `N. Name`.
    pub fn progress_rows(&self) -> Vec<ProgressRow> {
        let mut out = Vec::new();
        for (span, line) in lines(&self.text) {
            let trimmed = line.trim();
            if !trimmed.starts_with('|') || !trimmed.ends_with('|') {
                continue;
            }
            let inner = &trimmed[1..trimmed.len() - 1];
            let cells: Vec<&str> = inner.split('|').collect();
            if cells.len() < 3 {
                continue;
            }
            let Some(first) = PROGRESS_CELL.captures(cells[0]) else {
                continue;
            };
            let Ok(id) = UnitId::from_str(&first[1]) else {
                continue;
            };
            let Some(counts) = JOB_COUNT_CELL.captures(cells[1]) else {
                continue;
            };
            let Some(id_match) = first.get(1) else {
                continue;
            };
            // Offset of the first cell inside the full line.
            let cell_offset = line.find('|').map(|i| i + 1).unwrap_or(0);
            let completed = cells
                .get(3)
                .map(|c| c.trim())
                .filter(|c| !c.is_empty() && *c != "-")
                .map(str::to_string);
            out.push(ProgressRow {
                id,
                name: first[2].to_string(),
                done: counts[1].parse().unwrap_or(0),
                total: counts[2].parse().unwrap_or(0),
                status: cells[2].trim().to_string(),
                completed,
                span,
                first_cell: cells[0].trim().to_string(),
                id_span: Span::new(
                    span.start + cell_offset + id_match.start(),
                    span.start + cell_offset + id_match.end(),
                ),
            });
        }
        out
    }

    /// Every unit id named by a detail header or a checklist entry, sorted.
    pub fn unit_ids(&self) -> Vec<UnitId> {
        let ids: BTreeSet<UnitId> = self
            .units()
            .into_iter()
            .map(|h| h.id)
            .chain(self.checklist().into_iter().map(|c| c.id))
            .collect();
        ids.into_iter().collect()
    }

    /// Highest integer unit across headers and checklist entries.
    pub fn max_integer(&self) -> Option<u32> {
        self.unit_ids().into_iter().map(|id| id.major).max()
    }

    pub fn get_unit(&self, id: &UnitId) -> UnitDetails {
        let checklist = self.checklist().into_iter().find(|c| c.id == *id);
        let Some(span) = self.section(id) else {
            if checklist.is_some() {
                tracing::warn!("Unit {} is in the checklist but has no detail section", id);
            }
            return UnitDetails {
                found: false,
                malformed: checklist.is_some(),
                unit_id: Some(*id),
                name: checklist.as_ref().map(|c| c.name.clone()),
                checklist_checked: checklist.map(|c| c.checked),
                ..Default::default()
            };
        };
        let section = span.slice(&self.text);
        let header = self.units().into_iter().find(|h| h.id == *id);
        let depends_on = capture_field(&DEPENDS_ON, section);
        let requirements = capture_field(&REQUIREMENTS, section)
            .map(|r| split_requirements(&r))
            .unwrap_or_default();
        UnitDetails {
            found: true,
            malformed: false,
            unit_id: Some(*id),
            name: header.as_ref().map(|h| h.name.clone()),
            goal: capture_field(&GOAL, section),
            depends_on_ids: depends_on.as_deref().map(parse_depends).unwrap_or_default(),
            depends_on,
            requirements,
            success_criteria: success_criteria(section),
            inserted: header.is_some_and(|h| h.inserted),
            checklist_checked: checklist.map(|c| c.checked),
            section: Some(section.to_string()),
        }
    }

    pub fn analyze(&self, index: &DocumentIndex<'_>) -> Result<RoadmapAnalysis, PlanError> {
        let headers = self.units();
        let checklist = self.checklist();
        let dirs = index.list_units()?;

        let mut analyses = Vec::new();
        for id in self.unit_ids() {
            let header = headers.iter().find(|h| h.id == id);
            let entry = checklist.iter().find(|c| c.id == id);
            let details = self.get_unit(&id);
            let lookup = match dirs.iter().find(|d| id.prefixes(&d.name)) {
                Some(dir) => index.inspect(dir, None)?,
                None => UnitLookup::not_found(Some(id)),
            };
            let name = header
                .map(|h| h.name.clone())
                .or_else(|| entry.map(|c| c.name.clone()))
                .unwrap_or_default();
            analyses.push(UnitAnalysis {
                id,
                name,
                goal: details.goal,
                depends_on: details.depends_on_ids,
                has_details: header.is_some(),
                in_checklist: entry.is_some(),
                checklist_checked: entry.is_some_and(|c| c.checked),
                disk_status: DiskStatus::of(&lookup),
                directory: lookup.directory.clone(),
                jobs: lookup.job_count(),
                summaries: lookup.summary_count(),
                has_context: lookup.has_context,
                has_research: lookup.has_research,
            });
        }

        let total_jobs: usize = analyses.iter().map(|u| u.jobs).sum();
        let total_summaries: usize = analyses.iter().map(|u| u.summaries.min(u.jobs)).sum();
        let completed_units = analyses.iter().filter(|u| u.completed()).count();
        let progress_percent = if total_jobs == 0 {
            0
        } else {
            ((total_summaries * 100) / total_jobs).min(100) as u32
        };
        let current_idx = analyses.iter().position(|u| !u.completed());
        let current_unit = current_idx.map(|i| analyses[i].id);
        let next_unit = current_idx.and_then(|i| analyses.get(i + 1)).map(|u| u.id);
        Ok(RoadmapAnalysis {
            unit_count: analyses.len(),
            completed_units,
            total_jobs,
            total_summaries,
            progress_percent,
            current_unit,
            next_unit,
            missing_details: analyses
                .iter()
                .filter(|u| !u.has_details)
                .map(|u| u.id)
                .collect(),
            missing_checklist: analyses
                .iter()
                .filter(|u| !u.in_checklist)
                .map(|u| u.id)
                .collect(),
            units: analyses,
        })
    }

    /// Bring the roadmap in line with the jobs and summaries on disk for one unit.
    pub fn update_job_progress(
        &mut self,
        id: &UnitId,
        lookup: &UnitLookup,
        today: &str,
    ) -> Result<ProgressUpdate, PlanError> {
        let jobs = lookup.job_count();
        let summaries = lookup.summary_count().min(jobs);
        let complete = lookup.is_complete();
        let status = if complete {
            "Complete"
        } else if summaries > 0 {
            "In Progress"
        } else if jobs > 0 {
            "Planned"
        } else {
            "Not started"
        };
        let mut update = ProgressUpdate {
            unit_id: *id,
            updated: false,
            jobs,
            summaries,
            status: status.to_string(),
            complete,
        };

        let mut edits: Vec<(Span, String)> = Vec::new();
        if let Some(row) = self.progress_rows().into_iter().find(|r| r.id == *id) {
            let date = if complete {
                row.completed.clone().unwrap_or_else(|| today.to_string())
            } else {
                "-".to_string()
            };
            edits.push((
                row.span,
                format!(
                    "| {} | {}/{} | {} | {} |{}",
                    row.first_cell,
                    summaries,
                    jobs,
                    status,
                    date,
                    line_ending(row.span.slice(&self.text))
                ),
            ));
        }

        if let Some(section) = self.section(id) {
            let section_text = section.slice(&self.text);
            if let Some(caps) = JOBS_FIELD.captures(section_text) {
                if let Some(value) = caps.get(1) {
                    edits.push((
                        Span::new(section.start + value.start(), section.start + value.end()),
                        plural_jobs(jobs),
                    ));
                }
            }
            let summarized: BTreeSet<String> = lookup
                .summaries
                .iter()
                .filter_map(|s| s.strip_suffix("-SUMMARY.md").map(str::to_string))
                .collect();
            for (line_span, line) in lines(section_text) {
                let Some(caps) = JOB_LINE.captures(line) else {
                    continue;
                };
                let Some(mark) = caps.get(2) else {
                    continue;
                };
                let done = summarized.contains(&caps[4]);
                if done == mark.as_str().trim().is_empty() {
                    let abs = section.start + line_span.start;
                    let want = if done { "x" } else { " " };
                    edits.push((Span::new(abs + mark.start(), abs + mark.end()), want.to_string()));
                }
            }
        } else {
            tracing::warn!("Unit {} has no detail section to update", id);
        }

        if complete {
            if let Some(entry) = self.checklist().into_iter().find(|c| c.id == *id) {
                if !entry.checked {
                    edits.push((entry.mark, "x".to_string()));
                }
            }
        }

        if !edits.is_empty() {
            let updated = apply_edits(&self.text, edits)?;
            update.updated = updated != self.text;
            self.text = updated;
        }
        tracing::info!(
            "Unit {} progress: {}/{} ({})",
            id,
            summaries,
            jobs,
            update.status
        );
        Ok(update)
    }

    /// Check the checklist entry and mark the progress row `Complete` with `date`.
    pub fn mark_complete(&mut self, id: &UnitId, date: &str) -> Result<bool, PlanError> {
        let mut edits = Vec::new();
        if let Some(entry) = self.checklist().into_iter().find(|c| c.id == *id) {
            if !entry.checked {
                edits.push((entry.mark, "x".to_string()));
            }
        }
        if let Some(row) = self.progress_rows().into_iter().find(|r| r.id == *id) {
            let done = row.done.max(row.total);
            edits.push((
                row.span,
                format!(
                    "| {} | {}/{} | Complete | {} |{}",
                    row.first_cell,
                    done,
                    row.total,
                    date,
                    line_ending(row.span.slice(&self.text))
                ),
            ));
        }
        if edits.is_empty() {
            return Ok(false);
        }
        let updated = apply_edits(&self.text, edits)?;
        let changed = updated != self.text;
        self.text = updated;
        Ok(changed)
    }

    /// End of the section for `id` extended over decimal siblings that follow it.
    fn insertion_point_after(&self, id: &UnitId) -> Option<usize> {
        let headers = self.units();
        let pos = headers.iter().position(|h| h.id == *id)?;
        let mut last = headers[pos].id;
        for h in &headers[pos + 1..] {
            if h.id.major == id.major && h.id.is_decimal() && h.id > *id {
                last = h.id;
            } else {
                break;
            }
        }
        self.section(&last).map(|s| s.end)
    }

    /// Insert a detail section after `after` (and any decimal siblings following it), or
    /// after the last unit section when `after` is `None`.
    pub fn insert_section(&mut self, after: Option<&UnitId>, section: &str) -> Result<(), PlanError> {
        let pos = match after {
            Some(id) => self.insertion_point_after(id).ok_or_else(|| {
                PlanError::Guard(format!("unit {id} has no detail section in the roadmap"))
            })?,
            None => match self.units().last() {
                Some(last) => self.section(&last.id).map(|s| s.end).unwrap_or(self.text.len()),
                None => self
                    .headings()
                    .into_iter()
                    .find(|h| h.text.eq_ignore_ascii_case("Unit Details"))
                    .map(|h| h.span.end)
                    .unwrap_or(self.text.len()),
            },
        };
        let mut insertion = String::new();
        if pos > 0 && !self.text[..pos].ends_with('\n') {
            insertion.push('\n');
        }
        if pos > 0 && !self.text[..pos].ends_with("\n\n") {
            insertion.push('\n');
        }
        insertion.push_str(section);
        self.text = Span::at(pos).replace(&self.text, &insertion);
        Ok(())
    }

    /// Insert a checklist line after `after`'s entry (and following decimal siblings), or
    /// after the last entry.
    pub fn insert_checklist_entry(&mut self, after: Option<&UnitId>, line: &str) {
        let entries = self.checklist();
        let anchor = match after {
            Some(id) => entries
                .iter()
                .position(|c| c.id == *id)
                .map(|pos| {
                    let mut last = pos;
                    while let Some(next) = entries.get(last + 1) {
                        if next.id.major == id.major && next.id.is_decimal() && next.id > *id {
                            last += 1;
                        } else {
                            break;
                        }
                    }
                    entries[last].span.end
                }),
            None => entries.last().map(|c| c.span.end),
        };
        let pos = anchor.or_else(|| {
            self.headings()
                .into_iter()
                .find(|h| h.level == 2 && h.text.eq_ignore_ascii_case("Units"))
                .map(|h| h.span.end)
        });
        match pos {
            Some(pos) => {
                let mut insertion = String::new();
                if anchor.is_none() {
                    insertion.push('\n');
                } else if !self.text[..pos].ends_with('\n') {
                    insertion.push('\n');
                }
                insertion.push_str(line);
                self.text = Span::at(pos).replace(&self.text, &insertion);
            }
            None => tracing::warn!("Roadmap has no unit checklist; entry not added"),
        }
    }

    /// Insert a progress row after `after`'s row (and following decimal siblings), or after
    /// the last row. Roadmaps without a progress table are left alone.
    pub fn insert_progress_row(&mut self, after: Option<&UnitId>, line: &str) {
        let rows = self.progress_rows();
        let anchor = match after {
            Some(id) => rows.iter().position(|r| r.id == *id).map(|pos| {
                let mut last = pos;
                while let Some(next) = rows.get(last + 1) {
                    if next.id.major == id.major && next.id.is_decimal() && next.id > *id {
                        last += 1;
                    } else {
                        break;
                    }
                }
                rows[last].span.end
            }),
            None => rows.last().map(|r| r.span.end),
        };
        let pos = anchor.or_else(|| self.empty_progress_table_end());
        match pos {
            Some(pos) => {
                let mut insertion = String::new();
                if !self.text[..pos].ends_with('\n') {
                    insertion.push('\n');
                }
                insertion.push_str(line);
                self.text = Span::at(pos).replace(&self.text, &insertion);
            }
            None => tracing::debug!("Roadmap has no progress table; row not added"),
        }
    }

    /// End of the separator line of a progress table that has no unit rows yet.
    fn empty_progress_table_end(&self) -> Option<usize> {
        let progress = self
            .headings()
            .into_iter()
            .find(|h| h.text.eq_ignore_ascii_case("Progress"))?;
        lines(&self.text)
            .filter(|(span, _)| span.start >= progress.span.end)
            .find(|(_, line)| {
                let t = line.trim();
                t.starts_with('|') && t.contains("---")
            })
            .map(|(span, _)| span.end)
    }

    /// Drop the detail section, checklist entry and progress row of `id`.
    pub fn remove_unit(&mut self, id: &UnitId) -> Result<bool, PlanError> {
        let mut edits = Vec::new();
        if let Some(section) = self.section(id) {
            edits.push((section, String::new()));
        }
        if let Some(entry) = self.checklist().into_iter().find(|c| c.id == *id) {
            edits.push((entry.span, String::new()));
        }
        if let Some(row) = self.progress_rows().into_iter().find(|r| r.id == *id) {
            edits.push((row.span, String::new()));
        }
        if edits.is_empty() {
            return Ok(false);
        }
        self.text = apply_edits(&self.text, edits)?;
        tracing::info!("Removed unit {} from the roadmap", id);
        Ok(true)
    }

    /// Strip `removed` from every `Depends on` field. A field left with no ids becomes
    /// `Nothing`. Returns the number of rewritten fields.
    pub fn drop_dependency(&mut self, removed: &UnitId) -> Result<usize, PlanError> {
        let mut edits = Vec::new();
        for caps in DEPENDS_ON.captures_iter(&self.text) {
            let Some(value) = caps.get(1) else {
                continue;
            };
            let ids = parse_depends(value.as_str());
            if !ids.contains(removed) {
                continue;
            }
            let remaining: Vec<String> = ids
                .iter()
                .filter(|id| *id != removed)
                .map(|id| format!("Unit {}", id.display_short()))
                .collect();
            let replacement = if remaining.is_empty() {
                "Nothing".to_string()
            } else {
                remaining.join(", ")
            };
            edits.push((Span::new(value.start(), value.end()), replacement));
        }
        let count = edits.len();
        if count > 0 {
            self.text = apply_edits(&self.text, edits)?;
            tracing::info!("Dropped unit {} from {} dependency field(s)", removed, count);
        }
        Ok(count)
    }

    /// Rewrite shifted unit ids at structural positions: detail headers, checklist entries,
    /// progress-table first cells, `Depends on` fields and `NN-MM` job ids. Free prose is
    /// left alone. Returns the number of rewritten occurrences.
    pub fn renumber(&mut self, map: &BTreeMap<UnitId, UnitId>) -> Result<usize, PlanError> {
        if map.is_empty() {
            return Ok(0);
        }
        fn push(edits: &mut BTreeMap<Span, String>, span: Span, text: String) {
            if !edits.keys().any(|existing| existing.overlaps(&span)) {
                edits.insert(span, text);
            }
        }
        let mut edits: BTreeMap<Span, String> = BTreeMap::new();

        for header in self.units() {
            let Some(new) = map.get(&header.id) else {
                continue;
            };
            let line = header.span.slice(&self.text);
            if let Some(m) = HEADER_ID.captures(line).and_then(|c| c.get(1)) {
                push(
                    &mut edits,
                    Span::new(header.span.start + m.start(), header.span.start + m.end()),
                    render_like(m.as_str(), new),
                );
            }
        }
        for entry in self.checklist() {
            if let Some(new) = map.get(&entry.id) {
                let original = entry.id_span.slice(&self.text);
                push(&mut edits, entry.id_span, render_like(original, new));
            }
        }
        for row in self.progress_rows() {
            if let Some(new) = map.get(&row.id) {
                let original = row.id_span.slice(&self.text);
                push(&mut edits, row.id_span, render_like(original, new));
            }
        }
        for caps in DEPENDS_ON.captures_iter(&self.text) {
            let Some(value) = caps.get(1) else {
                continue;
            };
            for number in NUMBER.captures_iter(value.as_str()) {
                let Some(m) = number.get(1) else {
                    continue;
                };
                if let Some(new) = UnitId::from_str(m.as_str()).ok().and_then(|id| map.get(&id)) {
                    push(
                        &mut edits,
                        Span::new(value.start() + m.start(), value.start() + m.end()),
                        render_like(m.as_str(), new),
                    );
                }
            }
        }
        for caps in COMPOUND_JOB_ID.captures_iter(&self.text) {
            let Some(unit) = caps.get(1) else {
                continue;
            };
            if let Some(new) = UnitId::from_str(unit.as_str()).ok().and_then(|id| map.get(&id)) {
                push(
                    &mut edits,
                    Span::new(unit.start(), unit.end()),
                    new.to_string(),
                );
            }
        }

        let count = edits.len();
        self.text = apply_edits(&self.text, edits.into_iter().collect())?;
        tracing::info!("Rewrote {} unit reference(s) in the roadmap", count);
        Ok(count)
    }
}

fn line_ending(line: &str) -> &'static str {
    if line.ends_with("\r\n") {
        "\r\n"
    } else if line.ends_with('\n') {
        "\n"
    } else {
        ""
    }
}

fn capture_field(pattern: &Regex, section: &str) -> Option<String> {
    pattern
        .captures(section)
        .map(|c: Captures<'_>| c[1].trim().to_string())
        .filter(|v| !v.is_empty())
}

fn split_requirements(raw: &str) -> Vec<String> {
    raw.trim_matches(|c| c == '[' || c == ']')
        .split(',')
        .map(|r| r.trim().trim_matches('`').to_string())
        .filter(|r| !r.is_empty() && !r.eq_ignore_ascii_case("none") && r != "TBD")
        .collect()
}

/// Numbered items following the `**Success Criteria**` label.
fn success_criteria(section: &str) -> Vec<String> {
    let Some(label) = SUCCESS_CRITERIA.find(section) else {
        return Vec::new();
    };
    let after = line_at(section, label.start()).end;
    let mut items = Vec::new();
    for (_, line) in lines(&section[after..]) {
        if line.trim().is_empty() {
            if items.is_empty() {
                continue;
            }
            break;
        }
        match SUCCESS_ITEM.captures(line) {
            Some(caps) => items.push(caps[1].to_string()),
            None => break,
        }
    }
    items
}

/// Human-readable progress: a table or a single bar.
pub fn render_progress(analysis: &RoadmapAnalysis, format: ProgressFormat) -> String {
    let mut out = String::new();
    match format {
        ProgressFormat::Bar => {
            let _ = write!(
                out,
                "{} ({}/{} jobs, {}/{} units)",
                progress_bar(analysis.progress_percent),
                analysis.total_summaries,
                analysis.total_jobs,
                analysis.completed_units,
                analysis.unit_count
            );
        }
        ProgressFormat::Json => {
            out = serde_json::to_string_pretty(analysis).unwrap_or_default();
        }
        ProgressFormat::Table => {
            let _ = writeln!(out, "| Unit | Name | Jobs | Status |");
            let _ = writeln!(out, "|------|------|------|--------|");
            for unit in &analysis.units {
                let status = if unit.completed() {
                    "Complete".to_string()
                } else {
                    serde_json::to_value(unit.disk_status)
                        .ok()
                        .and_then(|v| v.as_str().map(str::to_string))
                        .unwrap_or_default()
                };
                let _ = writeln!(
                    out,
                    "| {} | {} | {}/{} | {} |",
                    unit.id, unit.name, unit.summaries, unit.jobs, status
                );
            }
            let _ = write!(out, "\nProgress: {}%", analysis.progress_percent);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::helpers::{mem_repo, roadmap_text, seed_project, FixtureUnit};

    fn three_units() -> Vec<FixtureUnit> {
        vec![
            FixtureUnit::new("1", "Foundation").checked().jobs(2, 2),
            FixtureUnit::new("2", "Auth").depends("Unit 1").jobs(1, 0),
            FixtureUnit::new("3", "Billing").depends("Unit 1, Unit 2").jobs(2, 1),
        ]
    }

    #[test]
    fn reads_both_representations() {
        let roadmap = Roadmap::new(roadmap_text(&three_units()));
        let headers = roadmap.units();
        assert_eq!(headers.len(), 3);
        assert_eq!(headers[1].name, "Auth");
        assert_eq!(headers[1].level, 3);
        let checklist = roadmap.checklist();
        assert!(checklist[0].checked);
        assert_eq!(checklist[2].description, "Billing work");
        let rows = roadmap.progress_rows();
        assert_eq!(rows[2].done, 1);
        assert_eq!(rows[2].total, 2);
        assert_eq!(roadmap.max_integer(), Some(3));
    }

    #[test]
    fn get_unit_extracts_fields() {
        let roadmap = Roadmap::new(roadmap_text(&three_units()));
        let unit = roadmap.get_unit(&UnitId::integer(3));
        assert!(unit.found);
        assert_eq!(unit.goal.as_deref(), Some("Deliver billing"));
        assert_eq!(
            unit.depends_on_ids,
            vec![UnitId::integer(1), UnitId::integer(2)]
        );
        assert_eq!(unit.requirements, vec!["REQ-03"]);
        assert_eq!(
            unit.success_criteria,
            vec!["Billing works", "Billing is documented"]
        );
        assert!(unit.section.unwrap().starts_with("### Unit 3: Billing\n"));
    }

    #[test]
    fn checklist_only_unit_is_malformed() {
        let text = "## Units\n\n- [ ] **Unit 1: One**\n- [ ] **Unit 2: Two**\n\n## Unit Details\n\n### Unit 1: One\n**Goal:** First\n";
        let roadmap = Roadmap::new(text);
        let missing = roadmap.get_unit(&UnitId::integer(2));
        assert!(!missing.found);
        assert!(missing.malformed);
        let present = roadmap.get_unit(&UnitId::integer(1));
        assert!(present.found);
        assert_eq!(present.goal.as_deref(), Some("First"));
        let absent = roadmap.get_unit(&UnitId::integer(7));
        assert!(!absent.found && !absent.malformed);
    }

    #[test]
    fn section_stops_at_higher_ranked_heading_and_ignores_code_fences() {
        let text = "## Unit Details\n\n### Unit 1: One\nbody\n```\n### Unit 9: Fake\n```\n#### Notes\nmore\n## Progress\ntail\n";
        let roadmap = Roadmap::new(text);
        assert_eq!(roadmap.units().len(), 1);
        let span = roadmap.section(&UnitId::integer(1)).unwrap();
        let section = span.slice(roadmap.text());
        assert!(section.contains("#### Notes"));
        assert!(section.ends_with("more\n"));
    }

    #[test]
    fn depends_sentinels_mean_none() {
        assert!(parse_depends("Nothing (first unit)").is_empty());
        assert!(parse_depends("None").is_empty());
        assert!(parse_depends("N/A").is_empty());
        assert!(parse_depends("-").is_empty());
        assert_eq!(
            parse_depends("Unit 2.1 and Unit 3"),
            vec![UnitId::decimal(2, 1), UnitId::integer(3)]
        );
    }

    #[test]
    fn update_job_progress_rewrites_only_matched_spans() {
        let repo = mem_repo();
        seed_project(&repo, &three_units());
        let mut roadmap = Roadmap::load(&repo).unwrap();
        let before = roadmap.text().to_string();
        // Finish unit 3 on disk.
        let lookup_dir = repo.units_dir().join("03-billing");
        repo.fs()
            .write(&lookup_dir.join("03-02-SUMMARY.md"), "---\nunit: 03\n---\n")
            .unwrap();
        let lookup = DocumentIndex::new(&repo).find_unit("3").unwrap();
        let update = roadmap
            .update_job_progress(&UnitId::integer(3), &lookup, "2026-02-01")
            .unwrap();
        assert!(update.complete);
        assert_eq!(update.status, "Complete");

        let text = roadmap.text();
        assert!(text.contains("| 3. Billing | 2/2 | Complete | 2026-02-01 |"));
        assert!(text.contains("- [x] 03-02-JOB.md - Job 2"));
        assert!(text.contains("- [x] **Unit 3: Billing**"));
        // Unit 2 is untouched.
        let unit2_before = Roadmap::new(before.clone())
            .section(&UnitId::integer(2))
            .map(|s| s.slice(&before).to_string());
        let unit2_after = roadmap
            .section(&UnitId::integer(2))
            .map(|s| s.slice(roadmap.text()).to_string());
        assert_eq!(unit2_before, unit2_after);
        assert_eq!(before.lines().count(), text.lines().count());
    }

    #[test]
    fn analyze_reports_disk_state() {
        let repo = mem_repo();
        let mut units = three_units();
        units.push(FixtureUnit::new("4", "Reports").without_directory());
        seed_project(&repo, &units);
        let analysis = Roadmap::load(&repo)
            .unwrap()
            .analyze(&DocumentIndex::new(&repo))
            .unwrap();
        assert_eq!(analysis.unit_count, 4);
        assert_eq!(analysis.units[0].disk_status, DiskStatus::Complete);
        assert_eq!(analysis.units[1].disk_status, DiskStatus::Planned);
        assert_eq!(analysis.units[2].disk_status, DiskStatus::Partial);
        assert_eq!(analysis.units[3].disk_status, DiskStatus::NoDirectory);
        assert_eq!(analysis.current_unit, Some(UnitId::integer(2)));
        assert_eq!(analysis.next_unit, Some(UnitId::integer(3)));
        assert_eq!(analysis.total_jobs, 5);
        assert_eq!(analysis.total_summaries, 3);
        assert_eq!(analysis.progress_percent, 60);
        assert!(analysis.missing_details.is_empty());
    }

    #[test]
    fn renumber_touches_structural_positions_only() {
        let text = "## Units\n\n- [ ] **Unit 1: A**\n- [ ] **Unit 3: C** - after unit 3 prose\n\n## Unit Details\n\n### Unit 1: A\n**Depends on**: Nothing\n\n### Unit 3: C\n**Goal**: Ship 3 things\n**Depends on**: Unit 1, Unit 3.1\n- [ ] 03-01-JOB.md - first\n\n## Progress\n\n| Unit | Jobs Complete | Status | Completed |\n|---|---|---|---|\n| 3. C | 0/1 | Planned | - |\n";
        let mut roadmap = Roadmap::new(text);
        let map = BTreeMap::from([
            (UnitId::integer(3), UnitId::integer(2)),
            (UnitId::decimal(3, 1), UnitId::decimal(2, 1)),
        ]);
        let count = roadmap.renumber(&map).unwrap();
        let out = roadmap.text();
        assert!(out.contains("- [ ] **Unit 2: C** - after unit 3 prose"));
        assert!(out.contains("### Unit 2: C\n"));
        assert!(out.contains("**Goal**: Ship 3 things"));
        assert!(out.contains("**Depends on**: Unit 1, Unit 2.1"));
        assert!(out.contains("- [ ] 02-01-JOB.md - first"));
        assert!(out.contains("| 2. C | 0/1 |"));
        assert_eq!(count, 5);
    }

    #[test]
    fn insert_section_goes_after_decimal_siblings() {
        let units = vec![
            FixtureUnit::new("1", "A"),
            FixtureUnit::new("1.1", "A fix"),
            FixtureUnit::new("2", "B"),
        ];
        let mut roadmap = Roadmap::new(roadmap_text(&units));
        let new_id = UnitId::decimal(1, 2);
        roadmap
            .insert_section(
                Some(&UnitId::integer(1)),
                &section_text(&new_id, "Urgent", "", "Unit 1", true),
            )
            .unwrap();
        roadmap.insert_checklist_entry(
            Some(&UnitId::integer(1)),
            &checklist_line(&new_id, "Urgent", "", true),
        );
        roadmap.insert_progress_row(Some(&UnitId::integer(1)), &progress_row_line(&new_id, "Urgent"));
        let order: Vec<UnitId> = roadmap.units().into_iter().map(|h| h.id).collect();
        assert_eq!(
            order,
            vec![
                UnitId::integer(1),
                UnitId::decimal(1, 1),
                UnitId::decimal(1, 2),
                UnitId::integer(2)
            ]
        );
        let checklist: Vec<UnitId> = roadmap.checklist().into_iter().map(|c| c.id).collect();
        assert_eq!(checklist, order);
        let rows: Vec<UnitId> = roadmap.progress_rows().into_iter().map(|r| r.id).collect();
        assert_eq!(rows, order);
        assert!(roadmap.units()[2].inserted);
        assert!(roadmap.get_unit(&new_id).found);
    }

    #[test]
    fn insert_after_unknown_unit_is_refused() {
        let mut roadmap = Roadmap::new(roadmap_text(&three_units()));
        let err = roadmap
            .insert_section(Some(&UnitId::integer(9)), "### Unit 9.1: X\n")
            .unwrap_err();
        assert!(matches!(err, PlanError::Guard(_)));
    }

    #[test]
    fn remove_unit_drops_all_three_forms() {
        let mut roadmap = Roadmap::new(roadmap_text(&three_units()));
        assert!(roadmap.remove_unit(&UnitId::integer(2)).unwrap());
        assert!(!roadmap.text().contains("Unit 2: Auth"));
        assert!(!roadmap.text().contains("| 2. Auth"));
        assert_eq!(roadmap.units().len(), 2);
        assert!(roadmap.get_unit(&UnitId::integer(3)).found);
    }

    #[test]
    fn progress_renders_as_bar() {
        let repo = mem_repo();
        seed_project(&repo, &three_units());
        let analysis = Roadmap::load(&repo)
            .unwrap()
            .analyze(&DocumentIndex::new(&repo))
            .unwrap();
        let bar = render_progress(&analysis, ProgressFormat::Bar);
        assert!(bar.starts_with("[██████░░░░] 60%"));
        let table = render_progress(&analysis, ProgressFormat::Table);
        assert!(table.contains("| 01 | Foundation | 2/2 | Complete |"));
    }
}
