//! Drift detection between the roadmap and the file tree, plus limited self-repair.
//!
//! Each check is independent and reports [`Finding`]s rather than failing; only a missing
//! planning root is fatal. Repair is deliberately narrow: it recreates the configuration
//! document and regenerates the state snapshot, and never touches unit content.
use serde::Serialize;
use std::{collections::BTreeSet, fmt, str::FromStr};

use crate::{
    config::{ConfigProvider, PlanConfig},
    error::PlanError,
    frontmatter,
    ids::{parse_dir_name, slug, UnitId},
    index::DocumentIndex,
    repo::{Repository, PROJECT_FILE, ROADMAP_FILE, STATE_FILE},
    roadmap::{Roadmap, RoadmapAnalysis},
    state::{self, StateDocument},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
    Info,
}

/// One named problem found by a check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Finding {
    pub code: &'static str,
    pub severity: Severity,
    pub message: String,
    pub fix: Option<String>,
    pub repairable: bool,
}

impl Finding {
    pub fn error(code: &'static str, message: impl Into<String>) -> Self {
        Self::new(code, Severity::Error, message)
    }

    pub fn warning(code: &'static str, message: impl Into<String>) -> Self {
        Self::new(code, Severity::Warning, message)
    }

    pub fn info(code: &'static str, message: impl Into<String>) -> Self {
        Self::new(code, Severity::Info, message)
    }

    fn new(code: &'static str, severity: Severity, message: impl Into<String>) -> Self {
        Finding {
            code,
            severity,
            message: message.into(),
            fix: None,
            repairable: false,
        }
    }

    pub fn with_fix(mut self, fix: impl Into<String>) -> Self {
        self.fix = Some(fix.into());
        self
    }

    pub fn repairable(mut self) -> Self {
        self.repairable = true;
        self
    }
}

impl fmt::Display for Finding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Broken,
}

impl HealthStatus {
    fn of(findings: &[Finding]) -> Self {
        if findings.iter().any(|f| f.severity == Severity::Error) {
            HealthStatus::Broken
        } else if findings.iter().any(|f| f.severity == Severity::Warning) {
            HealthStatus::Degraded
        } else {
            HealthStatus::Healthy
        }
    }
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HealthStatus::Healthy => write!(f, "healthy"),
            HealthStatus::Degraded => write!(f, "degraded"),
            HealthStatus::Broken => write!(f, "broken"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConsistencyReport {
    pub passed: bool,
    pub findings: Vec<Finding>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HealthReport {
    pub status: HealthStatus,
    pub errors: usize,
    pub warnings: usize,
    pub info: usize,
    pub findings: Vec<Finding>,
    pub repairs_performed: Vec<String>,
}

impl HealthReport {
    fn new(findings: Vec<Finding>, repairs_performed: Vec<String>) -> Self {
        let count = |s: Severity| findings.iter().filter(|f| f.severity == s).count();
        HealthReport {
            status: HealthStatus::of(&findings),
            errors: count(Severity::Error),
            warnings: count(Severity::Warning),
            info: count(Severity::Info),
            findings,
            repairs_performed,
        }
    }
}

/// Shared inputs for the checks, loaded once.
struct Survey<'a> {
    repo: &'a Repository,
    index: DocumentIndex<'a>,
    analysis: Option<RoadmapAnalysis>,
}

impl<'a> Survey<'a> {
    fn load(repo: &'a Repository) -> Result<Self, PlanError> {
        repo.require_planning_dir()?;
        let index = DocumentIndex::new(repo);
        let analysis = match Roadmap::load(repo) {
            Ok(roadmap) => Some(roadmap.analyze(&index)?),
            Err(PlanError::NotFound(_)) => None,
            Err(e) => return Err(e),
        };
        Ok(Survey {
            repo,
            index,
            analysis,
        })
    }

    fn roadmap_ids(&self) -> BTreeSet<UnitId> {
        self.analysis
            .iter()
            .flat_map(|a| a.units.iter().map(|u| u.id))
            .collect()
    }

    /// (a) roadmap units without a directory.
    fn missing_directories(&self, findings: &mut Vec<Finding>) {
        let Some(analysis) = &self.analysis else {
            return;
        };
        for unit in analysis.units.iter().filter(|u| u.directory.is_none()) {
            findings.push(
                Finding::warning(
                    "unit-missing-directory",
                    format!("Unit {} ({}) is in the roadmap but has no directory", unit.id, unit.name),
                )
                .with_fix(format!("mkdir .planning/units/{}-{}", unit.id, slug(&unit.name))),
            );
        }
    }

    /// (b) directories the roadmap does not mention.
    fn unlisted_directories(&self, findings: &mut Vec<Finding>) -> Result<(), PlanError> {
        if self.analysis.is_none() {
            return Ok(());
        }
        let known = self.roadmap_ids();
        for unit in self.index.list_units()? {
            if !known.contains(&unit.id) {
                findings.push(
                    Finding::warning(
                        "unit-not-in-roadmap",
                        format!("Directory {} has no roadmap entry", unit.name),
                    )
                    .with_fix(format!("Add Unit {} to ROADMAP.md or remove the directory", unit.id.display_short())),
                );
            }
        }
        Ok(())
    }

    /// (c) gaps in the integer sequence across roadmap and directories.
    fn unit_number_gaps(&self, findings: &mut Vec<Finding>) -> Result<(), PlanError> {
        let mut majors: BTreeSet<u32> = self.roadmap_ids().into_iter().map(|id| id.major).collect();
        majors.extend(self.index.list_units()?.into_iter().map(|u| u.id.major));
        let (Some(first), Some(last)) = (majors.first().copied(), majors.last().copied()) else {
            return Ok(());
        };
        for missing in (first..=last).filter(|n| !majors.contains(n)) {
            findings.push(Finding::warning(
                "unit-number-gap",
                format!("Unit {missing} is missing between units {first} and {last}"),
            ));
        }
        Ok(())
    }

    /// (d) job number gaps and (e) orphan summaries, per unit directory.
    fn job_files(&self, findings: &mut Vec<Finding>) -> Result<(), PlanError> {
        for unit in self.index.list_units()? {
            let jobs = self.index.job_ids(&unit.path)?;
            let numbers: BTreeSet<u32> = jobs
                .iter()
                .filter(|(_, has_job, _)| *has_job)
                .map(|(id, _, _)| id.number)
                .collect();
            if let Some(max) = numbers.last().copied() {
                for missing in (1..=max).filter(|n| !numbers.contains(n)) {
                    findings.push(Finding::warning(
                        "job-number-gap",
                        format!("Unit {} is missing job {:02}", unit.id, missing),
                    ));
                }
            }
            for (id, _, _) in jobs.iter().filter(|(_, has_job, has_summary)| *has_summary && !has_job) {
                findings.push(
                    Finding::warning(
                        "orphan-summary",
                        format!("{} has no matching job document", id.summary_file()),
                    )
                    .with_fix(format!("Restore {} or delete the summary", id.job_file())),
                );
            }
        }
        Ok(())
    }

    /// Units present in only one of the roadmap's two representations.
    fn roadmap_forms(&self, findings: &mut Vec<Finding>) {
        let Some(analysis) = &self.analysis else {
            return;
        };
        for id in &analysis.missing_details {
            findings.push(
                Finding::error(
                    "roadmap-malformed",
                    format!("Unit {id} is in the roadmap checklist but has no detail section"),
                )
                .with_fix(format!("Add a '### Unit {}: ...' section", id.display_short())),
            );
        }
        for id in &analysis.missing_checklist {
            findings.push(
                Finding::error(
                    "roadmap-malformed",
                    format!("Unit {id} has a detail section but no checklist entry"),
                )
                .with_fix(format!("Add '- [ ] **Unit {}: ...**' to the checklist", id.display_short())),
            );
        }
    }

    fn job_waves(&self, findings: &mut Vec<Finding>) -> Result<(), PlanError> {
        for unit in self.index.list_units()? {
            for (id, has_job, _) in self.index.job_ids(&unit.path)? {
                if !has_job {
                    continue;
                }
                let path = unit.path.join(id.job_file());
                let Some(content) = self.repo.fs().read_opt(&path) else {
                    continue;
                };
                if !frontmatter::extract(&content).contains_key("wave") {
                    findings.push(Finding::warning(
                        "job-missing-wave",
                        format!("{} has no wave in its metadata", id.job_file()),
                    ));
                }
            }
        }
        Ok(())
    }

    fn invalid_directories(&self, findings: &mut Vec<Finding>) -> Result<(), PlanError> {
        for name in self.index.unit_dirs()? {
            let valid = match parse_dir_name(&name) {
                Some((_, dir_slug)) => !dir_slug.is_empty() && slug(&dir_slug) == dir_slug,
                None => false,
            };
            if !valid {
                findings.push(Finding::warning(
                    "invalid-unit-directory",
                    format!("Directory units/{name} does not match '{{id}}-{{slug}}'"),
                ));
            }
        }
        Ok(())
    }

    /// (f) required top-level documents.
    fn documents(&self, findings: &mut Vec<Finding>) {
        let fs = self.repo.fs();
        let required = [
            (PROJECT_FILE, self.repo.project_path()),
            (ROADMAP_FILE, self.repo.roadmap_path()),
            (STATE_FILE, self.repo.state_path()),
        ];
        for (name, path) in required {
            if fs.exists(&path) {
                continue;
            }
            let finding = Finding::error("missing-document", format!("{name} is missing"));
            findings.push(if name == STATE_FILE {
                finding.with_fix("Run validate health --repair").repairable()
            } else {
                finding
            });
        }
    }

    /// (g) the configuration document.
    fn config(&self, findings: &mut Vec<Finding>) {
        let provider = ConfigProvider::new(self.repo);
        if !self.repo.fs().exists(&provider.path()) {
            findings.push(
                Finding::warning("config-missing", "config.toml is missing; defaults apply")
                    .with_fix("Run config init or validate health --repair")
                    .repairable(),
            );
            return;
        }
        if let Err(e) = provider.stored() {
            findings.push(
                Finding::error("config-malformed", format!("config.toml cannot be read: {e}"))
                    .with_fix("Run validate health --repair to restore defaults")
                    .repairable(),
            );
        }
    }

    /// (h) the snapshot's current unit must exist on disk.
    fn state_unit(&self, findings: &mut Vec<Finding>) -> Result<(), PlanError> {
        let doc = match StateDocument::load(self.repo) {
            Ok(doc) => doc,
            Err(PlanError::NotFound(_)) => return Ok(()),
            Err(e) => return Err(e),
        };
        let Some(raw) = doc.field(state::CURRENT_UNIT)? else {
            return Ok(());
        };
        // "3 of 8" style values carry the id first.
        let Some(first) = raw.split_whitespace().next() else {
            return Ok(());
        };
        let Ok(id) = UnitId::from_str(first) else {
            return Ok(());
        };
        if self.index.current_unit(&id)?.is_none() {
            findings.push(
                Finding::warning(
                    "state-unit-missing",
                    format!("STATE.md names unit {id}, which has no directory"),
                )
                .with_fix("Run validate health --repair to regenerate STATE.md")
                .repairable(),
            );
        }
        Ok(())
    }
}

/// Structural agreement between roadmap and disk: checks (a)-(e), roadmap forms and waves.
pub fn consistency(repo: &Repository) -> Result<ConsistencyReport, PlanError> {
    let survey = Survey::load(repo)?;
    let mut findings = Vec::new();
    if survey.analysis.is_none() {
        findings.push(Finding::error("missing-document", format!("{ROADMAP_FILE} is missing")));
    }
    survey.missing_directories(&mut findings);
    survey.unlisted_directories(&mut findings)?;
    survey.unit_number_gaps(&mut findings)?;
    survey.job_files(&mut findings)?;
    survey.roadmap_forms(&mut findings);
    survey.job_waves(&mut findings)?;
    tracing::debug!("Consistency check produced {} findings", findings.len());
    Ok(ConsistencyReport {
        passed: !findings.iter().any(|f| f.severity == Severity::Error),
        findings,
    })
}

fn health_findings(survey: &Survey<'_>) -> Result<Vec<Finding>, PlanError> {
    let mut findings = Vec::new();
    survey.documents(&mut findings);
    survey.config(&mut findings);
    survey.state_unit(&mut findings)?;
    survey.invalid_directories(&mut findings)?;
    survey.missing_directories(&mut findings);
    survey.unlisted_directories(&mut findings)?;
    survey.unit_number_gaps(&mut findings)?;
    survey.job_files(&mut findings)?;
    survey.roadmap_forms(&mut findings);
    survey.job_waves(&mut findings)?;
    Ok(findings)
}

/// Every check. With `repair`, repairable findings are fixed and the checks re-run.
pub fn health(repo: &Repository, repair: bool) -> Result<HealthReport, PlanError> {
    let survey = Survey::load(repo)?;
    let findings = health_findings(&survey)?;
    if !repair || !findings.iter().any(|f| f.repairable) {
        return Ok(HealthReport::new(findings, Vec::new()));
    }

    let mut repairs = Vec::new();
    let codes: BTreeSet<&str> = findings.iter().filter(|f| f.repairable).map(|f| f.code).collect();
    if codes.contains("config-missing") || codes.contains("config-malformed") {
        let provider = ConfigProvider::new(repo);
        if codes.contains("config-malformed") {
            let backup = provider.path().with_extension("toml.bak");
            repo.fs().copy(&provider.path(), &backup)?;
            repairs.push(format!("Backed up config to {}", repo.display_path(&backup)));
        }
        provider.save(&PlanConfig::default())?;
        tracing::info!("Recreated default config");
        repairs.push("Recreated config.toml with defaults".to_string());
    }
    if codes.contains("state-unit-missing") || codes.contains("missing-document") {
        let backed_up = state::regenerate(repo, survey.analysis.as_ref())?;
        repairs.push(if backed_up {
            "Regenerated STATE.md (previous copy in STATE.md.bak)".to_string()
        } else {
            "Regenerated STATE.md".to_string()
        });
    }

    let survey = Survey::load(repo)?;
    Ok(HealthReport::new(health_findings(&survey)?, repairs))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::helpers::{mem_repo, seed_project, FixtureUnit};

    fn codes(findings: &[Finding]) -> Vec<&'static str> {
        findings.iter().map(|f| f.code).collect()
    }

    #[test]
    fn healthy_fixture_has_no_findings() {
        let repo = mem_repo();
        seed_project(
            &repo,
            &[FixtureUnit::new("1", "Base").jobs(2, 1), FixtureUnit::new("2", "Next")],
        );
        let report = health(&repo, false).unwrap();
        assert_eq!(report.findings, vec![]);
        assert_eq!(report.status, HealthStatus::Healthy);
        assert!(consistency(&repo).unwrap().passed);
    }

    #[test]
    fn drift_produces_distinct_findings() {
        let repo = mem_repo();
        seed_project(
            &repo,
            &[
                FixtureUnit::new("1", "Base"),
                FixtureUnit::new("2", "Next").without_directory(),
            ],
        );
        repo.fs()
            .create_dir_all(&repo.units_dir().join("04-stray"))
            .unwrap();
        let dir = repo.units_dir().join("01-base");
        repo.fs().write(&dir.join("01-02-JOB.md"), "---\nunit: 01\n---\n").unwrap();
        repo.fs().write(&dir.join("01-03-SUMMARY.md"), "done").unwrap();

        let report = consistency(&repo).unwrap();
        let found = codes(&report.findings);
        for code in [
            "unit-missing-directory",
            "unit-not-in-roadmap",
            "unit-number-gap",
            "job-number-gap",
            "orphan-summary",
            "job-missing-wave",
        ] {
            assert!(found.contains(&code), "missing {code} in {found:?}");
        }
        assert!(report.passed);
        assert_eq!(
            health(&repo, false).unwrap().status,
            HealthStatus::Degraded
        );
    }

    #[test]
    fn checklist_only_unit_is_malformed() {
        let repo = mem_repo();
        seed_project(&repo, &[FixtureUnit::new("1", "Base")]);
        let text = repo.fs().read_to_string(&repo.roadmap_path()).unwrap();
        let text = text.replace(
            "- [ ] **Unit 1: Base** - Base work\n",
            "- [ ] **Unit 1: Base** - Base work\n- [ ] **Unit 2: Ghost** - Ghost work\n",
        );
        repo.fs().write(&repo.roadmap_path(), &text).unwrap();
        let report = consistency(&repo).unwrap();
        assert!(codes(&report.findings).contains(&"roadmap-malformed"));
        assert!(!report.passed);
    }

    #[test]
    fn repair_only_touches_config_and_state() {
        let repo = mem_repo();
        seed_project(&repo, &[FixtureUnit::new("1", "Base").jobs(1, 0)]);
        repo.fs().write(&repo.config_path(), "commit_docs = [oops").unwrap();
        let state = repo.fs().read_to_string(&repo.state_path()).unwrap();
        repo.fs()
            .write(&repo.state_path(), &state.replace("**Current Unit:** 01", "**Current Unit:** 07"))
            .unwrap();
        let job = repo.units_dir().join("01-base/01-01-JOB.md");
        let job_before = repo.fs().read_to_string(&job).unwrap();

        let before = health(&repo, false).unwrap();
        assert_eq!(before.status, HealthStatus::Broken);
        assert!(codes(&before.findings).contains(&"config-malformed"));
        assert!(codes(&before.findings).contains(&"state-unit-missing"));

        let after = health(&repo, true).unwrap();
        assert_eq!(after.repairs_performed.len(), 3);
        assert_eq!(after.status, HealthStatus::Healthy, "{:?}", after.findings);
        assert!(repo.fs().exists(&repo.state_path().with_extension("md.bak")));
        assert_eq!(repo.fs().read_to_string(&job).unwrap(), job_before);
        assert_eq!(
            state::snapshot(&repo).unwrap().current_unit.as_deref(),
            Some("01")
        );
    }

    #[test]
    fn missing_planning_root_is_fatal() {
        let repo = mem_repo();
        repo.fs().remove_dir_all(&repo.planning_dir()).unwrap();
        assert!(matches!(health(&repo, false), Err(PlanError::Structure(_))));
    }
}
