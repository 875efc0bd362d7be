use serde::{Deserialize, Serialize};
use std::{
    fmt::{Display, Formatter},
    path::PathBuf,
    str::FromStr,
};

use crate::{
    config::ConfigProvider,
    error::PlanError,
    frontmatter::{self, MetaValue},
    health, history,
    ids::UnitId,
    index::DocumentIndex,
    milestone, numbering,
    output::CommandOutput,
    repo::Repository,
    requirements,
    roadmap::{self, ProgressFormat, Roadmap},
    state::{self, Metric},
    verify::{self, Schema},
    workstreams,
};

/// One invocation of the planning engine. The command line maps onto this enum; every
/// operation runs through [`execute`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Op {
    StateLoad,
    /// A field, a section, or the whole snapshot.
    StateGet(Option<String>),
    StatePatch(Vec<(String, String)>),
    StateAdvanceJob,
    StateRecordMetric(Metric),
    StateAddDecision {
        unit: Option<String>,
        text: String,
    },
    StateAddBlocker(String),
    StateResolveBlocker(String),
    StateRecordSession {
        stopped_at: String,
        resume_file: Option<String>,
    },
    StateUpdateProgress,
    StateSnapshot,
    UnitFind(String),
    UnitNextDecimal(String),
    UnitAdd {
        name: String,
        goal: Option<String>,
        depends: Option<String>,
    },
    UnitInsert {
        after: String,
        name: String,
        goal: Option<String>,
    },
    UnitRemove {
        id: String,
        force: bool,
    },
    UnitComplete(String),
    RoadmapGetUnit(String),
    RoadmapAnalyze,
    RoadmapUpdateJobProgress(String),
    RoadmapProgress(ProgressFormat),
    RequirementsMarkComplete(Vec<String>),
    MilestoneComplete {
        version: String,
        name: Option<String>,
    },
    ValidateConsistency,
    ValidateHealth {
        repair: bool,
    },
    VerifyJobStructure(String),
    VerifyUnitCompleteness(String),
    VerifyArtifacts(String),
    VerifyKeyLinks(String),
    VerifyCommits(Vec<String>),
    VerifySummary(String),
    WorkstreamsAnalyze,
    WorkstreamsProvision {
        dry_run: bool,
    },
    WorkstreamsReconcile,
    FrontmatterGet {
        file: String,
        field: Option<String>,
    },
    FrontmatterSet {
        file: String,
        field: String,
        value: String,
    },
    FrontmatterMerge {
        file: String,
        data: String,
    },
    FrontmatterValidate {
        file: String,
        schema: Option<Schema>,
    },
    ConfigGet(String),
    ConfigSet {
        key: String,
        value: String,
    },
    ConfigInit,
    HistoryDigest,
    Commit {
        message: String,
        files: Vec<String>,
    },
}

impl Op {
    /// Does this operation write to the planning tree?
    pub fn mutates(&self) -> bool {
        !matches!(
            self,
            Op::StateLoad
                | Op::StateGet(_)
                | Op::StateSnapshot
                | Op::UnitFind(_)
                | Op::UnitNextDecimal(_)
                | Op::RoadmapGetUnit(_)
                | Op::RoadmapAnalyze
                | Op::RoadmapProgress(_)
                | Op::ValidateConsistency
                | Op::ValidateHealth { repair: false }
                | Op::VerifyJobStructure(_)
                | Op::VerifyUnitCompleteness(_)
                | Op::VerifyArtifacts(_)
                | Op::VerifyKeyLinks(_)
                | Op::VerifyCommits(_)
                | Op::VerifySummary(_)
                | Op::WorkstreamsAnalyze
                | Op::WorkstreamsProvision { dry_run: true }
                | Op::WorkstreamsReconcile
                | Op::FrontmatterGet { .. }
                | Op::FrontmatterValidate { .. }
                | Op::ConfigGet(_)
                | Op::HistoryDigest
        )
    }

    /// Operations on arbitrary documents, and `config init`, run without `.planning`.
    pub fn needs_planning_dir(&self) -> bool {
        !matches!(
            self,
            Op::FrontmatterGet { .. }
                | Op::FrontmatterSet { .. }
                | Op::FrontmatterMerge { .. }
                | Op::FrontmatterValidate { .. }
                | Op::VerifyJobStructure(_)
                | Op::VerifyArtifacts(_)
                | Op::VerifyKeyLinks(_)
                | Op::VerifyCommits(_)
                | Op::ConfigInit
        )
    }
}

impl Display for Op {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        match self {
            Op::StateLoad => write!(f, "state load"),
            Op::StateGet(key) => write!(f, "state get {}", key.as_deref().unwrap_or("")),
            Op::StatePatch(fields) => write!(
                f,
                "state patch {}",
                fields
                    .iter()
                    .map(|(k, _)| k.clone())
                    .collect::<Vec<String>>()
                    .join(", ")
            ),
            Op::StateAdvanceJob => write!(f, "state advance-job"),
            Op::StateRecordMetric(m) => write!(f, "state record-metric {}-{}", m.unit, m.job),
            Op::StateAddDecision { .. } => write!(f, "state add-decision"),
            Op::StateAddBlocker(_) => write!(f, "state add-blocker"),
            Op::StateResolveBlocker(_) => write!(f, "state resolve-blocker"),
            Op::StateRecordSession { .. } => write!(f, "state record-session"),
            Op::StateUpdateProgress => write!(f, "state update-progress"),
            Op::StateSnapshot => write!(f, "state snapshot"),
            Op::UnitFind(id) => write!(f, "unit find {id}"),
            Op::UnitNextDecimal(id) => write!(f, "unit next-decimal {id}"),
            Op::UnitAdd { name, .. } => write!(f, "unit add {name}"),
            Op::UnitInsert { after, name, .. } => write!(f, "unit insert {after} {name}"),
            Op::UnitRemove { id, force } => {
                write!(f, "unit remove {id}{}", if *force { " --force" } else { "" })
            }
            Op::UnitComplete(id) => write!(f, "unit complete {id}"),
            Op::RoadmapGetUnit(id) => write!(f, "roadmap get-unit {id}"),
            Op::RoadmapAnalyze => write!(f, "roadmap analyze"),
            Op::RoadmapUpdateJobProgress(id) => write!(f, "roadmap update-job-progress {id}"),
            Op::RoadmapProgress(format) => write!(f, "roadmap progress {format:?}"),
            Op::RequirementsMarkComplete(ids) => {
                write!(f, "requirements mark-complete {}", ids.join(","))
            }
            Op::MilestoneComplete { version, .. } => write!(f, "milestone complete {version}"),
            Op::ValidateConsistency => write!(f, "validate consistency"),
            Op::ValidateHealth { repair } => {
                write!(f, "validate health{}", if *repair { " --repair" } else { "" })
            }
            Op::VerifyJobStructure(file) => write!(f, "verify job-structure {file}"),
            Op::VerifyUnitCompleteness(id) => write!(f, "verify unit-completeness {id}"),
            Op::VerifyArtifacts(file) => write!(f, "verify artifacts {file}"),
            Op::VerifyKeyLinks(file) => write!(f, "verify key-links {file}"),
            Op::VerifyCommits(hashes) => write!(f, "verify commits {}", hashes.join(" ")),
            Op::VerifySummary(file) => write!(f, "verify summary {file}"),
            Op::WorkstreamsAnalyze => write!(f, "workstreams analyze"),
            Op::WorkstreamsProvision { dry_run } => {
                write!(f, "workstreams provision{}", if *dry_run { " --dry-run" } else { "" })
            }
            Op::WorkstreamsReconcile => write!(f, "workstreams reconcile"),
            Op::FrontmatterGet { file, .. } => write!(f, "frontmatter get {file}"),
            Op::FrontmatterSet { file, field, .. } => write!(f, "frontmatter set {file} {field}"),
            Op::FrontmatterMerge { file, .. } => write!(f, "frontmatter merge {file}"),
            Op::FrontmatterValidate { file, .. } => write!(f, "frontmatter validate {file}"),
            Op::ConfigGet(key) => write!(f, "config get {key}"),
            Op::ConfigSet { key, .. } => write!(f, "config set {key}"),
            Op::ConfigInit => write!(f, "config init"),
            Op::HistoryDigest => write!(f, "history digest"),
            Op::Commit { message, .. } => write!(f, "commit {message:?}"),
        }
    }
}

fn unit_id(raw: &str) -> Result<UnitId, PlanError> {
    UnitId::from_str(raw).map_err(|_| PlanError::Command(format!("'{raw}' is not a unit id")))
}

fn read_doc(repo: &Repository, file: &str) -> Result<(PathBuf, String), PlanError> {
    let path = repo.resolve(file);
    match repo.fs().read_to_string(&path) {
        Ok(content) => Ok((path, content)),
        Err(PlanError::NotFound(_)) => Err(PlanError::NotFound(format!("{file} not found"))),
        Err(e) => Err(e),
    }
}

fn flag(value: bool) -> String {
    value.to_string()
}

/// Run one operation against `repo`.
pub fn execute(repo: &Repository, op: &Op) -> Result<CommandOutput, PlanError> {
    tracing::debug!("Executing {}", op);
    if op.needs_planning_dir() {
        repo.require_planning_dir()?;
    }
    let output = match op {
        Op::StateLoad => CommandOutput::new(&state::load(repo)?)?,
        Op::StateGet(key) => {
            let value = state::get(repo, key.as_deref())?;
            let raw = value.value.clone().unwrap_or_default();
            CommandOutput::new(&value)?.with_raw(raw)
        }
        Op::StatePatch(fields) => CommandOutput::new(&state::patch(repo, fields)?)?,
        Op::StateAdvanceJob => {
            let advance = state::advance_job(repo)?;
            let raw = advance.current.clone().unwrap_or_else(|| advance.status.to_string());
            CommandOutput::new(&advance)?.with_raw(raw)
        }
        Op::StateRecordMetric(metric) => {
            state::record_metric(repo, metric)?;
            CommandOutput::new(&serde_json::json!({ "recorded": true }))?.with_raw("true")
        }
        Op::StateAddDecision { unit, text } => {
            state::add_decision(repo, unit.as_deref(), text)?;
            CommandOutput::new(&serde_json::json!({ "added": true }))?.with_raw("true")
        }
        Op::StateAddBlocker(text) => {
            state::add_blocker(repo, text)?;
            CommandOutput::new(&serde_json::json!({ "added": true }))?.with_raw("true")
        }
        Op::StateResolveBlocker(text) => {
            let removed = state::resolve_blocker(repo, text)?;
            let raw = flag(removed.is_some());
            CommandOutput::new(&serde_json::json!({ "resolved": removed.is_some(), "blocker": removed }))?
                .with_raw(raw)
        }
        Op::StateRecordSession {
            stopped_at,
            resume_file,
        } => CommandOutput::new(&state::record_session(repo, stopped_at, resume_file.as_deref())?)?,
        Op::StateUpdateProgress => {
            let percent = state::update_progress(repo)?;
            CommandOutput::new(&serde_json::json!({
                "percent": percent,
                "bar": state::progress_bar(percent),
            }))?
            .with_raw(percent.to_string())
        }
        Op::StateSnapshot => CommandOutput::new(&state::snapshot(repo)?)?,

        Op::UnitFind(id) => {
            let lookup = DocumentIndex::new(repo).find_unit(id)?;
            let raw = lookup.directory.clone().unwrap_or_default();
            CommandOutput::new(&lookup)?.with_raw(raw)
        }
        Op::UnitNextDecimal(id) => {
            repo.require_planning_dir()?;
            let base = unit_id(id)?.base();
            let roadmap = Roadmap::load(repo)?;
            let next = numbering::next_decimal(repo, &roadmap, &base)?;
            CommandOutput::new(&serde_json::json!({ "base": base, "next": next }))?
                .with_raw(next.to_string())
        }
        Op::UnitAdd {
            name,
            goal,
            depends,
        } => {
            let created = numbering::add_unit(repo, name, goal.as_deref(), depends.as_deref())?;
            let raw = created.unit_id.to_string();
            CommandOutput::new(&created)?.with_raw(raw)
        }
        Op::UnitInsert { after, name, goal } => {
            let created = numbering::insert_unit(repo, after, name, goal.as_deref())?;
            let raw = created.unit_id.to_string();
            CommandOutput::new(&created)?.with_raw(raw)
        }
        Op::UnitRemove { id, force } => {
            let outcome = numbering::remove_unit(repo, id, *force)?;
            let raw = outcome.removed.to_string();
            CommandOutput::new(&outcome)?.with_raw(raw)
        }
        Op::UnitComplete(id) => {
            let outcome = numbering::complete_unit(repo, id)?;
            let raw = outcome
                .next_unit
                .map(|n| n.to_string())
                .unwrap_or_else(|| "milestone-complete".to_string());
            CommandOutput::new(&outcome)?.with_raw(raw)
        }

        Op::RoadmapGetUnit(id) => {
            let details = Roadmap::load(repo)?.get_unit(&unit_id(id)?);
            let raw = details.section.clone().unwrap_or_default();
            CommandOutput::new(&details)?.with_raw(raw)
        }
        Op::RoadmapAnalyze => {
            let analysis = Roadmap::load(repo)?.analyze(&DocumentIndex::new(repo))?;
            CommandOutput::new(&analysis)?
        }
        Op::RoadmapUpdateJobProgress(id) => {
            let id = unit_id(id)?;
            let lookup = DocumentIndex::new(repo).find_unit(&id.to_string())?;
            if !lookup.found {
                return Err(PlanError::NotFound(format!("unit {id}")));
            }
            let mut roadmap = Roadmap::load(repo)?;
            let update = roadmap.update_job_progress(&id, &lookup, &state::today())?;
            if update.updated {
                roadmap.save(repo)?;
            }
            let raw = update.status.clone();
            CommandOutput::new(&update)?.with_raw(raw)
        }
        Op::RoadmapProgress(format) => {
            let analysis = Roadmap::load(repo)?.analyze(&DocumentIndex::new(repo))?;
            let rendered = roadmap::render_progress(&analysis, *format);
            match format {
                ProgressFormat::Json => CommandOutput::new(&analysis)?,
                _ => CommandOutput::new(&rendered)?.with_raw(rendered),
            }
        }
        Op::RequirementsMarkComplete(ids) => {
            let ids: Vec<String> = ids
                .iter()
                .flat_map(|i| i.split(','))
                .map(|i| i.trim().to_string())
                .filter(|i| !i.is_empty())
                .collect();
            if ids.is_empty() {
                return Err(PlanError::Command("no requirement ids given".to_string()));
            }
            let result = requirements::mark_complete(repo, &ids)?;
            let raw = result.updated.join(",");
            CommandOutput::new(&result)?.with_raw(raw)
        }
        Op::MilestoneComplete { version, name } => {
            let outcome = milestone::complete(repo, version, name.as_deref())?;
            let raw = outcome.archived_units.clone();
            CommandOutput::new(&outcome)?.with_raw(raw)
        }

        Op::ValidateConsistency => {
            let report = health::consistency(repo)?;
            let raw = if report.passed { "passed" } else { "failed" };
            CommandOutput::new(&report)?.with_raw(raw)
        }
        Op::ValidateHealth { repair } => {
            let report = health::health(repo, *repair)?;
            let raw = report.status.to_string();
            CommandOutput::new(&report)?.with_raw(raw)
        }

        Op::VerifyJobStructure(file) => {
            let report = verify::job_structure(repo, file)?;
            let raw = flag(report.valid);
            CommandOutput::new(&report)?.with_raw(raw)
        }
        Op::VerifyUnitCompleteness(id) => {
            let report = verify::unit_completeness(repo, id)?;
            let raw = flag(report.complete);
            CommandOutput::new(&report)?.with_raw(raw)
        }
        Op::VerifyArtifacts(file) => {
            let report = verify::artifacts(repo, file)?;
            let raw = flag(report.all_passed);
            CommandOutput::new(&report)?.with_raw(raw)
        }
        Op::VerifyKeyLinks(file) => {
            let report = verify::key_links(repo, file)?;
            let raw = flag(report.all_verified);
            CommandOutput::new(&report)?.with_raw(raw)
        }
        Op::VerifyCommits(hashes) => {
            let report = verify::commits(repo, hashes);
            let raw = flag(report.all_valid);
            CommandOutput::new(&report)?.with_raw(raw)
        }
        Op::VerifySummary(file) => {
            let report = verify::summary(repo, file)?;
            let raw = flag(report.passed);
            CommandOutput::new(&report)?.with_raw(raw)
        }

        Op::WorkstreamsAnalyze => CommandOutput::new(&workstreams::analyze(repo)?)?,
        Op::WorkstreamsProvision { dry_run } => {
            let report = workstreams::provision(repo, *dry_run)?;
            let raw = report.created.join("\n");
            CommandOutput::new(&report)?.with_raw(raw)
        }
        Op::WorkstreamsReconcile => CommandOutput::new(&workstreams::reconcile(repo)?)?,

        Op::FrontmatterGet { file, field } => {
            let (_, content) = read_doc(repo, file)?;
            let meta = frontmatter::extract(&content);
            match field {
                Some(field) => {
                    let value = meta
                        .get_path(field)
                        .ok_or_else(|| PlanError::NotFound(format!("field '{field}' in {file}")))?;
                    let raw = match value {
                        MetaValue::Scalar(s) => s.clone(),
                        other => serde_json::to_string(other)?,
                    };
                    CommandOutput::new(value)?.with_raw(raw)
                }
                None => CommandOutput::new(&meta)?,
            }
        }
        Op::FrontmatterSet { file, field, value } => {
            let (path, content) = read_doc(repo, file)?;
            let mut meta = frontmatter::extract(&content);
            meta.set(field, MetaValue::from_cli(value));
            repo.fs().write(&path, &frontmatter::splice(&content, &meta))?;
            tracing::info!("Set {} in {}", field, file);
            CommandOutput::new(&serde_json::json!({ "updated": true, "field": field }))?
                .with_raw("true")
        }
        Op::FrontmatterMerge { file, data } => {
            let json: serde_json::Value = serde_json::from_str(data)?;
            let MetaValue::Object(incoming) = MetaValue::from_json(&json) else {
                return Err(PlanError::Command("--data must be a JSON object".to_string()));
            };
            let (path, content) = read_doc(repo, file)?;
            let mut meta = frontmatter::extract(&content);
            let merged: Vec<String> = incoming.keys().map(str::to_string).collect();
            meta.merge(incoming);
            repo.fs().write(&path, &frontmatter::splice(&content, &meta))?;
            tracing::info!("Merged {} field(s) into {}", merged.len(), file);
            CommandOutput::new(&serde_json::json!({ "merged": merged }))?.with_raw(merged.join(","))
        }
        Op::FrontmatterValidate { file, schema } => {
            let (path, content) = read_doc(repo, file)?;
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default();
            let schema = schema.or_else(|| Schema::for_file(&name)).ok_or_else(|| {
                PlanError::Command(format!("cannot infer a schema for {name}; pass --schema"))
            })?;
            let report = verify::validate_metadata(&frontmatter::extract(&content), schema);
            let raw = flag(report.valid);
            CommandOutput::new(&report)?.with_raw(raw)
        }

        Op::ConfigGet(key) => {
            let value = ConfigProvider::new(repo).get(key)?;
            let raw = match &value {
                serde_json::Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            CommandOutput::new(&value)?.with_raw(raw)
        }
        Op::ConfigSet { key, value } => {
            repo.require_planning_dir()?;
            let config = ConfigProvider::new(repo).set(key, value)?;
            CommandOutput::new(&config)?.with_raw("true")
        }
        Op::ConfigInit => {
            repo.require_planning_dir()?;
            let config = ConfigProvider::new(repo).init()?;
            CommandOutput::new(&config)?.with_raw(repo.display_path(&repo.config_path()))
        }
        Op::HistoryDigest => CommandOutput::new(&history::digest(repo)?)?,
        Op::Commit { message, files } => {
            let paths: Vec<PathBuf> = files.iter().map(PathBuf::from).collect();
            let outcome = repo.commit(message, &paths)?;
            let raw = outcome.raw();
            CommandOutput::new(&outcome)?.with_raw(raw)
        }
    };
    if op.mutates() {
        tracing::info!("Completed {}", op);
    }
    Ok(output)
}
