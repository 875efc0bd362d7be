//! Dependency frontier over roadmap units.
//!
//! The roadmap's `Depends on` fields define a directed graph. Units whose dependencies are
//! all complete form the frontier of workstreams that may proceed in parallel; incomplete
//! units waiting on that frontier are join points.
use petgraph::{algo::kosaraju_scc, graph::NodeIndex, Graph};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

use crate::{
    config::PlanConfig,
    error::PlanError,
    ids::{slug, UnitId},
    index::DocumentIndex,
    repo::Repository,
    roadmap::{Roadmap, UnitAnalysis},
};

/// What the analyzer needs to know about one unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnitNode {
    pub id: UnitId,
    pub name: String,
    pub depends_on: Vec<UnitId>,
    pub completed: bool,
}

impl From<&UnitAnalysis> for UnitNode {
    fn from(unit: &UnitAnalysis) -> Self {
        UnitNode {
            id: unit.id,
            name: unit.name.clone(),
            depends_on: unit.depends_on.clone(),
            completed: unit.completed(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Workstream {
    pub unit_id: UnitId,
    pub name: String,
    pub depends_on: Vec<UnitId>,
    pub branch: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JoinPoint {
    pub unit_id: UnitId,
    pub name: String,
    pub waiting_on: Vec<UnitId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnknownDependency {
    pub unit_id: UnitId,
    pub missing: UnitId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WorkstreamAnalysis {
    pub candidates: Vec<Workstream>,
    pub join_points: Vec<JoinPoint>,
    pub completed: Vec<UnitId>,
    pub parallelism_possible: bool,
    pub parallelization_enabled: bool,
    pub unknown_dependencies: Vec<UnknownDependency>,
    /// Units on a dependency cycle, one group per strongly connected component.
    pub cycles: Vec<Vec<UnitId>>,
}

/// Build the dependency graph and report strongly connected components of size > 1, plus
/// self-dependencies.
fn find_cycles(units: &[UnitNode]) -> Vec<Vec<UnitId>> {
    let mut graph: Graph<UnitId, ()> = Graph::new();
    let mut nodes: BTreeMap<UnitId, NodeIndex> = BTreeMap::new();
    for unit in units {
        nodes.insert(unit.id, graph.add_node(unit.id));
    }
    let mut self_loops = Vec::new();
    for unit in units {
        for dep in &unit.depends_on {
            if *dep == unit.id {
                self_loops.push(vec![unit.id]);
                continue;
            }
            if let (Some(from), Some(to)) = (nodes.get(dep), nodes.get(&unit.id)) {
                graph.add_edge(*from, *to, ());
            }
        }
    }
    let mut cycles: Vec<Vec<UnitId>> = kosaraju_scc(&graph)
        .into_iter()
        .filter(|scc| scc.len() > 1)
        .map(|scc| {
            let mut ids: Vec<UnitId> = scc.into_iter().map(|idx| graph[idx]).collect();
            ids.sort();
            ids
        })
        .chain(self_loops)
        .collect();
    cycles.sort();
    cycles
}

/// Compute candidates and join points. Unknown dependency ids count as incomplete.
pub fn analyze_units(units: &[UnitNode], config: &PlanConfig) -> WorkstreamAnalysis {
    let known: BTreeSet<UnitId> = units.iter().map(|u| u.id).collect();
    let completed: BTreeSet<UnitId> = units.iter().filter(|u| u.completed).map(|u| u.id).collect();

    let unknown_dependencies: Vec<UnknownDependency> = units
        .iter()
        .flat_map(|u| {
            u.depends_on
                .iter()
                .filter(|dep| !known.contains(dep))
                .map(|dep| UnknownDependency {
                    unit_id: u.id,
                    missing: *dep,
                })
        })
        .collect();
    for unknown in &unknown_dependencies {
        tracing::warn!(
            "Unit {} depends on unit {} which is not in the roadmap",
            unknown.unit_id,
            unknown.missing
        );
    }

    let eligible: BTreeSet<UnitId> = units
        .iter()
        .filter(|u| !u.completed && u.depends_on.iter().all(|d| completed.contains(d)))
        .map(|u| u.id)
        .collect();

    let candidates: Vec<Workstream> = units
        .iter()
        .filter(|u| eligible.contains(&u.id))
        .map(|u| Workstream {
            unit_id: u.id,
            name: u.name.clone(),
            depends_on: u.depends_on.clone(),
            branch: config.unit_branch(&u.id.to_string(), &slug(&u.name)),
        })
        .collect();

    let join_points = units
        .iter()
        .filter(|u| !u.completed && !eligible.contains(&u.id))
        .filter(|u| u.depends_on.iter().any(|d| eligible.contains(d)))
        .map(|u| JoinPoint {
            unit_id: u.id,
            name: u.name.clone(),
            waiting_on: u
                .depends_on
                .iter()
                .filter(|d| !completed.contains(d))
                .copied()
                .collect(),
        })
        .collect();

    let cycles = find_cycles(units);
    if !cycles.is_empty() {
        tracing::warn!("Dependency cycles in roadmap: {:?}", cycles);
    }

    WorkstreamAnalysis {
        parallelism_possible: candidates.len() >= 2,
        parallelization_enabled: config.parallelization,
        candidates,
        join_points,
        completed: completed.into_iter().collect(),
        unknown_dependencies,
        cycles,
    }
}

fn roadmap_nodes(repo: &Repository) -> Result<Vec<UnitNode>, PlanError> {
    let roadmap = Roadmap::load(repo)?;
    let analysis = roadmap.analyze(&DocumentIndex::new(repo))?;
    Ok(analysis.units.iter().map(UnitNode::from).collect())
}

pub fn analyze(repo: &Repository) -> Result<WorkstreamAnalysis, PlanError> {
    repo.require_planning_dir()?;
    let nodes = roadmap_nodes(repo)?;
    Ok(analyze_units(&nodes, &repo.config()))
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ProvisionReport {
    pub dry_run: bool,
    pub created: Vec<String>,
    pub existing: Vec<String>,
}

/// Create a branch per candidate workstream. Existing branches are left alone.
pub fn provision(repo: &Repository, dry_run: bool) -> Result<ProvisionReport, PlanError> {
    let analysis = analyze(repo)?;
    if !analysis.parallelization_enabled {
        tracing::info!("Parallelization disabled in config; provisioning anyway on request");
    }
    let mut report = ProvisionReport {
        dry_run,
        ..Default::default()
    };
    for candidate in analysis.candidates {
        if repo.store().branch_exists(&candidate.branch) {
            report.existing.push(candidate.branch);
            continue;
        }
        if !dry_run {
            repo.store().create_branch(&candidate.branch)?;
        }
        report.created.push(candidate.branch);
    }
    Ok(report)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BranchState {
    /// The unit is complete; the branch can be merged or deleted.
    Done,
    /// The unit is on the current frontier.
    Active,
    /// Neither complete nor eligible.
    Stale,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BranchStatus {
    pub unit_id: UnitId,
    pub branch: String,
    pub state: BranchState,
}

/// Classify every existing workstream branch against the roadmap.
pub fn reconcile(repo: &Repository) -> Result<Vec<BranchStatus>, PlanError> {
    repo.require_planning_dir()?;
    let config = repo.config();
    let nodes = roadmap_nodes(repo)?;
    let analysis = analyze_units(&nodes, &config);
    let active: BTreeSet<UnitId> = analysis.candidates.iter().map(|c| c.unit_id).collect();
    let statuses = nodes
        .iter()
        .filter_map(|node| {
            let branch = config.unit_branch(&node.id.to_string(), &slug(&node.name));
            if !repo.store().branch_exists(&branch) {
                return None;
            }
            let state = if node.completed {
                BranchState::Done
            } else if active.contains(&node.id) {
                BranchState::Active
            } else {
                BranchState::Stale
            };
            Some(BranchStatus {
                unit_id: node.id,
                branch,
                state,
            })
        })
        .collect();
    Ok(statuses)
}
