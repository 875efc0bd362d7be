/// Parallel workstream analysis and branch provisioning against a roadmap on disk.
mod common;

use common::*;
use plandoc_core::{
    ids::UnitId,
    vcs::NullStore,
    workstreams::{self, BranchState},
};
use std::sync::Arc;
use test_log::test;

fn diamond(repo: &plandoc_core::repo::Repository) {
    let mut first = unit("1", "Core", "Nothing");
    first.checked = true;
    write_documents(
        repo,
        &[
            first,
            unit("2", "Storage", "Unit 1"),
            unit("3", "Network", "Unit 1"),
            unit("4", "Release", "Unit 2, Unit 3"),
        ],
    );
    for name in ["01-core", "02-storage", "03-network", "04-release"] {
        unit_dir(repo, name, &[]);
    }
}

#[test]
fn diamond_roadmap_has_two_workstreams_and_one_join() {
    let (_temp, repo) = disk_repo();
    diamond(&repo);

    let analysis = workstreams::analyze(&repo).unwrap();
    let ids: Vec<UnitId> = analysis.candidates.iter().map(|c| c.unit_id).collect();
    assert_eq!(ids, vec![UnitId::integer(2), UnitId::integer(3)]);
    assert!(analysis.parallelism_possible);
    assert_eq!(analysis.completed, vec![UnitId::integer(1)]);
    assert_eq!(analysis.join_points.len(), 1);
    assert_eq!(analysis.join_points[0].unit_id, UnitId::integer(4));
    assert_eq!(
        analysis.join_points[0].waiting_on,
        vec![UnitId::integer(2), UnitId::integer(3)]
    );
    assert!(analysis.cycles.is_empty());
}

#[test]
fn provision_then_reconcile() {
    let store = Arc::new(NullStore::new());
    let (_temp, repo) = disk_repo_with_store(store.clone());
    diamond(&repo);

    let dry = workstreams::provision(&repo, true).unwrap();
    assert_eq!(dry.created.len(), 2);
    assert!(store.branches().is_empty());

    let report = workstreams::provision(&repo, false).unwrap();
    assert_eq!(
        report.created,
        vec!["plan/unit-02-storage", "plan/unit-03-network"]
    );
    let again = workstreams::provision(&repo, false).unwrap();
    assert!(again.created.is_empty());
    assert_eq!(again.existing.len(), 2);

    let statuses = workstreams::reconcile(&repo).unwrap();
    assert_eq!(statuses.len(), 2);
    assert!(statuses.iter().all(|s| s.state == BranchState::Active));
}

#[test]
fn cycles_are_reported_not_followed() {
    let (_temp, repo) = disk_repo();
    write_documents(
        &repo,
        &[
            unit("1", "Left", "Unit 2"),
            unit("2", "Right", "Unit 1"),
            unit("3", "Orphan", "Unit 9"),
        ],
    );
    let analysis = workstreams::analyze(&repo).unwrap();
    assert!(analysis.candidates.is_empty());
    assert_eq!(
        analysis.cycles,
        vec![vec![UnitId::integer(1), UnitId::integer(2)]]
    );
    assert_eq!(analysis.unknown_dependencies.len(), 1);
    assert_eq!(analysis.unknown_dependencies[0].missing, UnitId::integer(9));
}
