/// Removal with cascading renumbering, on a real filesystem.
mod common;

use common::*;
use plandoc_core::{ids::UnitId, numbering, roadmap::Roadmap, workstreams, PlanError};
use test_log::test;

#[test]
fn integer_removal_cascades_through_disk_and_roadmap() {
    let (_temp, repo) = disk_repo();
    write_documents(
        &repo,
        &[
            unit("1", "Alpha", "Nothing"),
            unit("2", "Beta", "Unit 1"),
            unit("3", "Gamma", "Unit 2"),
            unit("4", "Delta", "Unit 1, Unit 3"),
        ],
    );
    unit_dir(&repo, "01-alpha", &["01-01-JOB.md", "01-01-SUMMARY.md"]);
    unit_dir(&repo, "02-beta", &["02-01-JOB.md", "02-CONTEXT.md"]);
    unit_dir(&repo, "03-gamma", &["03-01-JOB.md", "03-02-JOB.md", "03-01-SUMMARY.md"]);
    unit_dir(&repo, "04-delta", &["04-RESEARCH.md"]);

    let outcome = numbering::remove_unit(&repo, "2", false).unwrap();
    assert!(outcome.directory_deleted);
    assert_eq!(outcome.renamed_directories, 2);
    assert_eq!(outcome.renamed_files, 4);

    assert_eq!(dir_names(&repo), vec!["01-alpha", "02-gamma", "03-delta"]);
    assert_eq!(
        file_names(&repo, "02-gamma"),
        vec!["02-01-JOB.md", "02-01-SUMMARY.md", "02-02-JOB.md"]
    );
    assert_eq!(file_names(&repo, "03-delta"), vec!["03-RESEARCH.md"]);

    let text = read(&repo.roadmap_path());
    assert!(!text.contains("Beta"));
    assert!(text.contains("### Unit 2: Gamma"));
    assert!(text.contains("### Unit 3: Delta"));
    assert!(text.contains("- [ ] **Unit 3: Delta**"));
    assert!(text.contains("| 3. Delta |"));
    assert!(text.contains("**Depends on**: Unit 1, Unit 2"));
    assert!(!text.contains("Unit 4"));
    assert_eq!(outcome.dependencies_dropped, 1);

    // Gamma depended on the removed unit only; it must not end up depending on itself.
    let roadmap = Roadmap::load(&repo).unwrap();
    let gamma = roadmap.get_unit(&UnitId::integer(2));
    assert_eq!(gamma.depends_on.as_deref(), Some("Nothing"));
    assert!(gamma.depends_on_ids.is_empty());
    assert_eq!(
        roadmap.get_unit(&UnitId::integer(3)).depends_on_ids,
        vec![UnitId::integer(1), UnitId::integer(2)]
    );
    let analysis = workstreams::analyze(&repo).unwrap();
    assert!(analysis.cycles.is_empty());
    let ids: Vec<UnitId> = analysis.candidates.iter().map(|c| c.unit_id).collect();
    assert_eq!(ids, vec![UnitId::integer(2)]);

    let state = read(&repo.state_path());
    assert!(state.contains("**Total Units:** 3"));
}

#[test]
fn decimal_removal_only_shifts_siblings() {
    let (_temp, repo) = disk_repo();
    write_documents(
        &repo,
        &[
            unit("6", "Base", "Nothing"),
            unit("6.1", "First Fix", "Unit 6"),
            unit("6.2", "Second Fix", "Unit 6.1"),
            unit("7", "After", "Unit 6.2"),
        ],
    );
    unit_dir(&repo, "06-base", &[]);
    unit_dir(&repo, "06.1-first-fix", &[]);
    unit_dir(&repo, "06.2-second-fix", &["06.2-01-JOB.md"]);
    unit_dir(&repo, "07-after", &["07-01-JOB.md"]);

    numbering::remove_unit(&repo, "6.1", false).unwrap();

    assert_eq!(dir_names(&repo), vec!["06-base", "06.1-second-fix", "07-after"]);
    assert_eq!(file_names(&repo, "06.1-second-fix"), vec!["06.1-01-JOB.md"]);
    assert_eq!(file_names(&repo, "07-after"), vec!["07-01-JOB.md"]);
    let text = read(&repo.roadmap_path());
    assert!(text.contains("### Unit 6.1: Second Fix"));
    assert!(text.contains("### Unit 7: After"));
    let roadmap = Roadmap::load(&repo).unwrap();
    assert!(roadmap.get_unit(&UnitId::decimal(6, 1)).depends_on_ids.is_empty());
    assert_eq!(
        roadmap.get_unit(&UnitId::integer(7)).depends_on_ids,
        vec![UnitId::decimal(6, 1)]
    );
}

#[test]
fn integer_with_decimal_units_is_kept_until_they_go() {
    let (_temp, repo) = disk_repo();
    write_documents(
        &repo,
        &[
            unit("1", "Base", "Nothing"),
            unit("2", "Api", "Unit 1"),
            unit("2.1", "Hotfix", "Unit 2"),
            unit("3", "Top", "Unit 2"),
            unit("3.1", "Patch", "Unit 3"),
        ],
    );
    for name in ["01-base", "02-api", "02.1-hotfix", "03-top", "03.1-patch"] {
        unit_dir(&repo, name, &[]);
    }

    let refused = numbering::remove_unit(&repo, "2", false);
    assert!(matches!(refused, Err(PlanError::Guard(_))));
    assert_eq!(
        dir_names(&repo),
        vec!["01-base", "02-api", "02.1-hotfix", "03-top", "03.1-patch"]
    );

    numbering::remove_unit(&repo, "2.1", false).unwrap();
    numbering::remove_unit(&repo, "2", false).unwrap();
    assert_eq!(dir_names(&repo), vec!["01-base", "02-top", "02.1-patch"]);

    let roadmap = Roadmap::load(&repo).unwrap();
    let order: Vec<UnitId> = roadmap.units().iter().map(|h| h.id).collect();
    assert_eq!(
        order,
        vec![UnitId::integer(1), UnitId::integer(2), UnitId::decimal(2, 1)]
    );
    assert_eq!(
        roadmap.get_unit(&UnitId::decimal(2, 1)).depends_on_ids,
        vec![UnitId::integer(2)]
    );
    assert!(roadmap.get_unit(&UnitId::integer(2)).depends_on_ids.is_empty());
    assert!(read(&repo.state_path()).contains("**Total Units:** 3"));
}

#[test]
fn executed_units_need_force() {
    let (_temp, repo) = disk_repo();
    write_documents(&repo, &[unit("1", "Alpha", "Nothing"), unit("2", "Beta", "Unit 1")]);
    unit_dir(&repo, "01-alpha", &["01-01-JOB.md", "01-01-SUMMARY.md"]);
    unit_dir(&repo, "02-beta", &[]);

    let refused = numbering::remove_unit(&repo, "1", false);
    assert!(matches!(refused, Err(PlanError::Guard(_))));
    assert_eq!(dir_names(&repo), vec!["01-alpha", "02-beta"]);

    numbering::remove_unit(&repo, "1", true).unwrap();
    assert_eq!(dir_names(&repo), vec!["01-beta"]);
    assert!(read(&repo.roadmap_path()).contains("### Unit 1: Beta"));

    assert!(matches!(
        numbering::remove_unit(&repo, "9", true),
        Err(PlanError::NotFound(_))
    ));
}
