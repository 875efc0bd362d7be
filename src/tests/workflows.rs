//! Multi-step planning workflows driven through the command dispatcher.

use crate::{
    commands::{execute, Op},
    ids::JobId,
    repo::Repository,
    state::{self, UnitStatus},
    tests::helpers::{mem_repo, seed_project, summary_doc, FixtureUnit},
    PlanError,
};
use std::str::FromStr;

fn raw(repo: &Repository, op: Op) -> String {
    execute(repo, &op)
        .and_then(|out| out.render(true))
        .unwrap_or_else(|e| panic!("{op} failed: {e}"))
}

fn roadmap(repo: &Repository) -> String {
    repo.fs().read_to_string(&repo.roadmap_path()).unwrap()
}

#[test]
fn grow_and_shrink_the_plan() {
    let repo = mem_repo();
    seed_project(
        &repo,
        &[
            FixtureUnit::new("1", "Base").jobs(2, 2).checked(),
            FixtureUnit::new("2", "Api").jobs(1, 0).depends("Unit 1"),
            FixtureUnit::new("3", "Ui").depends("Unit 2"),
        ],
    );

    let inserted = raw(
        &repo,
        Op::UnitInsert {
            after: "2".to_string(),
            name: "Hotfix".to_string(),
            goal: Some("Patch the api".to_string()),
        },
    );
    assert_eq!(inserted, "02.1");
    let added = raw(
        &repo,
        Op::UnitAdd {
            name: "Docs".to_string(),
            goal: None,
            depends: None,
        },
    );
    assert_eq!(added, "04");
    assert_eq!(raw(&repo, Op::UnitNextDecimal("2".to_string())), "02.2");

    let text = roadmap(&repo);
    let hotfix = text.find("### Unit 2.1: Hotfix").expect("inserted section");
    assert!(text.find("### Unit 2: Api").unwrap() < hotfix);
    assert!(hotfix < text.find("### Unit 3: Ui").unwrap());
    assert!(text.contains("(INSERTED)"));

    let consistency = execute(&repo, &Op::ValidateConsistency).unwrap();
    assert_eq!(consistency.json["passed"], true);

    // Unit 3 has no summaries, so removal needs no override.
    let removed = execute(
        &repo,
        &Op::UnitRemove {
            id: "3".to_string(),
            force: false,
        },
    )
    .unwrap();
    assert_eq!(removed.json["renamed_directories"], 1);
    assert!(repo.fs().exists(&repo.units_dir().join("03-docs")));
    assert!(!repo.fs().exists(&repo.units_dir().join("04-docs")));
    assert!(repo.fs().exists(&repo.units_dir().join("02.1-hotfix")));

    let text = roadmap(&repo);
    assert!(text.contains("### Unit 3: Docs"));
    assert!(!text.contains("Unit 4"));
    assert!(!text.contains("Ui"));
    assert_eq!(raw(&repo, Op::StateGet(Some("Total Units".to_string()))), "4");

    // Unit 1 has executed jobs.
    let guarded = execute(
        &repo,
        &Op::UnitRemove {
            id: "1".to_string(),
            force: false,
        },
    );
    assert!(matches!(guarded, Err(PlanError::Guard(_))));
    assert!(repo.fs().exists(&repo.units_dir().join("01-base")));
}

#[test]
fn execute_jobs_then_close_the_milestone() {
    let repo = mem_repo();
    seed_project(
        &repo,
        &[
            FixtureUnit::new("1", "Base").jobs(2, 0),
            FixtureUnit::new("2", "Next").jobs(1, 0).depends("Unit 1"),
        ],
    );

    assert_eq!(raw(&repo, Op::StateAdvanceJob), "01-01");
    assert_eq!(raw(&repo, Op::StateAdvanceJob), "01-02");
    assert_eq!(raw(&repo, Op::StateAdvanceJob), "Ready to verify");

    let dir = repo.units_dir().join("01-base");
    for n in 1..=2 {
        let job = JobId::new(crate::ids::UnitId::integer(1), n);
        repo.fs()
            .write(&dir.join(job.summary_file()), &summary_doc(&job))
            .unwrap();
    }
    assert_eq!(
        raw(&repo, Op::RoadmapUpdateJobProgress("1".to_string())),
        "Complete"
    );
    assert!(roadmap(&repo).contains("| 1. Base | 2/2 | Complete |"));
    assert_eq!(raw(&repo, Op::VerifyUnitCompleteness("1".to_string())), "true");

    assert_eq!(raw(&repo, Op::UnitComplete("1".to_string())), "02");
    let snapshot = state::snapshot(&repo).unwrap();
    assert_eq!(snapshot.current_unit.as_deref(), Some("02"));
    assert_eq!(snapshot.status, Some(UnitStatus::ReadyToPlan));
    assert!(roadmap(&repo).contains("- [x] **Unit 1: Base**"));

    assert_eq!(raw(&repo, Op::UnitComplete("2".to_string())), "milestone-complete");
    assert_eq!(raw(&repo, Op::StateUpdateProgress), "66");

    execute(
        &repo,
        &Op::MilestoneComplete {
            version: "v1.0".to_string(),
            name: Some("Foundations".to_string()),
        },
    )
    .unwrap();
    let found = execute(&repo, &Op::UnitFind("1".to_string())).unwrap();
    assert_eq!(found.json["archived"], "v1.0");
    let history = execute(&repo, &Op::HistoryDigest).unwrap();
    assert_eq!(history.json["summaries_read"], 2);
}

#[test]
fn state_journal_round() {
    let repo = mem_repo();
    seed_project(&repo, &[FixtureUnit::new("1", "Base").jobs(1, 0)]);

    execute(
        &repo,
        &Op::StateAddDecision {
            unit: Some("01".to_string()),
            text: "Store plans as Markdown".to_string(),
        },
    )
    .unwrap();
    execute(&repo, &Op::StateAddBlocker("Waiting on API keys".to_string())).unwrap();
    assert_eq!(
        raw(&repo, Op::StateResolveBlocker("api keys".to_string())),
        "true"
    );
    assert_eq!(
        raw(&repo, Op::StateResolveBlocker("api keys".to_string())),
        "false"
    );
    execute(
        &repo,
        &Op::StateRecordSession {
            stopped_at: "Job 01-01 task 2".to_string(),
            resume_file: None,
        },
    )
    .unwrap();

    let snapshot = state::snapshot(&repo).unwrap();
    assert_eq!(snapshot.decisions, vec!["[Unit 01]: Store plans as Markdown".to_string()]);
    assert!(snapshot.blockers.is_empty());
    assert_eq!(snapshot.session.stopped_at.as_deref(), Some("Job 01-01 task 2"));
    assert_eq!(snapshot.session.resume_file, None);

    let patched = execute(
        &repo,
        &Op::StatePatch(vec![
            ("Status".to_string(), "Executing".to_string()),
            ("Nonexistent".to_string(), "x".to_string()),
        ]),
    )
    .unwrap();
    assert_eq!(patched.json["updated"][0], "Status");
    assert_eq!(patched.json["not_found"][0], "Nonexistent");
    assert_eq!(
        state::snapshot(&repo).unwrap().status,
        Some(UnitStatus::from_str("Executing").unwrap())
    );
}

#[test]
fn commands_refuse_without_planning_directory() {
    let repo = mem_repo();
    repo.fs().remove_dir_all(&repo.planning_dir()).unwrap();
    assert!(matches!(
        execute(&repo, &Op::ValidateHealth { repair: false }),
        Err(PlanError::Structure(_))
    ));
    assert!(matches!(
        execute(&repo, &Op::ConfigGet("commit_docs".to_string())),
        Err(PlanError::Structure(_))
    ));
    assert!(matches!(
        execute(&repo, &Op::UnitFind("1".to_string())),
        Err(PlanError::Structure(_))
    ));

    // Plain documents stay reachable.
    repo.fs()
        .write(&repo.resolve("notes/a.md"), "---\nwave: 3\n---\n\nBody\n")
        .unwrap();
    let wave = execute(
        &repo,
        &Op::FrontmatterGet {
            file: "notes/a.md".to_string(),
            field: Some("wave".to_string()),
        },
    )
    .unwrap();
    assert_eq!(wave.render(true).unwrap(), "3");
}
