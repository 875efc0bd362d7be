//! Shared fixtures for planning-record tests

use crate::{
    fs::MemFs,
    ids::{dir_name, JobId, UnitId},
    repo::Repository,
    vcs::NullStore,
};
use std::{str::FromStr, sync::Arc};

/// Initialize logging for tests
pub fn init_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init()
        .ok();
}

/// An empty in-memory repository rooted at `/project` with a `.planning` directory.
pub fn mem_repo() -> Repository {
    mem_repo_with_store(Arc::new(NullStore::new()))
}

pub fn mem_repo_with_store(store: Arc<NullStore>) -> Repository {
    init_logging();
    let repo = Repository::new("/project", Arc::new(MemFs::new()), store);
    repo.fs()
        .create_dir_all(&repo.planning_dir())
        .expect("memfs mkdir");
    repo
}

/// One unit of a fixture project.
#[derive(Debug, Clone)]
pub struct FixtureUnit {
    pub id: UnitId,
    pub name: String,
    pub depends: String,
    pub checked: bool,
    pub jobs: u32,
    pub summaries: u32,
    pub directory: bool,
}

impl FixtureUnit {
    pub fn new(id: &str, name: &str) -> Self {
        FixtureUnit {
            id: UnitId::from_str(id).expect("fixture unit id"),
            name: name.to_string(),
            depends: "Nothing".to_string(),
            checked: false,
            jobs: 0,
            summaries: 0,
            directory: true,
        }
    }

    pub fn depends(mut self, depends: &str) -> Self {
        self.depends = depends.to_string();
        self
    }

    pub fn checked(mut self) -> Self {
        self.checked = true;
        self
    }

    pub fn jobs(mut self, jobs: u32, summaries: u32) -> Self {
        self.jobs = jobs;
        self.summaries = summaries;
        self
    }

    pub fn without_directory(mut self) -> Self {
        self.directory = false;
        self
    }
}

/// Roadmap text with a checklist entry, a detail section and a progress row per unit.
pub fn roadmap_text(units: &[FixtureUnit]) -> String {
    let mut out = String::from("# Roadmap: Fixture Project\n\n## Overview\n\nA fixture.\n\n## Units\n\n");
    for unit in units {
        out.push_str(&format!(
            "- [{}] **Unit {}: {}** - {} work\n",
            if unit.checked { "x" } else { " " },
            unit.id.display_short(),
            unit.name,
            unit.name
        ));
    }
    out.push_str("\n## Unit Details\n\n");
    for unit in units {
        out.push_str(&format!(
            "### Unit {}: {}\n**Goal**: Deliver {}\n**Depends on**: {}\n**Requirements**: REQ-{:02}\n**Success Criteria** (what must be TRUE):\n  1. {} works\n  2. {} is documented\n**Jobs**: {} jobs\n\nJobs:\n",
            unit.id.display_short(),
            unit.name,
            unit.name.to_lowercase(),
            unit.depends,
            unit.id.major,
            unit.name,
            unit.name,
            unit.jobs
        ));
        for n in 1..=unit.jobs {
            out.push_str(&format!(
                "- [{}] {} - Job {}\n",
                if n <= unit.summaries { "x" } else { " " },
                JobId::new(unit.id, n).job_file(),
                n
            ));
        }
        out.push('\n');
    }
    out.push_str("## Progress\n\n| Unit | Jobs Complete | Status | Completed |\n|------|---------------|--------|-----------|\n");
    for unit in units {
        let status = if unit.jobs > 0 && unit.summaries >= unit.jobs {
            "Complete"
        } else if unit.summaries > 0 {
            "In Progress"
        } else {
            "Not started"
        };
        out.push_str(&format!(
            "| {}. {} | {}/{} | {} | - |\n",
            unit.id.display_short(),
            unit.name,
            unit.summaries,
            unit.jobs,
            status
        ));
    }
    out
}

pub fn state_text(current: &str, name: &str, total: usize) -> String {
    format!(
        "# Project State\n\n## Current Position\n\n**Current Unit:** {current}\n**Current Unit Name:** {name}\n**Total Units:** {total}\n**Current Job:** Not started\n**Total Jobs in Unit:** 2\n**Status:** Ready to plan\n**Last Activity:** 2026-01-01\n**Last Activity Description:** Project initialized\n**Progress:** [░░░░░░░░░░] 0%\n\n## Accumulated Context\n\n### Decisions\n\nNone yet.\n\n### Blockers/Concerns\n\nNone yet.\n\n## Performance Metrics\n\n| Unit | Job | Duration | Tasks | Files |\n|------|-----|----------|-------|-------|\n\n## Session Continuity\n\n**Last Session:** 2026-01-01\n**Stopped At:** Project initialized\n**Resume File:** None\n"
    )
}

/// A job document with complete, well-formed metadata.
pub fn job_doc(job: &JobId) -> String {
    format!(
        "---\nunit: {}\njob: {:02}\ntype: execute\nwave: 1\ndepends_on: []\nfiles_modified: [src/lib.rs]\nautonomous: true\nmust_haves:\n  truths:\n    - \"It works\"\n  artifacts:\n    - path: src/lib.rs\n      provides: library root\n---\n\n<tasks>\n<task type=\"auto\">\n  <name>Task 1</name>\n  <action>Do the thing</action>\n  <verify>Run it</verify>\n  <done>It is done</done>\n</task>\n</tasks>\n",
        job.unit, job.number
    )
}

pub fn summary_doc(job: &JobId) -> String {
    format!(
        "---\nunit: {}\njob: {:02}\nprovides: [feature-{}]\naffects: []\npatterns-established: [\"builder pattern\"]\nkey-decisions:\n  - \"Use plain files\"\ntech-stack:\n  added: [serde]\n---\n\n# Summary {}\n\nDone.\n",
        job.unit, job.number, job.number, job
    )
}

/// Write PROJECT, ROADMAP, STATE, config and a directory per unit.
pub fn seed_project(repo: &Repository, units: &[FixtureUnit]) {
    let fs = repo.fs();
    fs.write(&repo.project_path(), "# Fixture Project\n")
        .expect("write project");
    fs.write(&repo.roadmap_path(), &roadmap_text(units))
        .expect("write roadmap");
    let (current, name) = units
        .first()
        .map(|u| (u.id.to_string(), u.name.clone()))
        .unwrap_or_else(|| ("01".to_string(), "Start".to_string()));
    fs.write(&repo.state_path(), &state_text(&current, &name, units.len()))
        .expect("write state");
    fs.write(&repo.config_path(), "commit_docs = true\n")
        .expect("write config");
    for unit in units.iter().filter(|u| u.directory) {
        seed_unit_dir(repo, unit);
    }
}

pub fn seed_unit_dir(repo: &Repository, unit: &FixtureUnit) {
    let fs = repo.fs();
    let dir = repo.units_dir().join(dir_name(&unit.id, &unit.name));
    fs.create_dir_all(&dir).expect("mkdir unit");
    for n in 1..=unit.jobs {
        let job = JobId::new(unit.id, n);
        fs.write(&dir.join(job.job_file()), &job_doc(&job))
            .expect("write job");
        if n <= unit.summaries {
            fs.write(&dir.join(job.summary_file()), &summary_doc(&job))
                .expect("write summary");
        }
    }
}
