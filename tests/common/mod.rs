//! Shared test utilities for integration tests.
//!
//! Import from integration test files as:
//! ```ignore
//! mod common;
//! ```

use plandoc_core::{fs::DiskFs, repo::Repository, vcs::NullStore};
use std::{path::Path, sync::Arc};
use tempfile::TempDir;

/// One roadmap unit: id as written, name, `Depends on` text, checked in the checklist.
#[allow(dead_code)]
pub struct Unit<'a> {
    pub id: &'a str,
    pub name: &'a str,
    pub depends: &'a str,
    pub checked: bool,
}

#[allow(dead_code)]
pub fn unit<'a>(id: &'a str, name: &'a str, depends: &'a str) -> Unit<'a> {
    Unit {
        id,
        name,
        depends,
        checked: false,
    }
}

/// A repository on a fresh temp directory with an empty `.planning/units/`.
#[allow(dead_code)]
pub fn disk_repo() -> (TempDir, Repository) {
    disk_repo_with_store(Arc::new(NullStore::new()))
}

#[allow(dead_code)]
pub fn disk_repo_with_store(store: Arc<NullStore>) -> (TempDir, Repository) {
    let temp = TempDir::new().unwrap();
    let repo = Repository::new(temp.path(), Arc::new(DiskFs), store);
    std::fs::create_dir_all(repo.units_dir()).unwrap();
    (temp, repo)
}

#[allow(dead_code)]
pub fn roadmap(units: &[Unit<'_>]) -> String {
    let mut out = String::from("# Roadmap: Integration\n\n## Units\n\n");
    for u in units {
        out.push_str(&format!(
            "- [{}] **Unit {}: {}** - {}\n",
            if u.checked { "x" } else { " " },
            u.id,
            u.name,
            u.name.to_lowercase()
        ));
    }
    out.push_str("\n## Unit Details\n\n");
    for u in units {
        out.push_str(&format!(
            "### Unit {}: {}\n**Goal**: Build {}\n**Depends on**: {}\n**Jobs**: TBD\n\n",
            u.id,
            u.name,
            u.name.to_lowercase(),
            u.depends
        ));
    }
    out.push_str("## Progress\n\n| Unit | Jobs Complete | Status | Completed |\n|------|---------------|--------|-----------|\n");
    for u in units {
        out.push_str(&format!("| {}. {} | 0/0 | Not started | - |\n", u.id, u.name));
    }
    out
}

#[allow(dead_code)]
pub fn state(current: &str, total: usize) -> String {
    format!(
        "# Project State\n\n## Current Position\n\n**Current Unit:** {current}\n**Total Units:** {total}\n**Current Job:** Not started\n**Status:** Ready to plan\n**Last Activity:** 2026-01-01\n**Progress:** [░░░░░░░░░░] 0%\n\n## Accumulated Context\n\n### Decisions\n\nNone yet.\n\n### Blockers/Concerns\n\nNone yet.\n"
    )
}

/// PROJECT, ROADMAP, STATE and config documents.
#[allow(dead_code)]
pub fn write_documents(repo: &Repository, units: &[Unit<'_>]) {
    std::fs::write(repo.project_path(), "# Integration\n").unwrap();
    std::fs::write(repo.roadmap_path(), roadmap(units)).unwrap();
    let current = units.first().map(|u| u.id).unwrap_or("1");
    std::fs::write(repo.state_path(), state(current, units.len())).unwrap();
    std::fs::write(repo.config_path(), "commit_docs = true\n").unwrap();
}

/// A unit directory holding `files` (empty bodies carry a minimal metadata block).
#[allow(dead_code)]
pub fn unit_dir(repo: &Repository, name: &str, files: &[&str]) {
    let dir = repo.units_dir().join(name);
    std::fs::create_dir_all(&dir).unwrap();
    for file in files {
        std::fs::write(dir.join(file), "---\nwave: 1\n---\n\nBody\n").unwrap();
    }
}

#[allow(dead_code)]
pub fn read(path: &Path) -> String {
    std::fs::read_to_string(path).unwrap()
}

#[allow(dead_code)]
pub fn dir_names(repo: &Repository) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(repo.units_dir())
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
        .collect();
    names.sort();
    names
}

#[allow(dead_code)]
pub fn file_names(repo: &Repository, dir: &str) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(repo.units_dir().join(dir))
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
        .collect();
    names.sort();
    names
}
