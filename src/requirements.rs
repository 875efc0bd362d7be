//! The requirements ledger (`REQUIREMENTS.md`).
//!
//! Requirements are checklist entries `- [ ] **AUTH-01**: ...`, optionally mirrored in a
//! traceability table whose rows start with the requirement id.
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use std::collections::BTreeSet;

use crate::{
    error::PlanError,
    repo::Repository,
    span::{apply_edits, lines, Span},
};

static ENTRY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*[-*] \[([ xX])\]\s*\*\*([A-Za-z0-9_.-]+)\*\*:?\s*(.*?)\s*$")
        .expect("static regex")
});
const OPEN_STATUSES: [&str; 3] = ["pending", "in progress", "not started"];

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Requirement {
    pub id: String,
    pub description: String,
    pub complete: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MarkResult {
    pub updated: Vec<String>,
    pub already_complete: Vec<String>,
    pub not_found: Vec<String>,
}

pub fn parse(text: &str) -> Vec<Requirement> {
    lines(text)
        .filter_map(|(_, line)| ENTRY.captures(line))
        .map(|caps| Requirement {
            id: caps[2].to_string(),
            description: caps[3].to_string(),
            complete: !caps[1].trim().is_empty(),
        })
        .collect()
}

/// Check the entries and table rows of `ids`. Ids match case-insensitively.
pub fn mark_complete_text(text: &str, ids: &[String]) -> Result<(String, MarkResult), PlanError> {
    let wanted: BTreeSet<String> = ids
        .iter()
        .map(|id| id.trim().to_ascii_uppercase())
        .filter(|id| !id.is_empty())
        .collect();
    let mut edits: Vec<(Span, String)> = Vec::new();
    let mut updated = BTreeSet::new();
    let mut already = BTreeSet::new();
    let mut seen = BTreeSet::new();

    for (span, line) in lines(text) {
        if let Some(caps) = ENTRY.captures(line) {
            let id = caps[2].to_ascii_uppercase();
            if !wanted.contains(&id) {
                continue;
            }
            seen.insert(id.clone());
            let Some(mark) = caps.get(1) else {
                continue;
            };
            if mark.as_str().trim().is_empty() {
                edits.push((
                    Span::new(span.start + mark.start(), span.start + mark.end()),
                    "x".to_string(),
                ));
                updated.insert(id);
            } else {
                already.insert(id);
            }
            continue;
        }

        let trimmed = line.trim();
        if !trimmed.starts_with('|') {
            continue;
        }
        let cells: Vec<&str> = trimmed.trim_matches('|').split('|').collect();
        let Some(first) = cells.first() else {
            continue;
        };
        let id = first.trim().trim_matches('*').trim().to_ascii_uppercase();
        if !wanted.contains(&id) {
            continue;
        }
        seen.insert(id.clone());
        let mut changed = false;
        let rebuilt: Vec<String> = cells
            .iter()
            .map(|cell| {
                if OPEN_STATUSES.contains(&cell.trim().to_ascii_lowercase().as_str()) {
                    changed = true;
                    " Complete ".to_string()
                } else {
                    cell.to_string()
                }
            })
            .collect();
        if changed {
            let indent = &line[..line.len() - line.trim_start().len()];
            let ending = &span.slice(text)[line.len()..];
            edits.push((span, format!("{indent}|{}|{ending}", rebuilt.join("|"))));
            updated.insert(id);
        }
    }

    let out = apply_edits(text, edits)?;
    already.retain(|id| !updated.contains(id));
    let result = MarkResult {
        updated: updated.into_iter().collect(),
        already_complete: already.into_iter().collect(),
        not_found: wanted.difference(&seen).cloned().collect(),
    };
    Ok((out, result))
}

pub fn mark_complete(repo: &Repository, ids: &[String]) -> Result<MarkResult, PlanError> {
    let path = repo.requirements_path();
    let text = repo.fs().read_to_string(&path)?;
    let (updated, result) = mark_complete_text(&text, ids)?;
    if updated != text {
        repo.fs().write(&path, &updated)?;
        tracing::info!("Marked requirements complete: {}", result.updated.join(", "));
    }
    if !result.not_found.is_empty() {
        tracing::warn!("Requirements not found: {}", result.not_found.join(", "));
    }
    Ok(result)
}
