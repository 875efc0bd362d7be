//! Project history digest built from summary metadata, current and archived.
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

use crate::{
    error::PlanError,
    frontmatter,
    index::{DocumentIndex, UnitDir},
    repo::Repository,
};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct UnitDigest {
    pub name: String,
    pub archived: Option<String>,
    pub provides: BTreeSet<String>,
    pub affects: BTreeSet<String>,
    pub patterns: BTreeSet<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Decision {
    pub unit: String,
    pub decision: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct HistoryDigest {
    /// Keyed by canonical unit id; archived units by `{version}/{id}`.
    pub units: BTreeMap<String, UnitDigest>,
    pub decisions: Vec<Decision>,
    pub tech_stack: BTreeSet<String>,
    pub summaries_read: usize,
    /// Summaries that could not be read or carried no metadata block.
    pub skipped: usize,
}

impl HistoryDigest {
    fn absorb(&mut self, dir: &UnitDir, archived: Option<&str>, content: &str) -> bool {
        let parsed = frontmatter::parse(content);
        if !parsed.present {
            return false;
        }
        let meta = parsed.metadata;
        let key = match archived {
            Some(version) => format!("{version}/{}", dir.id),
            None => dir.id.to_string(),
        };
        let unit = self.units.entry(key.clone()).or_insert_with(|| UnitDigest {
            name: dir.slug.replace('-', " "),
            archived: archived.map(str::to_string),
            ..Default::default()
        });
        unit.provides.extend(meta.get_list("provides"));
        unit.affects.extend(meta.get_list("affects"));
        unit.patterns.extend(meta.get_list("patterns-established"));
        for decision in meta.get_list("key-decisions") {
            self.decisions.push(Decision {
                unit: key.clone(),
                decision,
            });
        }
        if let Some(stack) = meta.get_path("tech-stack.added") {
            self.tech_stack.extend(stack.to_string_list());
        }
        true
    }
}

/// Fold every summary into a digest. Archived milestones are read oldest first, so the
/// current units come last.
pub fn digest(repo: &Repository) -> Result<HistoryDigest, PlanError> {
    repo.require_planning_dir()?;
    let index = DocumentIndex::new(repo);
    let mut sources: Vec<(Option<String>, std::path::PathBuf)> = index
        .archives()?
        .into_iter()
        .rev()
        .map(|(version, path)| (Some(version), path))
        .collect();
    sources.push((None, repo.units_dir()));

    let mut digest = HistoryDigest::default();
    for (archived, root) in sources {
        for unit in index.units_in(&root)? {
            let lookup = index.inspect(&unit, archived.clone())?;
            for summary in &lookup.summaries {
                let path = unit.path.join(summary);
                let content = match repo.fs().read_to_string(&path) {
                    Ok(content) => content,
                    Err(e) => {
                        tracing::warn!("Skipping unreadable summary {}: {}", summary, e);
                        digest.skipped += 1;
                        continue;
                    }
                };
                if digest.absorb(&unit, archived.as_deref(), &content) {
                    digest.summaries_read += 1;
                } else {
                    tracing::warn!("Skipping summary without metadata {}", summary);
                    digest.skipped += 1;
                }
            }
        }
    }
    tracing::debug!(
        "History digest: {} summaries read, {} skipped",
        digest.summaries_read,
        digest.skipped
    );
    Ok(digest)
}
