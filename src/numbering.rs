//! Unit numbering: allocation, insertion, removal with cascading renumbering, completion.
//!
//! Removal is two-phase. [`plan_removal`] is a pure function from the current ids and
//! directory listings to a [`RenumberPlan`]; [`apply_plan`] then performs the filesystem
//! renames, the roadmap rewrite and the state counter update.
use serde::Serialize;
use std::{
    collections::{BTreeMap, BTreeSet},
    str::FromStr,
};

use crate::{
    error::PlanError,
    ids::{dir_name, slug, UnitId},
    index::DocumentIndex,
    repo::Repository,
    requirements,
    roadmap::{self, Roadmap},
    state::{self, StateDocument, UnitStatus},
};

const STAGING_PREFIX: &str = ".renumber-";

/// One past the highest integer unit in the roadmap; `1` for an empty roadmap.
pub fn next_integer(roadmap: &Roadmap) -> UnitId {
    UnitId::integer(roadmap.max_integer().map(|m| m + 1).unwrap_or(1))
}

/// One past the highest `base.N` among unit directories and roadmap entries. Gaps are
/// never reused.
pub fn next_decimal(repo: &Repository, roadmap: &Roadmap, base: &UnitId) -> Result<UnitId, PlanError> {
    let on_disk = DocumentIndex::new(repo)
        .list_units()?
        .into_iter()
        .map(|u| u.id);
    let max_minor = roadmap
        .unit_ids()
        .into_iter()
        .chain(on_disk)
        .filter(|id| id.major == base.major)
        .filter_map(|id| id.minor)
        .max()
        .unwrap_or(0);
    Ok(UnitId::decimal(base.major, max_minor + 1))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnitCreated {
    pub unit_id: UnitId,
    pub name: String,
    pub slug: String,
    pub directory: String,
    pub inserted_after: Option<UnitId>,
}

fn parse_unit(raw: &str) -> Result<UnitId, PlanError> {
    UnitId::from_str(raw).map_err(|_| PlanError::Command(format!("'{raw}' is not a unit id")))
}

/// Append a new integer unit: directory, detail section, checklist entry and progress row.
pub fn add_unit(
    repo: &Repository,
    name: &str,
    goal: Option<&str>,
    depends: Option<&str>,
) -> Result<UnitCreated, PlanError> {
    repo.require_planning_dir()?;
    if slug(name).is_empty() {
        return Err(PlanError::Command("unit name must contain letters or digits".to_string()));
    }
    let mut roadmap = Roadmap::load(repo)?;
    let id = next_integer(&roadmap);
    let depends = match depends {
        Some(d) => d.to_string(),
        None if id.major > 1 => format!("Unit {}", id.major - 1),
        None => "Nothing".to_string(),
    };
    let directory = repo.units_dir().join(dir_name(&id, name));
    repo.fs().create_dir_all(&directory)?;

    roadmap.insert_section(None, &roadmap::section_text(&id, name, goal.unwrap_or(""), &depends, false))?;
    roadmap.insert_checklist_entry(None, &roadmap::checklist_line(&id, name, goal.unwrap_or(""), false));
    roadmap.insert_progress_row(None, &roadmap::progress_row_line(&id, name));
    roadmap.save(repo)?;
    bump_total_units(repo, 1)?;
    tracing::info!("Added unit {} ({})", id, name);
    Ok(UnitCreated {
        unit_id: id,
        name: name.to_string(),
        slug: slug(name),
        directory: repo.display_path(&directory),
        inserted_after: None,
    })
}

/// Insert a decimal unit after `after`. Refused when `after` has no detail section.
pub fn insert_unit(
    repo: &Repository,
    after: &str,
    name: &str,
    goal: Option<&str>,
) -> Result<UnitCreated, PlanError> {
    repo.require_planning_dir()?;
    let target = parse_unit(after)?;
    if slug(name).is_empty() {
        return Err(PlanError::Command("unit name must contain letters or digits".to_string()));
    }
    let mut roadmap = Roadmap::load(repo)?;
    if roadmap.section(&target).is_none() {
        tracing::warn!("Refusing to insert after unit {}: no detail section", target);
        return Err(PlanError::Guard(format!(
            "unit {target} has no detail section in the roadmap; cannot insert after it"
        )));
    }
    let id = next_decimal(repo, &roadmap, &target.base())?;
    let directory = repo.units_dir().join(dir_name(&id, name));
    repo.fs().create_dir_all(&directory)?;

    let depends = format!("Unit {}", target.display_short());
    roadmap.insert_section(
        Some(&target),
        &roadmap::section_text(&id, name, goal.unwrap_or(""), &depends, true),
    )?;
    roadmap.insert_checklist_entry(
        Some(&target),
        &roadmap::checklist_line(&id, name, goal.unwrap_or(""), true),
    );
    roadmap.insert_progress_row(Some(&target), &roadmap::progress_row_line(&id, name));
    roadmap.save(repo)?;
    bump_total_units(repo, 1)?;
    tracing::info!("Inserted unit {} after {}", id, target);
    Ok(UnitCreated {
        unit_id: id,
        name: name.to_string(),
        slug: slug(name),
        directory: repo.display_path(&directory),
        inserted_after: Some(target),
    })
}

fn bump_total_units(repo: &Repository, delta: i64) -> Result<(), PlanError> {
    let mut doc = match StateDocument::load(repo) {
        Ok(doc) => doc,
        Err(PlanError::NotFound(_)) => {
            tracing::debug!("No STATE.md; total units counter not updated");
            return Ok(());
        }
        Err(e) => return Err(e),
    };
    let Some(current) = doc.field(state::TOTAL_UNITS)? else {
        return Ok(());
    };
    let Some(count) = current
        .split_whitespace()
        .next()
        .and_then(|n| n.parse::<i64>().ok())
    else {
        tracing::warn!("Total Units '{}' is not a number; left alone", current);
        return Ok(());
    };
    doc.set_field(state::TOTAL_UNITS, &(count + delta).max(0).to_string())?;
    doc.save(repo)
}

/// A unit directory as seen by the planner: its id, name and contained file names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirListing {
    pub id: UnitId,
    pub name: String,
    pub files: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileRename {
    pub from: String,
    pub to: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DirRename {
    pub from_id: UnitId,
    pub to_id: UnitId,
    pub from: String,
    pub to: String,
    pub files: Vec<FileRename>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RenumberPlan {
    pub removed: UnitId,
    pub removed_dir: Option<String>,
    /// Directory renames in descending order of their current id.
    pub renames: Vec<DirRename>,
    /// Every id that shifts, including roadmap-only units.
    pub id_map: BTreeMap<UnitId, UnitId>,
}

/// The id `id` takes after `removed` is deleted, or `None` when it does not move.
pub fn shifted(id: &UnitId, removed: &UnitId) -> Option<UnitId> {
    match removed.minor {
        Some(removed_minor) => match id.minor {
            Some(minor) if id.major == removed.major && minor > removed_minor => {
                Some(UnitId::decimal(id.major, minor - 1))
            }
            _ => None,
        },
        None if id.major > removed.major => Some(id.with_major(id.major - 1)),
        None => None,
    }
}

/// Compute every rename caused by removing `removed`, without touching anything.
///
/// An integer unit that still has decimal units under it cannot be removed, and no unit
/// may shift onto an id held by a unit that stays put.
pub fn plan_removal(
    removed: &UnitId,
    dirs: &[DirListing],
    roadmap_ids: &[UnitId],
) -> Result<RenumberPlan, PlanError> {
    let known: BTreeSet<UnitId> = roadmap_ids
        .iter()
        .chain(dirs.iter().map(|d| &d.id))
        .copied()
        .collect();
    if !removed.is_decimal() {
        let children: Vec<String> = known
            .iter()
            .filter(|id| id.is_decimal() && id.major == removed.major)
            .map(|id| id.display_short())
            .collect();
        if !children.is_empty() {
            return Err(PlanError::Guard(format!(
                "unit {} still has decimal units ({}); remove them first",
                removed.display_short(),
                children.join(", ")
            )));
        }
    }

    let mut id_map = BTreeMap::new();
    for id in known.iter().filter(|id| *id != removed) {
        if let Some(new) = shifted(id, removed) {
            id_map.insert(*id, new);
        }
    }
    for (from, to) in &id_map {
        if known.contains(to) && to != removed && !id_map.contains_key(to) {
            return Err(PlanError::Guard(format!(
                "unit {} would be renumbered onto existing unit {}",
                from.display_short(),
                to.display_short()
            )));
        }
    }

    let mut renames: Vec<DirRename> = dirs
        .iter()
        .filter(|d| d.id != *removed)
        .filter_map(|d| {
            let new = id_map.get(&d.id)?;
            // Directory names may carry an unpadded id (`3-auth`); files follow the same form.
            let (raw_id, to) = match d.name.split_once('-') {
                Some((raw, rest)) => (raw, format!("{new}-{rest}")),
                None => (d.name.as_str(), new.to_string()),
            };
            let prefixes = [format!("{}-", d.id), format!("{raw_id}-")];
            let new_prefix = format!("{new}-");
            let files = d
                .files
                .iter()
                .filter_map(|f| {
                    prefixes
                        .iter()
                        .find_map(|p| f.strip_prefix(p.as_str()))
                        .map(|rest| FileRename {
                            from: f.clone(),
                            to: format!("{new_prefix}{rest}"),
                        })
                })
                .collect();
            Some(DirRename {
                from_id: d.id,
                to_id: *new,
                from: d.name.clone(),
                to,
                files,
            })
        })
        .collect();
    renames.sort_by(|a, b| b.from_id.cmp(&a.from_id));

    Ok(RenumberPlan {
        removed: *removed,
        removed_dir: dirs
            .iter()
            .find(|d| d.id == *removed)
            .map(|d| d.name.clone()),
        renames,
        id_map,
    })
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RemoveOutcome {
    pub removed: UnitId,
    pub directory_deleted: bool,
    pub renamed_directories: usize,
    pub renamed_files: usize,
    pub roadmap_updated: bool,
    pub roadmap_references: usize,
    /// `Depends on` fields that no longer name the removed unit.
    pub dependencies_dropped: usize,
    pub state_updated: bool,
    pub plan: RenumberPlan,
}

/// Apply a plan: delete, stage, rename, rewrite the roadmap and decrement the counter.
pub fn apply_plan(repo: &Repository, plan: RenumberPlan) -> Result<RemoveOutcome, PlanError> {
    let fs = repo.fs();
    let units = repo.units_dir();

    let mut directory_deleted = false;
    if let Some(dir) = &plan.removed_dir {
        fs.remove_dir_all(&units.join(dir))?;
        directory_deleted = true;
        tracing::info!("Deleted unit directory {}", dir);
    }

    // Phase 1: move every shifting directory to a staging name, highest id first, so no
    // rename can land on a sibling that has not moved yet.
    for rename in &plan.renames {
        let staging = units.join(format!("{STAGING_PREFIX}{}", rename.to));
        tracing::debug!("Staging {} -> {:?}", rename.from, staging);
        fs.rename(&units.join(&rename.from), &staging)?;
    }
    // Phase 2: final names, then the files inside.
    let mut renamed_files = 0;
    for rename in &plan.renames {
        let staging = units.join(format!("{STAGING_PREFIX}{}", rename.to));
        let target = units.join(&rename.to);
        fs.rename(&staging, &target)?;
        for file in &rename.files {
            fs.rename(&target.join(&file.from), &target.join(&file.to))?;
            renamed_files += 1;
        }
        tracing::info!("Renamed unit {} -> {}", rename.from, rename.to);
    }

    let mut roadmap = Roadmap::load(repo)?;
    let removed_from_roadmap = roadmap.remove_unit(&plan.removed)?;
    let dependencies_dropped = roadmap.drop_dependency(&plan.removed)?;
    let references = roadmap.renumber(&plan.id_map)?;
    roadmap.save(repo)?;

    let state_updated = fs.exists(&repo.state_path());
    bump_total_units(repo, -1)?;

    Ok(RemoveOutcome {
        removed: plan.removed,
        directory_deleted,
        renamed_directories: plan.renames.len(),
        renamed_files,
        roadmap_updated: removed_from_roadmap || references > 0 || dependencies_dropped > 0,
        roadmap_references: references,
        dependencies_dropped,
        state_updated,
        plan,
    })
}

/// Remove a unit and renumber its successors. Units with executed jobs (a summary exists)
/// need `force`.
pub fn remove_unit(repo: &Repository, raw_id: &str, force: bool) -> Result<RemoveOutcome, PlanError> {
    repo.require_planning_dir()?;
    let id = parse_unit(raw_id)?;
    let index = DocumentIndex::new(repo);
    let roadmap = Roadmap::load(repo)?;
    let roadmap_ids = roadmap.unit_ids();
    let current = index.current_unit(&id)?;
    if current.is_none() && !roadmap_ids.contains(&id) {
        return Err(PlanError::NotFound(format!("unit {id}")));
    }
    if let Some(dir) = &current {
        let lookup = index.inspect(dir, None)?;
        if !lookup.summaries.is_empty() && !force {
            tracing::warn!("Refusing to remove unit {} with executed jobs", id);
            return Err(PlanError::Guard(format!(
                "unit {id} has {} executed job(s); pass --force to remove it anyway",
                lookup.summaries.len()
            )));
        }
    }

    let mut dirs = Vec::new();
    for unit in index.list_units()? {
        let files = repo
            .fs()
            .list_dir(&unit.path)?
            .into_iter()
            .filter(|e| !e.is_dir)
            .map(|e| e.name)
            .collect();
        dirs.push(DirListing {
            id: unit.id,
            name: unit.name,
            files,
        });
    }
    let plan = plan_removal(&id, &dirs, &roadmap_ids)?;
    tracing::debug!("Renumber plan: {:?}", plan);
    apply_plan(repo, plan)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CompleteOutcome {
    pub unit_id: UnitId,
    pub roadmap_updated: bool,
    pub requirements: Option<requirements::MarkResult>,
    pub next_unit: Option<UnitId>,
    pub milestone_complete: bool,
    pub date: String,
}

/// Mark a unit complete across the roadmap, the requirements ledger and the state snapshot.
pub fn complete_unit(repo: &Repository, raw_id: &str) -> Result<CompleteOutcome, PlanError> {
    repo.require_planning_dir()?;
    let id = parse_unit(raw_id)?;
    let date = state::today();
    let mut roadmap = Roadmap::load(repo)?;
    let details = roadmap.get_unit(&id);
    if !details.found && !details.malformed {
        return Err(PlanError::NotFound(format!("unit {id} in the roadmap")));
    }
    let roadmap_updated = roadmap.mark_complete(&id, &date)?;
    roadmap.save(repo)?;

    let requirements = if repo.fs().exists(&repo.requirements_path()) && !details.requirements.is_empty() {
        Some(requirements::mark_complete(repo, &details.requirements)?)
    } else {
        None
    };

    let ids = roadmap.unit_ids();
    let next_unit = ids.iter().find(|other| **other > id).copied();
    let milestone_complete = next_unit.is_none();
    if repo.fs().exists(&repo.state_path()) {
        let mut doc = StateDocument::load(repo)?;
        match next_unit {
            Some(next) => {
                let next_name = roadmap.get_unit(&next).name.unwrap_or_default();
                doc.set_field(state::CURRENT_UNIT, &next.to_string())?;
                doc.set_field(state::CURRENT_UNIT_NAME, &next_name)?;
                doc.set_field(state::CURRENT_JOB, "Not started")?;
                doc.set_field(state::STATUS, &UnitStatus::ReadyToPlan.to_string())?;
            }
            None => {
                doc.set_field(state::STATUS, &UnitStatus::MilestoneComplete.to_string())?;
            }
        }
        doc.set_field(state::LAST_ACTIVITY, &date)?;
        doc.set_field(
            state::LAST_ACTIVITY_DESCRIPTION,
            &format!("Unit {id} complete"),
        )?;
        doc.save(repo)?;
    }
    tracing::info!("Completed unit {}; next {:?}", id, next_unit);
    Ok(CompleteOutcome {
        unit_id: id,
        roadmap_updated,
        requirements,
        next_unit,
        milestone_complete,
        date,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::helpers::{mem_repo, seed_project, FixtureUnit};

    fn listing(id: &str, name: &str, files: &[&str]) -> DirListing {
        DirListing {
            id: UnitId::from_str(id).unwrap(),
            name: name.to_string(),
            files: files.iter().map(|f| f.to_string()).collect(),
        }
    }

    #[test]
    fn next_integer_starts_at_one() {
        assert_eq!(next_integer(&Roadmap::new("# Roadmap\n")), UnitId::integer(1));
        assert_eq!(
            next_integer(&Roadmap::new("- [ ] **Unit 4: Late**\n### Unit 2: B\n")),
            UnitId::integer(5)
        );
    }

    #[test]
    fn next_decimal_never_fills_gaps() {
        let repo = mem_repo();
        for name in ["06-base", "06.1-one", "06.3-three"] {
            repo.fs().create_dir_all(&repo.units_dir().join(name)).unwrap();
        }
        let roadmap = Roadmap::new("### Unit 6: Base\n");
        assert_eq!(
            next_decimal(&repo, &roadmap, &UnitId::integer(6)).unwrap(),
            UnitId::decimal(6, 4)
        );
        assert_eq!(
            next_decimal(&repo, &roadmap, &UnitId::integer(7)).unwrap(),
            UnitId::decimal(7, 1)
        );
    }

    #[test]
    fn integer_removal_plan_shifts_higher_units_and_keeps_suffixes() {
        let dirs = vec![
            listing("01", "01-a", &["01-01-JOB.md"]),
            listing("02", "02-b", &["02-01-JOB.md"]),
            listing("03", "03-c", &["03-01-JOB.md", "03-02-SUMMARY.md", "03-CONTEXT.md", "notes.md"]),
            listing("03.1", "03.1-c-fix", &["03.1-01-JOB.md"]),
        ];
        let roadmap_ids = vec![
            UnitId::integer(1),
            UnitId::integer(2),
            UnitId::integer(3),
            UnitId::decimal(3, 1),
            UnitId::integer(4),
        ];
        let plan = plan_removal(&UnitId::integer(2), &dirs, &roadmap_ids).unwrap();
        assert_eq!(plan.removed_dir.as_deref(), Some("02-b"));
        let order: Vec<&str> = plan.renames.iter().map(|r| r.from.as_str()).collect();
        assert_eq!(order, vec!["03.1-c-fix", "03-c"]);
        assert_eq!(plan.renames[0].to, "02.1-c-fix");
        assert_eq!(plan.renames[1].to, "02-c");
        let files: Vec<(&str, &str)> = plan.renames[1]
            .files
            .iter()
            .map(|f| (f.from.as_str(), f.to.as_str()))
            .collect();
        assert_eq!(
            files,
            vec![
                ("03-01-JOB.md", "02-01-JOB.md"),
                ("03-02-SUMMARY.md", "02-02-SUMMARY.md"),
                ("03-CONTEXT.md", "02-CONTEXT.md"),
            ]
        );
        assert_eq!(plan.id_map.get(&UnitId::integer(4)), Some(&UnitId::integer(3)));
        assert!(!plan.id_map.contains_key(&UnitId::integer(1)));
    }

    #[test]
    fn integer_with_decimal_children_is_not_removed() {
        let dirs = vec![
            listing("01", "01-base", &[]),
            listing("02", "02-api", &[]),
            listing("02.1", "02.1-hotfix", &[]),
            listing("03", "03-top", &[]),
            listing("03.1", "03.1-patch", &[]),
        ];
        let ids: Vec<UnitId> = dirs.iter().map(|d| d.id).collect();
        let refused = plan_removal(&UnitId::integer(2), &dirs, &ids);
        assert!(matches!(refused, Err(PlanError::Guard(msg)) if msg.contains("2.1")));

        // With the child gone, 3.1 takes the freed 2.1.
        let remaining: Vec<DirListing> = dirs
            .into_iter()
            .filter(|d| d.id != UnitId::decimal(2, 1))
            .collect();
        let ids: Vec<UnitId> = remaining.iter().map(|d| d.id).collect();
        let plan = plan_removal(&UnitId::integer(2), &remaining, &ids).unwrap();
        assert_eq!(
            plan.id_map.get(&UnitId::decimal(3, 1)),
            Some(&UnitId::decimal(2, 1))
        );
        assert_eq!(plan.renames[0].to, "02.1-patch");
    }

    #[test]
    fn decimal_removal_plan_only_shifts_later_siblings() {
        let dirs = vec![
            listing("02", "02-b", &[]),
            listing("02.1", "02.1-x", &[]),
            listing("02.2", "02.2-y", &["02.2-01-JOB.md"]),
            listing("03", "03-c", &[]),
        ];
        let ids: Vec<UnitId> = dirs.iter().map(|d| d.id).collect();
        let plan = plan_removal(&UnitId::decimal(2, 1), &dirs, &ids).unwrap();
        assert_eq!(plan.renames.len(), 1);
        assert_eq!(plan.renames[0].to, "02.1-y");
        assert_eq!(plan.renames[0].files[0].to, "02.1-01-JOB.md");
        assert_eq!(plan.id_map.len(), 1);
    }

    #[test]
    fn removal_cascades_through_disk_roadmap_and_state() {
        let repo = mem_repo();
        seed_project(
            &repo,
            &[
                FixtureUnit::new("1", "Base").jobs(1, 1).checked(),
                FixtureUnit::new("2", "Middle").depends("Unit 1").jobs(1, 0),
                FixtureUnit::new("3", "Top").depends("Unit 2").jobs(2, 0),
            ],
        );
        let outcome = remove_unit(&repo, "2", false).unwrap();
        assert!(outcome.directory_deleted);
        assert_eq!(outcome.renamed_directories, 1);

        let new_dir = repo.units_dir().join("02-top");
        assert!(repo.fs().exists(&new_dir.join("02-01-JOB.md")));
        assert!(repo.fs().exists(&new_dir.join("02-02-JOB.md")));
        assert!(!repo.fs().exists(&repo.units_dir().join("03-top")));

        let roadmap = Roadmap::load(&repo).unwrap();
        assert!(!roadmap.text().contains("Middle"));
        let top = roadmap.get_unit(&UnitId::integer(2));
        assert_eq!(top.name.as_deref(), Some("Top"));
        assert_eq!(top.depends_on.as_deref(), Some("Nothing"));
        assert!(top.depends_on_ids.is_empty());
        assert_eq!(outcome.dependencies_dropped, 1);
        let streams = crate::workstreams::analyze(&repo).unwrap();
        assert!(streams.cycles.is_empty());
        assert_eq!(streams.candidates[0].unit_id, UnitId::integer(2));
        assert!(roadmap.text().contains("- [ ] 02-02-JOB.md"));
        assert_eq!(
            StateDocument::load(&repo)
                .unwrap()
                .field(state::TOTAL_UNITS)
                .unwrap()
                .as_deref(),
            Some("2")
        );
    }

    #[test]
    fn removal_of_executed_unit_needs_force() {
        let repo = mem_repo();
        seed_project(
            &repo,
            &[
                FixtureUnit::new("1", "Base").jobs(1, 1),
                FixtureUnit::new("2", "Next"),
            ],
        );
        assert!(matches!(remove_unit(&repo, "1", false), Err(PlanError::Guard(_))));
        assert!(repo.fs().exists(&repo.units_dir().join("01-base")));
        remove_unit(&repo, "1", true).unwrap();
        assert!(repo.fs().exists(&repo.units_dir().join("01-next")));
    }

    #[test]
    fn add_and_insert_allocate_ids() {
        let repo = mem_repo();
        seed_project(
            &repo,
            &[FixtureUnit::new("1", "Base"), FixtureUnit::new("2", "Next")],
        );
        let added = add_unit(&repo, "Reporting", Some("Reports"), None).unwrap();
        assert_eq!(added.unit_id, UnitId::integer(3));
        assert_eq!(added.directory, ".planning/units/03-reporting");

        let inserted = insert_unit(&repo, "1", "Hot Fix", None).unwrap();
        assert_eq!(inserted.unit_id, UnitId::decimal(1, 1));
        let second = insert_unit(&repo, "1", "Another", None).unwrap();
        assert_eq!(second.unit_id, UnitId::decimal(1, 2));

        let roadmap = Roadmap::load(&repo).unwrap();
        let order: Vec<String> = roadmap.units().iter().map(|h| h.id.to_string()).collect();
        assert_eq!(order, vec!["01", "01.1", "01.2", "02", "03"]);
        let reporting = roadmap.get_unit(&UnitId::integer(3));
        assert_eq!(reporting.depends_on_ids, vec![UnitId::integer(2)]);
        assert!(matches!(
            insert_unit(&repo, "9", "Nowhere", None),
            Err(PlanError::Guard(_))
        ));
        assert_eq!(
            StateDocument::load(&repo)
                .unwrap()
                .field(state::TOTAL_UNITS)
                .unwrap()
                .as_deref(),
            Some("5")
        );
    }

    #[test]
    fn complete_advances_state() {
        let repo = mem_repo();
        seed_project(
            &repo,
            &[
                FixtureUnit::new("1", "Base").jobs(1, 1),
                FixtureUnit::new("2", "Next"),
            ],
        );
        repo.fs()
            .write(
                &repo.requirements_path(),
                "- [ ] **REQ-01**: First\n- [ ] **REQ-02**: Second\n",
            )
            .unwrap();
        let outcome = complete_unit(&repo, "1").unwrap();
        assert_eq!(outcome.next_unit, Some(UnitId::integer(2)));
        assert!(!outcome.milestone_complete);
        assert_eq!(outcome.requirements.unwrap().updated, vec!["REQ-01"]);
        let snap = state::snapshot(&repo).unwrap();
        assert_eq!(snap.current_unit.as_deref(), Some("02"));
        assert_eq!(snap.current_unit_name.as_deref(), Some("Next"));
        assert_eq!(snap.status, Some(UnitStatus::ReadyToPlan));
        assert!(Roadmap::load(&repo).unwrap().checklist()[0].checked);

        let last = complete_unit(&repo, "2").unwrap();
        assert!(last.milestone_complete);
        assert_eq!(
            state::snapshot(&repo).unwrap().status,
            Some(UnitStatus::MilestoneComplete)
        );
    }
}
