//! # plandoc-core
//!
//! A Rust library for maintaining a project's planning record: a tree of Markdown
//! documents under `.planning/` that describes a roadmap of numbered units, the jobs
//! inside each unit, their summaries, and the running project state.
//!
//! ## Overview
//!
//! The planning record is written by people and by automation alike, so every operation
//! here is a small, targeted edit of human-readable text. Documents are located,
//! scanned, and patched in place; anything the engine does not understand is left
//! untouched.
//!
//! ### Key Features
//!
//! - **Unit numbering**: integer and decimal unit ids, insertion between units, and
//!   removal that renumbers every later directory, file and roadmap reference
//! - **Roadmap analysis**: disk status per unit, progress tables, checklist completion
//! - **State document**: field and section edits of `STATE.md` that keep the rest intact
//! - **Metadata blocks**: the YAML-like header of job and summary documents
//! - **Validation**: consistency and health checks with optional repair
//! - **Workstreams**: which units can proceed in parallel, and their branches
//! - **Verification**: job structure, artifacts, key links, commits and summaries
//!
//! ## Architecture
//!
//! - **[`repo`]**: the [`repo::Repository`] every operation receives, with its
//!   filesystem ([`fs`]) and version store ([`vcs`]) collaborators
//! - **[`frontmatter`]**, **[`roadmap`]**, **[`state`]**, **[`requirements`]**: one module
//!   per document kind
//! - **[`index`]**: discovery of unit directories and their documents
//! - **[`numbering`]**, **[`milestone`]**, **[`workstreams`]**: multi-document workflows
//! - **[`health`]**, **[`verify`]**, **[`history`]**: read-mostly reports
//! - **[`commands`]**: the [`commands::Op`] enum and its dispatcher, which the `plandoc`
//!   binary drives
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use plandoc_core::{commands::{execute, Op}, repo::Repository};
//!
//! fn main() -> Result<(), plandoc_core::PlanError> {
//!     let repo = Repository::open(".")?;
//!     let analysis = execute(&repo, &Op::RoadmapAnalyze)?;
//!     println!("{}", analysis.render(false)?);
//!     Ok(())
//! }
//! ```
//!
//! ## Features
//!
//! - **bin** (default): the `plandoc` command line (`clap`, `tracing-subscriber`)

pub mod commands;
pub mod config;
pub mod error;
pub mod frontmatter;
pub mod fs;
pub mod health;
pub mod history;
pub mod ids;
pub mod index;
pub mod milestone;
pub mod numbering;
pub mod output;
pub mod repo;
pub mod requirements;
pub mod roadmap;
pub mod span;
pub mod state;
#[cfg(test)]
mod tests;
pub mod vcs;
pub mod verify;
pub mod workstreams;

pub use error::*;
