//! Command results as printed on stdout.
//!
//! Every command yields a JSON value and, where a single scalar answers the question, a
//! terse raw form. Payloads above [`SPILL_THRESHOLD`] bytes are written to a temporary file
//! and replaced by an `@file:<path>` reference.
use serde::Serialize;
use std::{io::Write, path::PathBuf};

use crate::error::PlanError;

pub const SPILL_THRESHOLD: usize = 50_000;

#[derive(Debug, Clone, PartialEq)]
pub struct CommandOutput {
    pub json: serde_json::Value,
    pub raw: Option<String>,
}

impl CommandOutput {
    pub fn new<T: Serialize>(value: &T) -> Result<Self, PlanError> {
        Ok(CommandOutput {
            json: serde_json::to_value(value)?,
            raw: None,
        })
    }

    pub fn with_raw(mut self, raw: impl Into<String>) -> Self {
        self.raw = Some(raw.into());
        self
    }

    /// The text to print: the raw form when requested and available, otherwise pretty JSON.
    pub fn render(&self, raw: bool) -> Result<String, PlanError> {
        match (&self.raw, raw) {
            (Some(text), true) => Ok(text.clone()),
            _ => Ok(serde_json::to_string_pretty(&self.json)?),
        }
    }
}

/// Where a rendered payload ended up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Emitted {
    Inline(String),
    Spilled(PathBuf),
}

impl Emitted {
    /// The line printed on stdout.
    pub fn line(&self) -> String {
        match self {
            Emitted::Inline(text) => text.clone(),
            Emitted::Spilled(path) => format!("@file:{}", path.display()),
        }
    }
}

/// Keep small payloads inline; persist large ones to a temp file that outlives the process.
pub fn spill(text: String) -> Result<Emitted, PlanError> {
    if text.len() <= SPILL_THRESHOLD {
        return Ok(Emitted::Inline(text));
    }
    let mut file = tempfile::Builder::new()
        .prefix("plandoc-")
        .suffix(".json")
        .tempfile()?;
    file.write_all(text.as_bytes())?;
    let (_, path) = file
        .keep()
        .map_err(|e| PlanError::Io(format!("could not keep spill file: {e}")))?;
    tracing::debug!("Spilled {} bytes to {:?}", text.len(), path);
    Ok(Emitted::Spilled(path))
}
