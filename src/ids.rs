//! Unit and job identifiers.
//!
//! A [`UnitId`] is an integer (`06`) or a decimal insertion under an integer (`06.1`). The
//! canonical text form pads the integer part to two digits; parsing accepts unpadded input
//! (`6`, `6.1`). Ordering is numeric: `02 < 02.1 < 02.2 < 03`.
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::{fmt, str::FromStr};
use unicode_normalization::UnicodeNormalization;

use crate::error::PlanError;

static UNIT_ID: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d+)(?:\.(\d+))?$").expect("static regex"));
static DIR_NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d+(?:\.\d+)?)(?:-(.*))?$").expect("static regex"));
static JOB_FILE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(\d+(?:\.\d+)?)-(\d+)-(JOB|SUMMARY)\.md$").expect("static regex")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct UnitId {
    pub major: u32,
    pub minor: Option<u32>,
}

impl UnitId {
    pub fn integer(major: u32) -> Self {
        UnitId { major, minor: None }
    }

    pub fn decimal(major: u32, minor: u32) -> Self {
        UnitId {
            major,
            minor: Some(minor),
        }
    }

    pub fn is_decimal(&self) -> bool {
        self.minor.is_some()
    }

    /// The integer unit this id belongs to.
    pub fn base(&self) -> UnitId {
        UnitId::integer(self.major)
    }

    /// Unpadded form used in roadmap prose: `2`, `2.1`.
    pub fn display_short(&self) -> String {
        match self.minor {
            Some(minor) => format!("{}.{}", self.major, minor),
            None => self.major.to_string(),
        }
    }

    /// Same fractional suffix moved onto another integer.
    pub fn with_major(&self, major: u32) -> UnitId {
        UnitId {
            major,
            minor: self.minor,
        }
    }

    /// Does a directory name carry this id, padded or not, followed by `-` (or equal it)?
    pub fn prefixes(&self, name: &str) -> bool {
        parse_dir_name(name).is_some_and(|(id, _)| id == *self)
    }
}

impl fmt::Display for UnitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.minor {
            Some(minor) => write!(f, "{:02}.{}", self.major, minor),
            None => write!(f, "{:02}", self.major),
        }
    }
}

impl FromStr for UnitId {
    type Err = PlanError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let caps = UNIT_ID
            .captures(trimmed)
            .ok_or_else(|| PlanError::Parse(format!("'{s}' is not a unit identifier")))?;
        let major = caps[1]
            .parse::<u32>()
            .map_err(|e| PlanError::Parse(format!("unit '{s}': {e}")))?;
        let minor = match caps.get(2) {
            Some(m) => Some(
                m.as_str()
                    .parse::<u32>()
                    .map_err(|e| PlanError::Parse(format!("unit '{s}': {e}")))?,
            ),
            None => None,
        };
        Ok(UnitId { major, minor })
    }
}

impl Serialize for UnitId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for UnitId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        UnitId::from_str(&s).map_err(serde::de::Error::custom)
    }
}

/// `{unit}-{NN}`, e.g. `03-02` or `06.1-01`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct JobId {
    pub unit: UnitId,
    pub number: u32,
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{:02}", self.unit, self.number)
    }
}

impl JobId {
    pub fn new(unit: UnitId, number: u32) -> Self {
        JobId { unit, number }
    }

    pub fn job_file(&self) -> String {
        format!("{self}-JOB.md")
    }

    pub fn summary_file(&self) -> String {
        format!("{self}-SUMMARY.md")
    }
}

/// Kind of a unit-directory file recognized by name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobDocKind {
    Job,
    Summary,
}

/// Parse `03-02-JOB.md` / `03-02-SUMMARY.md` file names.
pub fn parse_job_file(name: &str) -> Option<(JobId, JobDocKind)> {
    let caps = JOB_FILE.captures(name)?;
    let unit = UnitId::from_str(&caps[1]).ok()?;
    let number = caps[2].parse::<u32>().ok()?;
    let kind = if &caps[3] == "JOB" {
        JobDocKind::Job
    } else {
        JobDocKind::Summary
    };
    Some((JobId::new(unit, number), kind))
}

/// Split a unit directory name `06.1-fix-login` into its id and slug.
pub fn parse_dir_name(name: &str) -> Option<(UnitId, String)> {
    let caps = DIR_NAME.captures(name)?;
    let id = UnitId::from_str(&caps[1]).ok()?;
    let slug = caps.get(2).map(|m| m.as_str().to_string()).unwrap_or_default();
    Some((id, slug))
}

/// Normalize free text to an ASCII slug: `"Fix Login Flow!"` -> `fix-login-flow`.
pub fn slug(text: &str) -> String {
    let ascii: String = text
        .nfkd()
        .filter(|c| c.is_ascii())
        .collect::<String>()
        .to_ascii_lowercase();
    let mut out = String::with_capacity(ascii.len());
    let mut pending_dash = false;
    for c in ascii.chars() {
        if c.is_ascii_alphanumeric() {
            if pending_dash && !out.is_empty() {
                out.push('-');
            }
            pending_dash = false;
            out.push(c);
        } else {
            pending_dash = true;
        }
    }
    out
}

/// Directory name for a unit: `{id}-{slug}` (just `{id}` when the slug is empty).
pub fn dir_name(id: &UnitId, name: &str) -> String {
    let s = slug(name);
    if s.is_empty() {
        id.to_string()
    } else {
        format!("{id}-{s}")
    }
}
