use std::{fmt, io, path::StripPrefixError};

use regex::Error as RegexError;
use serde::{Deserialize, Serialize};
use serde_json::Error as JsonError;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Error)]
pub enum PlanError {
    #[error("Invalid Command: {0}")]
    Command(String),
    #[error("Refused: {0}")]
    Guard(String),
    #[error("File System error: {0}")]
    Io(String),
    #[error("Item Not Found: {0}")]
    NotFound(String),
    #[error("Parse error: {0}")]
    Parse(String),
    #[error("You do not have permission to access this resource")]
    PermissionDenied,
    #[error("(De)Serialization error: {0}")]
    Serialization(String),
    #[error("Planning structure error: {0}")]
    Structure(String),
    #[error("Version control error: {0}")]
    Vcs(String),
}

impl PlanError {
    /// Process exit code for the command line surface. Invalid invocations use the usage
    /// code; every other failure exits 1.
    pub fn exit_code(&self) -> i32 {
        match self {
            PlanError::Command(_) => 2,
            _ => 1,
        }
    }
}

impl From<StripPrefixError> for PlanError {
    fn from(src: StripPrefixError) -> PlanError {
        PlanError::NotFound(format!("Strip prefix failed for path. Error: {src}"))
    }
}

impl From<toml::de::Error> for PlanError {
    fn from(src: toml::de::Error) -> PlanError {
        PlanError::Serialization(format!("Toml deserialization error: {src}"))
    }
}

impl From<toml::ser::Error> for PlanError {
    fn from(src: toml::ser::Error) -> PlanError {
        PlanError::Serialization(format!("Toml serialization error: {src}"))
    }
}

impl From<toml_edit::TomlError> for PlanError {
    fn from(src: toml_edit::TomlError) -> PlanError {
        PlanError::Serialization(format!("Toml document error: {src}"))
    }
}

impl From<JsonError> for PlanError {
    fn from(src: JsonError) -> PlanError {
        PlanError::Serialization(format!("JSON (de)serialization error: {src}"))
    }
}

impl From<io::Error> for PlanError {
    fn from(x: io::Error) -> Self {
        match x.kind() {
            io::ErrorKind::NotFound => PlanError::NotFound(format!("{x}")),
            io::ErrorKind::PermissionDenied => PlanError::PermissionDenied,
            _ => PlanError::Io(format!("IOError: {}: {x}", x.kind())),
        }
    }
}

impl From<walkdir::Error> for PlanError {
    fn from(x: walkdir::Error) -> Self {
        match x.into_io_error() {
            Some(io_error) => PlanError::from(io_error),
            None => PlanError::Io("directory walk failed (filesystem loop)".to_string()),
        }
    }
}

impl From<fmt::Error> for PlanError {
    fn from(x: fmt::Error) -> Self {
        PlanError::Serialization(format!("{x}"))
    }
}

impl From<RegexError> for PlanError {
    fn from(x: RegexError) -> Self {
        PlanError::Parse(format!("Regex parse failed: {x}"))
    }
}
