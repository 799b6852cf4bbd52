//! Typed errors for the table engine and sheet persistence.
//!
//! Front ends wrap these in `anyhow` with context; the engine itself only ever
//! returns the variants below.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Rejected cell edit. Nothing in the table changes when one of these is
/// returned.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EditError {
    #[error("row {row} is out of range (table has {len} rows)")]
    RowOutOfRange { row: usize, len: usize },

    #[error("`{input}` is not a whole number")]
    NotANumber { input: String },

    #[error("available amount cannot be negative (got {value})")]
    Negative { value: i64 },

    #[error("quick-complete is locked")]
    Locked,

    #[error("no material named `{name}`")]
    UnknownName { name: String },
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProjectionError {
    #[error("multiplier {count} is outside 1..={max}")]
    OutOfRange { count: u32, max: u32 },

    #[error("scaling `{name}` by {count} overflows")]
    Overflow { name: String, count: u32 },
}

#[derive(Error, Debug)]
pub enum PersistError {
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to parse {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error(
        "{} has {columns} column(s); at least 4 are required (name, total, missing, available)",
        path.display()
    )]
    Format { path: PathBuf, columns: usize },

    #[error("{} is not valid UTF-8 (line {line})", path.display())]
    Encoding { path: PathBuf, line: u64 },

    #[error("no sheet is open")]
    NoSheet,

    #[error("unsaved changes could not be written")]
    Unsaved,
}

impl PersistError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn parse(path: impl Into<PathBuf>, source: csv::Error) -> Self {
        Self::Parse {
            path: path.into(),
            source,
        }
    }
}
