//! Application errors.
//!
//! Wraps [`CapacityError`] with the file it concerns. Rendered once, in
//! `main`, as a single line on stderr.

use bootfit_core::CapacityError;
use std::path::PathBuf;
use thiserror::Error;

/// Exit status for a passing check.
pub const EXIT_PASS: u8 = 0;

/// Exit status for a failing check and for every error.
pub const EXIT_FAIL: u8 = 1;

#[derive(Debug, Error)]
pub enum AppError {
    /// The bootloader source could not be read.
    #[error("cannot read {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The bootloader source was read but its capacity could not be derived.
    #[error("{}: {source}", .path.display())]
    Source {
        path: PathBuf,
        #[source]
        source: CapacityError,
    },

    /// Counting or comparing failed.
    #[error(transparent)]
    Capacity(#[from] CapacityError),

    /// The JSON report could not be produced.
    #[error("cannot render report: {0}")]
    Json(#[from] serde_json::Error),
}

impl AppError {
    /// The core error behind this failure, if any.
    pub fn capacity_error(&self) -> Option<&CapacityError> {
        match self {
            Self::Source { source, .. } => Some(source),
            Self::Capacity(err) => Some(err),
            Self::Read { .. } | Self::Json(_) => None,
        }
    }
}
