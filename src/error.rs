//! Crate-level aggregate error (§7, §10 "Error handling").
//!
//! Every decoding/engine module defines its own hand-rolled error enum
//! (`CfbError`, `AltiumError`, `CadenceError`, `QueryError`); this is the one
//! place that aggregates them, via `thiserror::Error` + `#[from]`.

use thiserror::Error;

use crate::altium::AltiumError;
use crate::cadence::CadenceError;
use crate::cfb::CfbError;
use crate::traversal::QueryError;

#[derive(Debug, Error)]
pub enum DesignError {
    #[error("unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error(transparent)]
    Cfb(#[from] CfbError),

    #[error(transparent)]
    Altium(#[from] AltiumError),

    #[error(transparent)]
    Cadence(#[from] CadenceError),

    #[error(transparent)]
    Query(#[from] QueryError),

    #[error("missing companion files: {0}")]
    MissingCompanionFiles(String),

    #[error("no matching netlist discovered: {0}")]
    NoNetlistDiscovered(String),
}

pub type DesignResult<T> = Result<T, DesignError>;

/// `{ "error": string }`, the boundary shape all errors surface as (§6, §7).
#[derive(Debug, Clone, serde::Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl From<&DesignError> for ErrorResponse {
    fn from(e: &DesignError) -> Self {
        ErrorResponse {
            error: e.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_response_formats_display() {
        let err = DesignError::UnsupportedFormat("extension .xyz is not supported".to_string());
        let resp: ErrorResponse = (&err).into();
        assert!(resp.error.contains(".xyz"));
    }
}
