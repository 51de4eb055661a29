//! Error types shared by every ETL stage.

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while extracting, transforming or loading a job.
#[derive(Error, Debug)]
pub enum EtlError {
    /// Input file does not exist
    #[error("Input file not found: {}", .0.display())]
    InputNotFound(PathBuf),

    /// Input could not be parsed or decoded
    #[error("Malformed input {} at line {line}: {reason}", .path.display())]
    InputMalformed {
        path: PathBuf,
        line: u64,
        reason: String,
    },

    /// Warehouse could not be opened or reached
    #[error("Connection error: {0}")]
    Connection(String),

    /// Record set did not have the expected shape
    #[error("Transform error: {0}")]
    Transform(String),

    /// Writing to a destination table failed
    #[error("Load error on {table}: {reason}")]
    Load { table: String, reason: String },

    /// Staged rows reference keys that do not exist
    #[error("Referential integrity check failed on {table}: {violations} orphan row(s)")]
    ReferentialIntegrity { table: String, violations: usize },

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl EtlError {
    pub fn load(table: &str, err: impl std::fmt::Display) -> Self {
        EtlError::Load {
            table: table.to_string(),
            reason: err.to_string(),
        }
    }

    /// Name of the pipeline stage the error belongs to, for logs and run summaries.
    pub fn stage(&self) -> &'static str {
        match self {
            EtlError::InputNotFound(_) | EtlError::InputMalformed { .. } | EtlError::Csv(_) => {
                "extract"
            }
            EtlError::Connection(_) => "connect",
            EtlError::Transform(_) => "transform",
            EtlError::Load { .. } | EtlError::ReferentialIntegrity { .. } => "load",
            EtlError::Config(_) => "config",
            EtlError::Io(_) | EtlError::Json(_) => "output",
        }
    }
}

pub type Result<T> = std::result::Result<T, EtlError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_names() {
        assert_eq!(EtlError::InputNotFound(PathBuf::from("x.csv")).stage(), "extract");
        assert_eq!(EtlError::Transform("bad".into()).stage(), "transform");
        assert_eq!(EtlError::load("fact_orders", "boom").stage(), "load");
        assert_eq!(
            EtlError::ReferentialIntegrity {
                table: "fact_orders".into(),
                violations: 2
            }
            .stage(),
            "load"
        );
    }

    #[test]
    fn test_messages_name_the_target() {
        let err = EtlError::load("dim_user", "UNIQUE constraint failed");
        assert_eq!(
            err.to_string(),
            "Load error on dim_user: UNIQUE constraint failed"
        );
        let err = EtlError::InputNotFound(PathBuf::from("data/customers.csv"));
        assert!(err.to_string().contains("data/customers.csv"));
    }
}
