//! Partition error taxonomy
//!
//! - [`PartitionError::Configuration`]: the table description is incomplete or contradictory; raised
//!   before any SQL exists and never retried.
//! - [`PartitionError::Synthesis`]: internal inconsistency found while generating SQL.
//! - [`PartitionError::Apply`]: a statement failed inside `apply`; the transaction has
//!   already been rolled back when the caller sees it.
//! - [`PartitionError::Maintenance`]: a standalone maintenance statement failed.

use crate::executor::ExecutorError;
use crate::plan::StatementRole;
use std::fmt;
use thiserror::Error;

/// Standalone maintenance operation kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MaintenanceOp {
    Attach,
    Detach,
    Drop,
    Analyze,
    Vacuum,
}

impl fmt::Display for MaintenanceOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MaintenanceOp::Attach => "attach",
            MaintenanceOp::Detach => "detach",
            MaintenanceOp::Drop => "drop",
            MaintenanceOp::Analyze => "analyze",
            MaintenanceOp::Vacuum => "vacuum",
        };
        f.write_str(name)
    }
}

/// Errors raised while planning or applying partition DDL
#[derive(Debug, Error)]
pub enum PartitionError {
    /// Table description incomplete or self-contradictory
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Inconsistency discovered while generating SQL
    #[error("Synthesis error: {0}")]
    Synthesis(String),

    /// A statement failed during apply; the transaction was rolled back
    #[error("Failed to apply partition plan for '{table}' at step {role}: {source}\n  statement: {statement}")]
    Apply {
        table: String,
        role: StatementRole,
        statement: String,
        #[source]
        source: ExecutorError,
    },

    /// A standalone maintenance operation failed
    #[error("Partition {operation} failed for '{target}': {source}\n  statement: {statement}")]
    Maintenance {
        operation: MaintenanceOp,
        target: String,
        statement: String,
        #[source]
        source: ExecutorError,
    },

    /// Configuration values could not be loaded
    #[error("Failed to load partition configuration: {0}")]
    Config(#[from] config::ConfigError),
}

impl PartitionError {
    pub(crate) fn configuration(message: impl Into<String>) -> Self {
        PartitionError::Configuration(message.into())
    }

    pub(crate) fn synthesis(message: impl Into<String>) -> Self {
        PartitionError::Synthesis(message.into())
    }

    pub fn is_configuration(&self) -> bool {
        matches!(self, PartitionError::Configuration(_))
    }

    pub fn is_synthesis(&self) -> bool {
        matches!(self, PartitionError::Synthesis(_))
    }

    pub fn is_apply(&self) -> bool {
        matches!(self, PartitionError::Apply { .. })
    }

    pub fn is_maintenance(&self) -> bool {
        matches!(self, PartitionError::Maintenance { .. })
    }

    /// The logical step that failed, for apply errors
    pub fn failed_role(&self) -> Option<&StatementRole> {
        match self {
            PartitionError::Apply { role, .. } => Some(role),
            _ => None,
        }
    }
}
