//! Transactional apply
//!
//! [`apply_plan`] runs every statement of a [`PartitionPlan`] inside one
//! transaction. Either all of them take effect or none do: the first failure rolls
//! the transaction back before the error is returned.

use crate::error::PartitionError;
use crate::executor::{DdlExecutor, ExecutorError};
use crate::plan::{PartitionPlan, StatementRole};
use crate::transaction::{TransactionScope, TransactionalExecutor};
use std::time::{Duration, Instant};

#[cfg(feature = "metrics")]
use crate::metrics::METRICS;

#[cfg(feature = "tracing")]
use tracing::info_span;

/// Outcome of a successful apply
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApplyReport {
    pub table: String,
    pub statements_executed: usize,
    pub elapsed: Duration,
    /// [`PartitionPlan::checksum`] of the applied plan
    pub checksum: String,
}

/// Execute `plan` atomically
///
/// # Errors
///
/// Returns [`PartitionError::Apply`] naming the failed step. When a statement fails
/// the transaction has been rolled back by the time the error is returned; a failed
/// rollback is logged and does not replace the original error.
pub fn apply_plan<E: TransactionalExecutor>(
    plan: &PartitionPlan,
    executor: &E,
) -> Result<ApplyReport, PartitionError> {
    #[cfg(feature = "tracing")]
    let _span = info_span!("apply_partition_plan", table = plan.table(), statements = plan.len())
        .entered();

    let start = Instant::now();
    log::info!(
        "Applying {} partition statements for '{}'",
        plan.len(),
        plan.table()
    );

    let transaction = executor
        .begin()
        .map_err(|e| apply_error(plan, StatementRole::Begin, "BEGIN", e.into()))?;

    for (index, step) in plan.iter().enumerate() {
        log::debug!("[{}/{}] {}: {}", index + 1, plan.len(), step.role, step.sql);

        if let Err(source) = transaction.execute(&step.sql) {
            log::warn!(
                "Statement for {} on '{}' failed, rolling back: {source}",
                step.role,
                plan.table()
            );
            if let Err(rollback_err) = transaction.rollback() {
                log::error!(
                    "Rollback after failed {} on '{}' also failed: {rollback_err}",
                    step.role,
                    plan.table()
                );
            }
            return Err(apply_error(plan, step.role.clone(), &step.sql, source));
        }
    }

    transaction
        .commit()
        .map_err(|e| apply_error(plan, StatementRole::Commit, "COMMIT", e.into()))?;

    let elapsed = start.elapsed();
    log::info!(
        "Applied {} partition statements for '{}' in {:?}",
        plan.len(),
        plan.table(),
        elapsed
    );

    Ok(ApplyReport {
        table: plan.table().to_string(),
        statements_executed: plan.len(),
        elapsed,
        checksum: plan.checksum(),
    })
}

fn apply_error(
    plan: &PartitionPlan,
    role: StatementRole,
    statement: &str,
    source: ExecutorError,
) -> PartitionError {
    #[cfg(feature = "metrics")]
    METRICS.record_apply_failure(plan.table());

    PartitionError::Apply {
        table: plan.table().to_string(),
        role,
        statement: statement.to_string(),
        source,
    }
}
