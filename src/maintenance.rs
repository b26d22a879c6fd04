//! Partition maintenance
//!
//! Operations on an existing partitioned table. Each one is a single autocommit
//! statement (plus `VACUUM` after a drop when enabled); none of them run inside the
//! create transaction, which is what allows `DETACH PARTITION ... CONCURRENTLY`.
//!
//! Table and partition names must be plain identifiers with at most one schema
//! qualifier; anything else is rejected before a statement is built.

use crate::builder::PartitionFlags;
use crate::error::{MaintenanceOp, PartitionError};
use crate::executor::DdlExecutor;
use crate::partition::{validate_qualified_identifier, PartitionBounds, PartitionValue};

#[cfg(feature = "metrics")]
use crate::metrics::METRICS;

#[cfg(feature = "tracing")]
use tracing::info_span;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionMaintenance {
    table: String,
    flags: PartitionFlags,
}

impl PartitionMaintenance {
    pub fn new(table: impl Into<String>, flags: PartitionFlags) -> Self {
        Self {
            table: table.into(),
            flags,
        }
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn flags(&self) -> &PartitionFlags {
        &self.flags
    }

    /// Attach an existing table as a partition
    pub fn attach_partition<E: DdlExecutor>(
        &self,
        executor: &E,
        partition_table: &str,
        bounds: &PartitionBounds,
    ) -> Result<(), PartitionError> {
        bounds.validate()?;
        self.check_names(partition_table)?;
        let sql = format!(
            "ALTER TABLE {} ATTACH PARTITION {partition_table} {}",
            self.table,
            bounds.values_clause()
        );
        self.run(executor, MaintenanceOp::Attach, partition_table, &sql)
    }

    pub fn attach_range_partition<E: DdlExecutor>(
        &self,
        executor: &E,
        partition_table: &str,
        from: impl Into<PartitionValue>,
        to: impl Into<PartitionValue>,
    ) -> Result<(), PartitionError> {
        let bounds = PartitionBounds::range(from, to)?;
        self.attach_partition(executor, partition_table, &bounds)
    }

    /// Detach a partition, keeping it as a standalone table
    ///
    /// `concurrently: None` follows the `detach_concurrently` flag.
    pub fn detach_partition<E: DdlExecutor>(
        &self,
        executor: &E,
        partition_table: &str,
        concurrently: Option<bool>,
    ) -> Result<(), PartitionError> {
        self.check_names(partition_table)?;
        let mut sql = format!("ALTER TABLE {} DETACH PARTITION {partition_table}", self.table);
        if concurrently.unwrap_or(self.flags.detach_concurrently) {
            sql.push_str(" CONCURRENTLY");
        }
        self.run(executor, MaintenanceOp::Detach, partition_table, &sql)
    }

    /// Drop a partition and everything depending on it
    pub fn drop_partition<E: DdlExecutor>(
        &self,
        executor: &E,
        partition_table: &str,
    ) -> Result<(), PartitionError> {
        self.check_names(partition_table)?;
        let sql = format!("DROP TABLE IF EXISTS {partition_table} CASCADE");
        self.run(executor, MaintenanceOp::Drop, partition_table, &sql)?;

        if self.flags.vacuum_after_drop {
            self.vacuum(executor, false)?;
        }
        Ok(())
    }

    pub fn analyze<E: DdlExecutor>(&self, executor: &E) -> Result<(), PartitionError> {
        self.analyze_partition(executor, &self.table)
    }

    pub fn vacuum<E: DdlExecutor>(&self, executor: &E, full: bool) -> Result<(), PartitionError> {
        self.vacuum_partition(executor, &self.table, full)
    }

    pub fn analyze_partition<E: DdlExecutor>(
        &self,
        executor: &E,
        partition_table: &str,
    ) -> Result<(), PartitionError> {
        self.check_names(partition_table)?;
        let sql = format!("ANALYZE {partition_table}");
        self.run(executor, MaintenanceOp::Analyze, partition_table, &sql)
    }

    pub fn vacuum_partition<E: DdlExecutor>(
        &self,
        executor: &E,
        partition_table: &str,
        full: bool,
    ) -> Result<(), PartitionError> {
        self.check_names(partition_table)?;
        let sql = if full {
            format!("VACUUM FULL {partition_table}")
        } else {
            format!("VACUUM {partition_table}")
        };
        self.run(executor, MaintenanceOp::Vacuum, partition_table, &sql)
    }

    fn check_names(&self, partition_table: &str) -> Result<(), PartitionError> {
        validate_qualified_identifier("table name", &self.table)?;
        validate_qualified_identifier("partition table", partition_table)
    }

    fn run<E: DdlExecutor>(
        &self,
        executor: &E,
        operation: MaintenanceOp,
        target: &str,
        sql: &str,
    ) -> Result<(), PartitionError> {
        #[cfg(feature = "tracing")]
        let _span = info_span!("partition_maintenance", table = %self.table, %operation, partition = target)
            .entered();

        log::debug!("{operation} on '{}': {sql}", self.table);
        let result = executor.execute(sql);

        #[cfg(feature = "metrics")]
        METRICS.record_maintenance(operation, result.is_ok());

        match result {
            Ok(_) => {
                log::info!("Partition {operation} succeeded for '{target}'");
                Ok(())
            }
            Err(source) => Err(PartitionError::Maintenance {
                operation,
                target: target.to_string(),
                statement: sql.to_string(),
                source,
            }),
        }
    }
}
