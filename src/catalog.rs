//! Catalog queries
//!
//! Read-only inspection of partitioned tables through `pg_inherits`, `pg_class` and
//! `pg_partitioned_table`, plus date-based retention built on top of it.
//!
//! Table names are resolved with `to_regclass`, so an unknown table reads as "not
//! partitioned" with no partitions rather than as an error.

use crate::builder::PartitionFlags;
use crate::error::{MaintenanceOp, PartitionError};
use crate::executor::{DdlExecutor, ExecutorError, MayPostgresExecutor};
use crate::maintenance::PartitionMaintenance;
use crate::partition::PartitionKind;
use chrono::NaiveDate;
use may_postgres::Row;
use once_cell::sync::Lazy;
use regex::Regex;

const LIST_PARTITIONS_SQL: &str = "SELECT \
        inhrelid::regclass::text AS name, \
        pg_get_expr(c.relpartbound, inhrelid) AS bound_expression, \
        pg_size_pretty(pg_relation_size(inhrelid)) AS size, \
        pg_stat_get_live_tuples(inhrelid) AS row_count \
    FROM pg_inherits \
    JOIN pg_class c ON c.oid = pg_inherits.inhrelid \
    WHERE inhparent = to_regclass($1::text) \
    ORDER BY inhrelid::regclass::text";

const PARTITION_STRATEGY_SQL: &str =
    "SELECT partstrat::text FROM pg_partitioned_table WHERE partrelid = to_regclass($1::text)";

const PARTITION_COLUMNS_SQL: &str = "SELECT a.attname::text \
    FROM pg_partitioned_table pt \
    JOIN pg_attribute a ON a.attrelid = pt.partrelid \
    WHERE pt.partrelid = to_regclass($1::text) AND a.attnum = ANY(pt.partattrs) \
    ORDER BY a.attnum";

const PARTITION_COUNT_SQL: &str =
    "SELECT count(*) FROM pg_inherits WHERE inhparent = to_regclass($1::text)";

const TABLE_SIZE_SQL: &str =
    "SELECT pg_size_pretty(pg_total_relation_size(to_regclass($1::text)))";

static RANGE_START: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"FROM \('(\d{4}-\d{2}-\d{2})").expect("range bound pattern is valid"));

/// One attached partition as the catalog reports it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionInfo {
    pub name: String,
    /// `pg_get_expr` of the partition bound, e.g. `FOR VALUES FROM ('2024-01-01') TO ('2024-02-01')`
    pub bound_expression: Option<String>,
    /// Human readable on-disk size
    pub size: String,
    pub row_count: i64,
}

impl PartitionInfo {
    /// Lower bound of a date RANGE partition
    pub fn range_start(&self) -> Option<NaiveDate> {
        self.bound_expression.as_deref().and_then(range_start_date)
    }

    /// Whether this partition is `name`, with or without its schema qualifier
    ///
    /// The catalog qualifies names only for schemas outside the search path.
    pub fn is_named(&self, name: &str) -> bool {
        self.name == name
            || self
                .name
                .rsplit_once('.')
                .is_some_and(|(_, bare)| bare == name)
    }
}

/// Partitions of `table`, ordered by name
pub fn list_partitions(
    executor: &MayPostgresExecutor,
    table: &str,
) -> Result<Vec<PartitionInfo>, ExecutorError> {
    executor
        .query_all(LIST_PARTITIONS_SQL, &[table])?
        .iter()
        .map(|row| {
            Ok(PartitionInfo {
                name: column(row, 0)?,
                bound_expression: column(row, 1)?,
                size: column::<Option<String>>(row, 2)?.unwrap_or_default(),
                row_count: column::<Option<i64>>(row, 3)?.unwrap_or(0),
            })
        })
        .collect()
}

/// Catalog entry of one partition of `table`
pub fn partition_info(
    executor: &MayPostgresExecutor,
    table: &str,
    partition: &str,
) -> Result<Option<PartitionInfo>, ExecutorError> {
    Ok(list_partitions(executor, table)?
        .into_iter()
        .find(|p| p.is_named(partition)))
}

/// Whether `partition` is currently attached to `table`
pub fn partition_exists(
    executor: &MayPostgresExecutor,
    table: &str,
    partition: &str,
) -> Result<bool, ExecutorError> {
    Ok(partition_info(executor, table, partition)?.is_some())
}

pub fn is_partitioned(executor: &MayPostgresExecutor, table: &str) -> Result<bool, ExecutorError> {
    Ok(partition_strategy(executor, table)?.is_some())
}

/// The strategy of a partitioned table, `None` when it is not partitioned
pub fn partition_strategy(
    executor: &MayPostgresExecutor,
    table: &str,
) -> Result<Option<PartitionKind>, ExecutorError> {
    let rows = executor.query_all(PARTITION_STRATEGY_SQL, &[table])?;
    let Some(row) = rows.first() else {
        return Ok(None);
    };

    let code: String = column(row, 0)?;
    match code.as_str() {
        "r" => Ok(Some(PartitionKind::Range)),
        "l" => Ok(Some(PartitionKind::List)),
        "h" => Ok(Some(PartitionKind::Hash)),
        other => Err(ExecutorError::Decode(format!(
            "unknown partition strategy code '{other}' for '{table}'"
        ))),
    }
}

/// Key columns of a partitioned table; expression keys contribute nothing
pub fn partition_columns(
    executor: &MayPostgresExecutor,
    table: &str,
) -> Result<Vec<String>, ExecutorError> {
    executor
        .query_all(PARTITION_COLUMNS_SQL, &[table])?
        .iter()
        .map(|row| column(row, 0))
        .collect()
}

pub fn partition_count(executor: &MayPostgresExecutor, table: &str) -> Result<i64, ExecutorError> {
    let rows = executor.query_all(PARTITION_COUNT_SQL, &[table])?;
    match rows.first() {
        Some(row) => column(row, 0),
        None => Ok(0),
    }
}

/// Human readable total size of `table` including indexes and TOAST
pub fn table_size(executor: &MayPostgresExecutor, table: &str) -> Result<String, ExecutorError> {
    let rows = executor.query_all(TABLE_SIZE_SQL, &[table])?;
    let size = match rows.first() {
        Some(row) => column::<Option<String>>(row, 0)?,
        None => None,
    };
    Ok(size.unwrap_or_else(|| "0 bytes".to_string()))
}

/// First partition by name
pub fn oldest_partition(
    executor: &MayPostgresExecutor,
    table: &str,
) -> Result<Option<PartitionInfo>, ExecutorError> {
    Ok(list_partitions(executor, table)?.into_iter().next())
}

/// Last partition by name
pub fn newest_partition(
    executor: &MayPostgresExecutor,
    table: &str,
) -> Result<Option<PartitionInfo>, ExecutorError> {
    Ok(list_partitions(executor, table)?.into_iter().last())
}

/// Parse the lower bound date out of a RANGE bound expression
///
/// Returns `None` for LIST, HASH and DEFAULT bounds and for non-date ranges.
pub fn range_start_date(bound_expression: &str) -> Option<NaiveDate> {
    let captures = RANGE_START.captures(bound_expression)?;
    NaiveDate::parse_from_str(captures.get(1)?.as_str(), "%Y-%m-%d").ok()
}

/// Partitions whose range starts strictly before `before`
pub fn partitions_older_than(partitions: &[PartitionInfo], before: NaiveDate) -> Vec<&PartitionInfo> {
    partitions
        .iter()
        .filter(|p| p.range_start().is_some_and(|start| start < before))
        .collect()
}

/// Drop every date RANGE partition of `table` that starts before `before`
///
/// Returns the dropped partition names. Stops at the first failed drop; partitions
/// dropped before it stay dropped.
pub fn drop_partitions_before(
    executor: &MayPostgresExecutor,
    table: &str,
    before: NaiveDate,
    maintenance: &PartitionMaintenance,
) -> Result<Vec<String>, PartitionError> {
    let partitions =
        list_partitions(executor, table).map_err(|source| PartitionError::Maintenance {
            operation: MaintenanceOp::Drop,
            target: table.to_string(),
            statement: LIST_PARTITIONS_SQL.to_string(),
            source,
        })?;

    let names: Vec<&str> = partitions_older_than(&partitions, before)
        .into_iter()
        .map(|p| p.name.as_str())
        .collect();
    let dropped = drop_partitions(executor, &names, maintenance)?;

    log::info!(
        "Dropped {} partitions of '{}' starting before {}",
        dropped.len(),
        table,
        before
    );
    Ok(dropped)
}

/// Drop `partitions` in order, vacuuming the parent once at the end
///
/// The vacuum follows the handle's `vacuum_after_drop` flag and is skipped when
/// nothing was dropped. Stops at the first failed drop.
pub fn drop_partitions<E: DdlExecutor>(
    executor: &E,
    partitions: &[&str],
    maintenance: &PartitionMaintenance,
) -> Result<Vec<String>, PartitionError> {
    let dropper = PartitionMaintenance::new(
        maintenance.table(),
        PartitionFlags {
            vacuum_after_drop: false,
            ..*maintenance.flags()
        },
    );

    let mut dropped = Vec::new();
    for partition in partitions {
        dropper.drop_partition(executor, partition)?;
        dropped.push(partition.to_string());
    }

    if !dropped.is_empty() && maintenance.flags().vacuum_after_drop {
        maintenance.vacuum(executor, false)?;
    }
    Ok(dropped)
}

fn column<T>(row: &Row, index: usize) -> Result<T, ExecutorError>
where
    T: for<'a> may_postgres::types::FromSql<'a>,
{
    row.try_get(index)
        .map_err(|e| ExecutorError::Decode(format!("column {index}: {e}")))
}
