//! # Partwright
//!
//! Declarative PostgreSQL partition management on `may_postgres`.
//!
//! Describe a partitioned table with a [`PartitionBuilder`], synthesize it into a
//! reviewable [`PartitionPlan`], and apply the plan atomically through any
//! [`TransactionalExecutor`]. Day-two operations (attach, detach, drop, analyze,
//! vacuum) live in [`PartitionMaintenance`]; catalog inspection and date-based
//! retention live in [`catalog`].

pub mod apply;
pub mod builder;
pub mod catalog;
pub mod config;
pub mod connection;
pub mod date_range;
pub mod error;
pub mod executor;
pub mod maintenance;
#[cfg(feature = "metrics")]
pub mod metrics;
pub mod partition;
pub mod plan;
pub mod recording;
pub mod schema;
pub mod transaction;

pub use apply::{apply_plan, ApplyReport};
pub use builder::{
    CheckConstraint, DefaultPartition, IndexIntent, PartitionBuilder, PartitionFlags, TableShape,
};
pub use config::{DefaultsConfig, NamingConfig, PartitionConfig};
pub use connection::{connect, ConnectionError};
pub use date_range::{DateRangeGenerator, Interval};
pub use error::{MaintenanceOp, PartitionError};
pub use executor::{DdlExecutor, ExecutorError, MayPostgresExecutor};
pub use maintenance::PartitionMaintenance;
pub use partition::{
    PartitionBounds, PartitionKey, PartitionKind, PartitionSpec, PartitionStrategy,
    PartitionValue, SubPartitionSet, SubPartitionSpec,
};
pub use plan::{PartitionPlan, PlannedStatement, StatementRole};
pub use recording::{RecordedEvent, RecordingExecutor};
pub use schema::SchemaResolver;
pub use transaction::{Transaction, TransactionError, TransactionScope, TransactionalExecutor};
