//! Partition specification model
//!
//! Value objects describing what a partitioned table should look like:
//! - [`PartitionValue`]: bound and list values with their SQL literal form
//! - [`PartitionBounds`]: the RANGE / LIST / HASH payload of one partition
//! - [`PartitionSpec`] and [`SubPartitionSpec`]: named partitions with schema and
//!   tablespace placement
//! - [`SubPartitionSet`]: the second-level strategy of a partitioned partition
//!
//! Every constructor validates its invariants, so an invalid partition never reaches SQL
//! synthesis.

pub mod spec;
pub mod value;

pub use spec::{
    PartitionBounds, PartitionKey, PartitionKind, PartitionSpec, PartitionStrategy,
    SubPartitionSet, SubPartitionSpec,
};
pub use value::{compare_bounds, PartitionValue};

use crate::error::PartitionError;

/// Check that `name` is a plain, unquoted SQL identifier
///
/// Letters, digits, `_` and `$` only. Identifiers are emitted verbatim into DDL.
pub(crate) fn validate_identifier(what: &str, name: &str) -> Result<(), PartitionError> {
    if name.is_empty() {
        return Err(PartitionError::configuration(format!("{what} cannot be empty")));
    }
    if let Some(bad) = name
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || *c == '_' || *c == '$'))
    {
        return Err(PartitionError::configuration(format!(
            "{what} '{name}' contains invalid character '{bad}'"
        )));
    }
    Ok(())
}

/// Like [`validate_identifier`] but allows one `schema.` qualifier
pub(crate) fn validate_qualified_identifier(what: &str, name: &str) -> Result<(), PartitionError> {
    match name.split_once('.') {
        Some((schema, table)) => {
            validate_identifier(what, schema)?;
            validate_identifier(what, table)
        }
        None => validate_identifier(what, name),
    }
}
