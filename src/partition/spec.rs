//! Partition specification value objects

use super::value::{compare_bounds, PartitionValue};
use super::validate_identifier;
use crate::error::PartitionError;
use std::cmp::Ordering;
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

/// Partitioning strategy kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PartitionKind {
    Range,
    List,
    Hash,
}

impl PartitionKind {
    pub fn as_sql(&self) -> &'static str {
        match self {
            PartitionKind::Range => "RANGE",
            PartitionKind::List => "LIST",
            PartitionKind::Hash => "HASH",
        }
    }
}

impl fmt::Display for PartitionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_sql())
    }
}

impl FromStr for PartitionKind {
    type Err = PartitionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "RANGE" => Ok(PartitionKind::Range),
            "LIST" => Ok(PartitionKind::List),
            "HASH" => Ok(PartitionKind::Hash),
            other => Err(PartitionError::configuration(format!(
                "unknown partition kind '{other}' (expected RANGE, LIST or HASH)"
            ))),
        }
    }
}

/// The bound payload of one partition, by strategy
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PartitionBounds {
    Range {
        from: PartitionValue,
        to: PartitionValue,
    },
    List {
        values: Vec<PartitionValue>,
    },
    Hash {
        modulus: u32,
        remainder: u32,
    },
}

impl PartitionBounds {
    /// Range bounds; `from` must sort strictly before `to`
    pub fn range(
        from: impl Into<PartitionValue>,
        to: impl Into<PartitionValue>,
    ) -> Result<Self, PartitionError> {
        let bounds = PartitionBounds::Range {
            from: from.into(),
            to: to.into(),
        };
        bounds.validate()?;
        Ok(bounds)
    }

    /// List bounds; at least one value, no sentinels, no duplicates
    pub fn list<I, V>(values: I) -> Result<Self, PartitionError>
    where
        I: IntoIterator<Item = V>,
        V: Into<PartitionValue>,
    {
        let bounds = PartitionBounds::List {
            values: values.into_iter().map(Into::into).collect(),
        };
        bounds.validate()?;
        Ok(bounds)
    }

    /// Hash bounds; `0 <= remainder < modulus`
    pub fn hash(modulus: u32, remainder: u32) -> Result<Self, PartitionError> {
        let bounds = PartitionBounds::Hash { modulus, remainder };
        bounds.validate()?;
        Ok(bounds)
    }

    pub fn kind(&self) -> PartitionKind {
        match self {
            PartitionBounds::Range { .. } => PartitionKind::Range,
            PartitionBounds::List { .. } => PartitionKind::List,
            PartitionBounds::Hash { .. } => PartitionKind::Hash,
        }
    }

    /// Check the variant's local invariants
    ///
    /// # Errors
    ///
    /// Returns a configuration error for inverted or empty ranges, mismatched bound
    /// types, empty or duplicated lists, sentinels in a list, a zero modulus, or a
    /// remainder outside `[0, modulus)`.
    pub fn validate(&self) -> Result<(), PartitionError> {
        match self {
            PartitionBounds::Range { from, to } => match compare_bounds(from, to)? {
                Some(Ordering::Less) => Ok(()),
                Some(_) => Err(PartitionError::configuration(format!(
                    "range lower bound {from} must be less than upper bound {to}"
                ))),
                None if from == to => Err(PartitionError::configuration(format!(
                    "range bounds {from} and {to} describe an empty range"
                ))),
                None => Ok(()),
            },
            PartitionBounds::List { values } => {
                if values.is_empty() {
                    return Err(PartitionError::configuration(
                        "list partition needs at least one value",
                    ));
                }
                if let Some(sentinel) = values.iter().find(|v| v.is_sentinel()) {
                    return Err(PartitionError::configuration(format!(
                        "{sentinel} is only valid as a range bound"
                    )));
                }
                let mut seen = HashSet::new();
                for value in values {
                    if !seen.insert(value) {
                        return Err(PartitionError::configuration(format!(
                            "list value {value} appears more than once"
                        )));
                    }
                }
                Ok(())
            }
            PartitionBounds::Hash { modulus, remainder } => {
                if *modulus == 0 {
                    return Err(PartitionError::configuration("hash modulus must be positive"));
                }
                if remainder >= modulus {
                    return Err(PartitionError::configuration(format!(
                        "hash remainder {remainder} must be less than modulus {modulus}"
                    )));
                }
                Ok(())
            }
        }
    }

    /// Render the `FOR VALUES ...` clause
    pub fn values_clause(&self) -> String {
        match self {
            PartitionBounds::Range { from, to } => format!(
                "FOR VALUES FROM ({}) TO ({})",
                from.to_sql_literal(),
                to.to_sql_literal()
            ),
            PartitionBounds::List { values } => {
                let rendered: Vec<String> = values.iter().map(|v| v.to_sql_literal()).collect();
                format!("FOR VALUES IN ({})", rendered.join(", "))
            }
            PartitionBounds::Hash { modulus, remainder } => {
                format!("FOR VALUES WITH (modulus {modulus}, remainder {remainder})")
            }
        }
    }
}

/// The partition key: a column list or an expression
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PartitionKey {
    Columns(Vec<String>),
    Expression(String),
}

impl PartitionKey {
    pub fn column(column: impl Into<String>) -> Self {
        PartitionKey::Columns(vec![column.into()])
    }

    pub fn columns<I, S>(columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        PartitionKey::Columns(columns.into_iter().map(Into::into).collect())
    }

    pub fn expression(expression: impl Into<String>) -> Self {
        PartitionKey::Expression(expression.into())
    }

    /// `EXTRACT(YEAR FROM column)`
    pub fn year(column: &str) -> Self {
        PartitionKey::Expression(format!("EXTRACT(YEAR FROM {column})"))
    }

    /// `DATE_TRUNC('month', column)`
    pub fn month(column: &str) -> Self {
        PartitionKey::Expression(format!("DATE_TRUNC('month', {column})"))
    }

    /// `DATE_TRUNC('day', column)`
    pub fn day(column: &str) -> Self {
        PartitionKey::Expression(format!("DATE_TRUNC('day', {column})"))
    }

    pub fn to_sql(&self) -> String {
        match self {
            PartitionKey::Columns(columns) => columns.join(", "),
            PartitionKey::Expression(expression) => expression.clone(),
        }
    }

    pub(crate) fn validate(&self) -> Result<(), PartitionError> {
        match self {
            PartitionKey::Columns(columns) if columns.is_empty() => Err(
                PartitionError::configuration("partition key needs at least one column"),
            ),
            PartitionKey::Columns(columns) => columns
                .iter()
                .try_for_each(|c| validate_identifier("partition key column", c)),
            PartitionKey::Expression(expression) if expression.trim().is_empty() => Err(
                PartitionError::configuration("partition key expression is empty"),
            ),
            PartitionKey::Expression(_) => Ok(()),
        }
    }
}

impl From<&str> for PartitionKey {
    fn from(column: &str) -> Self {
        PartitionKey::column(column)
    }
}

impl From<String> for PartitionKey {
    fn from(column: String) -> Self {
        PartitionKey::Columns(vec![column])
    }
}

impl From<Vec<&str>> for PartitionKey {
    fn from(columns: Vec<&str>) -> Self {
        PartitionKey::columns(columns)
    }
}

/// Strategy kind plus key, rendered as `PARTITION BY <KIND> (<key>)`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionStrategy {
    pub kind: PartitionKind,
    pub key: PartitionKey,
}

impl PartitionStrategy {
    pub fn new(kind: PartitionKind, key: impl Into<PartitionKey>) -> Self {
        Self {
            kind,
            key: key.into(),
        }
    }

    pub fn range(key: impl Into<PartitionKey>) -> Self {
        Self::new(PartitionKind::Range, key)
    }

    pub fn list(key: impl Into<PartitionKey>) -> Self {
        Self::new(PartitionKind::List, key)
    }

    pub fn hash(key: impl Into<PartitionKey>) -> Self {
        Self::new(PartitionKind::Hash, key)
    }
}

impl fmt::Display for PartitionStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PARTITION BY {} ({})", self.kind, self.key.to_sql())
    }
}

/// One partition of a partitioned table
///
/// A partition with a [`SubPartitionSet`] is itself partitioned; its children are
/// [`SubPartitionSpec`]s, which cannot nest further.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionSpec {
    name: String,
    bounds: PartitionBounds,
    schema: Option<String>,
    tablespace: Option<String>,
    sub_partitions: Option<SubPartitionSet>,
}

impl PartitionSpec {
    pub fn new(name: impl Into<String>, bounds: PartitionBounds) -> Result<Self, PartitionError> {
        let name = name.into();
        validate_identifier("partition name", &name)?;
        bounds.validate()?;
        Ok(Self {
            name,
            bounds,
            schema: None,
            tablespace: None,
            sub_partitions: None,
        })
    }

    pub fn range(
        name: impl Into<String>,
        from: impl Into<PartitionValue>,
        to: impl Into<PartitionValue>,
    ) -> Result<Self, PartitionError> {
        Self::new(name, PartitionBounds::range(from, to)?)
    }

    pub fn list<I, V>(name: impl Into<String>, values: I) -> Result<Self, PartitionError>
    where
        I: IntoIterator<Item = V>,
        V: Into<PartitionValue>,
    {
        Self::new(name, PartitionBounds::list(values)?)
    }

    pub fn hash(
        name: impl Into<String>,
        modulus: u32,
        remainder: u32,
    ) -> Result<Self, PartitionError> {
        Self::new(name, PartitionBounds::hash(modulus, remainder)?)
    }

    pub fn with_schema(mut self, schema: impl Into<String>) -> Self {
        self.schema = Some(schema.into());
        self
    }

    pub fn with_tablespace(mut self, tablespace: impl Into<String>) -> Self {
        self.tablespace = Some(tablespace.into());
        self
    }

    pub fn with_sub_partitions(mut self, sub_partitions: SubPartitionSet) -> Self {
        self.sub_partitions = Some(sub_partitions);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> PartitionKind {
        self.bounds.kind()
    }

    pub fn bounds(&self) -> &PartitionBounds {
        &self.bounds
    }

    pub fn schema(&self) -> Option<&str> {
        self.schema.as_deref()
    }

    pub fn tablespace(&self) -> Option<&str> {
        self.tablespace.as_deref()
    }

    pub fn sub_partitions(&self) -> Option<&SubPartitionSet> {
        self.sub_partitions.as_ref()
    }

    /// `(from, to)` for range partitions
    pub fn range_bounds(&self) -> Option<(&PartitionValue, &PartitionValue)> {
        match &self.bounds {
            PartitionBounds::Range { from, to } => Some((from, to)),
            _ => None,
        }
    }
}

/// A partition one level below a partitioned partition
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubPartitionSpec {
    name: String,
    bounds: PartitionBounds,
    schema: Option<String>,
    tablespace: Option<String>,
}

impl SubPartitionSpec {
    pub fn new(name: impl Into<String>, bounds: PartitionBounds) -> Result<Self, PartitionError> {
        let name = name.into();
        validate_identifier("sub-partition name", &name)?;
        bounds.validate()?;
        Ok(Self {
            name,
            bounds,
            schema: None,
            tablespace: None,
        })
    }

    pub fn range(
        name: impl Into<String>,
        from: impl Into<PartitionValue>,
        to: impl Into<PartitionValue>,
    ) -> Result<Self, PartitionError> {
        Self::new(name, PartitionBounds::range(from, to)?)
    }

    pub fn list<I, V>(name: impl Into<String>, values: I) -> Result<Self, PartitionError>
    where
        I: IntoIterator<Item = V>,
        V: Into<PartitionValue>,
    {
        Self::new(name, PartitionBounds::list(values)?)
    }

    pub fn hash(
        name: impl Into<String>,
        modulus: u32,
        remainder: u32,
    ) -> Result<Self, PartitionError> {
        Self::new(name, PartitionBounds::hash(modulus, remainder)?)
    }

    pub fn with_schema(mut self, schema: impl Into<String>) -> Self {
        self.schema = Some(schema.into());
        self
    }

    pub fn with_tablespace(mut self, tablespace: impl Into<String>) -> Self {
        self.tablespace = Some(tablespace.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> PartitionKind {
        self.bounds.kind()
    }

    pub fn bounds(&self) -> &PartitionBounds {
        &self.bounds
    }

    pub fn schema(&self) -> Option<&str> {
        self.schema.as_deref()
    }

    pub fn tablespace(&self) -> Option<&str> {
        self.tablespace.as_deref()
    }
}

/// Second-level strategy plus its ordered sub-partitions
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubPartitionSet {
    strategy: PartitionStrategy,
    default_schema: Option<String>,
    partitions: Vec<SubPartitionSpec>,
}

impl SubPartitionSet {
    pub fn new(strategy: PartitionStrategy) -> Self {
        Self {
            strategy,
            default_schema: None,
            partitions: Vec::new(),
        }
    }

    pub fn range(key: impl Into<PartitionKey>) -> Self {
        Self::new(PartitionStrategy::range(key))
    }

    pub fn list(key: impl Into<PartitionKey>) -> Self {
        Self::new(PartitionStrategy::list(key))
    }

    pub fn hash(key: impl Into<PartitionKey>) -> Self {
        Self::new(PartitionStrategy::hash(key))
    }

    /// Schema for sub-partitions that do not name one themselves
    pub fn default_schema(mut self, schema: impl Into<String>) -> Self {
        self.default_schema = Some(schema.into());
        self
    }

    /// Append a sub-partition
    ///
    /// # Errors
    ///
    /// Returns a configuration error when the name collides with a sibling or the
    /// sub-partition's kind differs from the set's strategy.
    pub fn add(mut self, partition: SubPartitionSpec) -> Result<Self, PartitionError> {
        if partition.kind() != self.strategy.kind {
            return Err(PartitionError::configuration(format!(
                "sub-partition '{}' is {} but the sub-partition strategy is {}",
                partition.name(),
                partition.kind(),
                self.strategy.kind
            )));
        }
        if self.partitions.iter().any(|p| p.name() == partition.name()) {
            return Err(PartitionError::configuration(format!(
                "duplicate sub-partition name '{}'",
                partition.name()
            )));
        }
        self.partitions.push(partition);
        Ok(self)
    }

    pub fn add_range(
        self,
        name: impl Into<String>,
        from: impl Into<PartitionValue>,
        to: impl Into<PartitionValue>,
    ) -> Result<Self, PartitionError> {
        let partition = SubPartitionSpec::range(name, from, to)?;
        self.add(partition)
    }

    pub fn add_list<I, V>(self, name: impl Into<String>, values: I) -> Result<Self, PartitionError>
    where
        I: IntoIterator<Item = V>,
        V: Into<PartitionValue>,
    {
        let partition = SubPartitionSpec::list(name, values)?;
        self.add(partition)
    }

    pub fn add_hash(
        self,
        name: impl Into<String>,
        modulus: u32,
        remainder: u32,
    ) -> Result<Self, PartitionError> {
        let partition = SubPartitionSpec::hash(name, modulus, remainder)?;
        self.add(partition)
    }

    pub fn strategy(&self) -> &PartitionStrategy {
        &self.strategy
    }

    pub fn schema(&self) -> Option<&str> {
        self.default_schema.as_deref()
    }

    pub fn partitions(&self) -> &[SubPartitionSpec] {
        &self.partitions
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn test_kind_parsing() {
        assert_eq!("range".parse::<PartitionKind>().unwrap(), PartitionKind::Range);
        assert_eq!(" List ".parse::<PartitionKind>().unwrap(), PartitionKind::List);
        let err = "interval".parse::<PartitionKind>().unwrap_err();
        assert!(err.is_configuration());
        assert!(err.to_string().contains("unknown partition kind"));
    }

    #[test]
    fn test_range_values_clause_with_sentinel() {
        let bounds = PartitionBounds::range(PartitionValue::MinValue, 100).unwrap();
        assert_eq!(bounds.values_clause(), "FOR VALUES FROM (MINVALUE) TO (100)");
    }

    #[test]
    fn test_range_values_clause_with_dates() {
        let bounds = PartitionBounds::range(
            NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            NaiveDate::from_ymd_opt(2024, 2, 1).unwrap(),
        )
        .unwrap();
        assert_eq!(
            bounds.values_clause(),
            "FOR VALUES FROM ('2024-01-01') TO ('2024-02-01')"
        );
    }

    #[test]
    fn test_inverted_range_rejected() {
        let err = PartitionBounds::range(200, 100).unwrap_err();
        assert!(err.is_configuration());
        assert!(PartitionBounds::range(100, 100).is_err());
        assert!(PartitionBounds::range(PartitionValue::MaxValue, 1).is_err());
        assert!(PartitionBounds::range("a", "a").is_err());
    }

    #[test]
    fn test_list_validation() {
        assert!(PartitionBounds::list(Vec::<PartitionValue>::new()).is_err());
        assert!(PartitionBounds::list(["eu", "eu"]).is_err());
        assert!(PartitionBounds::list([PartitionValue::MinValue]).is_err());

        let bounds = PartitionBounds::list(["eu", "us"]).unwrap();
        assert_eq!(bounds.values_clause(), "FOR VALUES IN ('eu', 'us')");

        let numeric = PartitionBounds::list([1, 2, 3]).unwrap();
        assert_eq!(numeric.values_clause(), "FOR VALUES IN (1, 2, 3)");
    }

    #[test]
    fn test_hash_remainder_bound() {
        assert!(PartitionBounds::hash(4, 3).is_ok());
        assert!(PartitionBounds::hash(4, 4).unwrap_err().is_configuration());
        assert!(PartitionBounds::hash(0, 0).is_err());
        assert_eq!(
            PartitionBounds::hash(4, 1).unwrap().values_clause(),
            "FOR VALUES WITH (modulus 4, remainder 1)"
        );
    }

    #[test]
    fn test_partition_key_helpers() {
        assert_eq!(PartitionKey::year("created_at").to_sql(), "EXTRACT(YEAR FROM created_at)");
        assert_eq!(
            PartitionKey::month("created_at").to_sql(),
            "DATE_TRUNC('month', created_at)"
        );
        assert_eq!(PartitionKey::columns(["tenant_id", "region"]).to_sql(), "tenant_id, region");
        assert_eq!(
            PartitionStrategy::hash("user_id").to_string(),
            "PARTITION BY HASH (user_id)"
        );
        assert!(PartitionKey::Columns(vec![]).validate().is_err());
        assert!(PartitionKey::expression("  ").validate().is_err());
    }

    #[test]
    fn test_spec_kind_is_derived_from_bounds() {
        let spec = PartitionSpec::hash("p0", 2, 0).unwrap().with_schema("hashed");
        assert_eq!(spec.kind(), PartitionKind::Hash);
        assert_eq!(spec.schema(), Some("hashed"));
        assert!(spec.range_bounds().is_none());
    }

    #[test]
    fn test_spec_name_must_be_identifier() {
        assert!(PartitionSpec::list("", ["a"]).is_err());
        assert!(PartitionSpec::list("bad name", ["a"]).is_err());
        assert!(PartitionSpec::list("p; DROP TABLE x", ["a"]).is_err());
    }

    #[test]
    fn test_sub_partition_set_rejects_duplicates_and_kind_mismatch() {
        let set = SubPartitionSet::list("region").add_list("eu", ["eu"]).unwrap();
        let err = set.clone().add_list("eu", ["eu-2"]).unwrap_err();
        assert!(err.to_string().contains("duplicate sub-partition name"));

        let err = set.add_hash("h0", 2, 0).unwrap_err();
        assert!(err.to_string().contains("sub-partition strategy is LIST"));
    }
}
