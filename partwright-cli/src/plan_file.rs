//! TOML plan files
//!
//! A plan file describes one partitioned table. Bound values are written as TOML
//! strings or numbers; strings are interpreted the same way as
//! [`PartitionValue::infer`] (`"MINVALUE"`, `"2024-01-01"`, `"eu"`).
//!
//! ```toml
//! table = "measurements"
//!
//! [shape]
//! statements = ["CREATE TABLE measurements (id bigint NOT NULL, recorded_at date NOT NULL)"]
//!
//! [strategy]
//! kind = "range"
//! columns = ["recorded_at"]
//!
//! [[generate]]
//! interval = "monthly"
//! start = "2024-01-01"
//! count = 12
//! ```

use chrono::NaiveDate;
use partwright::{
    DateRangeGenerator, DefaultPartition, IndexIntent, Interval, PartitionBounds,
    PartitionBuilder, PartitionConfig, PartitionError, PartitionKey, PartitionKind, PartitionSpec,
    PartitionStrategy, PartitionValue, SubPartitionSet, SubPartitionSpec, TableShape,
};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PlanFileError {
    #[error("Failed to read plan file {}: {}", .path.display(), .source)]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid plan file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error(transparent)]
    Partition(#[from] PartitionError),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PlanFile {
    pub table: String,
    pub shape: ShapeFile,
    pub strategy: StrategyFile,
    #[serde(default)]
    pub tablespace: Option<String>,
    /// Global default schema for partitions
    #[serde(default)]
    pub schema: Option<String>,
    /// Schema per partition kind, keyed `range` / `list` / `hash`
    #[serde(default)]
    pub schemas: BTreeMap<String, String>,
    #[serde(default)]
    pub partitions: Vec<PartitionFile>,
    #[serde(default)]
    pub generate: Vec<GenerateFile>,
    #[serde(default)]
    pub hash_partitions: Option<u32>,
    #[serde(default)]
    pub default_partition: Option<DefaultPartitionFile>,
    #[serde(default)]
    pub checks: Vec<CheckFile>,
    #[serde(default)]
    pub flags: FlagsFile,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ShapeFile {
    pub statements: Vec<String>,
    #[serde(default)]
    pub indexes: Vec<IndexFile>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct IndexFile {
    pub columns: Vec<String>,
    #[serde(default)]
    pub unique: bool,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StrategyFile {
    pub kind: String,
    #[serde(default)]
    pub columns: Vec<String>,
    #[serde(default)]
    pub expression: Option<String>,
}

/// A bound value as written in TOML
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum BoundValue {
    Integer(i64),
    Float(f64),
    Text(String),
}

impl From<&BoundValue> for PartitionValue {
    fn from(value: &BoundValue) -> Self {
        match value {
            BoundValue::Integer(i) => PartitionValue::Integer(*i),
            BoundValue::Float(f) => PartitionValue::infer(&f.to_string()),
            BoundValue::Text(s) => PartitionValue::infer(s),
        }
    }
}

/// Bound fields shared by partitions and sub-partitions
///
/// Exactly one shape must be present: `from` + `to`, `values`, or `modulus` +
/// `remainder`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BoundsFile {
    #[serde(default)]
    pub from: Option<BoundValue>,
    #[serde(default)]
    pub to: Option<BoundValue>,
    #[serde(default)]
    pub values: Option<Vec<BoundValue>>,
    #[serde(default)]
    pub modulus: Option<u32>,
    #[serde(default)]
    pub remainder: Option<u32>,
}

impl BoundsFile {
    pub fn to_bounds(&self, partition: &str) -> Result<PartitionBounds, PartitionError> {
        match (&self.from, &self.to, &self.values, self.modulus, self.remainder) {
            (Some(from), Some(to), None, None, None) => PartitionBounds::range(from, to),
            (None, None, Some(values), None, None) => PartitionBounds::list(values.iter()),
            (None, None, None, Some(modulus), Some(remainder)) => {
                PartitionBounds::hash(modulus, remainder)
            }
            _ => Err(PartitionError::Configuration(format!(
                "partition '{partition}' needs exactly one of from/to, values, or modulus/remainder"
            ))),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PartitionFile {
    pub name: String,
    #[serde(flatten)]
    pub bounds: BoundsFile,
    #[serde(default)]
    pub schema: Option<String>,
    #[serde(default)]
    pub tablespace: Option<String>,
    #[serde(default)]
    pub sub_partitions: Option<SubPartitionSetFile>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SubPartitionSetFile {
    pub kind: String,
    #[serde(default)]
    pub columns: Vec<String>,
    #[serde(default)]
    pub expression: Option<String>,
    #[serde(default)]
    pub schema: Option<String>,
    #[serde(default)]
    pub partitions: Vec<SubPartitionFile>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SubPartitionFile {
    pub name: String,
    #[serde(flatten)]
    pub bounds: BoundsFile,
    #[serde(default)]
    pub schema: Option<String>,
    #[serde(default)]
    pub tablespace: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GenerateFile {
    pub interval: String,
    pub start: NaiveDate,
    #[serde(default)]
    pub count: Option<u32>,
    #[serde(default)]
    pub end: Option<NaiveDate>,
    #[serde(default)]
    pub prefix: Option<String>,
    #[serde(default)]
    pub name_format: Option<String>,
    #[serde(default)]
    pub schema: Option<String>,
    #[serde(default)]
    pub tablespace: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DefaultPartitionFile {
    pub name: String,
    #[serde(default)]
    pub schema: Option<String>,
    #[serde(default)]
    pub tablespace: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CheckFile {
    pub name: String,
    pub expression: String,
}

/// Per-plan overrides of the configured defaults
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FlagsFile {
    #[serde(default)]
    pub enable_partition_pruning: Option<bool>,
    #[serde(default)]
    pub detach_concurrently: Option<bool>,
    #[serde(default)]
    pub analyze_after_create: Option<bool>,
    #[serde(default)]
    pub vacuum_after_drop: Option<bool>,
}

impl PlanFile {
    pub fn load(path: &Path) -> Result<Self, PlanFileError> {
        let content = std::fs::read_to_string(path).map_err(|source| PlanFileError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, PlanFileError> {
        Ok(toml::from_str(content)?)
    }

    /// Build the described table
    ///
    /// Partitions are added in file order: explicit partitions, then generated date
    /// ranges, then hash partitions.
    pub fn to_builder(&self, config: &PartitionConfig) -> Result<PartitionBuilder, PartitionError> {
        let mut builder = PartitionBuilder::new(self.table.clone(), config);

        let mut shape = TableShape::new(self.shape.statements.iter().cloned());
        for index in &self.shape.indexes {
            let intent = if index.unique {
                IndexIntent::unique(index.columns.iter().cloned())
            } else {
                IndexIntent::index(index.columns.iter().cloned())
            };
            shape = shape.with_index(match &index.name {
                Some(name) => intent.named(name.clone()),
                None => intent,
            });
        }
        builder.table_shape(shape);
        builder.partition_by(strategy(
            &self.strategy.kind,
            &self.strategy.columns,
            self.strategy.expression.as_deref(),
        )?)?;

        if let Some(tablespace) = &self.tablespace {
            builder.tablespace(tablespace.clone());
        }
        if let Some(schema) = &self.schema {
            builder.partition_schema(schema.clone());
        }
        for (kind, schema) in &self.schemas {
            builder.register_schema(kind.parse::<PartitionKind>()?, schema.clone());
        }

        for partition in &self.partitions {
            let mut spec = PartitionSpec::new(
                partition.name.clone(),
                partition.bounds.to_bounds(&partition.name)?,
            )?;
            if let Some(schema) = &partition.schema {
                spec = spec.with_schema(schema.clone());
            }
            if let Some(tablespace) = &partition.tablespace {
                spec = spec.with_tablespace(tablespace.clone());
            }
            builder.add_partition(spec)?;

            if let Some(sub_file) = &partition.sub_partitions {
                builder.with_sub_partitions(partition.name.clone(), sub_partition_set(sub_file)?);
            }
        }

        for generate in &self.generate {
            let mut generator =
                DateRangeGenerator::new(generate.interval.parse::<Interval>()?, generate.start);
            match (generate.count, generate.end) {
                (Some(_), Some(_)) => {
                    return Err(PartitionError::Configuration(format!(
                        "generated range starting {} sets both count and end",
                        generate.start
                    )))
                }
                (Some(count), None) => generator = generator.count(count),
                (None, Some(end)) => generator = generator.to(end),
                (None, None) => {}
            }
            if let Some(prefix) = &generate.prefix {
                generator = generator.prefix(prefix.clone());
            }
            if let Some(format) = &generate.name_format {
                generator = generator.name_format(format.clone());
            }
            if let Some(schema) = &generate.schema {
                generator = generator.schema(schema.clone());
            }
            if let Some(tablespace) = &generate.tablespace {
                generator = generator.tablespace(tablespace.clone());
            }
            builder.generate_partitions(&generator)?;
        }

        if let Some(count) = self.hash_partitions {
            builder.hash_partitions(count)?;
        }

        if let Some(default) = &self.default_partition {
            let mut partition = DefaultPartition::new(default.name.clone());
            if let Some(schema) = &default.schema {
                partition = partition.with_schema(schema.clone());
            }
            if let Some(tablespace) = &default.tablespace {
                partition = partition.with_tablespace(tablespace.clone());
            }
            builder.default_partition_spec(partition);
        }

        for check in &self.checks {
            builder.check(check.name.clone(), check.expression.clone());
        }

        let flags = &self.flags;
        if let Some(enabled) = flags.enable_partition_pruning {
            builder.enable_partition_pruning(enabled);
        }
        if let Some(enabled) = flags.detach_concurrently {
            builder.detach_concurrently(enabled);
        }
        if let Some(enabled) = flags.analyze_after_create {
            builder.analyze_after_create(enabled);
        }
        if let Some(enabled) = flags.vacuum_after_drop {
            builder.vacuum_after_drop(enabled);
        }

        Ok(builder)
    }
}

fn strategy(
    kind: &str,
    columns: &[String],
    expression: Option<&str>,
) -> Result<PartitionStrategy, PartitionError> {
    let kind = kind.parse::<PartitionKind>()?;
    let key = match (expression, columns.is_empty()) {
        (Some(expression), true) => PartitionKey::expression(expression),
        (None, false) => PartitionKey::columns(columns.iter().cloned()),
        _ => {
            return Err(PartitionError::Configuration(
                "partition strategy needs either columns or an expression".to_string(),
            ))
        }
    };
    Ok(PartitionStrategy::new(kind, key))
}

fn sub_partition_set(file: &SubPartitionSetFile) -> Result<SubPartitionSet, PartitionError> {
    let mut set = SubPartitionSet::new(strategy(
        &file.kind,
        &file.columns,
        file.expression.as_deref(),
    )?);
    if let Some(schema) = &file.schema {
        set = set.default_schema(schema.clone());
    }

    for sub in &file.partitions {
        let mut spec = SubPartitionSpec::new(sub.name.clone(), sub.bounds.to_bounds(&sub.name)?)?;
        if let Some(schema) = &sub.schema {
            spec = spec.with_schema(schema.clone());
        }
        if let Some(tablespace) = &sub.tablespace {
            spec = spec.with_tablespace(tablespace.clone());
        }
        set = set.add(spec)?;
    }
    Ok(set)
}
