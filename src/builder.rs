//! Partition Builder
//!
//! [`PartitionBuilder`] collects the description of one partitioned table and turns
//! it into a [`PartitionPlan`]. A builder is an ordinary value: it holds no
//! connection, [`synthesize`](PartitionBuilder::synthesize) borrows it immutably and
//! may be called any number of times with identical results, and `clone()` yields an
//! independent copy.
//!
//! # Example
//!
//! ```
//! use chrono::NaiveDate;
//! use partwright::{PartitionBuilder, PartitionConfig, PartitionStrategy, TableShape};
//!
//! # fn main() -> Result<(), partwright::PartitionError> {
//! let config = PartitionConfig::default();
//! let mut builder = PartitionBuilder::new("measurements", &config);
//! builder
//!     .table_shape(TableShape::from_statement(
//!         "CREATE TABLE measurements (id bigint NOT NULL, recorded_at date NOT NULL)",
//!     ))
//!     .partition_by(PartitionStrategy::range("recorded_at"))?
//!     .generate_monthly(NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(), 3)?;
//!
//! let plan = builder.synthesize()?;
//! assert_eq!(plan.len(), 5); // parent, three partitions, ANALYZE
//! # Ok(())
//! # }
//! ```

use crate::apply::{apply_plan, ApplyReport};
use crate::config::{DefaultsConfig, PartitionConfig};
use crate::date_range::{DateRangeGenerator, Interval};
use crate::error::PartitionError;
use crate::maintenance::PartitionMaintenance;
use crate::partition::{
    validate_identifier, validate_qualified_identifier, PartitionKey, PartitionKind,
    PartitionSpec, PartitionStrategy, PartitionValue, SubPartitionSet,
};
use crate::plan::{PartitionPlan, StatementRole};
use crate::schema::SchemaResolver;
use crate::transaction::TransactionalExecutor;
use chrono::NaiveDate;
use sea_query::{PostgresQueryBuilder, TableCreateStatement};
use serde::Serialize;
use std::collections::HashSet;

/// Behaviour flags carried by a builder and its plans
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PartitionFlags {
    /// Informational; PostgreSQL prunes partitions on its own
    pub pruning_enabled: bool,
    pub detach_concurrently: bool,
    pub analyze_after_create: bool,
    pub vacuum_after_drop: bool,
}

impl From<&DefaultsConfig> for PartitionFlags {
    fn from(defaults: &DefaultsConfig) -> Self {
        Self {
            pruning_enabled: defaults.enable_partition_pruning,
            detach_concurrently: defaults.detach_concurrently,
            analyze_after_create: defaults.analyze_after_create,
            vacuum_after_drop: defaults.vacuum_after_drop,
        }
    }
}

impl Default for PartitionFlags {
    fn default() -> Self {
        Self::from(&DefaultsConfig::default())
    }
}

/// The non-partitioned definition of the parent table
///
/// The first statement must be the `CREATE TABLE`; it is rewritten into the
/// partitioned parent. Later statements pass through unless they mention an index,
/// since indexes are declared with [`IndexIntent`]s and created on the parent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableShape {
    statements: Vec<String>,
    indexes: Vec<IndexIntent>,
}

impl TableShape {
    pub fn new<I, S>(statements: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            statements: statements.into_iter().map(Into::into).collect(),
            indexes: Vec::new(),
        }
    }

    pub fn from_statement(sql: impl Into<String>) -> Self {
        Self::new([sql.into()])
    }

    /// Render a sea-query table definition for PostgreSQL
    pub fn from_sea_query(table: &TableCreateStatement) -> Self {
        Self::from_statement(table.build(PostgresQueryBuilder))
    }

    pub fn with_statement(mut self, sql: impl Into<String>) -> Self {
        self.statements.push(sql.into());
        self
    }

    pub fn with_index(mut self, index: IndexIntent) -> Self {
        self.indexes.push(index);
        self
    }

    pub fn statements(&self) -> &[String] {
        &self.statements
    }

    pub fn indexes(&self) -> &[IndexIntent] {
        &self.indexes
    }
}

/// An index to create on the partitioned parent
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexIntent {
    columns: Vec<String>,
    unique: bool,
    name: Option<String>,
}

impl IndexIntent {
    pub fn index<I, S>(columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            columns: columns.into_iter().map(Into::into).collect(),
            unique: false,
            name: None,
        }
    }

    pub fn unique<I, S>(columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            unique: true,
            ..Self::index(columns)
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn is_unique(&self) -> bool {
        self.unique
    }

    /// The explicit name, or `<table>_<col>..._index`
    pub fn name_for(&self, table: &str) -> String {
        match &self.name {
            Some(name) => name.clone(),
            None => format!("{}_{}_index", table, self.columns.join("_")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckConstraint {
    pub name: String,
    pub expression: String,
}

/// The catch-all partition for rows no other partition accepts
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DefaultPartition {
    name: String,
    schema: Option<String>,
    tablespace: Option<String>,
}

impl DefaultPartition {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            schema: None,
            tablespace: None,
        }
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

    pub fn schema(&self) -> Option<&str> {
        self.schema.as_deref()
    }

    pub fn tablespace(&self) -> Option<&str> {
        self.tablespace.as_deref()
    }
}

/// Builder for one partitioned table
#[derive(Debug, Clone)]
pub struct PartitionBuilder {
    table: String,
    config: PartitionConfig,
    shape: Option<TableShape>,
    strategy: Option<PartitionStrategy>,
    partitions: Vec<PartitionSpec>,
    pending_sub_partitions: Vec<(String, SubPartitionSet)>,
    default_partition: Option<DefaultPartition>,
    tablespace: Option<String>,
    checks: Vec<CheckConstraint>,
    schemas: SchemaResolver,
    flags: PartitionFlags,
}

impl PartitionBuilder {
    /// Start describing `table` (optionally `schema.table`)
    pub fn new(table: impl Into<String>, config: &PartitionConfig) -> Self {
        Self {
            table: table.into(),
            config: config.clone(),
            shape: None,
            strategy: None,
            partitions: Vec::new(),
            pending_sub_partitions: Vec::new(),
            default_partition: None,
            tablespace: None,
            checks: Vec::new(),
            schemas: SchemaResolver::new(),
            flags: PartitionFlags::from(&config.defaults),
        }
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn flags(&self) -> &PartitionFlags {
        &self.flags
    }

    pub fn strategy(&self) -> Option<&PartitionStrategy> {
        self.strategy.as_ref()
    }

    pub fn partitions(&self) -> &[PartitionSpec] {
        &self.partitions
    }

    pub fn schemas(&self) -> &SchemaResolver {
        &self.schemas
    }

    pub fn table_shape(&mut self, shape: TableShape) -> &mut Self {
        self.shape = Some(shape);
        self
    }

    /// Set the table's partitioning strategy; allowed once
    pub fn partition_by(&mut self, strategy: PartitionStrategy) -> Result<&mut Self, PartitionError> {
        if let Some(existing) = &self.strategy {
            return Err(PartitionError::configuration(format!(
                "partition strategy for '{}' is already set to {existing}",
                self.table
            )));
        }
        strategy.key.validate()?;
        self.strategy = Some(strategy);
        Ok(self)
    }

    pub fn range_by(&mut self, key: impl Into<PartitionKey>) -> Result<&mut Self, PartitionError> {
        self.partition_by(PartitionStrategy::range(key))
    }

    pub fn list_by(&mut self, key: impl Into<PartitionKey>) -> Result<&mut Self, PartitionError> {
        self.partition_by(PartitionStrategy::list(key))
    }

    pub fn hash_by(&mut self, key: impl Into<PartitionKey>) -> Result<&mut Self, PartitionError> {
        self.partition_by(PartitionStrategy::hash(key))
    }

    /// RANGE on `EXTRACT(YEAR FROM column)`
    pub fn partition_by_year(&mut self, column: &str) -> Result<&mut Self, PartitionError> {
        self.range_by(PartitionKey::year(column))
    }

    /// RANGE on `DATE_TRUNC('month', column)`
    pub fn partition_by_month(&mut self, column: &str) -> Result<&mut Self, PartitionError> {
        self.range_by(PartitionKey::month(column))
    }

    /// RANGE on `DATE_TRUNC('day', column)`
    pub fn partition_by_day(&mut self, column: &str) -> Result<&mut Self, PartitionError> {
        self.range_by(PartitionKey::day(column))
    }

    /// Append a partition
    ///
    /// # Errors
    ///
    /// Returns a configuration error when no strategy is set yet, when the partition's
    /// kind differs from the strategy, when its sub-partition key is empty, or when the
    /// name is already taken.
    pub fn add_partition(&mut self, partition: PartitionSpec) -> Result<&mut Self, PartitionError> {
        let strategy = self.strategy.as_ref().ok_or_else(|| {
            PartitionError::configuration(format!(
                "partition '{}' added to '{}' before a partition strategy was set",
                partition.name(),
                self.table
            ))
        })?;

        if partition.kind() != strategy.kind {
            return Err(PartitionError::configuration(format!(
                "partition '{}' is {} but '{}' is partitioned by {}",
                partition.name(),
                partition.kind(),
                self.table,
                strategy.kind
            )));
        }

        if let Some(sub_partitions) = partition.sub_partitions() {
            sub_partitions.strategy().key.validate()?;
        }

        if self.partitions.iter().any(|p| p.name() == partition.name()) {
            return Err(PartitionError::configuration(format!(
                "duplicate partition name '{}' on '{}'",
                partition.name(),
                self.table
            )));
        }

        self.partitions.push(partition);
        Ok(self)
    }

    pub fn add_range_partition(
        &mut self,
        name: impl Into<String>,
        from: impl Into<PartitionValue>,
        to: impl Into<PartitionValue>,
    ) -> Result<&mut Self, PartitionError> {
        let partition = PartitionSpec::range(name, from, to)?;
        self.add_partition(partition)
    }

    pub fn add_list_partition<I, V>(
        &mut self,
        name: impl Into<String>,
        values: I,
    ) -> Result<&mut Self, PartitionError>
    where
        I: IntoIterator<Item = V>,
        V: Into<PartitionValue>,
    {
        let partition = PartitionSpec::list(name, values)?;
        self.add_partition(partition)
    }

    pub fn add_hash_partition(
        &mut self,
        name: impl Into<String>,
        modulus: u32,
        remainder: u32,
    ) -> Result<&mut Self, PartitionError> {
        let partition = PartitionSpec::hash(name, modulus, remainder)?;
        self.add_partition(partition)
    }

    /// Partition the partition named `partition` further
    ///
    /// The target is resolved when the plan is synthesized, so it may be added
    /// before or after this call.
    pub fn with_sub_partitions(
        &mut self,
        partition: impl Into<String>,
        sub_partitions: SubPartitionSet,
    ) -> &mut Self {
        let partition = partition.into();
        self.pending_sub_partitions.retain(|(name, _)| *name != partition);
        self.pending_sub_partitions.push((partition, sub_partitions));
        self
    }

    /// Add `count` HASH partitions named `part<sep><i>`
    pub fn hash_partitions(&mut self, count: u32) -> Result<&mut Self, PartitionError> {
        if count == 0 {
            return Err(PartitionError::configuration(
                "hash partition count must be positive",
            ));
        }
        let separator = self.config.naming.separator.clone();
        for remainder in 0..count {
            self.add_hash_partition(format!("part{separator}{remainder}"), count, remainder)?;
        }
        Ok(self)
    }

    /// Add every partition a date-range generator produces
    ///
    /// The builder's naming configuration replaces the generator's, and a generator
    /// without its own prefix gets `<table><separator>`.
    pub fn generate_partitions(
        &mut self,
        generator: &DateRangeGenerator,
    ) -> Result<&mut Self, PartitionError> {
        let mut generator = generator.clone().with_naming(self.config.naming.clone());
        if !generator.has_prefix() {
            generator = generator.prefix(format!(
                "{}{}",
                self.bare_table(),
                self.config.naming.separator
            ));
        }

        for partition in generator.build()? {
            self.add_partition(partition)?;
        }
        Ok(self)
    }

    pub fn generate_daily(&mut self, start: NaiveDate, count: u32) -> Result<&mut Self, PartitionError> {
        self.generate_interval(Interval::Daily, start, count)
    }

    pub fn generate_weekly(&mut self, start: NaiveDate, count: u32) -> Result<&mut Self, PartitionError> {
        self.generate_interval(Interval::Weekly, start, count)
    }

    pub fn generate_monthly(&mut self, start: NaiveDate, count: u32) -> Result<&mut Self, PartitionError> {
        self.generate_interval(Interval::Monthly, start, count)
    }

    pub fn generate_quarterly(&mut self, start: NaiveDate, count: u32) -> Result<&mut Self, PartitionError> {
        self.generate_interval(Interval::Quarterly, start, count)
    }

    pub fn generate_yearly(&mut self, start: NaiveDate, count: u32) -> Result<&mut Self, PartitionError> {
        self.generate_interval(Interval::Yearly, start, count)
    }

    fn generate_interval(
        &mut self,
        interval: Interval,
        start: NaiveDate,
        count: u32,
    ) -> Result<&mut Self, PartitionError> {
        let generator = DateRangeGenerator::new(interval, start).count(count);
        self.generate_partitions(&generator)
    }

    /// Add a default partition named `<table><sep><name>`
    pub fn default_partition(&mut self, name: impl Into<String>) -> &mut Self {
        self.default_partition = Some(DefaultPartition::new(name));
        self
    }

    pub fn default_partition_spec(&mut self, partition: DefaultPartition) -> &mut Self {
        self.default_partition = Some(partition);
        self
    }

    /// Register a CHECK constraint; an existing name gets the new expression
    pub fn check(&mut self, name: impl Into<String>, expression: impl Into<String>) -> &mut Self {
        let name = name.into();
        let expression = expression.into();
        match self.checks.iter_mut().find(|c| c.name == name) {
            Some(existing) => existing.expression = expression,
            None => self.checks.push(CheckConstraint { name, expression }),
        }
        self
    }

    pub fn tablespace(&mut self, tablespace: impl Into<String>) -> &mut Self {
        self.tablespace = Some(tablespace.into());
        self
    }

    /// Schema for partitions that neither name one nor match a kind registration
    pub fn partition_schema(&mut self, schema: impl Into<String>) -> &mut Self {
        self.schemas.set_default(schema);
        self
    }

    pub fn register_schema(&mut self, kind: PartitionKind, schema: impl Into<String>) -> &mut Self {
        self.schemas.register(kind, schema);
        self
    }

    pub fn enable_partition_pruning(&mut self, enabled: bool) -> &mut Self {
        self.flags.pruning_enabled = enabled;
        self
    }

    pub fn detach_concurrently(&mut self, enabled: bool) -> &mut Self {
        self.flags.detach_concurrently = enabled;
        self
    }

    pub fn analyze_after_create(&mut self, enabled: bool) -> &mut Self {
        self.flags.analyze_after_create = enabled;
        self
    }

    pub fn vacuum_after_drop(&mut self, enabled: bool) -> &mut Self {
        self.flags.vacuum_after_drop = enabled;
        self
    }

    /// Maintenance operations for this table, using the builder's flags
    pub fn maintenance(&self) -> PartitionMaintenance {
        PartitionMaintenance::new(self.table.clone(), self.flags)
    }

    /// Synthesize and apply the plan in one transaction
    pub fn create<E: TransactionalExecutor>(&self, executor: &E) -> Result<ApplyReport, PartitionError> {
        let plan = self.synthesize()?;
        apply_plan(&plan, executor)
    }

    /// Produce the ordered DDL for this table
    ///
    /// Order: parent table, pass-through shape statements, partitions (each followed
    /// by its sub-partitions), default partition, indexes, check constraints,
    /// `ANALYZE`. `CREATE SCHEMA IF NOT EXISTS` precedes the first statement that
    /// places a table in that schema.
    ///
    /// # Errors
    ///
    /// Returns a configuration error when the shape or strategy is missing, the shape
    /// cannot be rewritten, or two partitions resolve to the same table name, and a
    /// synthesis error when sub-partitions target a partition that does not exist.
    pub fn synthesize(&self) -> Result<PartitionPlan, PartitionError> {
        validate_qualified_identifier("table name", &self.table)?;

        let strategy = self.strategy.as_ref().ok_or_else(|| {
            PartitionError::configuration(format!(
                "no partition strategy set for '{}'",
                self.table
            ))
        })?;
        let shape = self.shape.as_ref().ok_or_else(|| {
            PartitionError::configuration(format!("no table shape supplied for '{}'", self.table))
        })?;
        let partitions = self.resolve_sub_partitions()?;

        let mut plan = PartitionPlan::new(self.table.clone(), self.flags);
        let mut schemas_created = HashSet::new();

        plan.push(StatementRole::ParentTable, self.parent_statement(shape, strategy)?);

        for (index, statement) in shape.statements().iter().enumerate().skip(1) {
            if statement.to_lowercase().contains("index") {
                log::debug!("skipping index statement #{index} of '{}' table shape", self.table);
                continue;
            }
            plan.push(StatementRole::ShapeStatement(index), statement.clone());
        }

        let mut qualified_names = HashSet::new();
        for partition in &partitions {
            let schema = self.schemas.resolve_for(partition.schema(), partition.kind());
            let qualified = self.qualified_partition_name(schema, partition.name());
            if !qualified_names.insert(qualified.clone()) {
                return Err(PartitionError::configuration(format!(
                    "partitions of '{}' resolve to the same table '{qualified}'",
                    self.table
                )));
            }
            if let Some(schema) = schema {
                ensure_schema(&mut plan, &mut schemas_created, schema)?;
            }

            let mut sql = format!(
                "CREATE TABLE IF NOT EXISTS {qualified} PARTITION OF {} {}",
                self.table,
                partition.bounds().values_clause()
            );
            if let Some(sub_partitions) = partition.sub_partitions() {
                sub_partitions.strategy().key.validate()?;
                sql.push(' ');
                sql.push_str(&sub_partitions.strategy().to_string());
            }
            push_tablespace(&mut sql, partition.tablespace())?;
            plan.push(StatementRole::Partition(qualified.clone()), sql);

            let Some(sub_partitions) = partition.sub_partitions() else {
                continue;
            };
            for sub in sub_partitions.partitions() {
                let sub_schema = sub
                    .schema()
                    .or(sub_partitions.schema())
                    .or_else(|| self.schemas.resolve(sub.kind()));
                if let Some(schema) = sub_schema {
                    ensure_schema(&mut plan, &mut schemas_created, schema)?;
                }
                // Unresolved sub-partitions live next to the parent table.
                let sub_name = match sub_schema.or(self.parent_schema()) {
                    Some(schema) => format!("{schema}.{}", sub.name()),
                    None => sub.name().to_string(),
                };
                if !qualified_names.insert(sub_name.clone()) {
                    return Err(PartitionError::configuration(format!(
                        "sub-partition '{sub_name}' collides with another partition of '{}'",
                        self.table
                    )));
                }

                let mut sql = format!(
                    "CREATE TABLE IF NOT EXISTS {sub_name} PARTITION OF {qualified} {}",
                    sub.bounds().values_clause()
                );
                push_tablespace(&mut sql, sub.tablespace())?;
                plan.push(
                    StatementRole::SubPartition {
                        parent: qualified.clone(),
                        name: sub_name,
                    },
                    sql,
                );
            }
        }

        if let Some(default) = &self.default_partition {
            validate_identifier("default partition name", default.name())?;
            let schema = default.schema().or(self.schemas.default_schema());
            let qualified = self.qualified_partition_name(schema, default.name());
            if qualified_names.contains(&qualified) {
                return Err(PartitionError::configuration(format!(
                    "default partition '{qualified}' collides with a regular partition of '{}'",
                    self.table
                )));
            }
            if let Some(schema) = schema {
                ensure_schema(&mut plan, &mut schemas_created, schema)?;
            }

            let mut sql = format!(
                "CREATE TABLE IF NOT EXISTS {qualified} PARTITION OF {} DEFAULT",
                self.table
            );
            push_tablespace(&mut sql, default.tablespace().or(self.tablespace.as_deref()))?;
            plan.push(StatementRole::DefaultPartition(qualified), sql);
        }

        for index in shape.indexes() {
            if index.columns().is_empty() {
                return Err(PartitionError::configuration(format!(
                    "index on '{}' needs at least one column",
                    self.table
                )));
            }
            let name = index.name_for(self.bare_table());
            let unique = if index.is_unique() { "UNIQUE " } else { "" };
            plan.push(
                StatementRole::Index(name.clone()),
                format!(
                    "CREATE {unique}INDEX IF NOT EXISTS {name} ON {} ({})",
                    self.table,
                    index.columns().join(", ")
                ),
            );
        }

        for check in &self.checks {
            validate_identifier("check constraint name", &check.name)?;
            plan.push(
                StatementRole::CheckConstraint(check.name.clone()),
                format!(
                    "ALTER TABLE {} ADD CONSTRAINT {} CHECK ({})",
                    self.table, check.name, check.expression
                ),
            );
        }

        if self.flags.analyze_after_create {
            plan.push(StatementRole::Analyze, format!("ANALYZE {}", self.table));
        }

        log::debug!(
            "synthesized {} statements for '{}' ({})",
            plan.len(),
            self.table,
            strategy
        );
        Ok(plan)
    }

    /// Table name without its schema qualifier
    fn bare_table(&self) -> &str {
        self.table
            .rsplit_once('.')
            .map_or(self.table.as_str(), |(_, table)| table)
    }

    fn parent_schema(&self) -> Option<&str> {
        self.table.rsplit_once('.').map(|(schema, _)| schema)
    }

    /// `<schema.>?<table><sep><name>`, or `name` as given when it already starts with
    /// the table name
    fn qualified_partition_name(&self, schema: Option<&str>, name: &str) -> String {
        let bare = self.bare_table();
        let local = if name.starts_with(bare) {
            name.to_string()
        } else {
            format!("{bare}{}{name}", self.config.naming.separator)
        };

        match schema.or(self.parent_schema()) {
            Some(schema) => format!("{schema}.{local}"),
            None => local,
        }
    }

    fn parent_statement(
        &self,
        shape: &TableShape,
        strategy: &PartitionStrategy,
    ) -> Result<String, PartitionError> {
        let first = shape.statements().first().ok_or_else(|| {
            PartitionError::configuration(format!("table shape for '{}' is empty", self.table))
        })?;

        let trimmed = first.trim();
        let trimmed = trimmed.strip_suffix(';').unwrap_or(trimmed).trim_end();
        let body = trimmed.strip_suffix(')').ok_or_else(|| {
            PartitionError::configuration(format!(
                "table shape for '{}' must start with a CREATE TABLE statement ending in ')'",
                self.table
            ))
        })?;

        let mut sql = format!("{body}) {strategy}");
        push_tablespace(&mut sql, self.tablespace.as_deref())?;
        Ok(sql)
    }

    fn resolve_sub_partitions(&self) -> Result<Vec<PartitionSpec>, PartitionError> {
        let mut partitions = self.partitions.clone();
        for (target, sub_partitions) in &self.pending_sub_partitions {
            let partition = partitions
                .iter_mut()
                .find(|p| p.name() == target.as_str())
                .ok_or_else(|| {
                    PartitionError::synthesis(format!(
                        "sub-partitions registered for unknown partition '{target}' of '{}'",
                        self.table
                    ))
                })?;
            *partition = partition.clone().with_sub_partitions(sub_partitions.clone());
        }
        Ok(partitions)
    }
}

fn ensure_schema(
    plan: &mut PartitionPlan,
    created: &mut HashSet<String>,
    schema: &str,
) -> Result<(), PartitionError> {
    validate_identifier("schema name", schema)?;
    if created.insert(schema.to_string()) {
        plan.push(
            StatementRole::CreateSchema(schema.to_string()),
            format!("CREATE SCHEMA IF NOT EXISTS {schema}"),
        );
    }
    Ok(())
}

fn push_tablespace(sql: &mut String, tablespace: Option<&str>) -> Result<(), PartitionError> {
    if let Some(tablespace) = tablespace {
        validate_identifier("tablespace name", tablespace)?;
        sql.push_str(&format!(" TABLESPACE {tablespace}"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use sea_query::{ColumnDef, Table};

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn builder(table: &str) -> PartitionBuilder {
        let mut builder = PartitionBuilder::new(table, &PartitionConfig::default());
        builder.table_shape(TableShape::from_statement(format!(
            "CREATE TABLE {table} (id bigint NOT NULL, region text NOT NULL, created_at date NOT NULL);"
        )));
        builder
    }

    #[test]
    fn test_parent_statement_gets_strategy_and_tablespace() {
        let mut b = builder("orders");
        b.range_by("created_at").unwrap().tablespace("fast");
        b.analyze_after_create(false);

        let plan = b.synthesize().unwrap();
        assert_eq!(
            plan.statements(),
            vec!["CREATE TABLE orders (id bigint NOT NULL, region text NOT NULL, created_at date NOT NULL) PARTITION BY RANGE (created_at) TABLESPACE fast"]
        );
    }

    #[test]
    fn test_shape_without_closing_paren_rejected() {
        let mut b = PartitionBuilder::new("orders", &PartitionConfig::default());
        b.table_shape(TableShape::from_statement("CREATE TABLE orders AS SELECT 1"));
        b.hash_by("id").unwrap();
        assert!(b.synthesize().unwrap_err().is_configuration());
    }

    #[test]
    fn test_shape_index_statements_are_dropped() {
        let mut b = PartitionBuilder::new("orders", &PartitionConfig::default());
        b.table_shape(
            TableShape::from_statement("CREATE TABLE orders (id bigint)")
                .with_statement("COMMENT ON TABLE orders IS 'all orders'")
                .with_statement("CREATE INDEX orders_id_idx ON orders (id)"),
        );
        b.hash_by("id").unwrap().analyze_after_create(false);

        let plan = b.synthesize().unwrap();
        assert_eq!(plan.len(), 2);
        assert_eq!(plan.steps()[1].role, StatementRole::ShapeStatement(1));
    }

    #[test]
    fn test_sea_query_shape() {
        let table = Table::create()
            .table("events")
            .col(ColumnDef::new("id").big_integer().not_null())
            .col(ColumnDef::new("created_at").date().not_null())
            .to_owned();

        let mut b = PartitionBuilder::new("events", &PartitionConfig::default());
        b.table_shape(TableShape::from_sea_query(&table));
        b.range_by("created_at").unwrap();

        let plan = b.synthesize().unwrap();
        let parent = plan.statements()[0];
        assert!(parent.starts_with("CREATE TABLE \"events\" ("));
        assert!(parent.ends_with(") PARTITION BY RANGE (created_at)"));
    }

    #[test]
    fn test_partition_names_and_literals() {
        let mut b = builder("orders");
        b.range_by("id")
            .unwrap()
            .add_range_partition("low", PartitionValue::MinValue, 100)
            .unwrap()
            .add_range_partition("orders_high", 100, PartitionValue::MaxValue)
            .unwrap();

        let plan = b.synthesize().unwrap();
        assert_eq!(
            plan.statements()[1],
            "CREATE TABLE IF NOT EXISTS orders_low PARTITION OF orders FOR VALUES FROM (MINVALUE) TO (100)"
        );
        assert_eq!(
            plan.statements()[2],
            "CREATE TABLE IF NOT EXISTS orders_high PARTITION OF orders FOR VALUES FROM (100) TO (MAXVALUE)"
        );
        assert_eq!(plan.statements()[3], "ANALYZE orders");
    }

    #[test]
    fn test_schema_qualified_parent() {
        let mut b = builder("sales.orders");
        b.list_by("region")
            .unwrap()
            .add_list_partition("eu", ["eu"])
            .unwrap()
            .register_schema(PartitionKind::List, "regional");
        b.add_partition(PartitionSpec::list("us", ["us"]).unwrap()).unwrap();

        let plan = b.synthesize().unwrap();
        assert_eq!(plan.statements()[1], "CREATE SCHEMA IF NOT EXISTS regional");
        assert_eq!(
            plan.statements()[2],
            "CREATE TABLE IF NOT EXISTS regional.orders_eu PARTITION OF sales.orders FOR VALUES IN ('eu')"
        );
        assert!(plan.statements()[3].starts_with("CREATE TABLE IF NOT EXISTS regional.orders_us"));
    }

    #[test]
    fn test_parent_schema_used_without_resolution() {
        let mut b = builder("sales.orders");
        b.hash_by("id").unwrap().hash_partitions(2).unwrap();

        let plan = b.synthesize().unwrap();
        assert_eq!(
            plan.statements()[1],
            "CREATE TABLE IF NOT EXISTS sales.orders_part_0 PARTITION OF sales.orders FOR VALUES WITH (modulus 2, remainder 0)"
        );
    }

    #[test]
    fn test_sub_partitions_follow_parent_schema() {
        let mut b = builder("sales.orders");
        b.list_by("region")
            .unwrap()
            .add_list_partition("eu", ["eu"])
            .unwrap()
            .analyze_after_create(false);
        b.with_sub_partitions(
            "eu",
            SubPartitionSet::hash("id").add_hash("orders_eu_h0", 1, 0).unwrap(),
        );

        let plan = b.synthesize().unwrap();
        assert_eq!(
            plan.statements()[2],
            "CREATE TABLE IF NOT EXISTS sales.orders_eu_h0 PARTITION OF sales.orders_eu FOR VALUES WITH (modulus 1, remainder 0)"
        );
        assert!(!plan
            .steps()
            .iter()
            .any(|step| matches!(step.role, StatementRole::CreateSchema(_))));
    }

    #[test]
    fn test_empty_sub_partition_key_rejected() {
        let unkeyed = || {
            SubPartitionSet::range(PartitionKey::Columns(vec![]))
                .add_range("orders_eu_2024", ymd(2024, 1, 1), ymd(2025, 1, 1))
                .unwrap()
        };

        let mut b = builder("orders");
        b.list_by("region").unwrap();
        let partition = PartitionSpec::list("eu", ["eu"])
            .unwrap()
            .with_sub_partitions(unkeyed());
        assert!(b.add_partition(partition).unwrap_err().is_configuration());

        let mut b = builder("orders");
        b.list_by("region").unwrap().add_list_partition("eu", ["eu"]).unwrap();
        b.with_sub_partitions("eu", unkeyed());
        assert!(b.synthesize().unwrap_err().is_configuration());
    }

    #[test]
    fn test_schema_and_tablespace_names_are_checked() {
        let mut b = builder("orders");
        b.hash_by("id")
            .unwrap()
            .hash_partitions(2)
            .unwrap()
            .partition_schema("archive; DROP TABLE orders");
        assert!(b.synthesize().unwrap_err().is_configuration());

        let mut b = builder("orders");
        b.hash_by("id").unwrap().tablespace("fast disk");
        assert!(b.synthesize().unwrap_err().is_configuration());

        let mut b = builder("orders");
        b.hash_by("id")
            .unwrap()
            .add_partition(PartitionSpec::hash("h0", 1, 0).unwrap().with_tablespace("cold'"))
            .unwrap();
        assert!(b.synthesize().unwrap_err().is_configuration());
    }

    #[test]
    fn test_schema_statement_emitted_once_and_first() {
        let mut b = builder("orders");
        b.range_by("created_at")
            .unwrap()
            .partition_schema("archive")
            .generate_monthly(ymd(2024, 1, 1), 3)
            .unwrap();

        let plan = b.synthesize().unwrap();
        let schema_statements: Vec<_> = plan
            .iter()
            .filter(|s| matches!(s.role, StatementRole::CreateSchema(_)))
            .collect();
        assert_eq!(schema_statements.len(), 1);
        assert_eq!(plan.statements()[1], "CREATE SCHEMA IF NOT EXISTS archive");
        assert_eq!(
            plan.statements()[2],
            "CREATE TABLE IF NOT EXISTS archive.orders_2024_01 PARTITION OF orders FOR VALUES FROM ('2024-01-01') TO ('2024-02-01')"
        );
    }

    #[test]
    fn test_nested_branch_emits_three_tables_in_order() {
        let mut b = builder("sales");
        b.list_by("region")
            .unwrap()
            .add_list_partition("eu", ["eu"])
            .unwrap()
            .analyze_after_create(false);
        b.with_sub_partitions(
            "eu",
            SubPartitionSet::range("created_at")
                .add_range("sales_eu_2024", ymd(2024, 1, 1), ymd(2025, 1, 1))
                .unwrap()
                .add_range("sales_eu_2025", ymd(2025, 1, 1), ymd(2026, 1, 1))
                .unwrap(),
        );

        let plan = b.synthesize().unwrap();
        let creates: Vec<&str> = plan
            .statements()
            .into_iter()
            .filter(|s| s.starts_with("CREATE TABLE IF NOT EXISTS"))
            .collect();
        assert_eq!(
            creates,
            vec![
                "CREATE TABLE IF NOT EXISTS sales_eu PARTITION OF sales FOR VALUES IN ('eu') PARTITION BY RANGE (created_at)",
                "CREATE TABLE IF NOT EXISTS sales_eu_2024 PARTITION OF sales_eu FOR VALUES FROM ('2024-01-01') TO ('2025-01-01')",
                "CREATE TABLE IF NOT EXISTS sales_eu_2025 PARTITION OF sales_eu FOR VALUES FROM ('2025-01-01') TO ('2026-01-01')",
            ]
        );
        assert_eq!(
            plan.steps()[2].role,
            StatementRole::SubPartition {
                parent: "sales_eu".to_string(),
                name: "sales_eu_2024".to_string()
            }
        );
    }

    #[test]
    fn test_sub_partition_schema_precedence() {
        let mut b = builder("sales");
        b.list_by("region").unwrap().add_list_partition("eu", ["eu"]).unwrap();
        b.register_schema(PartitionKind::Hash, "hashed");
        b.with_sub_partitions(
            "eu",
            SubPartitionSet::hash("id")
                .default_schema("eu_data")
                .add_hash("eu_h0", 2, 0)
                .unwrap()
                .add(
                    crate::partition::SubPartitionSpec::hash("eu_h1", 2, 1)
                        .unwrap()
                        .with_schema("special"),
                )
                .unwrap(),
        );

        let plan = b.synthesize().unwrap();
        let statements = plan.statements();
        assert!(statements.contains(&"CREATE SCHEMA IF NOT EXISTS eu_data"));
        assert!(statements.iter().any(|s| s.starts_with("CREATE TABLE IF NOT EXISTS eu_data.eu_h0")));
        assert!(statements.iter().any(|s| s.starts_with("CREATE TABLE IF NOT EXISTS special.eu_h1")));
        assert!(!statements.contains(&"CREATE SCHEMA IF NOT EXISTS hashed"));
    }

    #[test]
    fn test_unknown_sub_partition_target_is_synthesis_error() {
        let mut b = builder("sales");
        b.list_by("region").unwrap().add_list_partition("eu", ["eu"]).unwrap();
        b.with_sub_partitions(
            "apac",
            SubPartitionSet::hash("id").add_hash("apac_h0", 1, 0).unwrap(),
        );
        assert!(b.synthesize().unwrap_err().is_synthesis());
    }

    #[test]
    fn test_default_partition_uses_table_tablespace() {
        let mut b = builder("orders");
        b.list_by("region")
            .unwrap()
            .add_list_partition("eu", ["eu"])
            .unwrap()
            .tablespace("warm")
            .default_partition("other")
            .analyze_after_create(false);

        let plan = b.synthesize().unwrap();
        let last = plan.steps().last().unwrap();
        assert_eq!(last.role, StatementRole::DefaultPartition("orders_other".to_string()));
        assert_eq!(
            last.sql,
            "CREATE TABLE IF NOT EXISTS orders_other PARTITION OF orders DEFAULT TABLESPACE warm"
        );
    }

    #[test]
    fn test_default_partition_collision_rejected() {
        let mut b = builder("orders");
        b.list_by("region")
            .unwrap()
            .add_list_partition("other", ["xx"])
            .unwrap()
            .default_partition_spec(DefaultPartition::new("orders_other"));
        let err = b.synthesize().unwrap_err();
        assert!(err.is_configuration());
        assert!(err.to_string().contains("collides"));
    }

    #[test]
    fn test_indexes_checks_and_analyze_order() {
        let mut b = PartitionBuilder::new("orders", &PartitionConfig::default());
        b.table_shape(
            TableShape::from_statement("CREATE TABLE orders (id bigint, tenant_id int, total numeric)")
                .with_index(IndexIntent::index(["tenant_id", "id"]))
                .with_index(IndexIntent::unique(["id"]).named("orders_pk_idx")),
        );
        b.hash_by("id")
            .unwrap()
            .check("positive_total", "total > 0")
            .check("tenant_set", "tenant_id IS NOT NULL")
            .check("positive_total", "total >= 0");

        let plan = b.synthesize().unwrap();
        assert_eq!(
            &plan.statements()[1..],
            &[
                "CREATE INDEX IF NOT EXISTS orders_tenant_id_id_index ON orders (tenant_id, id)",
                "CREATE UNIQUE INDEX IF NOT EXISTS orders_pk_idx ON orders (id)",
                "ALTER TABLE orders ADD CONSTRAINT positive_total CHECK (total >= 0)",
                "ALTER TABLE orders ADD CONSTRAINT tenant_set CHECK (tenant_id IS NOT NULL)",
                "ANALYZE orders",
            ]
        );
    }

    #[test]
    fn test_strategy_rules() {
        let mut b = builder("orders");
        assert!(b
            .add_hash_partition("p0", 2, 0)
            .unwrap_err()
            .to_string()
            .contains("before a partition strategy"));

        b.hash_by("id").unwrap();
        assert!(b.range_by("created_at").unwrap_err().is_configuration());
        assert!(b.add_list_partition("eu", ["eu"]).unwrap_err().is_configuration());

        b.add_hash_partition("p0", 2, 0).unwrap();
        assert!(b
            .add_hash_partition("p0", 2, 1)
            .unwrap_err()
            .to_string()
            .contains("duplicate partition name"));
    }

    #[test]
    fn test_missing_shape_or_strategy() {
        let mut b = PartitionBuilder::new("orders", &PartitionConfig::default());
        assert!(b.synthesize().unwrap_err().is_configuration());
        b.hash_by("id").unwrap();
        assert!(b.synthesize().unwrap_err().to_string().contains("no table shape"));
    }

    #[test]
    fn test_synthesis_is_deterministic() {
        let mut b = builder("orders");
        b.range_by("created_at")
            .unwrap()
            .partition_schema("archive")
            .generate_quarterly(ymd(2024, 1, 1), 4)
            .unwrap()
            .default_partition("default")
            .check("has_region", "region <> ''");

        let first = b.synthesize().unwrap();
        let second = b.synthesize().unwrap();
        assert_eq!(first.to_sql_script(), second.to_sql_script());
        assert_eq!(first.checksum(), second.checksum());
    }

    #[test]
    fn test_clone_is_independent() {
        let mut original = builder("orders");
        original.hash_by("id").unwrap();
        let mut copy = original.clone();
        copy.hash_partitions(4).unwrap();
        assert!(original.partitions().is_empty());
        assert_eq!(copy.partitions().len(), 4);
    }

    #[test]
    fn test_generator_uses_config_naming() {
        let mut config = PartitionConfig::default();
        config.naming.separator = "__".to_string();
        config.naming.month_format = "m%Y%m".to_string();

        let mut b = PartitionBuilder::new("clicks", &config);
        b.table_shape(TableShape::from_statement("CREATE TABLE clicks (at date)"));
        b.range_by("at").unwrap().generate_monthly(ymd(2024, 12, 1), 2).unwrap();

        let names: Vec<&str> = b.partitions().iter().map(|p| p.name()).collect();
        assert_eq!(names, vec!["clicks__m202412", "clicks__m202501"]);
    }

    #[test]
    fn test_flags_seeded_from_config() {
        let mut config = PartitionConfig::default();
        config.defaults.detach_concurrently = true;
        config.defaults.analyze_after_create = false;

        let b = PartitionBuilder::new("orders", &config);
        assert!(b.flags().detach_concurrently);
        assert!(!b.flags().analyze_after_create);
        assert!(b.maintenance().flags().detach_concurrently);
    }
}
