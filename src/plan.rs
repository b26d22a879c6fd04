//! Synthesized partition plans
//!
//! A [`PartitionPlan`] is the ordered list of DDL statements for one partitioned
//! table, each tagged with the logical step that produced it. Plans are plain data:
//! print them, diff them, checksum them, or hand them to
//! [`apply_plan`](crate::apply::apply_plan).

use crate::builder::PartitionFlags;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::fmt;

/// The logical step a statement belongs to
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "step", content = "target", rename_all = "snake_case")]
pub enum StatementRole {
    CreateSchema(String),
    ParentTable,
    /// Pass-through statement from the table shape, by position
    ShapeStatement(usize),
    Partition(String),
    SubPartition { parent: String, name: String },
    DefaultPartition(String),
    Index(String),
    CheckConstraint(String),
    Analyze,
    Begin,
    Commit,
}

impl fmt::Display for StatementRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StatementRole::CreateSchema(schema) => write!(f, "create schema {schema}"),
            StatementRole::ParentTable => write!(f, "parent table"),
            StatementRole::ShapeStatement(index) => write!(f, "table shape statement #{index}"),
            StatementRole::Partition(name) => write!(f, "partition {name}"),
            StatementRole::SubPartition { parent, name } => {
                write!(f, "sub-partition {name} of {parent}")
            }
            StatementRole::DefaultPartition(name) => write!(f, "default partition {name}"),
            StatementRole::Index(name) => write!(f, "index {name}"),
            StatementRole::CheckConstraint(name) => write!(f, "check constraint {name}"),
            StatementRole::Analyze => write!(f, "analyze"),
            StatementRole::Begin => write!(f, "begin transaction"),
            StatementRole::Commit => write!(f, "commit"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlannedStatement {
    pub role: StatementRole,
    pub sql: String,
}

/// Ordered DDL for one partitioned table
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PartitionPlan {
    table: String,
    flags: PartitionFlags,
    steps: Vec<PlannedStatement>,
}

impl PartitionPlan {
    pub(crate) fn new(table: impl Into<String>, flags: PartitionFlags) -> Self {
        Self {
            table: table.into(),
            flags,
            steps: Vec::new(),
        }
    }

    pub(crate) fn push(&mut self, role: StatementRole, sql: impl Into<String>) {
        self.steps.push(PlannedStatement {
            role,
            sql: sql.into(),
        });
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn flags(&self) -> &PartitionFlags {
        &self.flags
    }

    pub fn steps(&self) -> &[PlannedStatement] {
        &self.steps
    }

    /// The SQL text of every step, in execution order
    pub fn statements(&self) -> Vec<&str> {
        self.steps.iter().map(|s| s.sql.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, PlannedStatement> {
        self.steps.iter()
    }

    /// SHA-256 of the newline-joined statements, as lowercase hex
    ///
    /// Two plans with the same checksum execute the same SQL.
    pub fn checksum(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.statements().join("\n").as_bytes());
        format!("{:x}", hasher.finalize())
    }

    /// The plan as a runnable script, one statement per line
    pub fn to_sql_script(&self) -> String {
        self.steps
            .iter()
            .map(|s| format!("{};\n", s.sql))
            .collect()
    }
}

impl<'a> IntoIterator for &'a PartitionPlan {
    type Item = &'a PlannedStatement;
    type IntoIter = std::slice::Iter<'a, PlannedStatement>;

    fn into_iter(self) -> Self::IntoIter {
        self.steps.iter()
    }
}
