//! Schema resolution for partitions
//!
//! Precedence, highest first: the schema named on the partition itself, the schema
//! registered for the partition's kind, the global default. With none of them the
//! partition lives next to its parent.

use crate::partition::PartitionKind;
use std::collections::HashMap;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SchemaResolver {
    by_kind: HashMap<PartitionKind, String>,
    default: Option<String>,
}

impl SchemaResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the schema for every partition of `kind`, replacing any earlier one
    pub fn register(&mut self, kind: PartitionKind, schema: impl Into<String>) -> &mut Self {
        self.by_kind.insert(kind, schema.into());
        self
    }

    pub fn register_many<I, S>(&mut self, schemas: I) -> &mut Self
    where
        I: IntoIterator<Item = (PartitionKind, S)>,
        S: Into<String>,
    {
        for (kind, schema) in schemas {
            self.register(kind, schema);
        }
        self
    }

    pub fn set_default(&mut self, schema: impl Into<String>) -> &mut Self {
        self.default = Some(schema.into());
        self
    }

    /// Schema for a partition of `kind` that names none itself
    pub fn resolve(&self, kind: PartitionKind) -> Option<&str> {
        self.by_kind
            .get(&kind)
            .map(String::as_str)
            .or(self.default.as_deref())
    }

    /// Schema for a partition, honouring its explicit schema first
    pub fn resolve_for<'a>(&'a self, explicit: Option<&'a str>, kind: PartitionKind) -> Option<&'a str> {
        explicit.or_else(|| self.resolve(kind))
    }

    pub fn default_schema(&self) -> Option<&str> {
        self.default.as_deref()
    }

    pub fn has_schema_for(&self, kind: PartitionKind) -> bool {
        self.by_kind.contains_key(&kind)
    }

    pub fn clear(&mut self) {
        self.by_kind.clear();
        self.default = None;
    }
}
