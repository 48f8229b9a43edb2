//! Model schemas and the model registry.
//!
//! A [`ModelSchema`] describes one structured model kind: its primary key,
//! its declared relations and (optionally) the executor its records are
//! read through. The [`Registry`] maps kinds to schemas so the loader can
//! hydrate related records and find default instances of a target kind.

use crate::connection::Executor;
use crate::error::{Error, Result};
use crate::record::ModelRecord;
use crate::relation::RelationDescriptor;
use crate::row::Row;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Static description of a structured model kind.
#[derive(Clone)]
pub struct ModelSchema {
    kind: String,
    primary_key: Vec<String>,
    relations: HashMap<String, RelationDescriptor>,
    executor: Option<Arc<dyn Executor>>,
}

impl ModelSchema {
    /// Create a schema with primary key `id` and no relations.
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            primary_key: vec!["id".to_string()],
            relations: HashMap::new(),
            executor: None,
        }
    }

    /// Set the primary key columns.
    #[must_use]
    pub fn with_primary_key<S: Into<String>>(mut self, columns: impl IntoIterator<Item = S>) -> Self {
        self.primary_key = columns.into_iter().map(Into::into).collect();
        self
    }

    /// Declare a relation. Its owner becomes this schema's kind.
    #[must_use]
    pub fn with_relation(mut self, name: impl Into<String>, mut relation: RelationDescriptor) -> Self {
        relation.set_owner(&self.kind);
        self.relations.insert(name.into(), relation);
        self
    }

    /// Read records of this kind through `executor`.
    #[must_use]
    pub fn with_executor(mut self, executor: Arc<dyn Executor>) -> Self {
        self.executor = Some(executor);
        self
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn primary_key_columns(&self) -> &[String] {
        &self.primary_key
    }

    /// Look up a relation by exact name.
    pub fn relation(&self, name: &str) -> Result<&RelationDescriptor> {
        self.relations
            .get(name)
            .ok_or_else(|| Error::unknown_relation(&self.kind, name))
    }

    pub fn find_relation(&self, name: &str) -> Option<&RelationDescriptor> {
        self.relations.get(name)
    }

    /// Declared relation names, sorted.
    pub fn relation_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.relations.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn executor(&self) -> Option<Arc<dyn Executor>> {
        self.executor.clone()
    }

    /// A blank record of this kind.
    pub fn instance(self: &Arc<Self>) -> ModelRecord {
        ModelRecord::new(Arc::clone(self))
    }

    /// Hydrate a record of this kind from a storage row.
    pub fn hydrate(self: &Arc<Self>, row: Row) -> ModelRecord {
        ModelRecord::from_row(Arc::clone(self), row)
    }
}

impl fmt::Debug for ModelSchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelSchema")
            .field("kind", &self.kind)
            .field("primary_key", &self.primary_key)
            .field("relations", &self.relation_names())
            .field("has_executor", &self.executor.is_some())
            .finish()
    }
}

/// Kind-to-schema lookup.
#[derive(Debug, Clone, Default)]
pub struct Registry {
    schemas: HashMap<String, Arc<ModelSchema>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a schema, replacing any previous schema of the same kind.
    pub fn register(&mut self, schema: ModelSchema) -> Arc<ModelSchema> {
        let schema = Arc::new(schema);
        self.schemas
            .insert(schema.kind().to_string(), Arc::clone(&schema));
        schema
    }

    /// Builder-style [`register`](Registry::register).
    #[must_use]
    pub fn with(mut self, schema: ModelSchema) -> Self {
        self.register(schema);
        self
    }

    pub fn get(&self, kind: &str) -> Option<&Arc<ModelSchema>> {
        self.schemas.get(kind)
    }

    /// Look up a schema, failing for unregistered kinds.
    pub fn schema(&self, kind: &str) -> Result<Arc<ModelSchema>> {
        self.schemas
            .get(kind)
            .cloned()
            .ok_or_else(|| Error::unknown_model(kind))
    }

    /// A default (blank) instance of `kind`.
    pub fn instance(&self, kind: &str) -> Result<ModelRecord> {
        Ok(self.schema(kind)?.instance())
    }

    pub fn len(&self) -> usize {
        self.schemas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.schemas.is_empty()
    }
}
