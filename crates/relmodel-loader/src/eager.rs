//! Nested eager loading.
//!
//! This module provides the `EagerLoader` builder for configuring which
//! relations to load for a batch of records. Each relation level costs one
//! batched resolution, however many records the level holds.

use crate::RelationLoader;
use relmodel_core::error::{ConfigError, ConfigErrorKind};
use relmodel_core::{Error, ModelSchema, RecordRef, RecordView, Result};
use std::sync::Arc;

/// A path to a relation to include.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncludePath {
    /// Relation name on the parent model.
    pub relation: String,
    /// Nested relations to load on the related records.
    pub nested: Vec<IncludePath>,
}

impl IncludePath {
    /// Create a new include path for a single relation.
    #[must_use]
    pub fn new(relation: impl Into<String>) -> Self {
        Self {
            relation: relation.into(),
            nested: Vec::new(),
        }
    }

    /// Add a nested relation to load.
    #[must_use]
    pub fn nest(mut self, path: IncludePath) -> Self {
        merge_into(&mut self.nested, path);
        self
    }

    fn from_parts(parts: &[&str]) -> Option<Self> {
        let (head, rest) = parts.split_first()?;
        let mut path = IncludePath::new(*head);
        if let Some(child) = Self::from_parts(rest) {
            path.nested.push(child);
        }
        Some(path)
    }
}

/// Add `path` to `paths`, merging with an existing path of the same name.
fn merge_into(paths: &mut Vec<IncludePath>, path: IncludePath) {
    match paths.iter_mut().find(|p| p.relation == path.relation) {
        Some(existing) => {
            for child in path.nested {
                merge_into(&mut existing.nested, child);
            }
        }
        None => paths.push(path),
    }
}

/// Builder for eager loading configuration.
///
/// # Example
///
/// ```ignore
/// let eager = EagerLoader::new()
///     .include("profile")
///     .include_nested("orders.items.product");
/// loader.load_with(&eager, &customers)?;
/// ```
#[derive(Debug, Clone, Default)]
pub struct EagerLoader {
    /// Relations to eager-load.
    includes: Vec<IncludePath>,
    /// Model kind of the primaries, needed when they are plain records.
    model: Option<String>,
    /// Result mode for relations that do not fix their own.
    as_array: Option<bool>,
}

impl EagerLoader {
    /// Create a new empty eager loader.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Name the model kind of the primary records.
    #[must_use]
    pub fn for_model(mut self, kind: impl Into<String>) -> Self {
        self.model = Some(kind.into());
        self
    }

    /// Load related records as plain records (or structured ones) unless a
    /// relation fixes its own mode.
    #[must_use]
    pub fn as_array(mut self, value: bool) -> Self {
        self.as_array = Some(value);
        self
    }

    /// Include a relation in eager loading.
    #[must_use]
    pub fn include(mut self, relation: impl Into<String>) -> Self {
        merge_into(&mut self.includes, IncludePath::new(relation));
        self
    }

    /// Include a nested relation (e.g., "orders.items").
    ///
    /// Empty segments are skipped; an empty path is ignored.
    #[must_use]
    pub fn include_nested(mut self, path: &str) -> Self {
        let parts: Vec<&str> = path
            .trim()
            .split('.')
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .collect();
        if let Some(include) = IncludePath::from_parts(&parts) {
            merge_into(&mut self.includes, include);
        }
        self
    }

    /// Include a nested relation, rejecting malformed paths.
    pub fn try_include_nested(self, path: &str) -> Result<Self> {
        let parts: Vec<&str> = path.split('.').map(str::trim).collect();
        if parts.iter().any(|p| p.is_empty()) {
            return Err(Error::Config(ConfigError::new(
                ConfigErrorKind::InvalidRelationPath,
                format!("invalid relation path \"{path}\""),
            )));
        }
        Ok(self.include_nested(path))
    }

    /// Get the include paths.
    #[must_use]
    pub fn includes(&self) -> &[IncludePath] {
        &self.includes
    }

    /// Check if any relations are included.
    #[must_use]
    pub fn has_includes(&self) -> bool {
        !self.includes.is_empty()
    }

    pub fn model(&self) -> Option<&str> {
        self.model.as_deref()
    }

    pub fn is_as_array(&self) -> Option<bool> {
        self.as_array
    }
}

impl RelationLoader {
    /// Populate every relation configured on `eager`, level by level.
    #[tracing::instrument(
        level = "debug",
        skip(self, eager, primaries),
        fields(primaries = primaries.len())
    )]
    pub fn load_with(&self, eager: &EagerLoader, primaries: &[RecordRef]) -> Result<()> {
        let as_array = eager.is_as_array().unwrap_or(self.config().as_array);
        for include in eager.includes() {
            self.load_include(include, primaries, eager.model(), as_array)?;
        }
        Ok(())
    }

    fn schema_of(
        &self,
        primaries: &[RecordRef],
        kind: Option<&str>,
    ) -> Result<Option<Arc<ModelSchema>>> {
        let Some(first) = primaries.first() else {
            return Ok(None);
        };
        if let Some(schema) = first.borrow().schema() {
            return Ok(Some(Arc::clone(schema)));
        }
        match kind {
            Some(kind) => self.registry().schema(kind).map(Some),
            None => Err(Error::Config(ConfigError::new(
                ConfigErrorKind::UnknownModel,
                "eager loading plain records requires a model kind",
            ))),
        }
    }

    fn load_include(
        &self,
        include: &IncludePath,
        primaries: &[RecordRef],
        kind: Option<&str>,
        as_array: bool,
    ) -> Result<()> {
        let Some(schema) = self.schema_of(primaries, kind)? else {
            return Ok(());
        };
        let relation = schema.relation(&include.relation)?;
        let as_array = relation.as_array.unwrap_or(as_array);
        let related = self
            .populate(&include.relation, relation, primaries, as_array)?
            .records;
        tracing::info!(
            model = schema.kind(),
            relation = %include.relation,
            primaries = primaries.len(),
            related = related.len(),
            "Eager batch loaded"
        );

        for nested in &include.nested {
            self.load_include(nested, &related, Some(&relation.target), as_array)?;
        }
        Ok(())
    }
}
