//! Finding primary records with eager-loaded relations.

use relmodel_core::query::{Condition, OrderBy};
use relmodel_core::{Query, RecordRef, Result};
use relmodel_loader::{EagerLoader, RelationLoader};

/// Query builder returning hydrated records of one model kind.
///
/// # Example
///
/// ```ignore
/// let customers = find(&loader, "customer")
///     .and_where(Condition::eq("status", "active"))
///     .with("orders.items")
///     .all()?;
/// ```
#[derive(Debug)]
pub struct Finder<'a> {
    loader: &'a RelationLoader,
    kind: String,
    query: Query,
    eager: EagerLoader,
    as_array: Option<bool>,
}

/// Start a query for records of `kind`.
pub fn find<'a>(loader: &'a RelationLoader, kind: &str) -> Finder<'a> {
    Finder {
        loader,
        kind: kind.to_string(),
        query: Query::new(kind),
        eager: EagerLoader::new().for_model(kind),
        as_array: None,
    }
}

impl Finder<'_> {
    #[must_use]
    pub fn and_where(mut self, condition: Condition) -> Self {
        self.query = self.query.and_where(condition);
        self
    }

    #[must_use]
    pub fn order_by(mut self, term: OrderBy) -> Self {
        self.query = self.query.order_by([term]);
        self
    }

    #[must_use]
    pub fn limit(mut self, limit: usize) -> Self {
        self.query = self.query.limit(limit);
        self
    }

    /// Eager-load a relation path such as `"orders.items"`.
    #[must_use]
    pub fn with(mut self, path: &str) -> Self {
        self.eager = self.eager.include_nested(path);
        self
    }

    /// Return plain records instead of structured ones.
    #[must_use]
    pub fn as_array(mut self, value: bool) -> Self {
        self.as_array = Some(value);
        self
    }

    fn is_as_array(&self) -> bool {
        self.as_array.unwrap_or(self.loader.config().as_array)
    }

    /// Fetch every matching record, then load the requested relations.
    #[tracing::instrument(level = "debug", skip(self), fields(kind = %self.kind))]
    pub fn all(self) -> Result<Vec<RecordRef>> {
        let as_array = self.is_as_array();
        let db = self.loader.executor_for(&self.kind);
        let records = self
            .query
            .as_array(as_array)
            .all(db.as_ref())?
            .into_iter()
            .map(|row| self.loader.hydrate(&self.kind, row, as_array))
            .collect::<Result<Vec<_>>>()?;

        tracing::debug!(found = records.len(), "Fetched primary records");
        if self.eager.has_includes() {
            let eager = self.eager.as_array(as_array);
            self.loader.load_with(&eager, &records)?;
        }
        Ok(records)
    }

    /// Fetch the first matching record, then load the requested relations.
    pub fn one(self) -> Result<Option<RecordRef>> {
        Ok(self.limit(1).all()?.into_iter().next())
    }
}

/// Render records (and their loaded relations) as a JSON array.
pub fn to_json(records: &[RecordRef]) -> serde_json::Value {
    serde_json::Value::Array(records.iter().map(RecordRef::to_json).collect())
}
