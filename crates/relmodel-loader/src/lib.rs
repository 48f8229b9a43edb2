//! Relation resolution engine for relmodel.
//!
//! [`RelationLoader`] populates a named relation onto a batch of primary
//! records with one dependent query (plus one per via step), instead of one
//! query per primary record:
//!
//! 1. the relation's links are validated;
//! 2. the dependent query is narrowed by the primaries' key values, or by
//!    the key values of the via records for indirect relations;
//! 3. a single to-one primary fetches one row; anything else fetches all
//!    rows and groups them into buckets;
//! 4. each primary receives its bucket (or an empty value);
//! 5. declared inverse relations are bound without querying.
//!
//! # Example
//!
//! ```ignore
//! let loader = RelationLoader::new(registry, db);
//! let customers = loader.hydrate_all("customer", rows)?;
//! let relation = registry.schema("customer")?.relation("orders")?.clone();
//! loader.populate_relation("orders", &relation, &customers)?;
//! ```

pub mod bucket;
pub mod config;
pub mod eager;
pub mod inverse;
pub mod pivot;

pub use bucket::{Bucket, Buckets, PivotMap, build_buckets, build_pivot_map, index_buckets};
pub use config::LoaderConfig;
pub use eager::{EagerLoader, IncludePath};
pub use inverse::InverseBinder;
pub use pivot::{ViaStep, filter_by_models, find_junction_rows};

use bucket::insert_indexed;
use relmodel_core::error::{ConfigError, ConfigErrorKind};
use relmodel_core::{
    Error, Executor, LinkSpec, LookupKey, ModelSchema, PlainRecord, RecordRef, RecordView,
    Registry, Related, RelationDescriptor, Result, Row, Value, Via, encode,
};
use std::sync::Arc;

/// Outcome of one resolution step.
#[derive(Debug, Default)]
struct Populated {
    /// Related records in query order.
    records: Vec<RecordRef>,
    /// Pivot map built by this step, for the step above it.
    map: Option<PivotMap>,
}

/// Resolves relations over batches of records.
pub struct RelationLoader {
    registry: Arc<Registry>,
    executor: Arc<dyn Executor>,
    config: LoaderConfig,
}

impl RelationLoader {
    /// Create a loader reading through `executor` unless a model schema
    /// names its own.
    pub fn new(registry: Arc<Registry>, executor: Arc<dyn Executor>) -> Self {
        Self {
            registry,
            executor,
            config: LoaderConfig::default(),
        }
    }

    /// Replace the configuration (builder pattern).
    #[must_use]
    pub fn with_config(mut self, config: LoaderConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &LoaderConfig {
        &self.config
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// The executor reading records of `kind`.
    ///
    /// The kind's schema may name its own; otherwise the loader default.
    pub fn executor_for(&self, kind: &str) -> Arc<dyn Executor> {
        self.registry
            .get(kind)
            .and_then(|schema| schema.executor())
            .unwrap_or_else(|| Arc::clone(&self.executor))
    }

    /// The executor reading junction rows for `primaries`.
    ///
    /// A structured primary names it through its schema; plain primaries
    /// fall back to a default instance of the owner kind.
    fn junction_executor(&self, primaries: &[RecordRef], owner: &str) -> Arc<dyn Executor> {
        let from_primary = primaries.first().and_then(|p| {
            let record = p.borrow();
            record.schema().and_then(|s| s.executor())
        });
        from_primary
            .or_else(|| {
                self.registry
                    .instance(owner)
                    .ok()
                    .and_then(|instance| instance.executor())
            })
            .unwrap_or_else(|| Arc::clone(&self.executor))
    }

    /// Hydrate one row as a record of `kind`.
    pub fn hydrate(&self, kind: &str, row: Row, as_array: bool) -> Result<RecordRef> {
        if as_array {
            return Ok(RecordRef::new(PlainRecord::from_row(row)));
        }
        let schema: Arc<ModelSchema> = self.registry.schema(kind)?;
        Ok(RecordRef::new(schema.hydrate(row)))
    }

    /// Hydrate rows as structured records of `kind`.
    pub fn hydrate_all(&self, kind: &str, rows: Vec<Row>) -> Result<Vec<RecordRef>> {
        rows.into_iter()
            .map(|row| self.hydrate(kind, row, false))
            .collect()
    }

    /// Populate relation `name` onto every record of `primaries`.
    ///
    /// Returns the related records fetched, in query order. Every primary
    /// receives a value: its matches, or an empty list (to-many) or
    /// [`Related::Null`] (to-one) when nothing matched.
    #[tracing::instrument(
        level = "debug",
        skip(self, relation, primaries),
        fields(target = %relation.target, primaries = primaries.len())
    )]
    pub fn populate_relation(
        &self,
        name: &str,
        relation: &RelationDescriptor,
        primaries: &[RecordRef],
    ) -> Result<Vec<RecordRef>> {
        let as_array = relation.as_array.unwrap_or(self.config.as_array);
        Ok(self.populate(name, relation, primaries, as_array)?.records)
    }

    fn populate(
        &self,
        name: &str,
        relation: &RelationDescriptor,
        primaries: &[RecordRef],
        as_array: bool,
    ) -> Result<Populated> {
        relation.validate()?;
        if primaries.is_empty() {
            return Ok(Populated::default());
        }

        let query = relation.base_query().as_array(as_array);
        let (query, via) = match &relation.via {
            Some(Via::Table(junction)) => {
                let db = self.junction_executor(primaries, &junction.owner);
                let rows = find_junction_rows(db.as_ref(), primaries, junction, &self.config)?;
                let query = filter_by_models(query, &relation.link, &rows, &self.config);
                (query, Some((ViaStep { models: rows, inner: None }, &junction.link)))
            }
            Some(Via::Relation {
                name: via_name,
                relation: via_relation,
            }) => {
                let via_as_array = via_relation.as_array.unwrap_or(as_array);
                let inner = self.populate(via_name, via_relation, primaries, via_as_array)?;
                let query = filter_by_models(query, &relation.link, &inner.records, &self.config);
                let step = ViaStep {
                    models: inner.records,
                    inner: inner.map,
                };
                (query, Some((step, &via_relation.link)))
            }
            None => (
                filter_by_models(query, &relation.link, primaries, &self.config),
                None,
            ),
        };

        let map = via.as_ref().map(|(step, via_link)| {
            let map = build_pivot_map(&step.models, &relation.link, via_link, &self.config);
            match &step.inner {
                Some(inner) => map.compose(inner),
                None => map,
            }
        });

        let db = self.executor_for(&relation.target);

        if !relation.multiple && primaries.len() == 1 {
            let record = query
                .one(db.as_ref())?
                .map(|row| self.hydrate(&relation.target, row, as_array))
                .transpose()?;
            let primary = &primaries[0];
            primary.borrow_mut().populate_relation(
                name,
                record.clone().map_or(Related::Null, Related::One),
            );
            let records: Vec<RecordRef> = record.into_iter().collect();
            tracing::debug!(relation = name, found = records.len(), "Attached to-one relation");
            self.bind_inverse(relation, primaries, &records, name)?;
            return Ok(Populated { records, map });
        }

        let records = query
            .all(db.as_ref())?
            .into_iter()
            .map(|row| self.hydrate(&relation.target, row, as_array))
            .collect::<Result<Vec<_>>>()?;

        let mut buckets = build_buckets(
            &records,
            &relation.link,
            map.as_ref(),
            !relation.multiple,
            &self.config,
        );
        if relation.multiple {
            if let Some(index_by) = &relation.index_by {
                buckets = index_buckets(buckets, index_by);
            }
        }

        let acting = relation.acting_link();
        for primary in primaries {
            let value = self.bucket_value(primary, relation, acting, &buckets);
            primary.borrow_mut().populate_relation(name, value);
        }
        tracing::debug!(
            relation = name,
            related = records.len(),
            buckets = buckets.len(),
            "Attached relation"
        );

        self.bind_inverse(relation, primaries, &records, name)?;
        Ok(Populated { records, map })
    }

    fn bind_inverse(
        &self,
        relation: &RelationDescriptor,
        primaries: &[RecordRef],
        records: &[RecordRef],
        name: &str,
    ) -> Result<()> {
        match &relation.inverse_of {
            Some(inverse) => InverseBinder::new(&self.registry, &self.config)
                .bind(relation, primaries, records, name, inverse),
            None => Ok(()),
        }
    }

    fn empty_value(relation: &RelationDescriptor) -> Related {
        match (relation.multiple, &relation.index_by) {
            (false, _) => Related::Null,
            (true, Some(_)) => Related::Indexed(Vec::new()),
            (true, None) => Related::Many(Vec::new()),
        }
    }

    fn lookup(&self, buckets: &Buckets, key: &LookupKey) -> Option<Related> {
        if !self.config.null_keys_match && !key.is_matchable() {
            return None;
        }
        buckets.get(key).map(Bucket::to_related)
    }

    /// The value a primary receives from `buckets`.
    ///
    /// A to-many relation over one column whose primary value is an array
    /// receives the union of the buckets of every element.
    fn bucket_value(
        &self,
        primary: &RecordRef,
        relation: &RelationDescriptor,
        acting: &LinkSpec,
        buckets: &Buckets,
    ) -> Related {
        let local = acting.local_attributes();

        if let (true, [attribute]) = (relation.multiple, local.as_slice()) {
            if let Some(Value::Array(items)) = primary.attribute(attribute) {
                return self.union_value(relation, &items, buckets);
            }
        }

        let key = encode(&*primary.borrow(), &local);
        self.lookup(buckets, &key)
            .unwrap_or_else(|| Self::empty_value(relation))
    }

    fn union_value(
        &self,
        relation: &RelationDescriptor,
        items: &[Value],
        buckets: &Buckets,
    ) -> Related {
        let mut list = Vec::new();
        let mut indexed = Vec::new();
        for item in items {
            let key = LookupKey::from_values(std::iter::once(item));
            match self.lookup(buckets, &key) {
                Some(Related::Indexed(entries)) => {
                    for (index, record) in entries {
                        insert_indexed(&mut indexed, index, record);
                    }
                }
                Some(other) => list.extend(other.records()),
                None => {}
            }
        }
        if relation.index_by.is_some() {
            Related::Indexed(indexed)
        } else {
            Related::Many(list)
        }
    }

    /// Load relation `name` of a single structured record.
    ///
    /// A relation populated earlier (eagerly or lazily) is returned from
    /// the record without querying.
    #[tracing::instrument(level = "debug", skip(self, primary))]
    pub fn load_lazy(&self, primary: &RecordRef, name: &str) -> Result<Related> {
        let schema = {
            let record = primary.borrow();
            if let Some(cached) = record.relation(name) {
                tracing::trace!(relation = name, "Relation already populated");
                return Ok(cached.clone());
            }
            record.schema().cloned()
        };
        let Some(schema) = schema else {
            return Err(Error::Config(ConfigError::new(
                ConfigErrorKind::UnknownModel,
                format!("cannot lazy-load \"{name}\": plain records have no model kind"),
            )));
        };

        let relation = schema.relation(name)?;
        self.populate_relation(name, relation, std::slice::from_ref(primary))?;
        Ok(primary.relation(name).unwrap_or_default())
    }
}

impl std::fmt::Debug for RelationLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RelationLoader")
            .field("registry", &self.registry)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relmodel_core::error::QueryErrorKind;
    use relmodel_memory::MemoryExecutor;

    fn db() -> Arc<MemoryExecutor> {
        Arc::new(MemoryExecutor::new().with_table(
            "item",
            [
                Row::from_pairs([("id", Value::from(1_i64)), ("sku", Value::from("a"))]),
                Row::from_pairs([("id", Value::from(2_i64)), ("sku", Value::from("b"))]),
                Row::from_pairs([("id", Value::from(3_i64)), ("sku", Value::from("a"))]),
            ],
        ))
    }

    fn loader(db: &Arc<MemoryExecutor>) -> RelationLoader {
        let registry = Registry::new().with(ModelSchema::new("item"));
        RelationLoader::new(Arc::new(registry), Arc::clone(db) as Arc<dyn Executor>)
    }

    fn plain(pairs: &[(&str, Value)]) -> RecordRef {
        let mut record = PlainRecord::new();
        for (k, v) in pairs {
            record.set_attribute(k, v.clone());
        }
        RecordRef::new(record)
    }

    fn ids(related: &Related) -> Vec<i64> {
        related
            .records()
            .iter()
            .filter_map(|r| r.get::<i64>("id").ok())
            .collect()
    }

    #[test]
    fn test_empty_link_fails_before_querying() {
        let db = db();
        let relation = RelationDescriptor::has_many("item", LinkSpec::default());
        let err = loader(&db)
            .populate_relation("items", &relation, &[plain(&[("id", Value::BigInt(1))])])
            .unwrap_err();
        assert_eq!(err.config_kind(), Some(ConfigErrorKind::InvalidLink));
        assert_eq!(db.query_count(), 0);
    }

    #[test]
    fn test_empty_primaries_issue_no_query() {
        let db = db();
        let relation = RelationDescriptor::has_many("item", LinkSpec::single("item_ids", "id"));
        let related = loader(&db).populate_relation("items", &relation, &[]).unwrap();
        assert!(related.is_empty());
        assert_eq!(db.query_count(), 0);
    }

    #[test]
    fn test_array_valued_key_takes_union_of_buckets() {
        let db = db();
        let relation = RelationDescriptor::has_many("item", LinkSpec::single("item_ids", "id"));
        let first = plain(&[("item_ids", Value::from(vec![3_i64, 1]))]);
        let second = plain(&[("item_ids", Value::from(vec![2_i64, 99]))]);

        let related = loader(&db)
            .populate_relation("items", &relation, &[first.clone(), second.clone()])
            .unwrap();

        assert_eq!(related.len(), 3);
        assert_eq!(ids(&first.relation("items").unwrap_or_default()), vec![3, 1]);
        assert_eq!(ids(&second.relation("items").unwrap_or_default()), vec![2]);
        assert_eq!(db.query_count(), 1);
    }

    #[test]
    fn test_array_valued_key_with_index_by() {
        let db = db();
        let relation = RelationDescriptor::has_many("item", LinkSpec::single("item_ids", "id"))
            .index_by("sku");
        let primary = plain(&[("item_ids", Value::from(vec![1_i64, 2, 3]))]);

        loader(&db)
            .populate_relation("items", &relation, std::slice::from_ref(&primary))
            .unwrap();

        let Some(Related::Indexed(entries)) = primary.relation("items") else {
            panic!("expected indexed relation");
        };
        let keys: Vec<_> = entries.iter().map(|(k, _)| k.clone()).collect();
        assert_eq!(keys, vec![Value::from("a"), Value::from("b")]);
        assert_eq!(entries[0].1.attribute("id"), Some(Value::BigInt(3)));
    }

    #[test]
    fn test_null_keys_match_when_configured() {
        let db = Arc::new(MemoryExecutor::new().with_table(
            "order",
            [
                Row::from_pairs([("id", Value::BigInt(13)), ("customer_id", Value::Null)]),
                Row::from_pairs([("id", Value::BigInt(14)), ("customer_id", Value::BigInt(1))]),
            ],
        ));
        let relation = RelationDescriptor::has_many("order", LinkSpec::single("id", "customer_id"));
        let orphan = plain(&[("id", Value::Null)]);
        let owner = plain(&[("id", Value::BigInt(1))]);
        let primaries = [orphan.clone(), owner.clone()];

        let strict = loader(&db).with_config(LoaderConfig::default().as_array(true));
        strict.populate_relation("orders", &relation, &primaries).unwrap();
        assert!(ids(&orphan.relation("orders").unwrap_or_default()).is_empty());
        assert_eq!(ids(&owner.relation("orders").unwrap_or_default()), vec![14]);

        let lenient = loader(&db)
            .with_config(LoaderConfig::default().as_array(true).null_keys_match(true));
        let related = lenient.populate_relation("orders", &relation, &primaries).unwrap();
        assert_eq!(related.len(), 2);
        assert_eq!(ids(&orphan.relation("orders").unwrap_or_default()), vec![13]);
        assert_eq!(ids(&owner.relation("orders").unwrap_or_default()), vec![14]);
        assert_eq!(db.query_count(), 2);
    }

    #[test]
    fn test_null_only_primaries_query_when_null_keys_match() {
        let db = Arc::new(MemoryExecutor::new().with_table(
            "order",
            [Row::from_pairs([("id", Value::BigInt(13)), ("customer_id", Value::Null)])],
        ));
        let relation = RelationDescriptor::has_many("order", LinkSpec::single("id", "customer_id"));
        let orphan = plain(&[("id", Value::Null)]);

        loader(&db)
            .with_config(LoaderConfig::default().as_array(true).null_keys_match(true))
            .populate_relation("orders", &relation, std::slice::from_ref(&orphan))
            .unwrap();

        assert_eq!(ids(&orphan.relation("orders").unwrap_or_default()), vec![13]);
        assert_eq!(db.query_count(), 1);
    }

    #[test]
    fn test_storage_errors_propagate_unchanged() {
        let db = db();
        db.fail_with(Some("item"), QueryErrorKind::Timeout, "statement timeout");
        let relation = RelationDescriptor::has_many("item", LinkSpec::single("item_id", "id"));

        let err = loader(&db)
            .populate_relation("items", &relation, &[plain(&[("item_id", Value::BigInt(1))])])
            .unwrap_err();
        assert!(err.is_retryable());
        assert_eq!(err.to_string(), "Query error: statement timeout");
    }

    #[test]
    fn test_unregistered_target_is_a_config_error() {
        let db = db();
        let relation = RelationDescriptor::has_many("gadget", LinkSpec::single("id", "owner_id"));
        let loader = RelationLoader::new(Arc::new(Registry::new()), Arc::clone(&db) as Arc<dyn Executor>);
        db.create_table("gadget", [Row::from_pairs([("id", 5_i64), ("owner_id", 1_i64)])]);

        let err = loader
            .populate_relation("gadgets", &relation, &[plain(&[("id", Value::BigInt(1))])])
            .unwrap_err();
        assert_eq!(err.config_kind(), Some(ConfigErrorKind::UnknownModel));

        let plain_rel = relation.as_array(true);
        let primary = plain(&[("id", Value::BigInt(1))]);
        loader
            .populate_relation("gadgets", &plain_rel, std::slice::from_ref(&primary))
            .unwrap();
        assert_eq!(ids(&primary.relation("gadgets").unwrap_or_default()), vec![5]);
    }

    #[test]
    fn test_lazy_load_requires_structured_record() {
        let db = db();
        let err = loader(&db)
            .load_lazy(&plain(&[("id", Value::BigInt(1))]), "items")
            .unwrap_err();
        assert!(err.is_config_error());
    }
}
