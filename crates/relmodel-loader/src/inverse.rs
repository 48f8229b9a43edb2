//! Back-reference binding.
//!
//! After a relation is attached, the related records can point back at
//! their primaries without another query: the data is already in memory.
//! Back references are non-owning ([`Related::Parent`] and
//! [`Related::Parents`]), so a primary and its related records never keep
//! each other alive.

use crate::bucket::build_buckets;
use crate::config::LoaderConfig;
use relmodel_core::{
    ModelSchema, RecordRef, RecordView, Registry, Related, RelationDescriptor, Result, encode,
};
use std::sync::Arc;

/// Writes inverse relation slots onto freshly attached related records.
pub struct InverseBinder<'a> {
    registry: &'a Registry,
    config: &'a LoaderConfig,
}

impl<'a> InverseBinder<'a> {
    pub fn new(registry: &'a Registry, config: &'a LoaderConfig) -> Self {
        Self { registry, config }
    }

    /// Schema declaring the inverse relation.
    ///
    /// Structured related records carry it; for plain records a default
    /// instance of the target kind is consulted.
    fn inverse_schema(
        &self,
        forward: &RelationDescriptor,
        sample: &RecordRef,
    ) -> Result<Arc<ModelSchema>> {
        if let Some(schema) = sample.borrow().schema() {
            return Ok(Arc::clone(schema));
        }
        self.registry.schema(&forward.target)
    }

    /// Bind `inverse_name` on every related record.
    ///
    /// `primary_relation` is the forward slot on the primaries that was just
    /// populated with `related`.
    #[tracing::instrument(level = "debug", skip(self, forward, primaries, related))]
    pub fn bind(
        &self,
        forward: &RelationDescriptor,
        primaries: &[RecordRef],
        related: &[RecordRef],
        primary_relation: &str,
        inverse_name: &str,
    ) -> Result<()> {
        let Some(sample) = related.first() else {
            return Ok(());
        };
        if primaries.is_empty() || inverse_name.is_empty() {
            return Ok(());
        }

        let schema = self.inverse_schema(forward, sample)?;
        let inverse = schema.relation(inverse_name)?;

        if inverse.multiple {
            let buckets = build_buckets(primaries, &inverse.link, None, false, self.config);
            let local = inverse.link.local_attributes();
            for record in related {
                let key = encode(&*record.borrow(), &local);
                let parents = buckets
                    .get(&key)
                    .map(|bucket| bucket.records().iter().map(RecordRef::downgrade).collect())
                    .unwrap_or_default();
                record
                    .borrow_mut()
                    .populate_relation(inverse_name, Related::Parents(parents));
            }
        } else {
            for primary in primaries {
                let Some(forward_value) = primary.relation(primary_relation) else {
                    continue;
                };
                for record in forward_value.records() {
                    record
                        .borrow_mut()
                        .populate_relation(inverse_name, Related::Parent(primary.downgrade()));
                }
            }
        }

        tracing::debug!(
            related = related.len(),
            multiple = inverse.multiple,
            "Bound inverse relation"
        );
        Ok(())
    }
}
