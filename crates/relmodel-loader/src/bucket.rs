//! Grouping related records by lookup key.
//!
//! Related records are fetched in one batch for every primary record, then
//! grouped here so each primary can pick its share in constant time. For
//! indirect relations a [`PivotMap`] translates the related record's key
//! into the keys of the primary records reaching it.

use crate::config::LoaderConfig;
use relmodel_core::{IndexBy, LinkSpec, LookupKey, RecordRef, Related, Value, encode, encode_value};
use std::collections::HashMap;

/// The members sharing one lookup key.
#[derive(Debug, Clone)]
pub enum Bucket {
    /// Members in query order.
    List(Vec<RecordRef>),
    /// The member kept for a to-one relation.
    Single(RecordRef),
    /// Members keyed by their index value.
    Indexed(Vec<(Value, RecordRef)>),
}

impl Bucket {
    /// The relation slot value for this bucket.
    pub fn to_related(&self) -> Related {
        match self {
            Bucket::List(records) => Related::Many(records.clone()),
            Bucket::Single(record) => Related::One(record.clone()),
            Bucket::Indexed(entries) => Related::Indexed(entries.clone()),
        }
    }

    pub fn records(&self) -> Vec<RecordRef> {
        match self {
            Bucket::List(records) => records.clone(),
            Bucket::Single(record) => vec![record.clone()],
            Bucket::Indexed(entries) => entries.iter().map(|(_, r)| r.clone()).collect(),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Bucket::List(records) => records.len(),
            Bucket::Single(_) => 1,
            Bucket::Indexed(entries) => entries.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Buckets of one resolution, keyed by primary-side lookup key.
pub type Buckets = HashMap<LookupKey, Bucket>;

/// Insert under `index`, replacing an earlier member with an equal index.
pub(crate) fn insert_indexed(entries: &mut Vec<(Value, RecordRef)>, index: Value, record: RecordRef) {
    let part = encode_value(&index);
    match entries.iter_mut().find(|(k, _)| encode_value(k) == part) {
        Some(slot) => slot.1 = record,
        None => entries.push((index, record)),
    }
}

/// Maps dependent-side keys to the primary-side keys reaching them.
///
/// Each set of primary keys keeps first-seen order and holds no duplicates.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PivotMap {
    map: HashMap<LookupKey, Vec<LookupKey>>,
}

impl PivotMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `dependent` is reachable from `primary`.
    pub fn insert(&mut self, dependent: LookupKey, primary: LookupKey) {
        let primaries = self.map.entry(dependent).or_default();
        if !primaries.contains(&primary) {
            primaries.push(primary);
        }
    }

    /// Primary-side keys reaching `dependent`.
    pub fn get(&self, dependent: &LookupKey) -> &[LookupKey] {
        self.map.get(dependent).map_or(&[], Vec::as_slice)
    }

    /// Chain this map with the map of the step below it.
    ///
    /// Every intermediate key this map points at is replaced by the keys
    /// `inner` maps it to; the result takes the union over all of them.
    #[must_use]
    pub fn compose(&self, inner: &PivotMap) -> PivotMap {
        let mut result = PivotMap::new();
        for (dependent, intermediates) in &self.map {
            for intermediate in intermediates {
                for primary in inner.get(intermediate) {
                    result.insert(dependent.clone(), primary.clone());
                }
            }
        }
        result
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

/// Build the pivot map of an indirect relation from its via records.
///
/// Each via record is keyed by `link`'s local attributes (what the related
/// records are matched on) and by `via_link`'s foreign attributes (what the
/// primary records are matched on).
pub fn build_pivot_map(
    via_models: &[RecordRef],
    link: &LinkSpec,
    via_link: &LinkSpec,
    config: &LoaderConfig,
) -> PivotMap {
    let dependent_attrs = link.local_attributes();
    let primary_attrs = via_link.foreign_attributes();

    let mut map = PivotMap::new();
    for model in via_models {
        let (dependent, primary) = {
            let record = model.borrow();
            (
                encode(&*record, &dependent_attrs),
                encode(&*record, &primary_attrs),
            )
        };
        if !config.null_keys_match && !(dependent.is_matchable() && primary.is_matchable()) {
            continue;
        }
        map.insert(dependent, primary);
    }
    tracing::trace!(entries = map.len(), "Built pivot map");
    map
}

/// Group `models` by the foreign attributes of `link`.
///
/// With a pivot map, each member is filed under every primary key the map
/// gives for its own key, and members the map does not know are dropped.
/// With `collapse_to_single`, each bucket keeps only its first member.
pub fn build_buckets(
    models: &[RecordRef],
    link: &LinkSpec,
    pivot: Option<&PivotMap>,
    collapse_to_single: bool,
    config: &LoaderConfig,
) -> Buckets {
    let attrs = link.foreign_attributes();
    let mut lists: HashMap<LookupKey, Vec<RecordRef>> = HashMap::new();

    for model in models {
        let key = encode(&*model.borrow(), &attrs);
        if !config.null_keys_match && !key.is_matchable() {
            continue;
        }
        match pivot {
            Some(map) => {
                for primary in map.get(&key) {
                    lists.entry(primary.clone()).or_default().push(model.clone());
                }
            }
            None => lists.entry(key).or_default().push(model.clone()),
        }
    }

    lists
        .into_iter()
        .map(|(key, mut members)| {
            if !collapse_to_single {
                return (key, Bucket::List(members));
            }
            if members.len() > 1 && config.warn_on_to_one_overflow {
                tracing::warn!(
                    key = %key,
                    matched = members.len(),
                    "To-one relation matched several records, keeping the first"
                );
            }
            let first = members.swap_remove(0);
            (key, Bucket::Single(first))
        })
        .collect()
}

/// Re-key every bucket's members by `index_by`.
///
/// A repeated index value replaces the earlier member in place.
pub fn index_buckets(buckets: Buckets, index_by: &IndexBy) -> Buckets {
    buckets
        .into_iter()
        .map(|(key, bucket)| {
            let mut entries = Vec::with_capacity(bucket.len());
            for record in bucket.records() {
                let index = index_by.index_of(&*record.borrow());
                insert_indexed(&mut entries, index, record);
            }
            (key, Bucket::Indexed(entries))
        })
        .collect()
}
