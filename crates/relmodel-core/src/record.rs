//! Records and relation slots.
//!
//! The engine works over two record representations:
//!
//! - [`ModelRecord`]: a structured record bound to a [`ModelSchema`], with
//!   relation slots kept apart from attributes and tracked as populated.
//! - [`PlainRecord`]: an ordered keyed map (the "raw row" mode), where a
//!   relation value is stored under its name next to the attributes.
//!
//! Both implement [`RecordView`]; the engine only ever goes through that
//! trait. Records are shared through [`RecordRef`] handles so one related
//! record can be attached to several primaries.

use crate::connection::Executor;
use crate::error::Result;
use crate::relation::RelationDescriptor;
use crate::row::{FromValue, Row, convert_named};
use crate::schema::ModelSchema;
use crate::value::Value;
use std::cell::{Ref, RefCell, RefMut};
use std::fmt;
use std::rc::{Rc, Weak};
use std::sync::Arc;

/// Relations nested deeper than this are rendered as `null` by `to_json`.
const MAX_JSON_DEPTH: usize = 16;

/// Uniform access to a record, whatever its representation.
pub trait RecordView {
    /// Read an attribute. Relation slots are not attributes.
    fn attribute(&self, name: &str) -> Option<&Value>;

    /// Write an attribute.
    fn set_attribute(&mut self, name: &str, value: Value);

    /// Read a populated relation slot.
    fn relation(&self, name: &str) -> Option<&Related>;

    /// Attach a relation value.
    fn populate_relation(&mut self, name: &str, value: Related);

    /// `true` for structured records.
    fn is_structured(&self) -> bool;

    /// The schema of a structured record.
    fn schema(&self) -> Option<&Arc<ModelSchema>> {
        None
    }

    /// Whether the relation was populated (eagerly or lazily) already.
    fn is_relation_populated(&self, name: &str) -> bool {
        self.relation(name).is_some()
    }
}

/// Value stored in a relation slot.
#[derive(Clone, Default)]
pub enum Related {
    /// To-one relation with no match.
    #[default]
    Null,
    /// To-one relation.
    One(RecordRef),
    /// To-many relation in query order.
    Many(Vec<RecordRef>),
    /// To-many relation keyed by an index value.
    Indexed(Vec<(Value, RecordRef)>),
    /// To-one back reference to the primary record that owns this one.
    Parent(WeakRecordRef),
    /// To-many back reference to the primary records that own this one.
    Parents(Vec<WeakRecordRef>),
}

impl Related {
    /// Is this the empty to-one value?
    pub fn is_null(&self) -> bool {
        matches!(self, Related::Null)
    }

    /// Is this a to-many value?
    pub fn is_many(&self) -> bool {
        matches!(self, Related::Many(_) | Related::Indexed(_) | Related::Parents(_))
    }

    /// The single record of a to-one value.
    ///
    /// Back references are upgraded; a dropped owner yields `None`.
    pub fn one(&self) -> Option<RecordRef> {
        match self {
            Related::One(record) => Some(record.clone()),
            Related::Parent(weak) => weak.upgrade(),
            _ => None,
        }
    }

    /// Every record reachable from this value, in slot order.
    pub fn records(&self) -> Vec<RecordRef> {
        match self {
            Related::Null => Vec::new(),
            Related::One(record) => vec![record.clone()],
            Related::Many(records) => records.clone(),
            Related::Indexed(entries) => entries.iter().map(|(_, r)| r.clone()).collect(),
            Related::Parent(weak) => weak.upgrade().into_iter().collect(),
            Related::Parents(weak) => weak.iter().filter_map(WeakRecordRef::upgrade).collect(),
        }
    }

    /// Look up a member of an indexed to-many value.
    pub fn get_indexed(&self, index: &Value) -> Option<&RecordRef> {
        match self {
            Related::Indexed(entries) => entries.iter().find(|(k, _)| k == index).map(|(_, r)| r),
            _ => None,
        }
    }

    /// Number of records held.
    pub fn len(&self) -> usize {
        match self {
            Related::Null => 0,
            Related::One(_) | Related::Parent(_) => 1,
            Related::Many(records) => records.len(),
            Related::Indexed(entries) => entries.len(),
            Related::Parents(weak) => weak.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn to_json(&self, depth: usize) -> serde_json::Value {
        use serde_json::Value as Json;

        match self {
            Related::Null | Related::Parent(_) | Related::Parents(_) => Json::Null,
            Related::One(record) => record.to_json_at(depth),
            Related::Many(records) => {
                Json::Array(records.iter().map(|r| r.to_json_at(depth)).collect())
            }
            Related::Indexed(entries) => Json::Object(
                entries
                    .iter()
                    .map(|(k, r)| (index_label(k), r.to_json_at(depth)))
                    .collect(),
            ),
        }
    }
}

fn index_label(value: &Value) -> String {
    match value {
        Value::Text(s) | Value::Decimal(s) => s.clone(),
        other => other.to_json().to_string(),
    }
}

impl fmt::Debug for Related {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Related::Null => f.write_str("Null"),
            Related::One(record) => f.debug_tuple("One").field(record).finish(),
            Related::Many(records) => f.debug_tuple("Many").field(records).finish(),
            Related::Indexed(entries) => f.debug_tuple("Indexed").field(entries).finish(),
            Related::Parent(_) => f.write_str("Parent(..)"),
            Related::Parents(weak) => write!(f, "Parents({} back references)", weak.len()),
        }
    }
}

/// A structured record bound to a model schema.
#[derive(Clone)]
pub struct ModelRecord {
    schema: Arc<ModelSchema>,
    attributes: Vec<(String, Value)>,
    related: Vec<(String, Related)>,
}

impl ModelRecord {
    /// An empty record of the schema's kind.
    pub fn new(schema: Arc<ModelSchema>) -> Self {
        Self {
            schema,
            attributes: Vec::new(),
            related: Vec::new(),
        }
    }

    /// Hydrate a record from a storage row.
    pub fn from_row(schema: Arc<ModelSchema>, row: Row) -> Self {
        Self {
            schema,
            attributes: row.into_pairs(),
            related: Vec::new(),
        }
    }

    /// Builder-style attribute assignment.
    #[must_use]
    pub fn with(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.set_attribute(name, value.into());
        self
    }

    /// The model kind.
    pub fn kind(&self) -> &str {
        self.schema.kind()
    }

    /// Look up a relation declared on this record's model.
    pub fn get_relation(&self, name: &str) -> Result<&RelationDescriptor> {
        self.schema.relation(name)
    }

    /// The executor configured for this record's model, if any.
    pub fn executor(&self) -> Option<Arc<dyn Executor>> {
        self.schema.executor()
    }

    /// Primary key values in key-column order.
    pub fn primary_key(&self) -> Vec<Value> {
        self.schema
            .primary_key_columns()
            .iter()
            .map(|c| self.attribute(c).cloned().unwrap_or(Value::Null))
            .collect()
    }

    /// Names of the relations populated so far.
    pub fn populated_relations(&self) -> impl Iterator<Item = &str> {
        self.related.iter().map(|(name, _)| name.as_str())
    }

    /// Forget a populated relation so the next access loads it again.
    pub fn unset_relation(&mut self, name: &str) -> Option<Related> {
        let pos = self.related.iter().position(|(n, _)| n == name)?;
        Some(self.related.remove(pos).1)
    }

    pub fn attributes(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.attributes.iter().map(|(k, v)| (k.as_str(), v))
    }
}

impl RecordView for ModelRecord {
    fn attribute(&self, name: &str) -> Option<&Value> {
        self.attributes.iter().find(|(k, _)| k == name).map(|(_, v)| v)
    }

    fn set_attribute(&mut self, name: &str, value: Value) {
        match self.attributes.iter_mut().find(|(k, _)| k == name) {
            Some(slot) => slot.1 = value,
            None => self.attributes.push((name.to_string(), value)),
        }
    }

    fn relation(&self, name: &str) -> Option<&Related> {
        self.related.iter().find(|(k, _)| k == name).map(|(_, v)| v)
    }

    fn populate_relation(&mut self, name: &str, value: Related) {
        match self.related.iter_mut().find(|(k, _)| k == name) {
            Some(slot) => slot.1 = value,
            None => self.related.push((name.to_string(), value)),
        }
    }

    fn is_structured(&self) -> bool {
        true
    }

    fn schema(&self) -> Option<&Arc<ModelSchema>> {
        Some(&self.schema)
    }
}

impl fmt::Debug for ModelRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelRecord")
            .field("kind", &self.kind())
            .field("attributes", &self.attributes)
            .field(
                "populated",
                &self.populated_relations().collect::<Vec<_>>(),
            )
            .finish()
    }
}

/// A field of a plain-map record.
#[derive(Debug, Clone)]
pub enum Field {
    Value(Value),
    Related(Related),
}

/// A plain keyed map record (raw-row mode).
#[derive(Debug, Clone, Default)]
pub struct PlainRecord {
    fields: Vec<(String, Field)>,
}

impl PlainRecord {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hydrate a plain record from a storage row.
    pub fn from_row(row: Row) -> Self {
        Self {
            fields: row
                .into_pairs()
                .into_iter()
                .map(|(k, v)| (k, Field::Value(v)))
                .collect(),
        }
    }

    /// Builder-style attribute assignment.
    #[must_use]
    pub fn with(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.set_attribute(name, value.into());
        self
    }

    /// Raw access to a field, attribute or relation.
    pub fn get(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|(k, _)| k == name).map(|(_, f)| f)
    }

    pub fn fields(&self) -> impl Iterator<Item = (&str, &Field)> {
        self.fields.iter().map(|(k, f)| (k.as_str(), f))
    }

    fn put(&mut self, name: &str, field: Field) {
        match self.fields.iter_mut().find(|(k, _)| k == name) {
            Some(slot) => slot.1 = field,
            None => self.fields.push((name.to_string(), field)),
        }
    }
}

impl RecordView for PlainRecord {
    fn attribute(&self, name: &str) -> Option<&Value> {
        match self.get(name) {
            Some(Field::Value(v)) => Some(v),
            _ => None,
        }
    }

    fn set_attribute(&mut self, name: &str, value: Value) {
        self.put(name, Field::Value(value));
    }

    fn relation(&self, name: &str) -> Option<&Related> {
        match self.get(name) {
            Some(Field::Related(r)) => Some(r),
            _ => None,
        }
    }

    fn populate_relation(&mut self, name: &str, value: Related) {
        self.put(name, Field::Related(value));
    }

    fn is_structured(&self) -> bool {
        false
    }
}

/// Either record representation.
#[derive(Debug, Clone)]
pub enum Record {
    Model(ModelRecord),
    Plain(PlainRecord),
}

impl Record {
    pub fn as_model(&self) -> Option<&ModelRecord> {
        match self {
            Record::Model(m) => Some(m),
            Record::Plain(_) => None,
        }
    }

    pub fn as_plain(&self) -> Option<&PlainRecord> {
        match self {
            Record::Plain(p) => Some(p),
            Record::Model(_) => None,
        }
    }

    /// Render attributes and forward relations as JSON.
    ///
    /// Back references are rendered as `null`.
    pub fn to_json(&self) -> serde_json::Value {
        self.to_json_at(0)
    }

    fn to_json_at(&self, depth: usize) -> serde_json::Value {
        let mut map = serde_json::Map::new();
        match self {
            Record::Model(m) => {
                for (k, v) in &m.attributes {
                    map.insert(k.clone(), v.to_json());
                }
                for (k, r) in &m.related {
                    map.insert(k.clone(), nested_json(r, depth));
                }
            }
            Record::Plain(p) => {
                for (k, field) in &p.fields {
                    let json = match field {
                        Field::Value(v) => v.to_json(),
                        Field::Related(r) => nested_json(r, depth),
                    };
                    map.insert(k.clone(), json);
                }
            }
        }
        serde_json::Value::Object(map)
    }
}

fn nested_json(related: &Related, depth: usize) -> serde_json::Value {
    if depth >= MAX_JSON_DEPTH {
        serde_json::Value::Null
    } else {
        related.to_json(depth + 1)
    }
}

impl RecordView for Record {
    fn attribute(&self, name: &str) -> Option<&Value> {
        match self {
            Record::Model(m) => m.attribute(name),
            Record::Plain(p) => p.attribute(name),
        }
    }

    fn set_attribute(&mut self, name: &str, value: Value) {
        match self {
            Record::Model(m) => m.set_attribute(name, value),
            Record::Plain(p) => p.set_attribute(name, value),
        }
    }

    fn relation(&self, name: &str) -> Option<&Related> {
        match self {
            Record::Model(m) => m.relation(name),
            Record::Plain(p) => p.relation(name),
        }
    }

    fn populate_relation(&mut self, name: &str, value: Related) {
        match self {
            Record::Model(m) => m.populate_relation(name, value),
            Record::Plain(p) => p.populate_relation(name, value),
        }
    }

    fn is_structured(&self) -> bool {
        matches!(self, Record::Model(_))
    }

    fn schema(&self) -> Option<&Arc<ModelSchema>> {
        match self {
            Record::Model(m) => m.schema(),
            Record::Plain(_) => None,
        }
    }
}

impl From<ModelRecord> for Record {
    fn from(record: ModelRecord) -> Self {
        Record::Model(record)
    }
}

impl From<PlainRecord> for Record {
    fn from(record: PlainRecord) -> Self {
        Record::Plain(record)
    }
}

/// Shared handle to a record.
///
/// Forward relation slots own their related records through `RecordRef`s;
/// back references use [`WeakRecordRef`] so record graphs never own
/// themselves.
#[derive(Clone)]
pub struct RecordRef(Rc<RefCell<Record>>);

impl RecordRef {
    pub fn new(record: impl Into<Record>) -> Self {
        Self(Rc::new(RefCell::new(record.into())))
    }

    pub fn borrow(&self) -> Ref<'_, Record> {
        self.0.borrow()
    }

    pub fn borrow_mut(&self) -> RefMut<'_, Record> {
        self.0.borrow_mut()
    }

    /// Do both handles point at the same record?
    pub fn ptr_eq(&self, other: &RecordRef) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    pub fn downgrade(&self) -> WeakRecordRef {
        WeakRecordRef(Rc::downgrade(&self.0))
    }

    /// Clone of an attribute value.
    pub fn attribute(&self, name: &str) -> Option<Value> {
        self.0.borrow().attribute(name).cloned()
    }

    /// Typed attribute value.
    ///
    /// A missing attribute or a value of the wrong type is a
    /// [`TypeError`](crate::error::TypeError).
    pub fn get<T: FromValue>(&self, name: &str) -> Result<T> {
        convert_named(self.0.borrow().attribute(name), name)
    }

    /// Clone of a relation slot.
    pub fn relation(&self, name: &str) -> Option<Related> {
        self.0.borrow().relation(name).cloned()
    }

    pub fn is_structured(&self) -> bool {
        self.0.borrow().is_structured()
    }

    pub fn to_json(&self) -> serde_json::Value {
        self.to_json_at(0)
    }

    fn to_json_at(&self, depth: usize) -> serde_json::Value {
        match self.0.try_borrow() {
            Ok(record) => record.to_json_at(depth),
            Err(_) => serde_json::Value::Null,
        }
    }
}

impl fmt::Debug for RecordRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0.try_borrow() {
            Ok(record) => record.fmt(f),
            Err(_) => f.write_str("RecordRef(<borrowed>)"),
        }
    }
}

impl From<ModelRecord> for RecordRef {
    fn from(record: ModelRecord) -> Self {
        RecordRef::new(record)
    }
}

impl From<PlainRecord> for RecordRef {
    fn from(record: PlainRecord) -> Self {
        RecordRef::new(record)
    }
}

/// Non-owning handle to a record.
#[derive(Clone, Default)]
pub struct WeakRecordRef(Weak<RefCell<Record>>);

impl WeakRecordRef {
    pub fn upgrade(&self) -> Option<RecordRef> {
        self.0.upgrade().map(RecordRef)
    }
}

impl fmt::Debug for WeakRecordRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("WeakRecordRef(..)")
    }
}
