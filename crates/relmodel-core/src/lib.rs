//! Core types and traits for relmodel.
//!
//! This crate provides the foundational abstractions the relation engine
//! works with:
//!
//! - `Value` and `Row` for data read from storage
//! - `Query` and the `Executor` trait for the storage collaborator
//! - `RecordView`, `ModelRecord` and `PlainRecord` for the two record modes
//! - `RelationDescriptor` and `LinkSpec` for relation metadata
//! - `LookupKey` for matching records by attribute values
//! - `ModelSchema` and `Registry` for model kinds

pub mod connection;
pub mod error;
pub mod key;
pub mod query;
pub mod record;
pub mod relation;
pub mod row;
pub mod schema;
pub mod value;

pub use connection::Executor;
pub use error::{
    ConfigError, ConfigErrorKind, Error, QueryError, QueryErrorKind, Result, TypeError,
};
pub use key::{KeyPart, LookupKey, encode, encode_value};
pub use query::{Condition, Direction, OrderBy, Query};
pub use record::{
    Field, ModelRecord, PlainRecord, Record, RecordRef, RecordView, Related, WeakRecordRef,
};
pub use relation::{IndexBy, LinkPair, LinkSpec, RelationDescriptor, Via};
pub use row::{ColumnInfo, FromValue, Row};
pub use schema::{ModelSchema, Registry};
pub use value::Value;
