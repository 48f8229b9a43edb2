//! relmodel - relation resolution and eager loading for record-oriented ORMs.
//!
//! relmodel resolves declared relations over batches of already-loaded
//! records:
//!
//! - To-one and to-many relations over single or composite keys
//! - Indirect relations through junction tables or other relations
//! - Inverse relations bound without extra queries
//! - Nested eager loading (`"orders.items.product"`) and lazy loading
//! - Structured records or plain keyed maps, chosen per query
//!
//! # Quick Start
//!
//! ```ignore
//! use relmodel::prelude::*;
//!
//! let registry = Registry::new()
//!     .with(ModelSchema::new("customer").with_relation(
//!         "orders",
//!         RelationDescriptor::has_many("order", LinkSpec::single("id", "customer_id"))
//!             .inverse_of("customer"),
//!     ))
//!     .with(ModelSchema::new("order").with_relation(
//!         "customer",
//!         RelationDescriptor::has_one("customer", LinkSpec::single("customer_id", "id")),
//!     ));
//!
//! let db = Arc::new(MemoryExecutor::new());
//! let loader = RelationLoader::new(Arc::new(registry), db);
//!
//! // One query for the customers, one for all of their orders.
//! let customers = find(&loader, "customer").with("orders").all()?;
//! ```

mod find;

pub use find::{Finder, find, to_json};

pub use relmodel_core::{
    ColumnInfo, Condition, ConfigError, ConfigErrorKind, Direction, Error, Executor, Field,
    FromValue, IndexBy, KeyPart, LinkPair, LinkSpec, LookupKey, ModelRecord, ModelSchema,
    OrderBy, PlainRecord, Query, QueryError, QueryErrorKind, Record, RecordRef, RecordView,
    Registry, Related, RelationDescriptor, Result, Row, TypeError, Value, Via, WeakRecordRef,
    encode, encode_value,
};
pub use relmodel_loader::{
    Bucket, Buckets, EagerLoader, IncludePath, InverseBinder, LoaderConfig, PivotMap,
    RelationLoader, build_buckets, build_pivot_map, filter_by_models, index_buckets,
};
pub use relmodel_memory::MemoryExecutor;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::{
        Condition, EagerLoader, Error, Executor, LinkSpec, LoaderConfig, MemoryExecutor,
        ModelRecord, ModelSchema, OrderBy, PlainRecord, Query, RecordRef, RecordView, Registry,
        Related, RelationDescriptor, RelationLoader, Result, Row, Value, find,
    };
    pub use std::sync::Arc;
}
