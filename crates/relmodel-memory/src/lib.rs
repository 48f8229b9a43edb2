//! In-memory storage driver for relmodel.
//!
//! `MemoryExecutor` holds named tables of [`Row`]s and answers [`Query`]s
//! by filtering, ordering and limiting them. Every query that reaches the
//! executor is recorded, so callers can assert how many storage round trips
//! a resolution took.
//!
//! # Example
//!
//! ```ignore
//! let db = MemoryExecutor::new()
//!     .with_table("customer", [Row::from_pairs([("id", 1_i64)])])
//!     .with_table("order", [Row::from_pairs([("id", 10_i64), ("customer_id", 1_i64)])]);
//!
//! let rows = Query::new("order")
//!     .and_where(Condition::eq("customer_id", 1_i64))
//!     .all(&db)?;
//! assert_eq!(db.query_count(), 1);
//! ```

mod eval;

use relmodel_core::error::{QueryError, QueryErrorKind};
use relmodel_core::{Error, Executor, Query, Result, Row, Value};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError, RwLock};

#[derive(Debug, Clone)]
struct Failure {
    table: Option<String>,
    kind: QueryErrorKind,
    message: String,
}

/// An [`Executor`] backed by in-memory tables.
#[derive(Debug, Default)]
pub struct MemoryExecutor {
    tables: RwLock<HashMap<String, Vec<Row>>>,
    log: Mutex<Vec<Query>>,
    failure: Mutex<Option<Failure>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl MemoryExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style table creation. Replaces an existing table.
    #[must_use]
    pub fn with_table(self, table: impl Into<String>, rows: impl IntoIterator<Item = Row>) -> Self {
        self.create_table(table, rows);
        self
    }

    /// Create (or replace) a table.
    pub fn create_table(&self, table: impl Into<String>, rows: impl IntoIterator<Item = Row>) {
        let mut tables = self.tables.write().unwrap_or_else(PoisonError::into_inner);
        tables.insert(table.into(), rows.into_iter().collect());
    }

    /// Append a row, creating the table if needed.
    pub fn insert(&self, table: &str, row: Row) {
        let mut tables = self.tables.write().unwrap_or_else(PoisonError::into_inner);
        tables.entry(table.to_string()).or_default().push(row);
    }

    /// Create a table from a JSON array of flat objects.
    ///
    /// Integers become `BigInt`, other numbers `Double`, arrays `Array`,
    /// nested objects are kept as `Json`.
    pub fn load_json(&self, table: &str, json: &serde_json::Value) -> Result<usize> {
        let serde_json::Value::Array(items) = json else {
            return Err(Error::Custom(format!(
                "table \"{table}\" fixture must be a JSON array"
            )));
        };
        let mut rows = Vec::with_capacity(items.len());
        for item in items {
            let serde_json::Value::Object(map) = item else {
                return Err(Error::Custom(format!(
                    "table \"{table}\" fixture rows must be JSON objects"
                )));
            };
            rows.push(Row::from_pairs(
                map.iter().map(|(k, v)| (k.clone(), json_to_value(v))),
            ));
        }
        let count = rows.len();
        self.create_table(table, rows);
        tracing::debug!(table = table, rows = count, "Loaded fixture table");
        Ok(count)
    }

    /// Make subsequent queries fail with `kind`.
    ///
    /// With `table` set, only queries reading that table fail.
    pub fn fail_with(&self, table: Option<&str>, kind: QueryErrorKind, message: impl Into<String>) {
        *lock(&self.failure) = Some(Failure {
            table: table.map(str::to_string),
            kind,
            message: message.into(),
        });
    }

    /// Stop injecting failures.
    pub fn clear_failure(&self) {
        *lock(&self.failure) = None;
    }

    /// Number of queries that reached this executor.
    pub fn query_count(&self) -> usize {
        lock(&self.log).len()
    }

    /// Number of queries that read `table`.
    pub fn query_count_for(&self, table: &str) -> usize {
        lock(&self.log)
            .iter()
            .filter(|q| q.from_table() == table)
            .count()
    }

    /// Every query received so far, in arrival order.
    pub fn queries(&self) -> Vec<Query> {
        lock(&self.log).clone()
    }

    /// Clear the query log.
    pub fn reset(&self) {
        lock(&self.log).clear();
    }

    fn injected_failure(&self, table: &str) -> Option<Error> {
        let failure = lock(&self.failure);
        let failure = failure.as_ref()?;
        if failure.table.as_deref().is_some_and(|t| t != table) {
            return None;
        }
        Some(Error::Query(QueryError::new(
            failure.kind,
            failure.message.clone(),
        )))
    }
}

fn json_to_value(json: &serde_json::Value) -> Value {
    use serde_json::Value as Json;

    match json {
        Json::Null => Value::Null,
        Json::Bool(b) => Value::Bool(*b),
        Json::Number(n) => n
            .as_i64()
            .map(Value::BigInt)
            .or_else(|| n.as_f64().map(Value::Double))
            .unwrap_or(Value::Null),
        Json::String(s) => Value::Text(s.clone()),
        Json::Array(items) => Value::Array(items.iter().map(json_to_value).collect()),
        Json::Object(_) => Value::Json(json.clone()),
    }
}

impl Executor for MemoryExecutor {
    #[tracing::instrument(level = "trace", skip(self, query), fields(table = %query.from_table()))]
    fn fetch_all(&self, query: &Query) -> Result<Vec<Row>> {
        lock(&self.log).push(query.clone());

        if let Some(err) = self.injected_failure(query.from_table()) {
            tracing::debug!(error = %err, "Injected storage failure");
            return Err(err);
        }
        if query.is_emulated() {
            return Ok(Vec::new());
        }

        let tables = self.tables.read().unwrap_or_else(PoisonError::into_inner);
        let Some(table) = tables.get(query.from_table()) else {
            return Err(Error::Query(QueryError::new(
                QueryErrorKind::NotFound,
                format!("no such table: {}", query.from_table()),
            )));
        };

        let mut rows: Vec<Row> = table
            .iter()
            .filter(|row| eval::eval_all(row, query.conditions()))
            .cloned()
            .collect();
        eval::sort_rows(&mut rows, query.ordering());
        if let Some(limit) = query.limit_value() {
            rows.truncate(limit);
        }

        tracing::trace!(rows = rows.len(), "Query answered");
        Ok(rows)
    }
}
