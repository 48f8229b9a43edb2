//! Dependent queries handed to the storage collaborator.
//!
//! A [`Query`] names the table (or model kind) to read, a conjunction of
//! [`Condition`]s, an ordering and a result mode. SQL generation is the
//! driver's business; this module only describes *what* to fetch.

use crate::connection::Executor;
use crate::error::Result;
use crate::row::Row;
use crate::value::Value;

/// A filter predicate over attribute values.
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    /// `column = value`
    Eq(String, Value),
    /// `(columns) IN (tuples)`; single-column lists use one-element tuples.
    In {
        columns: Vec<String>,
        values: Vec<Vec<Value>>,
    },
    /// `column IS NULL`
    IsNull(String),
    /// `column IS NOT NULL`
    NotNull(String),
    /// Every nested condition holds.
    And(Vec<Condition>),
    /// At least one nested condition holds.
    Or(Vec<Condition>),
    /// The nested condition does not hold.
    Not(Box<Condition>),
}

impl Condition {
    /// `column = value`
    pub fn eq(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Condition::Eq(column.into(), value.into())
    }

    /// `column IN (values)`
    pub fn in_list<V: Into<Value>>(
        column: impl Into<String>,
        values: impl IntoIterator<Item = V>,
    ) -> Self {
        Condition::In {
            columns: vec![column.into()],
            values: values.into_iter().map(|v| vec![v.into()]).collect(),
        }
    }

    /// `(columns) IN (tuples)`
    pub fn in_tuples(columns: Vec<String>, tuples: Vec<Vec<Value>>) -> Self {
        Condition::In {
            columns,
            values: tuples,
        }
    }

    /// `column IS NULL`
    pub fn is_null(column: impl Into<String>) -> Self {
        Condition::IsNull(column.into())
    }

    /// `column IS NOT NULL`
    pub fn not_null(column: impl Into<String>) -> Self {
        Condition::NotNull(column.into())
    }

    /// Negate this condition.
    #[allow(clippy::should_implement_trait)]
    pub fn not(self) -> Self {
        Condition::Not(Box::new(self))
    }
}

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Direction {
    #[default]
    Asc,
    Desc,
}

/// One ORDER BY term.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderBy {
    pub column: String,
    pub direction: Direction,
}

impl OrderBy {
    pub fn asc(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            direction: Direction::Asc,
        }
    }

    pub fn desc(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            direction: Direction::Desc,
        }
    }
}

/// A read query against one table.
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    from: String,
    conditions: Vec<Condition>,
    order_by: Vec<OrderBy>,
    limit: Option<usize>,
    as_array: bool,
    emulate_execution: bool,
}

impl Query {
    /// Create a query reading from `from`.
    pub fn new(from: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            conditions: Vec::new(),
            order_by: Vec::new(),
            limit: None,
            as_array: false,
            emulate_execution: false,
        }
    }

    /// Add a condition; all conditions are combined with AND.
    #[must_use]
    pub fn and_where(mut self, condition: Condition) -> Self {
        self.conditions.push(condition);
        self
    }

    /// Append ORDER BY terms.
    #[must_use]
    pub fn order_by(mut self, terms: impl IntoIterator<Item = OrderBy>) -> Self {
        self.order_by.extend(terms);
        self
    }

    /// Limit the number of rows returned.
    #[must_use]
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Request raw rows (`true`) or structured records (`false`).
    #[must_use]
    pub fn as_array(mut self, value: bool) -> Self {
        self.as_array = value;
        self
    }

    /// Mark the query as one that can match nothing.
    ///
    /// `all`/`one` then return empty results without reaching storage.
    #[must_use]
    pub fn emulate_execution(mut self) -> Self {
        self.emulate_execution = true;
        self
    }

    pub fn from_table(&self) -> &str {
        &self.from
    }

    pub fn conditions(&self) -> &[Condition] {
        &self.conditions
    }

    pub fn ordering(&self) -> &[OrderBy] {
        &self.order_by
    }

    pub fn limit_value(&self) -> Option<usize> {
        self.limit
    }

    pub fn is_as_array(&self) -> bool {
        self.as_array
    }

    pub fn is_emulated(&self) -> bool {
        self.emulate_execution
    }

    /// Fetch every matching row.
    pub fn all(&self, db: &dyn Executor) -> Result<Vec<Row>> {
        if self.emulate_execution {
            tracing::trace!(table = %self.from, "Emulated query, skipping storage");
            return Ok(Vec::new());
        }
        db.fetch_all(self)
    }

    /// Fetch the first matching row.
    pub fn one(&self, db: &dyn Executor) -> Result<Option<Row>> {
        if self.emulate_execution {
            tracing::trace!(table = %self.from, "Emulated query, skipping storage");
            return Ok(None);
        }
        db.fetch_one(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct CountingExecutor {
        calls: AtomicUsize,
    }

    impl Executor for CountingExecutor {
        fn fetch_all(&self, _query: &Query) -> Result<Vec<Row>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(vec![Row::from_pairs([("id", 1_i64)])])
        }
    }

    #[test]
    fn test_builder_chain() {
        let query = Query::new("orders")
            .and_where(Condition::eq("status", "paid"))
            .and_where(Condition::in_list("customer_id", [1_i64, 2]))
            .order_by([OrderBy::desc("id")])
            .limit(10)
            .as_array(true);

        assert_eq!(query.from_table(), "orders");
        assert_eq!(query.conditions().len(), 2);
        assert_eq!(query.ordering(), &[OrderBy::desc("id")]);
        assert_eq!(query.limit_value(), Some(10));
        assert!(query.is_as_array());
        assert!(!query.is_emulated());
    }

    #[test]
    fn test_in_list_builds_single_column_tuples() {
        let cond = Condition::in_list("id", [1_i64, 2]);
        assert_eq!(
            cond,
            Condition::In {
                columns: vec!["id".to_string()],
                values: vec![vec![Value::BigInt(1)], vec![Value::BigInt(2)]],
            }
        );
    }

    #[test]
    fn test_emulated_query_never_reaches_storage() {
        let db = CountingExecutor::default();
        let query = Query::new("orders").emulate_execution();

        assert!(query.all(&db).unwrap().is_empty());
        assert!(query.one(&db).unwrap().is_none());
        assert_eq!(db.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_default_fetch_one_takes_first_row() {
        let db = CountingExecutor::default();
        let row = Query::new("orders").one(&db).unwrap();
        assert_eq!(row.and_then(|r| r.get_by_name("id").cloned()), Some(Value::BigInt(1)));
        assert_eq!(db.calls.load(Ordering::SeqCst), 1);
    }
}
