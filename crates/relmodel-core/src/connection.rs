//! The storage collaborator contract.
//!
//! The relation engine never talks to a database directly. It hands
//! [`Query`] values to an [`Executor`] and hydrates records from the
//! returned [`Row`]s. Executors are synchronous: the engine blocks until a
//! call returns, and timeouts or retries are the executor's concern.

use crate::error::Result;
use crate::query::Query;
use crate::row::Row;

/// Executes read queries for the relation engine.
pub trait Executor: Send + Sync {
    /// Fetch every row matching `query`, in the query's order.
    fn fetch_all(&self, query: &Query) -> Result<Vec<Row>>;

    /// Fetch the first row matching `query`.
    ///
    /// The default implementation limits the query to one row and delegates
    /// to [`fetch_all`](Executor::fetch_all).
    fn fetch_one(&self, query: &Query) -> Result<Option<Row>> {
        let limited = query.clone().limit(1);
        Ok(self.fetch_all(&limited)?.into_iter().next())
    }
}
