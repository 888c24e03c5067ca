//! Database connection contract.
//!
//! The engine never implements a wire protocol; it consumes this trait.
//! A single handle is shared by every builder clone executed against it,
//! and statements run one at a time per handle. Cancellation and timeouts
//! come from the asupersync `Cx`, not from the builder.

use crate::error::Error;
use crate::row::Row;
use crate::value::Value;
use asupersync::{Cx, Outcome};
use std::future::Future;

/// A forward-only cursor over an open result set.
///
/// Rows are pulled one at a time without materializing the full set.
/// Drivers that cannot stream may buffer internally.
pub trait RowCursor: Send {
    /// Fetch the next row, or `None` when the result set is exhausted.
    fn next_row(&mut self, cx: &Cx) -> impl Future<Output = Outcome<Option<Row>, Error>> + Send;
}

/// A database connection capable of executing statements.
///
/// All operations are async and take a `Cx` context for cancellation and
/// timeout support. Implementations must be `Send + Sync`.
///
/// # Transactions
///
/// Callers demarcate transactions explicitly around multi-statement
/// sequences with [`begin_transaction`](Connection::begin_transaction),
/// [`commit`](Connection::commit) and [`roll_back`](Connection::roll_back).
pub trait Connection: Send + Sync {
    /// The cursor type returned by [`fetch`](Connection::fetch).
    type Cursor: RowCursor;

    /// The driver identifier ("mysql", "pgsql", "sqlite", ...).
    ///
    /// Used to select the SQL dialect; unknown names fall back to MySQL
    /// grammar.
    fn driver_name(&self) -> &str;

    /// Execute a query and return all rows.
    fn query(
        &self,
        cx: &Cx,
        sql: &str,
        params: &[Value],
    ) -> impl Future<Output = Outcome<Vec<Row>, Error>> + Send;

    /// Execute a query and return the first row, if any.
    fn query_one(
        &self,
        cx: &Cx,
        sql: &str,
        params: &[Value],
    ) -> impl Future<Output = Outcome<Option<Row>, Error>> + Send {
        async move {
            match self.query(cx, sql, params).await {
                Outcome::Ok(rows) => Outcome::Ok(rows.into_iter().next()),
                Outcome::Err(e) => Outcome::Err(e),
                Outcome::Cancelled(r) => Outcome::Cancelled(r),
                Outcome::Panicked(p) => Outcome::Panicked(p),
            }
        }
    }

    /// Execute a statement (INSERT, UPDATE, DELETE) and return rows affected.
    fn execute(
        &self,
        cx: &Cx,
        sql: &str,
        params: &[Value],
    ) -> impl Future<Output = Outcome<u64, Error>> + Send;

    /// Execute an INSERT and return the last inserted row id.
    fn insert(
        &self,
        cx: &Cx,
        sql: &str,
        params: &[Value],
    ) -> impl Future<Output = Outcome<i64, Error>> + Send;

    /// Execute a query and return a forward-only cursor over its rows.
    fn fetch(
        &self,
        cx: &Cx,
        sql: &str,
        params: &[Value],
    ) -> impl Future<Output = Outcome<Self::Cursor, Error>> + Send;

    /// Quote a value as a SQL literal for diagnostic output.
    ///
    /// Never used for statement execution; parameters are always bound.
    fn quote(&self, value: &Value) -> String {
        value.to_string()
    }

    /// Begin a transaction on this handle.
    fn begin_transaction(&self, cx: &Cx) -> impl Future<Output = Outcome<(), Error>> + Send;

    /// Commit the open transaction.
    fn commit(&self, cx: &Cx) -> impl Future<Output = Outcome<(), Error>> + Send;

    /// Roll back the open transaction.
    fn roll_back(&self, cx: &Cx) -> impl Future<Output = Outcome<(), Error>> + Send;
}
