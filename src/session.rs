use crate::AsyncResult;

/// A database session able to run statements and control a transaction.
///
/// Statements take `&self` so that operations can be re-issued from a retry
/// loop; transaction control takes `&mut self` as it changes the session state.
pub trait Session: Send + Sync {
    /// Begins a new transaction.
    fn begin(&mut self) -> AsyncResult<'_, ()>;

    /// Commits the current transaction.
    fn commit(&mut self) -> AsyncResult<'_, ()>;

    /// Rolls back the current transaction.
    fn rollback(&mut self) -> AsyncResult<'_, ()>;

    /// Executes a raw SQL statement, discarding its results.
    fn execute<'a>(&'a self, sql: &'a str) -> AsyncResult<'a, ()>;

    /// Executes a raw SQL statement and returns the first column of the first row as text.
    fn query_scalar<'a>(&'a self, sql: &'a str) -> AsyncResult<'a, Option<String>>;

    /// Whether a transaction is currently open on this session.
    fn in_transaction(&self) -> bool;

    /// Schedules a rollback of the current transaction without waiting for it.
    ///
    /// Used where awaiting is impossible (ie: on drop). The rollback must be
    /// issued before any other statement is sent through this session.
    fn start_rollback(&mut self);
}
