//! Helpers for running database work reliably: a retry policy for transient
//! PostgreSQL errors and transaction scopes with configurable isolation level.

mod connection_options;
pub mod driver;
pub mod error;
mod result;
pub mod retry;
mod session;
mod transaction;
mod transaction_isolation_level;

pub use connection_options::ConnectionOptions;
pub use driver::connect;
pub use error::Error;
pub use result::{AsyncResult, Result};
pub use retry::{postgres_retry, Backoff, RetryPolicy, RetryableErrorSet, SqlStateAware};
pub use session::Session;
pub use transaction::{Transaction, TransactionStatus};
pub use transaction_isolation_level::TransactionIsolationLevel;

#[cfg(test)]
mod tests;
