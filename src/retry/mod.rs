mod backoff;
mod retryable_error_set;

pub use backoff::Backoff;
pub use retryable_error_set::{RetryDecision, RetryableErrorSet};

use crate::error::DatabaseError;
use crate::{Error, Result};
use lazy_static::lazy_static;
use log::{debug, error, warn};
use std::env::VarError;
use std::fmt::Display;
use std::future::Future;

/// Environment variable holding the maximum number of attempts of the default policy.
pub const RETRIES_NUMBER_ENV: &str = "DB_TRY_RETRIES_NUMBER";

const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Errors which may carry a SQLSTATE code.
pub trait SqlStateAware {
    fn sql_state(&self) -> Option<&str>;
}

impl SqlStateAware for Error {
    fn sql_state(&self) -> Option<&str> {
        Error::sql_state(self)
    }
}

impl SqlStateAware for DatabaseError {
    fn sql_state(&self) -> Option<&str> {
        Some(self.code())
    }
}

#[cfg(feature = "postgres")]
impl SqlStateAware for tokio_postgres::Error {
    fn sql_state(&self) -> Option<&str> {
        self.code().map(|state| state.code())
    }
}

lazy_static! {
    static ref DEFAULT_POLICY: RetryPolicy = RetryPolicy::from_env().unwrap_or_else(|e| {
        warn!(target: "db_try::retry", "Invalid retry configuration, using defaults: {}", e);
        RetryPolicy::postgres()
    });
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
    backoff: Backoff,
    retryable: RetryableErrorSet,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, backoff: Backoff, retryable: RetryableErrorSet) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff,
            retryable,
        }
    }

    /// Retries connection exceptions and serialization failures, making at most
    /// 3 attempts with exponential backoff.
    pub fn postgres() -> Self {
        Self::new(
            DEFAULT_MAX_ATTEMPTS,
            Backoff::exponential_jitter(),
            RetryableErrorSet::postgres().clone(),
        )
    }

    /// Same as [`RetryPolicy::postgres`], reading the maximum number of attempts
    /// from the `DB_TRY_RETRIES_NUMBER` environment variable if set.
    pub fn from_env() -> Result<Self> {
        let policy = Self::postgres();
        match std::env::var(RETRIES_NUMBER_ENV) {
            Ok(value) => Ok(policy.with_max_attempts(parse_max_attempts(&value)?)),
            Err(VarError::NotPresent) => Ok(policy),
            Err(e) => Err(Error::config(format!("{}: {}", RETRIES_NUMBER_ENV, e))),
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    pub fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn with_retryable_errors(mut self, retryable: RetryableErrorSet) -> Self {
        self.retryable = retryable;
        self
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn backoff(&self) -> &Backoff {
        &self.backoff
    }

    pub fn retryable_errors(&self) -> &RetryableErrorSet {
        &self.retryable
    }

    pub fn should_retry(&self, code: &str) -> bool {
        self.retryable.is_retryable(code)
    }

    /// Runs the operation, retrying it while it fails with a transient database error.
    pub async fn run<F, Fut, T, E>(&self, op: F) -> std::result::Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = std::result::Result<T, E>>,
        E: SqlStateAware + Display,
    {
        self.run_with(op, <E as SqlStateAware>::sql_state).await
    }

    /// Runs the operation, using `classifier` to extract the SQLSTATE code from errors.
    ///
    /// Errors for which the classifier returns `None` are not database errors
    /// and are returned immediately. The error returned once retries are
    /// exhausted is the last one raised by the operation.
    pub async fn run_with<F, Fut, T, E, C>(
        &self,
        mut op: F,
        classifier: C,
    ) -> std::result::Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = std::result::Result<T, E>>,
        C: Fn(&E) -> Option<&str>,
        E: Display,
    {
        let started_at = chrono::Utc::now();
        let mut attempt: u32 = 0;

        loop {
            attempt += 1;
            let err = match op().await {
                Ok(value) => return Ok(value),
                Err(err) => err,
            };

            let Some(code) = classifier(&err) else {
                return Err(err);
            };

            if !self.retryable.is_retryable(code) {
                debug!(target: "db_try::retry", "Error {} is not transient, not retrying", code);
                return Err(err);
            }

            if attempt >= self.max_attempts {
                let elapsed = chrono::Utc::now() - started_at;
                error!(target: "db_try::retry", "Giving up after {} attempts in {}ms: {}", attempt, elapsed.num_milliseconds(), err);
                return Err(err);
            }

            let delay = self.backoff.delay(attempt);
            warn!(target: "db_try::retry", "Attempt {}/{} failed with {}, retrying in {}ms: {}", attempt, self.max_attempts, code, delay.as_millis(), err);

            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::postgres()
    }
}

fn parse_max_attempts(value: &str) -> Result<u32> {
    match value.trim().parse::<u32>() {
        Ok(0) => Err(Error::config(format!(
            "{} must be greater than zero",
            RETRIES_NUMBER_ENV
        ))),
        Ok(n) => Ok(n),
        Err(e) => Err(Error::config(format!(
            "invalid {} \"{}\": {}",
            RETRIES_NUMBER_ENV, value, e
        ))),
    }
}

/// Runs the operation under the default PostgreSQL retry policy.
///
/// The policy is built once from the environment (see [`RetryPolicy::from_env`]).
pub async fn postgres_retry<F, Fut, T, E>(op: F) -> std::result::Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = std::result::Result<T, E>>,
    E: SqlStateAware + Display,
{
    DEFAULT_POLICY.run(op).await
}
