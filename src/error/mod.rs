use std::backtrace::Backtrace;
use std::fmt::{Debug, Display, Formatter};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    TransactionNotActive = 1,
    TransactionAlreadyStarted = 2,
    ConfigError = 3,
    UnknownDriver = 4,

    Database = 1001,

    UnknownError = -1,
}

pub struct Error {
    kind: ErrorKind,
    inner: Box<dyn std::error::Error + Send + Sync>,
    suppressed: Option<Box<Error>>,
    backtrace: Backtrace,
}

pub struct StdError(Error);

impl Display for StdError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        std::fmt::Display::fmt(&self.0.to_string(), f)
    }
}

impl Debug for StdError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        std::fmt::Display::fmt(&self.0.to_string(), f)
    }
}

impl std::error::Error for StdError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(self.0.inner.as_ref())
    }
}

impl From<Error> for StdError {
    fn from(e: Error) -> Self {
        StdError(e)
    }
}

/// A driver-neutral database error, identified by its SQLSTATE code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseError {
    code: String,
    message: String,
}

impl DatabaseError {
    pub fn new<C: Into<String>, M: Into<String>>(code: C, message: M) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl Display for DatabaseError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} (SQLSTATE {})", self.message, self.code)
    }
}

impl std::error::Error for DatabaseError {}

impl Error {
    pub fn new<E>(kind: ErrorKind, error: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Error {
            kind,
            inner: error.into(),
            suppressed: None,
            backtrace: Backtrace::capture(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Database errors are the only ones carrying a SQLSTATE code.
    pub fn is_database_error(&self) -> bool {
        self.kind == ErrorKind::Database || self.sql_state().is_some()
    }

    /// Whether the error was raised by a misuse of the API rather than by the database.
    pub fn is_programming_error(&self) -> bool {
        matches!(
            self.kind,
            ErrorKind::TransactionNotActive | ErrorKind::TransactionAlreadyStarted
        )
    }

    /// Returns the SQLSTATE code of the underlying database error, if any.
    pub fn sql_state(&self) -> Option<&str> {
        if let Some(e) = self.inner.downcast_ref::<DatabaseError>() {
            return Some(e.code());
        }

        #[cfg(feature = "postgres")]
        if let Some(e) = self.inner.downcast_ref::<tokio_postgres::Error>() {
            return e.code().map(|state| state.code());
        }

        None
    }

    /// An error which occurred while cleaning up after this one.
    pub fn suppressed(&self) -> Option<&Error> {
        self.suppressed.as_deref()
    }

    pub fn with_suppressed(mut self, error: Error) -> Self {
        self.suppressed = Some(Box::new(error));
        self
    }

    pub fn get_ref(&self) -> &(dyn std::error::Error + Send + Sync + 'static) {
        self.inner.as_ref()
    }

    pub fn backtrace(&self) -> &Backtrace {
        &self.backtrace
    }

    pub fn database<C: Into<String>, M: Into<String>>(code: C, message: M) -> Self {
        Self::new(ErrorKind::Database, DatabaseError::new(code, message))
    }

    pub fn transaction_not_active(operation: &str) -> Self {
        Self::new(
            ErrorKind::TransactionNotActive,
            format!("Cannot {} a transaction which is not active", operation),
        )
    }

    pub fn transaction_already_started() -> Self {
        Self::new(
            ErrorKind::TransactionAlreadyStarted,
            "Transaction has already been started",
        )
    }

    pub fn config<T: ToString>(message: T) -> Self {
        Self::new(ErrorKind::ConfigError, message.to_string())
    }

    pub fn unknown_driver<T: ToString>(scheme: T) -> Self {
        Self::new(
            ErrorKind::UnknownDriver,
            format!("Unknown driver for scheme \"{}\"", scheme.to_string()),
        )
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.inner)
    }
}

impl Debug for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.inner)?;
        if let Some(suppressed) = &self.suppressed {
            write!(f, "\nSuppressed: {}", suppressed)?;
        }

        write!(f, "\nBacktrace:\n{}", self.backtrace)
    }
}

impl<T> From<T> for Error
where
    T: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    fn from(err: T) -> Self {
        let inner = err.into();
        let kind = if inner.is::<DatabaseError>() {
            ErrorKind::Database
        } else {
            database_kind(inner.as_ref())
        };

        Error {
            kind,
            inner,
            suppressed: None,
            backtrace: Backtrace::capture(),
        }
    }
}

#[cfg(feature = "postgres")]
fn database_kind(inner: &(dyn std::error::Error + Send + Sync + 'static)) -> ErrorKind {
    match inner.downcast_ref::<tokio_postgres::Error>() {
        Some(e) if e.code().is_some() => ErrorKind::Database,
        _ => ErrorKind::UnknownError,
    }
}

#[cfg(not(feature = "postgres"))]
fn database_kind(_: &(dyn std::error::Error + Send + Sync + 'static)) -> ErrorKind {
    ErrorKind::UnknownError
}
