use crate::{Error, Result};
use std::fmt::{Display, Formatter};
use std::str::FromStr;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum TransactionIsolationLevel {
    ReadUncommitted,
    ReadCommitted,
    RepeatableRead,
    Serializable,
}

impl TransactionIsolationLevel {
    /// Returns the SQL keyword(s) naming this isolation level.
    pub fn as_sql(&self) -> &'static str {
        match self {
            TransactionIsolationLevel::ReadUncommitted => "READ UNCOMMITTED",
            TransactionIsolationLevel::ReadCommitted => "READ COMMITTED",
            TransactionIsolationLevel::RepeatableRead => "REPEATABLE READ",
            TransactionIsolationLevel::Serializable => "SERIALIZABLE",
        }
    }

    /// Returns the SQL to set the isolation level of the current transaction.
    /// Must be the first statement executed in the transaction.
    pub fn get_set_transaction_isolation_sql(&self) -> String {
        format!("SET TRANSACTION ISOLATION LEVEL {}", self.as_sql())
    }
}

impl Display for TransactionIsolationLevel {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_sql())
    }
}

impl FromStr for TransactionIsolationLevel {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let normalized = s
            .trim()
            .split(|c: char| c.is_whitespace() || c == '_' || c == '-')
            .filter(|part| !part.is_empty())
            .collect::<Vec<_>>()
            .join(" ")
            .to_ascii_uppercase();

        match normalized.as_str() {
            "READ UNCOMMITTED" => Ok(TransactionIsolationLevel::ReadUncommitted),
            "READ COMMITTED" => Ok(TransactionIsolationLevel::ReadCommitted),
            "REPEATABLE READ" => Ok(TransactionIsolationLevel::RepeatableRead),
            "SERIALIZABLE" => Ok(TransactionIsolationLevel::Serializable),
            _ => Err(Error::config(format!(
                "Unknown transaction isolation level \"{}\"",
                s
            ))),
        }
    }
}

impl TryFrom<&str> for TransactionIsolationLevel {
    type Error = Error;

    fn try_from(value: &str) -> Result<Self> {
        value.parse()
    }
}
