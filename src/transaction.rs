use crate::session::Session;
use crate::{AsyncResult, Error, Result, TransactionIsolationLevel};
use log::{debug, error, warn};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TransactionStatus {
    NotStarted,
    Active,
    Committed,
    RolledBack,
}

/// A database transaction running on a borrowed session.
///
/// The session is exclusively borrowed for the lifetime of the transaction.
/// A transaction still active when closed is rolled back; if it is dropped
/// while active (early return, panic, task cancellation) a rollback is queued
/// on the session and issued before its next statement.
pub struct Transaction<'s, S: Session + ?Sized> {
    session: &'s mut S,
    isolation_level: Option<TransactionIsolationLevel>,
    status: TransactionStatus,
}

impl<'s, S: Session + ?Sized> Transaction<'s, S> {
    pub fn new(session: &'s mut S) -> Self {
        Self {
            session,
            isolation_level: None,
            status: TransactionStatus::NotStarted,
        }
    }

    pub fn with_isolation_level(mut self, isolation_level: TransactionIsolationLevel) -> Self {
        self.isolation_level = Some(isolation_level);
        self
    }

    pub fn isolation_level(&self) -> Option<TransactionIsolationLevel> {
        self.isolation_level
    }

    pub fn status(&self) -> TransactionStatus {
        self.status
    }

    pub fn is_active(&self) -> bool {
        self.status == TransactionStatus::Active
    }

    pub fn session(&self) -> &S {
        &*self.session
    }

    /// Begins the transaction, setting its isolation level if configured.
    pub async fn begin(&mut self) -> Result<()> {
        if self.status != TransactionStatus::NotStarted {
            return Err(Error::transaction_already_started());
        }

        // Active before awaiting: if this future is dropped once BEGIN has been
        // sent, the drop guard must still queue a rollback.
        self.status = TransactionStatus::Active;
        if let Err(e) = self.session.begin().await {
            self.status = TransactionStatus::NotStarted;
            return Err(e);
        }

        if let Some(isolation_level) = self.isolation_level {
            let sql = isolation_level.get_set_transaction_isolation_sql();
            if let Err(e) = self.session.execute(&sql).await {
                let rollback = self.session.rollback().await;
                self.status = TransactionStatus::NotStarted;

                return Err(match rollback {
                    Ok(()) => e,
                    Err(rollback_error) => e.with_suppressed(rollback_error),
                });
            }
        }

        debug!(target: "db_try::transaction", "Transaction started (isolation level: {})", self.isolation_level.map_or("default", |l| l.as_sql()));
        Ok(())
    }

    pub async fn commit(&mut self) -> Result<()> {
        if !self.is_active() {
            return Err(Error::transaction_not_active("commit"));
        }

        // A failed commit ends the transaction on the server as well.
        match self.session.commit().await {
            Ok(()) => {
                self.status = TransactionStatus::Committed;
                Ok(())
            }
            Err(e) => {
                self.status = TransactionStatus::RolledBack;
                Err(e)
            }
        }
    }

    pub async fn rollback(&mut self) -> Result<()> {
        if !self.is_active() {
            return Err(Error::transaction_not_active("rollback"));
        }

        let result = self.session.rollback().await;
        self.status = TransactionStatus::RolledBack;

        result
    }

    /// Ends the transaction scope, rolling back if neither committed nor rolled back.
    pub async fn close(mut self) -> Result<()> {
        if self.is_active() {
            debug!(target: "db_try::transaction", "Rolling back transaction left open");
            self.rollback().await
        } else {
            Ok(())
        }
    }

    /// Runs `body` inside the transaction.
    ///
    /// The transaction is begun before calling the body and rolled back after
    /// it, unless the body committed or rolled back explicitly. The error
    /// returned by the body always wins over a failed rollback, which is
    /// then reachable through [`Error::suppressed`].
    pub async fn run<T, F>(mut self, body: F) -> Result<T>
    where
        F: for<'t> FnOnce(&'t mut Transaction<'s, S>) -> AsyncResult<'t, T>,
    {
        self.begin().await?;
        let result = body(&mut self).await;
        if !self.is_active() {
            return result;
        }

        match (result, self.rollback().await) {
            (result, Ok(())) => result,
            (Ok(_), Err(rollback_error)) => Err(rollback_error),
            (Err(e), Err(rollback_error)) => {
                error!(target: "db_try::transaction", "Rollback failed after error \"{}\": {}", e, rollback_error);
                Err(e.with_suppressed(rollback_error))
            }
        }
    }
}

impl<S: Session + ?Sized> Drop for Transaction<'_, S> {
    fn drop(&mut self) {
        if self.is_active() {
            warn!(target: "db_try::transaction", "Transaction dropped while active, scheduling rollback");
            self.session.start_rollback();
            self.status = TransactionStatus::RolledBack;
        }
    }
}
