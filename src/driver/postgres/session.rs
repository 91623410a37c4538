use crate::session::Session;
use crate::{AsyncResult, ConnectionOptions, Result};
use log::{debug, error};
use std::fmt::{Debug, Formatter};
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::task::JoinHandle;
use tokio_postgres::{Client, Config, NoTls, SimpleQueryMessage};

/// A session backed by a single `tokio-postgres` connection.
pub struct PostgresSession {
    client: Client,
    handle: JoinHandle<()>,
    in_transaction: bool,
    pending_rollback: AtomicBool,
}

impl PostgresSession {
    fn build_config(options: &ConnectionOptions) -> Config {
        let mut config = Config::new();
        if let Some(host) = options.host.as_deref().filter(|h| !h.is_empty()) {
            config.host(host);
        }

        config
            .port(options.port.unwrap_or(5432))
            .user(options.username.as_deref().unwrap_or("postgres"))
            .dbname(options.database_name.as_deref().unwrap_or("postgres"));

        if let Some(password) = &options.password {
            config.password(password);
        }

        if let Some(application_name) = options.application_name.as_deref() {
            if !application_name.is_empty() {
                config.application_name(application_name);
            }
        }

        config
    }

    pub async fn connect(options: &ConnectionOptions) -> Result<Self> {
        let config = Self::build_config(options);
        let (client, connection) = config.connect(NoTls).await?;
        let handle = tokio::spawn(async move {
            if let Err(e) = connection.await {
                error!(target: "db_try::driver", "connection error: {}", e);
            }
        });

        Ok(Self {
            client,
            handle,
            in_transaction: false,
            pending_rollback: AtomicBool::new(false),
        })
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    async fn flush_pending_rollback(&self) -> Result<()> {
        if self.pending_rollback.swap(false, Ordering::SeqCst) {
            debug!(target: "db_try::driver", "Rolling back abandoned transaction");
            self.client.batch_execute("ROLLBACK").await?;
        }

        Ok(())
    }

    async fn end_transaction(&mut self, sql: &str) -> Result<()> {
        self.flush_pending_rollback().await?;
        let result = self.client.batch_execute(sql).await;
        self.in_transaction = false;

        Ok(result?)
    }
}

impl Debug for PostgresSession {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PostgresSession")
            .field("in_transaction", &self.in_transaction)
            .field("closed", &self.client.is_closed())
            .finish()
    }
}

impl Drop for PostgresSession {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

impl Session for PostgresSession {
    fn begin(&mut self) -> AsyncResult<'_, ()> {
        Box::pin(async move {
            self.flush_pending_rollback().await?;

            // Set before awaiting so that start_rollback covers a BEGIN already sent.
            self.in_transaction = true;
            if let Err(e) = self.client.batch_execute("BEGIN").await {
                self.in_transaction = false;
                return Err(e.into());
            }

            Ok(())
        })
    }

    fn commit(&mut self) -> AsyncResult<'_, ()> {
        Box::pin(self.end_transaction("COMMIT"))
    }

    fn rollback(&mut self) -> AsyncResult<'_, ()> {
        Box::pin(self.end_transaction("ROLLBACK"))
    }

    fn execute<'a>(&'a self, sql: &'a str) -> AsyncResult<'a, ()> {
        Box::pin(async move {
            self.flush_pending_rollback().await?;
            self.client.batch_execute(sql).await?;

            Ok(())
        })
    }

    fn query_scalar<'a>(&'a self, sql: &'a str) -> AsyncResult<'a, Option<String>> {
        Box::pin(async move {
            self.flush_pending_rollback().await?;
            let messages = self.client.simple_query(sql).await?;
            for message in messages {
                if let SimpleQueryMessage::Row(row) = message {
                    return Ok(row.try_get(0)?.map(String::from));
                }
            }

            Ok(None)
        })
    }

    fn in_transaction(&self) -> bool {
        self.in_transaction
    }

    fn start_rollback(&mut self) {
        if self.in_transaction {
            self.in_transaction = false;
            self.pending_rollback.store(true, Ordering::SeqCst);
        }
    }
}


#[cfg(all(test, feature = "functional-tests"))]
mod tests {
    use crate::retry::{Backoff, RetryPolicy};
    use crate::session::Session;
    use crate::tests::{create_session, init_logger};
    use crate::{Error, Transaction, TransactionIsolationLevel};
    use serial_test::serial;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;
    use tokio_test::{assert_err, assert_ok};

    async fn install_raise_error(session: &impl Session, error_code: &str) {
        session
            .execute(&format!(
                r#"
        CREATE OR REPLACE FUNCTION raise_error()
        RETURNS VOID AS $$
        BEGIN
            RAISE SQLSTATE '{}';
        END;
        $$ LANGUAGE plpgsql;
        "#,
                error_code
            ))
            .await
            .expect("Failed to create function");
    }

    async fn count_attempts(error_code: &str) -> (u32, Error) {
        init_logger();
        let session = create_session().await.expect("Connection failed");
        install_raise_error(&session, error_code).await;

        let policy = RetryPolicy::postgres().with_backoff(Backoff::Fixed(Duration::from_millis(10)));
        let calls = AtomicU32::new(0);
        let result = policy
            .run(|| async {
                calls.fetch_add(1, Ordering::SeqCst);
                session.execute("SELECT raise_error()").await
            })
            .await;

        (calls.load(Ordering::SeqCst), assert_err!(result))
    }

    #[tokio::test]
    #[serial]
    async fn retries_connection_exception() {
        let (calls, err) = count_attempts("08000").await;
        assert_eq!(calls, 3);
        assert_eq!(err.sql_state(), Some("08000"));
    }

    #[tokio::test]
    #[serial]
    async fn retries_connection_does_not_exist() {
        let (calls, err) = count_attempts("08003").await;
        assert_eq!(calls, 3);
        assert_eq!(err.sql_state(), Some("08003"));
    }

    #[tokio::test]
    #[serial]
    async fn retries_serialization_failure() {
        let (calls, err) = count_attempts("40001").await;
        assert_eq!(calls, 3);
        assert_eq!(err.sql_state(), Some("40001"));
    }

    #[tokio::test]
    #[serial]
    async fn does_not_retry_statement_completion_unknown() {
        let (calls, err) = count_attempts("40002").await;
        assert_eq!(calls, 1);
        assert_eq!(err.sql_state(), Some("40002"));
        assert!(err.is_database_error());
    }

    #[tokio::test]
    async fn transaction_with_commit() {
        let mut session = create_session().await.expect("Connection failed");
        let mut transaction = Transaction::new(&mut session);

        assert_ok!(transaction.begin().await);
        assert!(transaction.session().in_transaction());
        assert_ok!(transaction.commit().await);
        assert!(!transaction.session().in_transaction());
    }

    #[tokio::test]
    async fn transaction_serializable_with_commit() {
        let mut session = create_session().await.expect("Connection failed");
        let mut transaction = Transaction::new(&mut session)
            .with_isolation_level(TransactionIsolationLevel::Serializable);

        assert_ok!(transaction.begin().await);
        assert!(transaction.session().in_transaction());
        let isolation = transaction
            .session()
            .query_scalar("SHOW transaction_isolation")
            .await
            .unwrap();
        assert_eq!(isolation.as_deref(), Some("serializable"));
        assert_ok!(transaction.commit().await);
        assert!(!transaction.session().in_transaction());
        drop(transaction);

        let isolation = session
            .query_scalar("SHOW transaction_isolation")
            .await
            .unwrap();
        assert_eq!(isolation.as_deref(), Some("read committed"));
    }

    #[tokio::test]
    async fn transaction_with_rollback() {
        let mut session = create_session().await.expect("Connection failed");
        let mut transaction = Transaction::new(&mut session);

        assert_ok!(transaction.begin().await);
        assert!(transaction.session().in_transaction());
        assert_ok!(transaction.rollback().await);
        assert!(!transaction.session().in_transaction());
    }

    #[tokio::test]
    async fn transaction_without_commit() {
        let mut session = create_session().await.expect("Connection failed");
        let result = Transaction::new(&mut session)
            .run(|tx| {
                Box::pin(async move {
                    assert!(tx.session().in_transaction());
                    tx.session()
                        .execute("CREATE TEMPORARY TABLE uncommitted (id INT)")
                        .await
                })
            })
            .await;

        assert_ok!(result);
        assert!(!session.in_transaction());

        let exists = session
            .query_scalar("SELECT to_regclass('pg_temp.uncommitted')::text")
            .await
            .unwrap();
        assert_eq!(exists, None);
    }

    #[tokio::test]
    async fn transaction_with_exception() {
        let mut session = create_session().await.expect("Connection failed");
        let result = Transaction::new(&mut session)
            .run(|tx| {
                Box::pin(async move {
                    assert!(tx.session().in_transaction());
                    Err::<(), _>(Error::from("some error"))
                })
            })
            .await;

        let err = assert_err!(result);
        assert_eq!(err.to_string(), "some error");
        assert!(!session.in_transaction());
    }

    #[tokio::test]
    async fn dropped_transaction_is_rolled_back_before_next_statement() {
        let mut session = create_session().await.expect("Connection failed");
        {
            let mut transaction = Transaction::new(&mut session);
            assert_ok!(transaction.begin().await);
            assert_ok!(
                transaction
                    .session()
                    .execute("CREATE TEMPORARY TABLE abandoned (id INT)")
                    .await
            );
        }

        assert!(!session.in_transaction());
        let exists = session
            .query_scalar("SELECT to_regclass('pg_temp.abandoned')::text")
            .await
            .unwrap();
        assert_eq!(exists, None);
    }
}
