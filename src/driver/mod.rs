use crate::session::Session;
use crate::{ConnectionOptions, Error, Result};

#[cfg(feature = "postgres")]
pub mod postgres;

/// Opens a session on the database identified by the given DSN.
pub async fn connect(dsn: &str) -> Result<Box<dyn Session>> {
    let options = ConnectionOptions::try_from(dsn)?;
    create_session(&options).await
}

pub async fn create_session(options: &ConnectionOptions) -> Result<Box<dyn Session>> {
    match options.scheme.as_deref().unwrap_or_default() {
        #[cfg(feature = "postgres")]
        "psql" => Ok(Box::new(postgres::PostgresSession::connect(options).await?)),
        proto => Err(Error::unknown_driver(proto)),
    }
}
