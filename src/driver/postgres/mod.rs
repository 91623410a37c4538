mod session;

pub use session::PostgresSession;
