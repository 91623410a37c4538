
#[cfg(all(feature = "postgres", feature = "functional-tests"))]
pub use connection::{create_session, get_database_dsn};
pub use session::MockSession;

pub fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}
