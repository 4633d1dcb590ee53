//! PostgreSQL-backed durable Request Store and message queues.
//!
//! Used in queue mode, where several manager replicas and any number of
//! workers share one database.

pub mod queue;
pub mod store;

use sqlx::postgres::PgPoolOptions;

pub use queue::{PgQueue, DEFAULT_VISIBILITY_TIMEOUT};
pub use store::PgRequestStore;

pub type DbPool = sqlx::PgPool;

/// Create a connection pool from a database URL.
pub async fn create_pool(database_url: &str) -> Result<DbPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(20)
        .connect(database_url)
        .await
}

/// Verify the database answers a trivial query.
pub async fn health_check(pool: &DbPool) -> Result<(), sqlx::Error> {
    sqlx::query("SELECT 1").execute(pool).await?;
    Ok(())
}

/// Apply pending schema migrations.
pub async fn run_migrations(pool: &DbPool) -> Result<(), sqlx::migrate::MigrateError> {
    sqlx::migrate!("./migrations").run(pool).await
}

pub(crate) fn backend_error(err: sqlx::Error) -> String {
    tracing::error!(error = %err, "Database error");
    err.to_string()
}
