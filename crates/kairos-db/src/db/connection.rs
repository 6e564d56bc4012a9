use diesel_async::AsyncPgConnection;
use diesel_async::pooled_connection::AsyncDieselConnectionManager;
use diesel_async::pooled_connection::bb8::{Pool, PooledConnection};
use kairos_core::config::DatabaseConfig;

use crate::db::DbProvider;
use crate::error::DbResult;

pub type DbPool = Pool<AsyncPgConnection>;
pub type DbConnection<'pool> = PooledConnection<'pool, AsyncPgConnection>;

/// ## Summary
/// Pool size for a pass running `workers` groups at once.
///
/// Each worker holds a connection for its transaction, plus one for the pass's own group scan.
/// The configured maximum wins when it is larger.
#[must_use]
pub fn pool_size(database: &DatabaseConfig, workers: usize) -> u32 {
    let needed = u32::try_from(workers.max(1)).unwrap_or(u32::MAX).saturating_add(1);
    needed.max(u32::from(database.max_connections))
}

/// ## Summary
/// Creates the shared connection pool for the materialization pass.
///
/// ## Errors
/// Returns an error if the pool cannot be created with the configured database URL.
#[tracing::instrument(skip(database))]
pub async fn create_pool(database: &DatabaseConfig, workers: usize) -> anyhow::Result<DbPool> {
    let size = pool_size(database, workers);
    tracing::debug!(size, "Creating database connection pool");

    let manager = AsyncDieselConnectionManager::<AsyncPgConnection>::new(&database.url);

    let pool = Pool::builder()
        .max_size(size)
        .min_idle(Some(1))
        .test_on_check_out(false)
        .idle_timeout(None)
        .max_lifetime(None)
        .build(manager)
        .await?;

    tracing::info!(size, "Database connection pool created");

    Ok(pool)
}

impl DbProvider for DbPool {
    #[tracing::instrument(skip(self))]
    fn get_connection<'a>(
        &'a self,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = DbResult<DbConnection<'a>>> + Send + 'a>>
    {
        Box::pin(async move { Ok(self.get().await?) })
    }
}
