pub mod error;
pub mod payment_store;
#[cfg(feature = "database")]
pub mod postgres_store;

pub use error::{StoreError, StoreResult};
pub use payment_store::{InMemoryPaymentStore, PaymentStore, RecordMutator, UpdateOutcome};
#[cfg(feature = "database")]
pub use postgres_store::PostgresPaymentStore;

#[cfg(feature = "database")]
pub use self::pool::*;

#[cfg(feature = "database")]
mod pool {
    use super::error::StoreError;
    use crate::config::StoreConfig;
    use sqlx::postgres::PgPoolOptions;
    use sqlx::PgPool;
    use std::time::Duration;
    use tracing::{error as log_error, info};

    /// Database pool configuration
    #[derive(Debug, Clone)]
    pub struct PoolConfig {
        pub max_connections: u32,
        pub min_connections: u32,
        pub connection_timeout: Duration,
        pub idle_timeout: Duration,
    }

    impl Default for PoolConfig {
        fn default() -> Self {
            Self {
                max_connections: 10,
                min_connections: 1,
                connection_timeout: Duration::from_secs(10),
                idle_timeout: Duration::from_secs(600),
            }
        }
    }

    pub async fn init_pool(
        database_url: &str,
        config: Option<PoolConfig>,
    ) -> Result<PgPool, StoreError> {
        let config = config.unwrap_or_default();

        info!(
            max_connections = config.max_connections,
            min_connections = config.min_connections,
            connection_timeout = ?config.connection_timeout,
            "initializing database pool"
        );

        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(config.connection_timeout)
            .idle_timeout(config.idle_timeout)
            .connect(database_url)
            .await
            .map_err(|e| {
                log_error!(error = %e, "failed to initialize database pool");
                StoreError::from_sqlx(e)
            })?;

        info!("database pool initialized");
        Ok(pool)
    }

    pub async fn init_pool_from_config(config: &StoreConfig) -> Result<PgPool, StoreError> {
        let url = config.database_url.as_deref().ok_or_else(|| {
            StoreError::unavailable("DATABASE_URL is required for the postgres store")
        })?;
        let pool_config = PoolConfig {
            max_connections: config.max_connections,
            min_connections: config.min_connections,
            connection_timeout: Duration::from_secs(config.connection_timeout),
            ..PoolConfig::default()
        };
        init_pool(url, Some(pool_config)).await
    }

    pub async fn run_migrations(pool: &PgPool) -> Result<(), StoreError> {
        sqlx::migrate!("./migrations")
            .run(pool)
            .await
            .map_err(|e| StoreError::unavailable(format!("migration failed: {}", e)))?;
        info!("database migrations applied");
        Ok(())
    }

}
