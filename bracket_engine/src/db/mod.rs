//! Storage for brackets and matches.
//!
//! [`BracketStore`] is the seam between the engine and persistence.
//! [`PgBracketStore`] backs it with PostgreSQL through a pooled [`Database`];
//! [`MemoryBracketStore`] keeps everything in process.

use sqlx::postgres::{PgPool, PgPoolOptions};
use std::sync::Arc;
use std::time::Duration;

pub mod config;
pub mod errors;
pub mod memory;
pub mod repository;
pub mod timeouts;

pub use config::DatabaseConfig;
pub use errors::{StoreError, StoreResult};
pub use memory::MemoryBracketStore;
pub use repository::{BracketStore, PgBracketStore, SharedStore, StoreTransaction};

use timeouts::with_long_timeout;

/// Schema for the `brackets` and `matches` tables
pub const SCHEMA: &str = include_str!("../../migrations/0001_brackets.sql");

/// Database connection pool wrapper
#[derive(Clone)]
pub struct Database {
    pool: Arc<PgPool>,
}

impl Database {
    /// Create a new database connection pool
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use bracket_engine::db::{Database, DatabaseConfig};
    ///
    /// #[tokio::main]
    /// async fn main() -> Result<(), sqlx::Error> {
    ///     let config = DatabaseConfig::from_env();
    ///     let db = Database::new(&config).await?;
    ///     db.apply_schema().await.ok();
    ///     Ok(())
    /// }
    /// ```
    pub async fn new(config: &DatabaseConfig) -> Result<Self, sqlx::Error> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(Duration::from_secs(config.connection_timeout_secs))
            .idle_timeout(Duration::from_secs(config.idle_timeout_secs))
            .max_lifetime(Duration::from_secs(config.max_lifetime_secs))
            .connect(&config.database_url)
            .await?;

        Ok(Self {
            pool: Arc::new(pool),
        })
    }

    /// Get a reference to the connection pool
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Bracket store sharing this pool
    pub fn store(&self) -> PgBracketStore {
        PgBracketStore::new(Arc::clone(&self.pool))
    }

    /// Create the bracket tables if they do not exist yet
    pub async fn apply_schema(&self) -> StoreResult<()> {
        with_long_timeout(sqlx::raw_sql(SCHEMA).execute(&*self.pool)).await?;
        Ok(())
    }

    /// Check if the database connection is healthy
    pub async fn health_check(&self) -> Result<(), sqlx::Error> {
        sqlx::query("SELECT 1").execute(&*self.pool).await?;
        Ok(())
    }

    /// Close the database connection pool
    pub async fn close(self) {
        self.pool.close().await;
    }
}
