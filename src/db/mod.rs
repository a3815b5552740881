//! PostgreSQL persistence.
//!
//! Queries are bound at runtime; the schema lives in `migrations/` and is
//! applied by [`Database::migrate`].

mod clients;
mod dashboard;
mod documents;
mod invoices;
mod users;

use std::time::Duration;

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

use crate::config::Config;
use crate::error::Result;
use crate::models::Profile;

pub use clients::ClientFilter;
pub use dashboard::{AmountByStatus, CountByStatus, DashboardStats};
pub use invoices::{InvoiceFilter, InvoiceWithLines};

/// Database connection pool
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    /// Connect eagerly, failing when the database is unreachable.
    pub async fn new(config: &Config) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .acquire_timeout(Duration::from_secs(5))
            .connect(config.database_url())
            .await?;

        tracing::info!("database connection established");
        Ok(Self { pool })
    }

    /// Build a pool that connects on first use.
    pub fn connect_lazy(config: &Config) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .acquire_timeout(Duration::from_secs(5))
            .connect_lazy(config.database_url())?;

        Ok(Self { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Get a reference to the connection pool
    pub fn get_pool(&self) -> &PgPool {
        &self.pool
    }

    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| crate::error::Error::Database(e.into()))?;
        tracing::info!("database migrations applied");
        Ok(())
    }

    pub async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    // Profile operations
    pub async fn get_profile(&self, id: i32) -> Result<Profile> {
        let profile = sqlx::query_as::<_, Profile>("SELECT * FROM profiles WHERE id = $1")
            .bind(id)
            .fetch_optional(self.get_pool())
            .await?
            .ok_or_else(|| crate::error::Error::not_found(format!("profile {id}")))?;

        Ok(profile)
    }
}

/// Escapes `%`, `_` and `\` for use inside an ILIKE pattern.
pub(crate) fn like_pattern(query: &str) -> String {
    let mut escaped = String::with_capacity(query.len() + 2);
    escaped.push('%');
    for c in query.trim().chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped.push('%');
    escaped
}
