//! Postgres-backed repository implementations.

mod content;
mod memberships;
mod types;
mod util;

pub use util::map_sqlx_error;

use std::sync::Arc;
use std::time::Duration;

use sqlx::{
    postgres::{PgPool, PgPoolOptions},
    query,
};

use crate::application::repos::RepoError;

#[derive(Clone)]
pub struct PostgresRepositories {
    pool: Arc<PgPool>,
    statement_timeout: Option<Duration>,
}

impl PostgresRepositories {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
            statement_timeout: None,
        }
    }

    /// Cap every listing statement; exceeding it surfaces as [`RepoError::Timeout`].
    pub fn with_statement_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.statement_timeout = timeout;
        self
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub fn statement_timeout(&self) -> Option<Duration> {
        self.statement_timeout
    }

    pub async fn connect(url: &str, max_connections: u32) -> Result<PgPool, sqlx::Error> {
        PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await
    }

    pub async fn health_check(&self) -> Result<(), sqlx::Error> {
        query("SELECT 1").execute(self.pool()).await.map(|_| ())
    }

    /// Wait for in-flight queries, then close every pooled connection.
    pub async fn close(&self) {
        self.pool.close().await;
    }

    fn convert_count(value: i64) -> Result<u64, RepoError> {
        value
            .try_into()
            .map_err(|_| RepoError::from_persistence("count exceeds supported range"))
    }
}
