//! PostgreSQL isolated-session provider
//!
//! Implements `SessionFactory` over a `deadpool-postgres` pool. Each isolated
//! session is a separate pooled connection, so audit lookups and inserts
//! never join the transaction of the operation being audited.

mod session;
pub mod sql;

pub use session::PostgresSession;

use crate::config::PostgresConfig;
use crate::error::{AuditError, Result};
use crate::provider::{IsolatedSession, SessionFactory};
use crate::types::AUDIT_TABLE;
use async_trait::async_trait;
use deadpool_postgres::{Config, ManagerConfig, Pool, PoolConfig, RecyclingMethod, Runtime, Timeouts};
use std::time::Duration;
use tokio_postgres::NoTls;

/// Postgres-backed isolated session factory
pub struct PostgresSessions {
    pool: Pool,
    audit_table: String,
}

impl PostgresSessions {
    /// Build a pool from configuration and verify it with `SELECT 1`
    pub async fn connect(config: &PostgresConfig) -> Result<Self> {
        let pool = create_pool(config)?;

        let client = pool
            .get()
            .await
            .map_err(|e| AuditError::Connection(format!("{}:{}: {}", config.host, config.port, e)))?;
        client.query_one("SELECT 1", &[]).await?;
        drop(client);

        tracing::info!(
            host = %config.host,
            port = config.port,
            database = %config.database,
            max_pool_size = config.max_pool_size,
            "Audit session pool established"
        );

        Ok(Self::from_pool(pool))
    }

    /// Wrap an existing pool (e.g., the application's own)
    ///
    /// Sessions are still isolated: each is its own checked-out connection.
    pub fn from_pool(pool: Pool) -> Self {
        Self {
            pool,
            audit_table: AUDIT_TABLE.to_string(),
        }
    }

    /// Write audit records to a different table
    ///
    /// Mutations of this table are never audited, whatever
    /// `AuditConfig::audit_table` says.
    pub fn with_audit_table(mut self, table: impl Into<String>) -> Self {
        self.audit_table = table.into();
        self
    }


    /// Table audit records are written to
    pub fn audit_table(&self) -> &str {
        &self.audit_table
    }

    /// Create the audit table and its index if missing
    pub async fn ensure_audit_table(&self) -> Result<()> {
        let client = self.pool.get().await?;
        client
            .batch_execute(&sql::create_audit_table(&self.audit_table))
            .await?;
        tracing::info!(table = %self.audit_table, "Audit table ready");
        Ok(())
    }

    /// The underlying pool
    pub fn pool(&self) -> &Pool {
        &self.pool
    }
}

#[async_trait]
impl SessionFactory for PostgresSessions {
    async fn isolated(&self) -> Result<Box<dyn IsolatedSession>> {
        let client = self.pool.get().await?;
        Ok(Box::new(PostgresSession::new(client, self.audit_table.clone())))
    }

    fn name(&self) -> &str {
        "postgres"
    }

    fn audit_table(&self) -> Option<&str> {
        Some(&self.audit_table)
    }
}

fn create_pool(config: &PostgresConfig) -> Result<Pool> {
    if config.max_pool_size == 0 {
        return Err(AuditError::Config("max_pool_size must be >= 1".to_string()));
    }

    let mut cfg = Config::new();
    cfg.host = Some(config.host.clone());
    cfg.port = Some(config.port);
    cfg.user = Some(config.user.clone());
    cfg.password = Some(config.password.clone());
    cfg.dbname = Some(config.database.clone());
    cfg.manager = Some(ManagerConfig {
        recycling_method: RecyclingMethod::Fast,
    });

    let mut pool_config = PoolConfig::new(config.max_pool_size);
    pool_config.timeouts = Timeouts {
        wait: Some(Duration::from_secs(config.wait_timeout_secs)),
        create: Some(Duration::from_secs(config.wait_timeout_secs)),
        recycle: None,
    };
    cfg.pool = Some(pool_config);

    cfg.create_pool(Some(Runtime::Tokio1), NoTls)
        .map_err(|e| AuditError::Config(format!("Failed to create pool: {}", e)))
}
