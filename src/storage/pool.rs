//! Connection Source: pooled client handles to the backing store.
//!
//! Each borrow returns a `deadpool_redis::Connection`. Its `Drop` impl
//! returns the handle to the pool on every exit path, including panics
//! unwound through it and early `?` returns -- there is no explicit release
//! call to forget. Three submission modes ride on top of the returned
//! handle, all via the plain `redis` crate API:
//!
//! - **single command**: `redis::cmd("...").query_async(&mut conn)`
//! - **pipeline**: `redis::pipe()...query_async(&mut conn)` (no atomicity)
//! - **optimistic transaction**: `WATCH` + `redis::pipe().atomic()`, whose
//!   `EXEC` reply is `None` if a watched key changed underneath it

use std::time::Duration;

use async_trait::async_trait;
use deadpool_redis::{Config as DeadpoolConfig, Pool, Runtime};

use super::backend::{ConnectionPool, RealConnection, RedisConnection};
use crate::config::RedisConfig;
use crate::error::{Result, StoreError};

pub struct ConnectionSource {
    pool: Pool,
    pub connect_timeout: Duration,
    pub socket_timeout: Duration,
}

impl ConnectionSource {
    pub fn new(config: &RedisConfig) -> Result<Self> {
        let mut cfg = DeadpoolConfig::from_url(config.url());
        cfg.pool = Some(deadpool_redis::PoolConfig {
            max_size: config.max_conn.max(config.min_conn).max(1),
            ..Default::default()
        });
        let pool = cfg
            .create_pool(Some(Runtime::Tokio1))
            .map_err(|e| StoreError::Internal(format!("failed to build connection pool: {e}")))?;

        Ok(Self {
            pool,
            connect_timeout: Duration::from_millis(config.connect_timeout_millis),
            socket_timeout: Duration::from_millis(config.socket_timeout_millis),
        })
    }

    /// Borrow a pooled connection, scoped to the returned guard's lifetime.
    pub async fn acquire_raw(&self) -> Result<deadpool_redis::Connection> {
        tokio::time::timeout(self.connect_timeout, self.pool.get())
            .await
            .map_err(|_| StoreError::Internal("timed out acquiring a pooled connection".into()))?
            .map_err(StoreError::from)
    }
}

#[async_trait]
impl ConnectionPool for ConnectionSource {
    async fn acquire(&self) -> Result<Box<dyn RedisConnection>> {
        let conn = self.acquire_raw().await?;
        Ok(Box::new(RealConnection::new(conn)))
    }
}
