//! The primitive redis-shaped operations the Store and Query engines are
//! written against, and the real implementation over a pooled connection.
//!
//! Splitting this out behind a trait (rather than calling the `redis` crate
//! directly from `store.rs`/`query.rs`) is what lets the engines be
//! exercised in tests without a live Redis server -- see
//! `storage::testing` for the in-memory stand-in.

use async_trait::async_trait;
use std::collections::HashMap;

use crate::error::{Result, StoreError};

/// One write inside a pipeline or an optimistic (WATCH/MULTI/EXEC)
/// transaction.
#[derive(Debug, Clone)]
pub enum PipelineOp {
    HsetMultiple {
        key: String,
        fields: Vec<(String, String)>,
    },
    Rpush {
        key: String,
        value: String,
    },
    Lrem {
        key: String,
        value: String,
    },
    Del {
        key: String,
    },
}

/// The reply to one op inside an executed transaction, narrowed to the two
/// shapes the store engine ever needs to inspect.
#[derive(Debug, Clone, PartialEq)]
pub enum ExecReply {
    Ok,
    Int(i64),
}

impl ExecReply {
    pub fn is_ok_status(&self) -> bool {
        matches!(self, ExecReply::Ok)
    }

    pub fn is_nonzero_count(&self) -> bool {
        matches!(self, ExecReply::Int(n) if *n != 0)
    }
}

/// A single borrowed connection to the backing store, carrying enough state
/// to support a WATCH/MULTI/EXEC optimistic transaction across calls.
#[async_trait]
pub trait RedisConnection: Send {
    async fn hgetall(&mut self, key: &str) -> Result<HashMap<String, String>>;
    async fn exists(&mut self, key: &str) -> Result<bool>;
    async fn del(&mut self, key: &str) -> Result<i64>;
    async fn rpush(&mut self, key: &str, value: &str) -> Result<i64>;
    async fn lrem(&mut self, key: &str, value: &str) -> Result<i64>;
    async fn llen(&mut self, key: &str) -> Result<i64>;
    async fn lrange(&mut self, key: &str, start: i64, stop: i64) -> Result<Vec<String>>;
    async fn scan(&mut self, cursor: &str, pattern: &str, count: usize) -> Result<(String, Vec<String>)>;
    async fn hset_multiple(&mut self, key: &str, fields: Vec<(String, String)>) -> Result<()>;

    /// Batched, non-atomic submission: commands run in order, no rollback.
    async fn pipeline(&mut self, ops: Vec<PipelineOp>) -> Result<()>;

    /// WATCH a key on this connection.
    async fn watch(&mut self, key: &str) -> Result<()>;
    /// Clear any WATCHes on this connection.
    async fn unwatch(&mut self) -> Result<()>;
    /// MULTI/EXEC: `None` if a watched key changed since `watch()`,
    /// `Some(replies)` in submission order otherwise.
    async fn exec_atomic(&mut self, ops: Vec<PipelineOp>) -> Result<Option<Vec<ExecReply>>>;
}

/// Source of borrowed connections. Implemented by `ConnectionSource` (pool.rs)
/// for production and by the test support's `FakeConnectionPool`.
#[async_trait]
pub trait ConnectionPool: Send + Sync {
    async fn acquire(&self) -> Result<Box<dyn RedisConnection>>;
}

pub struct RealConnection {
    conn: deadpool_redis::Connection,
}

impl RealConnection {
    pub fn new(conn: deadpool_redis::Connection) -> Self {
        Self { conn }
    }

    fn build_pipeline(ops: &[PipelineOp], atomic: bool) -> redis::Pipeline {
        let mut pipe = redis::pipe();
        if atomic {
            pipe.atomic();
        }
        for op in ops {
            match op {
                PipelineOp::HsetMultiple { key, fields } => {
                    let mut cmd = redis::cmd("HMSET");
                    cmd.arg(key);
                    for (field, value) in fields {
                        cmd.arg(field).arg(value);
                    }
                    pipe.add_command(cmd);
                }
                PipelineOp::Rpush { key, value } => {
                    pipe.rpush(key, value);
                }
                PipelineOp::Lrem { key, value } => {
                    // count=0 removes all occurrences equal to value; I1
                    // guarantees at most one is ever present.
                    pipe.lrem(key, 0, value);
                }
                PipelineOp::Del { key } => {
                    pipe.del(key);
                }
            }
        }
        pipe
    }

    fn value_to_exec_reply(value: &redis::Value) -> Result<ExecReply> {
        match value {
            redis::Value::Okay => Ok(ExecReply::Ok),
            redis::Value::Int(n) => Ok(ExecReply::Int(*n)),
            other => Err(StoreError::Internal(format!(
                "unexpected reply shape in transaction: {:?}",
                other
            ))),
        }
    }
}

#[async_trait]
impl RedisConnection for RealConnection {
    async fn hgetall(&mut self, key: &str) -> Result<HashMap<String, String>> {
        let map: HashMap<String, String> = redis::cmd("HGETALL")
            .arg(key)
            .query_async(&mut self.conn)
            .await?;
        Ok(map)
    }

    async fn exists(&mut self, key: &str) -> Result<bool> {
        let exists: bool = redis::cmd("EXISTS").arg(key).query_async(&mut self.conn).await?;
        Ok(exists)
    }

    async fn del(&mut self, key: &str) -> Result<i64> {
        let n: i64 = redis::cmd("DEL").arg(key).query_async(&mut self.conn).await?;
        Ok(n)
    }

    async fn rpush(&mut self, key: &str, value: &str) -> Result<i64> {
        let n: i64 = redis::cmd("RPUSH").arg(key).arg(value).query_async(&mut self.conn).await?;
        Ok(n)
    }

    async fn lrem(&mut self, key: &str, value: &str) -> Result<i64> {
        let n: i64 = redis::cmd("LREM")
            .arg(key)
            .arg(0)
            .arg(value)
            .query_async(&mut self.conn)
            .await?;
        Ok(n)
    }

    async fn llen(&mut self, key: &str) -> Result<i64> {
        let n: i64 = redis::cmd("LLEN").arg(key).query_async(&mut self.conn).await?;
        Ok(n)
    }

    async fn lrange(&mut self, key: &str, start: i64, stop: i64) -> Result<Vec<String>> {
        let values: Vec<String> = redis::cmd("LRANGE")
            .arg(key)
            .arg(start)
            .arg(stop)
            .query_async(&mut self.conn)
            .await?;
        Ok(values)
    }

    async fn scan(&mut self, cursor: &str, pattern: &str, count: usize) -> Result<(String, Vec<String>)> {
        let (next_cursor, keys): (String, Vec<String>) = redis::cmd("SCAN")
            .arg(cursor)
            .arg("MATCH")
            .arg(pattern)
            .arg("COUNT")
            .arg(count)
            .query_async(&mut self.conn)
            .await?;
        Ok((next_cursor, keys))
    }

    async fn hset_multiple(&mut self, key: &str, fields: Vec<(String, String)>) -> Result<()> {
        let mut cmd = redis::cmd("HMSET");
        cmd.arg(key);
        for (field, value) in fields {
            cmd.arg(field).arg(value);
        }
        let _: () = cmd.query_async(&mut self.conn).await?;
        Ok(())
    }

    async fn pipeline(&mut self, ops: Vec<PipelineOp>) -> Result<()> {
        let pipe = Self::build_pipeline(&ops, false);
        let _: () = pipe.query_async(&mut self.conn).await?;
        Ok(())
    }

    async fn watch(&mut self, key: &str) -> Result<()> {
        let _: () = redis::cmd("WATCH").arg(key).query_async(&mut self.conn).await?;
        Ok(())
    }

    async fn unwatch(&mut self) -> Result<()> {
        let _: () = redis::cmd("UNWATCH").query_async(&mut self.conn).await?;
        Ok(())
    }

    async fn exec_atomic(&mut self, ops: Vec<PipelineOp>) -> Result<Option<Vec<ExecReply>>> {
        let pipe = Self::build_pipeline(&ops, true);
        let raw: Option<Vec<redis::Value>> = pipe.query_async(&mut self.conn).await?;
        match raw {
            None => Ok(None),
            Some(values) => {
                let replies = values
                    .iter()
                    .map(Self::value_to_exec_reply)
                    .collect::<Result<Vec<_>>>()?;
                Ok(Some(replies))
            }
        }
    }
}
