//! An in-memory stand-in for the Redis-shaped `ConnectionPool`/`RedisConnection`
//! traits, used by the crate's own unit tests and exported so the
//! `tests/` integration suite can exercise the Store and Query engines
//! without a live Redis server.
//!
//! This is a test double, not a second production backend: it models just
//! enough of hash/list/WATCH-MULTI-EXEC semantics to make the store's
//! concurrency-sensitive behavior meaningful to test, nothing more.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use super::backend::{ConnectionPool, ExecReply, PipelineOp, RedisConnection};
use crate::error::Result;

#[derive(Debug, Clone)]
enum FakeValue {
    Hash(HashMap<String, String>),
    List(VecDeque<String>),
}

#[derive(Default)]
struct FakeState {
    data: HashMap<String, FakeValue>,
    versions: HashMap<String, u64>,
}

impl FakeState {
    fn bump(&mut self, key: &str) {
        *self.versions.entry(key.to_string()).or_insert(0) += 1;
    }

    fn version_of(&self, key: &str) -> u64 {
        self.versions.get(key).copied().unwrap_or(0)
    }

    fn apply(&mut self, op: &PipelineOp) -> ExecReply {
        match op {
            PipelineOp::HsetMultiple { key, fields } => {
                let entry = self
                    .data
                    .entry(key.clone())
                    .or_insert_with(|| FakeValue::Hash(HashMap::new()));
                if let FakeValue::Hash(map) = entry {
                    for (field, value) in fields {
                        map.insert(field.clone(), value.clone());
                    }
                }
                self.bump(key);
                ExecReply::Ok
            }
            PipelineOp::Rpush { key, value } => {
                let entry = self
                    .data
                    .entry(key.clone())
                    .or_insert_with(|| FakeValue::List(VecDeque::new()));
                let len = if let FakeValue::List(list) = entry {
                    list.push_back(value.clone());
                    list.len() as i64
                } else {
                    0
                };
                self.bump(key);
                ExecReply::Int(len)
            }
            PipelineOp::Lrem { key, value } => {
                let removed = if let Some(FakeValue::List(list)) = self.data.get_mut(key) {
                    let before = list.len();
                    list.retain(|v| v != value);
                    (before - list.len()) as i64
                } else {
                    0
                };
                self.bump(key);
                ExecReply::Int(removed)
            }
            PipelineOp::Del { key } => {
                let removed = self.data.remove(key).is_some();
                self.bump(key);
                ExecReply::Int(if removed { 1 } else { 0 })
            }
        }
    }
}

fn key_matches(pattern: &str, key: &str) -> bool {
    match pattern.strip_suffix('*') {
        Some(prefix) => key.starts_with(prefix),
        None => key == pattern,
    }
}

pub struct FakeConnectionPool {
    shared: Arc<Mutex<FakeState>>,
}

impl FakeConnectionPool {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            shared: Arc::new(Mutex::new(FakeState::default())),
        })
    }
}

#[async_trait]
impl ConnectionPool for FakeConnectionPool {
    async fn acquire(&self) -> Result<Box<dyn RedisConnection>> {
        Ok(Box::new(FakeRedisConnection {
            shared: self.shared.clone(),
            watched: Vec::new(),
        }))
    }
}

pub struct FakeRedisConnection {
    shared: Arc<Mutex<FakeState>>,
    watched: Vec<(String, u64)>,
}

#[async_trait]
impl RedisConnection for FakeRedisConnection {
    async fn hgetall(&mut self, key: &str) -> Result<HashMap<String, String>> {
        let state = self.shared.lock().await;
        Ok(match state.data.get(key) {
            Some(FakeValue::Hash(map)) => map.clone(),
            _ => HashMap::new(),
        })
    }

    async fn exists(&mut self, key: &str) -> Result<bool> {
        let state = self.shared.lock().await;
        Ok(state.data.contains_key(key))
    }

    async fn del(&mut self, key: &str) -> Result<i64> {
        let mut state = self.shared.lock().await;
        let removed = state.data.remove(key).is_some();
        state.bump(key);
        Ok(if removed { 1 } else { 0 })
    }

    async fn rpush(&mut self, key: &str, value: &str) -> Result<i64> {
        let mut state = self.shared.lock().await;
        let op = PipelineOp::Rpush {
            key: key.to_string(),
            value: value.to_string(),
        };
        Ok(match state.apply(&op) {
            ExecReply::Int(n) => n,
            _ => 0,
        })
    }

    async fn lrem(&mut self, key: &str, value: &str) -> Result<i64> {
        let mut state = self.shared.lock().await;
        let op = PipelineOp::Lrem {
            key: key.to_string(),
            value: value.to_string(),
        };
        Ok(match state.apply(&op) {
            ExecReply::Int(n) => n,
            _ => 0,
        })
    }

    async fn llen(&mut self, key: &str) -> Result<i64> {
        let state = self.shared.lock().await;
        Ok(match state.data.get(key) {
            Some(FakeValue::List(list)) => list.len() as i64,
            _ => 0,
        })
    }

    async fn lrange(&mut self, key: &str, start: i64, stop: i64) -> Result<Vec<String>> {
        let state = self.shared.lock().await;
        let list = match state.data.get(key) {
            Some(FakeValue::List(list)) => list.clone(),
            _ => return Ok(Vec::new()),
        };
        let len = list.len() as i64;
        if len == 0 {
            return Ok(Vec::new());
        }
        let norm = |i: i64| -> i64 {
            if i < 0 {
                (len + i).max(0)
            } else {
                i
            }
        };
        let start = norm(start).min(len - 1).max(0);
        let stop = norm(stop).min(len - 1);
        if stop < start {
            return Ok(Vec::new());
        }
        Ok(list
            .iter()
            .skip(start as usize)
            .take((stop - start + 1) as usize)
            .cloned()
            .collect())
    }

    async fn scan(&mut self, cursor: &str, pattern: &str, count: usize) -> Result<(String, Vec<String>)> {
        let state = self.shared.lock().await;
        let mut matching: Vec<String> = state
            .data
            .keys()
            .filter(|k| key_matches(pattern, k))
            .cloned()
            .collect();
        matching.sort();

        let offset: usize = cursor.parse().unwrap_or(0);
        if offset >= matching.len() {
            return Ok(("0".to_string(), Vec::new()));
        }
        let end = (offset + count).min(matching.len());
        let batch = matching[offset..end].to_vec();
        let next_cursor = if end >= matching.len() {
            "0".to_string()
        } else {
            end.to_string()
        };
        Ok((next_cursor, batch))
    }

    async fn hset_multiple(&mut self, key: &str, fields: Vec<(String, String)>) -> Result<()> {
        let mut state = self.shared.lock().await;
        state.apply(&PipelineOp::HsetMultiple {
            key: key.to_string(),
            fields,
        });
        Ok(())
    }

    async fn pipeline(&mut self, ops: Vec<PipelineOp>) -> Result<()> {
        let mut state = self.shared.lock().await;
        for op in &ops {
            state.apply(op);
        }
        Ok(())
    }

    async fn watch(&mut self, key: &str) -> Result<()> {
        let state = self.shared.lock().await;
        self.watched.push((key.to_string(), state.version_of(key)));
        Ok(())
    }

    async fn unwatch(&mut self) -> Result<()> {
        self.watched.clear();
        Ok(())
    }

    async fn exec_atomic(&mut self, ops: Vec<PipelineOp>) -> Result<Option<Vec<ExecReply>>> {
        let mut state = self.shared.lock().await;
        let aborted = self
            .watched
            .iter()
            .any(|(key, version)| state.version_of(key) != *version);
        self.watched.clear();
        if aborted {
            return Ok(None);
        }
        let replies = ops.iter().map(|op| state.apply(op)).collect();
        Ok(Some(replies))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn watch_aborts_on_concurrent_mutation() {
        let pool = FakeConnectionPool::new();
        let mut writer = pool.acquire().await.unwrap();
        writer
            .hset_multiple("k", vec![("a".into(), "1".into())])
            .await
            .unwrap();

        let mut reader = pool.acquire().await.unwrap();
        reader.watch("k").await.unwrap();

        // A concurrent peer mutates the watched key before EXEC.
        writer
            .hset_multiple("k", vec![("a".into(), "2".into())])
            .await
            .unwrap();

        let result = reader
            .exec_atomic(vec![PipelineOp::HsetMultiple {
                key: "k".to_string(),
                fields: vec![("a".to_string(), "3".to_string())],
            }])
            .await
            .unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn exec_atomic_succeeds_when_unwatched_key_is_stable() {
        let pool = FakeConnectionPool::new();
        let mut conn = pool.acquire().await.unwrap();
        conn.hset_multiple("k", vec![("a".into(), "1".into())])
            .await
            .unwrap();
        conn.watch("k").await.unwrap();
        let result = conn
            .exec_atomic(vec![PipelineOp::HsetMultiple {
                key: "k".to_string(),
                fields: vec![("a".to_string(), "2".to_string())],
            }])
            .await
            .unwrap();
        assert!(result.is_some());
    }
}
