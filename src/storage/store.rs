//! Store Engine: applies a `WriteRequest` against the backing store.
//!
//! Writes that only touch one key (`BranchUpdate`) use a plain HMSET. Writes
//! that touch a hash and a status index together (`GlobalAdd`, `GlobalRemove`,
//! `BranchAdd`, `BranchRemove`) use a non-atomic pipeline -- partial failure
//! there is a transport error, not a split-brain write, since both commands
//! are submitted in the same round trip. Only `GlobalUpdate` needs the full
//! WATCH/MULTI/EXEC protocol, because it is the one write racing against
//! concurrent peers advancing the same global transaction's status.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use tracing::warn;

use super::backend::{ConnectionPool, ExecReply, PipelineOp, RedisConnection};
use super::codec;
use super::keys;
use super::model::{self, GlobalStatus, WriteRequest};
use crate::error::{Result, StoreError};

fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

fn transaction_id_or_err(xid: &str) -> Result<i64> {
    model::transaction_id_from_xid(xid)
        .ok_or_else(|| StoreError::InvalidArgument(format!("malformed xid: {xid}")))
}

pub struct StoreEngine {
    pool: Arc<dyn ConnectionPool>,
}

impl StoreEngine {
    pub fn new(pool: Arc<dyn ConnectionPool>) -> Self {
        Self { pool }
    }

    /// Apply one write. The tagged union is matched exhaustively, so there is
    /// no "unknown kind" case to reject at runtime -- the compiler rejects it.
    pub async fn write_session(&self, request: WriteRequest) -> Result<bool> {
        match request {
            WriteRequest::GlobalAdd(record) => self.global_add(record).await,
            WriteRequest::GlobalUpdate { xid, new_status } => self.global_update(&xid, new_status).await,
            WriteRequest::GlobalRemove { xid, status } => self.global_remove(&xid, status).await,
            WriteRequest::BranchAdd(record) => self.branch_add(record).await,
            WriteRequest::BranchUpdate {
                branch_id,
                new_status,
                application_data,
            } => self.branch_update(branch_id, new_status, application_data).await,
            WriteRequest::BranchRemove { branch_id } => self.branch_remove(branch_id).await,
        }
    }

    async fn global_add(&self, mut record: model::GlobalRecord) -> Result<bool> {
        let now = now_millis();
        record.gmt_create = now;
        record.gmt_modified = now;

        let hash_key = keys::global_key(record.transaction_id);
        let status_key = keys::status_key(record.status.into());
        let fields: Vec<(String, String)> = codec::encode_global(&record).into_iter().collect();

        let mut conn = self.pool.acquire().await?;
        conn.pipeline(vec![
            PipelineOp::HsetMultiple {
                key: hash_key,
                fields,
            },
            PipelineOp::Rpush {
                key: status_key,
                value: record.xid,
            },
        ])
        .await?;
        Ok(true)
    }

    async fn global_remove(&self, xid: &str, status: GlobalStatus) -> Result<bool> {
        let tid = transaction_id_or_err(xid)?;
        let hash_key = keys::global_key(tid);

        let mut conn = self.pool.acquire().await?;
        let map = conn.hgetall(&hash_key).await?;
        if !map.contains_key("xid") {
            return Ok(true);
        }

        let status_key = keys::status_key(status.into());
        conn.pipeline(vec![
            PipelineOp::Lrem {
                key: status_key,
                value: xid.to_string(),
            },
            PipelineOp::Del { key: hash_key },
        ])
        .await?;
        Ok(true)
    }

    /// WATCH the global hash, re-read it, and attempt a MULTI/EXEC that
    /// flips its status field and moves its xid between the two status
    /// index lists. A lost race (`EXEC` returns `None`) means a concurrent
    /// peer drove the transaction forward first -- counted as success, not
    /// failure. A landed-but-partial write is repaired by compensation.
    async fn global_update(&self, xid: &str, new_status: GlobalStatus) -> Result<bool> {
        let tid = transaction_id_or_err(xid)?;
        let hash_key = keys::global_key(tid);

        let mut conn = self.pool.acquire().await?;
        conn.watch(&hash_key).await?;

        let map = conn.hgetall(&hash_key).await?;
        let current_status_str = match map.get("status") {
            Some(s) => s.clone(),
            None => {
                conn.unwatch().await?;
                return Err(StoreError::NotFound(xid.to_string()));
            }
        };
        let current_status_code: i32 = current_status_str
            .parse()
            .map_err(|_| StoreError::Internal(format!("corrupt status field for {xid}")))?;

        if current_status_code == i32::from(new_status) {
            conn.unwatch().await?;
            return Ok(true);
        }

        let now = now_millis();
        let old_status_key = keys::status_key(current_status_code);
        let new_status_key = keys::status_key(new_status.into());

        let ops = vec![
            PipelineOp::HsetMultiple {
                key: hash_key.clone(),
                fields: vec![
                    ("status".to_string(), i32::from(new_status).to_string()),
                    ("gmtModified".to_string(), now.to_string()),
                ],
            },
            PipelineOp::Lrem {
                key: old_status_key.clone(),
                value: xid.to_string(),
            },
            PipelineOp::Rpush {
                key: new_status_key.clone(),
                value: xid.to_string(),
            },
        ];

        match conn.exec_atomic(ops).await? {
            None => Ok(true),
            Some(replies) => {
                let hash_ok = replies.first().map(ExecReply::is_ok_status).unwrap_or(false);
                let lrem_ok = replies.get(1).map(ExecReply::is_nonzero_count).unwrap_or(false);
                let rpush_ok = replies.get(2).map(ExecReply::is_nonzero_count).unwrap_or(false);

                if hash_ok && lrem_ok && rpush_ok {
                    return Ok(true);
                }

                self.compensate_global_update(
                    &mut *conn,
                    &hash_key,
                    &current_status_str,
                    map.get("gmtModified").cloned().unwrap_or_default(),
                    &old_status_key,
                    &new_status_key,
                    xid,
                    hash_ok,
                    lrem_ok,
                    rpush_ok,
                )
                .await?;
                Ok(false)
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn compensate_global_update(
        &self,
        conn: &mut dyn RedisConnection,
        hash_key: &str,
        prior_status: &str,
        prior_gmt_modified: String,
        old_status_key: &str,
        new_status_key: &str,
        xid: &str,
        hash_ok: bool,
        lrem_ok: bool,
        rpush_ok: bool,
    ) -> Result<()> {
        if hash_ok && !(lrem_ok && rpush_ok) {
            conn.watch(hash_key).await?;
            let current = conn.hgetall(hash_key).await?;
            if current.contains_key("xid") {
                let _ = conn
                    .exec_atomic(vec![PipelineOp::HsetMultiple {
                        key: hash_key.to_string(),
                        fields: vec![
                            ("status".to_string(), prior_status.to_string()),
                            ("gmtModified".to_string(), prior_gmt_modified),
                        ],
                    }])
                    .await?;
            } else {
                conn.unwatch().await?;
            }
        }
        if lrem_ok {
            conn.rpush(old_status_key, xid).await?;
        }
        if rpush_ok {
            conn.lrem(new_status_key, xid).await?;
        }
        warn!(xid, "compensated a partially applied global status update");
        Ok(())
    }

    async fn branch_add(&self, mut record: model::BranchRecord) -> Result<bool> {
        let now = now_millis();
        record.gmt_create = now;
        record.gmt_modified = now;

        let hash_key = keys::branch_key(record.branch_id);
        let list_key = keys::branches_key(&record.xid);
        let fields: Vec<(String, String)> = codec::encode_branch(&record).into_iter().collect();

        let mut conn = self.pool.acquire().await?;
        conn.pipeline(vec![
            PipelineOp::HsetMultiple {
                key: hash_key.clone(),
                fields,
            },
            PipelineOp::Rpush {
                key: list_key,
                value: hash_key,
            },
        ])
        .await?;
        Ok(true)
    }

    async fn branch_remove(&self, branch_id: i64) -> Result<bool> {
        let hash_key = keys::branch_key(branch_id);

        let mut conn = self.pool.acquire().await?;
        let map = conn.hgetall(&hash_key).await?;
        let xid = match map.get("xid") {
            Some(xid) => xid.clone(),
            None => return Ok(true),
        };

        let list_key = keys::branches_key(&xid);
        conn.pipeline(vec![
            PipelineOp::Lrem {
                key: list_key,
                value: hash_key.clone(),
            },
            PipelineOp::Del { key: hash_key },
        ])
        .await?;
        Ok(true)
    }

    async fn branch_update(
        &self,
        branch_id: i64,
        new_status: model::BranchStatus,
        application_data: Option<String>,
    ) -> Result<bool> {
        let hash_key = keys::branch_key(branch_id);

        let mut conn = self.pool.acquire().await?;
        let map = conn.hgetall(&hash_key).await?;
        if !map.contains_key("xid") {
            return Err(StoreError::NotFound(format!("branch {branch_id}")));
        }

        let now = now_millis();
        let mut fields = vec![
            ("status".to_string(), new_status.to_string()),
            ("gmtModified".to_string(), now.to_string()),
        ];
        if let Some(data) = application_data {
            fields.push(("applicationData".to_string(), data));
        }
        conn.hset_multiple(&hash_key, fields).await?;
        Ok(true)
    }
}
