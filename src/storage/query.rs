//! Query Engine: the read paths over the backing store.
//!
//! Every method borrows a fresh pooled connection per backing-store call
//! rather than threading one connection through a whole read -- simpler to
//! reason about than juggling a shared `&mut` across concurrent fan-out,
//! and the pool is cheap to borrow from (see `pool.rs`). Reads that can
//! safely run in parallel (status fan-out, branch hydration, page
//! hydration) do, via `futures_util::future::join_all`.

use std::collections::HashSet;
use std::sync::Arc;

use futures_util::future::join_all;

use super::backend::ConnectionPool;
use super::codec;
use super::keys;
use super::model::{self, BranchRecord, GlobalStatus, SessionAggregate};
use crate::error::{Result, StoreError};

/// `readBranchesByXid` pages through `branches:<xid>` in windows this wide
/// rather than one `LRANGE 0 -1`, so a pathologically large branch list
/// doesn't block the connection on one oversized reply.
const BRANCH_SCAN_WINDOW: i64 = 20;

/// `findGlobalsByPage`'s per-`SCAN` batch size.
const GLOBAL_SCAN_BATCH: usize = 100;

pub struct QueryEngine {
    pool: Arc<dyn ConnectionPool>,
    query_limit: usize,
}

impl QueryEngine {
    pub fn new(pool: Arc<dyn ConnectionPool>, query_limit: usize) -> Self {
        Self { pool, query_limit }
    }

    pub async fn read_by_xid(&self, xid: &str, with_branches: bool) -> Result<Option<SessionAggregate>> {
        let tid = model::transaction_id_from_xid(xid)
            .ok_or_else(|| StoreError::InvalidArgument(format!("malformed xid: {xid}")))?;
        self.read_by_transaction_id(tid, with_branches).await
    }

    pub async fn read_by_transaction_id(
        &self,
        transaction_id: i64,
        with_branches: bool,
    ) -> Result<Option<SessionAggregate>> {
        let map = {
            let mut conn = self.pool.acquire().await?;
            conn.hgetall(&keys::global_key(transaction_id)).await?
        };
        if map.is_empty() {
            return Ok(None);
        }
        let global = codec::decode_global(&map).map_err(StoreError::Internal)?;

        let branches = if with_branches {
            self.read_branches_by_xid(&global.xid).await?
        } else {
            Vec::new()
        };
        Ok(Some(SessionAggregate { global, branches }))
    }

    /// For N statuses, each `LRANGE` is capped to `max(1, queryLimit / N)`
    /// so a multi-status query never returns more than roughly `queryLimit`
    /// xids in total; the resulting lists are concatenated in per-status
    /// insertion order, one status block after another.
    pub async fn read_by_status(
        &self,
        statuses: &[GlobalStatus],
        with_branches: bool,
    ) -> Result<Vec<SessionAggregate>> {
        if statuses.is_empty() {
            return Ok(Vec::new());
        }
        let effective_limit = (self.query_limit / statuses.len()).max(1) as i64;

        let lists = join_all(statuses.iter().map(|status| {
            let pool = self.pool.clone();
            let status_key = keys::status_key((*status).into());
            async move {
                let mut conn = pool.acquire().await?;
                conn.lrange(&status_key, 0, effective_limit - 1).await
            }
        }))
        .await;

        let mut xids = Vec::new();
        for list in lists {
            xids.extend(list?);
        }
        self.hydrate_all(xids, with_branches).await
    }

    pub async fn read_by_status_paged(
        &self,
        status: GlobalStatus,
        page_num: usize,
        page_size: usize,
        with_branches: bool,
    ) -> Result<Vec<SessionAggregate>> {
        let page_num = page_num.max(1);
        let start = ((page_num - 1) * page_size) as i64;
        let end = (page_num * page_size).saturating_sub(1) as i64;

        let xids = {
            let mut conn = self.pool.acquire().await?;
            conn.lrange(&keys::status_key(status.into()), start, end).await?
        };
        self.hydrate_all(xids, with_branches).await
    }

    /// Cursor-scans `global:*` starting at `"0"` (a `SCAN` cursor is opaque,
    /// never a computed offset), accumulating *distinct* keys in the order
    /// encountered until it has enough to satisfy `(pageNum-1)*pageSize +
    /// pageSize` entries, or the cursor wraps back to `"0"` first -- whichever
    /// comes first. `SCAN` may repeat a key across batches; dedup via a set.
    pub async fn find_globals_by_page(
        &self,
        page_num: usize,
        page_size: usize,
        with_branches: bool,
    ) -> Result<Vec<SessionAggregate>> {
        if page_size == 0 {
            return Ok(Vec::new());
        }
        let page_num = page_num.max(1);
        let skip = (page_num - 1) * page_size;
        let needed = skip + page_size;

        let mut seen: HashSet<String> = HashSet::new();
        let mut ordered: Vec<String> = Vec::new();
        let mut cursor = "0".to_string();

        loop {
            let (next_cursor, batch) = {
                let mut conn = self.pool.acquire().await?;
                conn.scan(&cursor, keys::global_scan_pattern(), GLOBAL_SCAN_BATCH)
                    .await?
            };
            for key in batch {
                if seen.insert(key.clone()) {
                    ordered.push(key);
                }
            }
            cursor = next_cursor;
            if ordered.len() >= needed || cursor == "0" {
                break;
            }
        }

        let page_keys: Vec<i64> = ordered
            .into_iter()
            .skip(skip)
            .take(page_size)
            .filter_map(|key| key.strip_prefix(keys::GLOBAL_PREFIX).and_then(|s| s.parse().ok()))
            .collect();

        let aggregates = join_all(
            page_keys
                .into_iter()
                .map(|tid| self.read_by_transaction_id(tid, with_branches)),
        )
        .await;

        let mut result = Vec::new();
        for aggregate in aggregates {
            if let Some(agg) = aggregate? {
                result.push(agg);
            }
        }
        Ok(result)
    }

    pub async fn count_by_status(&self, statuses: &[GlobalStatus]) -> Result<i64> {
        let counts = join_all(statuses.iter().map(|status| {
            let pool = self.pool.clone();
            let status_key = keys::status_key((*status).into());
            async move {
                let mut conn = pool.acquire().await?;
                conn.llen(&status_key).await
            }
        }))
        .await;

        let mut total = 0i64;
        for count in counts {
            total += count?;
        }
        Ok(total)
    }

    /// Pages through `branches:<xid>` in fixed windows, then hydrates every
    /// branch hash concurrently. A branch hash that comes back empty was
    /// removed by a concurrent peer between the `LRANGE` and the `HGETALL`
    /// -- dropped rather than surfaced as an error. Sorted by `branchId`
    /// ascending for deterministic replay.
    pub async fn read_branches_by_xid(&self, xid: &str) -> Result<Vec<BranchRecord>> {
        let list_key = keys::branches_key(xid);
        let mut branch_keys = Vec::new();
        let mut start = 0i64;

        loop {
            let chunk = {
                let mut conn = self.pool.acquire().await?;
                conn.lrange(&list_key, start, start + BRANCH_SCAN_WINDOW - 1).await?
            };
            let chunk_len = chunk.len() as i64;
            branch_keys.extend(chunk);
            if chunk_len < BRANCH_SCAN_WINDOW {
                break;
            }
            start += BRANCH_SCAN_WINDOW;
        }

        let maps = join_all(branch_keys.into_iter().map(|branch_key| {
            let pool = self.pool.clone();
            async move {
                let mut conn = pool.acquire().await?;
                conn.hgetall(&branch_key).await
            }
        }))
        .await;

        let mut branches = Vec::new();
        for map in maps {
            let map = map?;
            if map.is_empty() {
                continue;
            }
            branches.push(codec::decode_branch(&map).map_err(StoreError::Internal)?);
        }
        branches.sort_by_key(|b| b.branch_id);
        Ok(branches)
    }

    async fn hydrate_all(&self, xids: Vec<String>, with_branches: bool) -> Result<Vec<SessionAggregate>> {
        let results = join_all(xids.iter().map(|xid| self.read_by_xid(xid, with_branches))).await;
        let mut aggregates = Vec::new();
        for result in results {
            if let Some(agg) = result? {
                aggregates.push(agg);
            }
        }
        Ok(aggregates)
    }
}
