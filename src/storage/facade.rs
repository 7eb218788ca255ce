//! SessionStore: the facade the coordinator actually calls, combining the
//! Store Engine (writes) and Query Engine (reads) behind the operation set
//! named in the store's external-interface contract.

use std::sync::Arc;

use super::backend::ConnectionPool;
use super::model::{BranchRecord, GlobalStatus, SessionAggregate, SessionQuery, WriteRequest};
use super::query::QueryEngine;
use super::store::StoreEngine;
use crate::error::Result;

pub struct SessionStore {
    pool: Arc<dyn ConnectionPool>,
    store: StoreEngine,
    query: QueryEngine,
}

impl SessionStore {
    pub fn new(pool: Arc<dyn ConnectionPool>, query_limit: usize) -> Self {
        Self {
            store: StoreEngine::new(pool.clone()),
            query: QueryEngine::new(pool.clone(), query_limit),
            pool,
        }
    }

    /// The connection source this store was built on, for collaborators
    /// (the recovery scan) that need to talk to the backing store directly.
    pub fn pool(&self) -> Arc<dyn ConnectionPool> {
        self.pool.clone()
    }

    pub async fn write_session(&self, request: WriteRequest) -> Result<bool> {
        self.store.write_session(request).await
    }

    pub async fn read_session(&self, xid: &str, with_branches: bool) -> Result<Option<SessionAggregate>> {
        self.query.read_by_xid(xid, with_branches).await
    }

    /// `readSession(xid)` shorthand for `readSession(xid, true)`.
    pub async fn read_session_with_branches(&self, xid: &str) -> Result<Option<SessionAggregate>> {
        self.read_session(xid, true).await
    }

    pub async fn read_session_by(
        &self,
        condition: SessionQuery,
        with_branches: bool,
    ) -> Result<Vec<SessionAggregate>> {
        match condition {
            SessionQuery::Xid(xid) => Ok(self
                .query
                .read_by_xid(&xid, with_branches)
                .await?
                .into_iter()
                .collect()),
            SessionQuery::TransactionId(tid) => Ok(self
                .query
                .read_by_transaction_id(tid, with_branches)
                .await?
                .into_iter()
                .collect()),
            SessionQuery::Status(status) => self.query.read_by_status(&[status], with_branches).await,
            SessionQuery::Statuses(statuses) => self.query.read_by_status(&statuses, with_branches).await,
        }
    }

    pub async fn read_session_status_by_page(
        &self,
        status: GlobalStatus,
        page_num: usize,
        page_size: usize,
        with_branches: bool,
    ) -> Result<Vec<SessionAggregate>> {
        self.query
            .read_by_status_paged(status, page_num, page_size, with_branches)
            .await
    }

    pub async fn find_branch_session_by_xid(&self, xid: &str) -> Result<Vec<BranchRecord>> {
        self.query.read_branches_by_xid(xid).await
    }

    pub async fn find_global_session_by_page(
        &self,
        page_num: usize,
        page_size: usize,
        with_branches: bool,
    ) -> Result<Vec<SessionAggregate>> {
        self.query.find_globals_by_page(page_num, page_size, with_branches).await
    }

    pub async fn count_by_global_sessions(&self, statuses: &[GlobalStatus]) -> Result<i64> {
        self.query.count_by_status(statuses).await
    }
}
