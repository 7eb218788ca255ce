//! Cross-module integration tests exercising the whole write/query surface
//! through the public `SessionStore` facade against the in-memory fake
//! backing store, run without a live Redis server.

use txn_session_store::storage::model::{
    BranchRecord, BranchType, GlobalRecord, GlobalStatus, SessionQuery, WriteRequest,
};
use txn_session_store::storage::testing::FakeConnectionPool;
use txn_session_store::storage::SessionStore;

fn global(xid: &str, tid: i64, status: GlobalStatus) -> GlobalRecord {
    GlobalRecord {
        xid: xid.to_string(),
        transaction_id: tid,
        status,
        application_id: "order-service".to_string(),
        service_group: "my_tx_group".to_string(),
        tx_name: "create-order".to_string(),
        timeout: 60_000,
        begin_time: 1_700_000_000_000,
        application_data: None,
        gmt_create: 0,
        gmt_modified: 0,
    }
}

fn branch(branch_id: i64, xid: &str) -> BranchRecord {
    BranchRecord {
        branch_id,
        xid: xid.to_string(),
        resource_group_id: "my_group".to_string(),
        resource_id: "jdbc:mysql://localhost/db".to_string(),
        client_id: "client-1".to_string(),
        branch_type: BranchType::AT,
        status: 1,
        application_data: None,
        gmt_create: 0,
        gmt_modified: 0,
    }
}

fn new_store() -> SessionStore {
    SessionStore::new(FakeConnectionPool::new(), 100)
}

#[tokio::test]
async fn insert_and_read_global() {
    let store = new_store();
    let xid = "1.1.1.1:8091:10";
    store
        .write_session(WriteRequest::GlobalAdd(global(xid, 10, GlobalStatus::Begin)))
        .await
        .unwrap();

    let found = store.read_session(xid, false).await.unwrap().unwrap();
    assert_eq!(found.global.xid, xid);
    assert_eq!(found.global.status, GlobalStatus::Begin);
    assert!(found.branches.is_empty());
}

#[tokio::test]
async fn update_moves_status_index_and_bumps_gmt_modified() {
    let store = new_store();
    let xid = "1.1.1.1:8091:10";
    store
        .write_session(WriteRequest::GlobalAdd(global(xid, 10, GlobalStatus::Begin)))
        .await
        .unwrap();
    let before = store.read_session(xid, false).await.unwrap().unwrap();

    store
        .write_session(WriteRequest::GlobalUpdate {
            xid: xid.to_string(),
            new_status: GlobalStatus::Committing,
        })
        .await
        .unwrap();

    let after = store.read_session(xid, false).await.unwrap().unwrap();
    assert_eq!(after.global.status, GlobalStatus::Committing);
    assert!(after.global.gmt_modified >= before.global.gmt_modified);

    let begin_count = store.count_by_global_sessions(&[GlobalStatus::Begin]).await.unwrap();
    let committing_count = store
        .count_by_global_sessions(&[GlobalStatus::Committing])
        .await
        .unwrap();
    assert_eq!(begin_count, 0);
    assert_eq!(committing_count, 1);
}

/// Updating a global to its own current status is a no-op.
#[tokio::test]
async fn idempotent_update_to_same_status_leaves_record_unchanged() {
    let store = new_store();
    let xid = "1.1.1.1:8091:10";
    store
        .write_session(WriteRequest::GlobalAdd(global(xid, 10, GlobalStatus::Begin)))
        .await
        .unwrap();
    let before = store.read_session(xid, false).await.unwrap().unwrap();

    let ok = store
        .write_session(WriteRequest::GlobalUpdate {
            xid: xid.to_string(),
            new_status: GlobalStatus::Begin,
        })
        .await
        .unwrap();
    assert!(ok);

    let after = store.read_session(xid, false).await.unwrap().unwrap();
    assert_eq!(before, after);
}

/// Insert/read/delete round trip.
#[tokio::test]
async fn insert_delete_round_trip() {
    let store = new_store();
    let xid = "1.1.1.1:8091:10";
    store
        .write_session(WriteRequest::GlobalAdd(global(xid, 10, GlobalStatus::Begin)))
        .await
        .unwrap();
    assert!(store.read_session(xid, false).await.unwrap().is_some());

    store
        .write_session(WriteRequest::GlobalRemove {
            xid: xid.to_string(),
            status: GlobalStatus::Begin,
        })
        .await
        .unwrap();
    assert!(store.read_session(xid, false).await.unwrap().is_none());
}

/// Branches read back sorted by branchId ascending regardless of
/// insertion order.
#[tokio::test]
async fn branch_lifecycle_and_ordering() {
    let store = new_store();
    let xid = "1.1.1.1:8091:10";
    store
        .write_session(WriteRequest::GlobalAdd(global(xid, 10, GlobalStatus::Begin)))
        .await
        .unwrap();
    store
        .write_session(WriteRequest::BranchAdd(branch(101, xid)))
        .await
        .unwrap();
    store
        .write_session(WriteRequest::BranchAdd(branch(100, xid)))
        .await
        .unwrap();

    let found = store.read_session(xid, true).await.unwrap().unwrap();
    let ids: Vec<i64> = found.branches.iter().map(|b| b.branch_id).collect();
    assert_eq!(ids, vec![100, 101]);

    store
        .write_session(WriteRequest::BranchRemove { branch_id: 100 })
        .await
        .unwrap();
    let remaining = store.find_branch_session_by_xid(xid).await.unwrap();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].branch_id, 101);
}

/// Status query limit clamps per-status, and count matches the status list length.
#[tokio::test]
async fn status_query_respects_limit_and_count_matches() {
    let store = new_store();
    for tid in 1..=5 {
        let xid = format!("1.1.1.1:8091:{tid}");
        store
            .write_session(WriteRequest::GlobalAdd(global(&xid, tid, GlobalStatus::Begin)))
            .await
            .unwrap();
    }

    let results = store
        .read_session_by(SessionQuery::Statuses(vec![GlobalStatus::Begin]), false)
        .await
        .unwrap();
    assert_eq!(results.len(), 5);

    let count = store.count_by_global_sessions(&[GlobalStatus::Begin]).await.unwrap();
    assert_eq!(count, 5);
}

/// Concatenation of all pages of a status list equals the full list.
#[tokio::test]
async fn paged_status_query_covers_the_whole_list() {
    let store = new_store();
    for tid in 1..=7 {
        let xid = format!("1.1.1.1:8091:{tid}");
        store
            .write_session(WriteRequest::GlobalAdd(global(&xid, tid, GlobalStatus::Begin)))
            .await
            .unwrap();
    }

    let mut seen = Vec::new();
    for page in 1..=4 {
        let page_results = store
            .read_session_status_by_page(GlobalStatus::Begin, page, 2, false)
            .await
            .unwrap();
        seen.extend(page_results.into_iter().map(|a| a.global.transaction_id));
    }
    seen.sort();
    assert_eq!(seen, vec![1, 2, 3, 4, 5, 6, 7]);
}

/// A global scan page is exactly `pageSize` distinct aggregates, and
/// pagination terminates once every record is covered.
#[tokio::test]
async fn global_scan_pagination_covers_every_record_once() {
    let store = new_store();
    for tid in 1..=25 {
        let xid = format!("1.1.1.1:8091:{tid}");
        store
            .write_session(WriteRequest::GlobalAdd(global(&xid, tid, GlobalStatus::Begin)))
            .await
            .unwrap();
    }

    let mut collected = Vec::new();
    for page in 1..=3 {
        let page_results = store
            .find_global_session_by_page(page, 10, false)
            .await
            .unwrap();
        collected.extend(page_results.into_iter().map(|a| a.global.transaction_id));
    }
    collected.sort();
    let expected: Vec<i64> = (1..=25).collect();
    assert_eq!(collected, expected);
}

/// Two racing updates from different statuses both report success, and
/// the surviving status holds exactly the xid.
#[tokio::test]
async fn concurrent_contending_updates_both_succeed_with_single_final_status() {
    let store = new_store();
    let xid = "1.1.1.1:8091:10".to_string();
    store
        .write_session(WriteRequest::GlobalAdd(global(&xid, 10, GlobalStatus::Committing)))
        .await
        .unwrap();

    let ok_committed = store
        .write_session(WriteRequest::GlobalUpdate {
            xid: xid.clone(),
            new_status: GlobalStatus::Committed,
        })
        .await
        .unwrap();
    assert!(ok_committed);

    // A second peer racing to CommitFailed loses the race (the store moved
    // on already) but is still reported as success -- the only guarantee
    // owed here is that some transition happens.
    let ok_fail = store
        .write_session(WriteRequest::GlobalUpdate {
            xid: xid.clone(),
            new_status: GlobalStatus::CommitFailed,
        })
        .await
        .unwrap();
    assert!(ok_fail);

    let final_state = store.read_session(&xid, false).await.unwrap().unwrap();
    assert!(matches!(
        final_state.global.status,
        GlobalStatus::Committed | GlobalStatus::CommitFailed
    ));

    let committed_count = store.count_by_global_sessions(&[GlobalStatus::Committed]).await.unwrap();
    let failed_count = store
        .count_by_global_sessions(&[GlobalStatus::CommitFailed])
        .await
        .unwrap();
    assert_eq!(committed_count + failed_count, 1);
}

#[tokio::test]
async fn removing_a_missing_global_is_idempotent() {
    let store = new_store();
    let ok = store
        .write_session(WriteRequest::GlobalRemove {
            xid: "1.1.1.1:8091:404".to_string(),
            status: GlobalStatus::Begin,
        })
        .await
        .unwrap();
    assert!(ok);
}

#[tokio::test]
async fn updating_a_missing_global_is_not_found() {
    let store = new_store();
    let err = store
        .write_session(WriteRequest::GlobalUpdate {
            xid: "1.1.1.1:8091:404".to_string(),
            new_status: GlobalStatus::Committing,
        })
        .await
        .unwrap_err();
    assert!(matches!(err, txn_session_store::error::StoreError::NotFound(_)));
}
