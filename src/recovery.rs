//! Recovery scan: the coordinator's actual correctness mechanism for
//! the status index, as opposed to the best-effort compensation inside
//! `GLOBAL_UPDATE` (see `storage::store`). Iterates `global:*` and makes
//! each status-list membership agree with the record it describes:
//!
//! - a xid present in a status list that doesn't match its record's
//!   current `status` field is moved to the correct list;
//! - a xid present in a status list whose `global:<tid>` hash no longer
//!   exists (the record was deleted, but a crash mid-pipeline or a lost
//!   `GLOBAL_UPDATE` race left the index entry behind) is dropped;
//! - a record missing from its own status list (the other half of the
//!   same crash/race) is re-added.
//!
//! This is the coordinator's responsibility to schedule periodically; the
//! crate only exposes the scan itself plus an illustrative loop in
//! `main.rs`.

use std::collections::HashSet;

use tracing::{info, warn};

use crate::error::Result;
use crate::storage::codec;
use crate::storage::keys;
use crate::storage::model::GlobalStatus;
use crate::storage::SessionStore;

const SCAN_BATCH: usize = 100;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RecoveryReport {
    pub globals_scanned: usize,
    pub index_entries_repaired: usize,
    pub stray_entries_removed: usize,
}

pub async fn scan_and_repair(store: &SessionStore) -> Result<RecoveryReport> {
    let pool = store.pool();
    let mut report = RecoveryReport::default();

    let mut known_keys: HashSet<String> = HashSet::new();
    let mut known: Vec<(String, GlobalStatus)> = Vec::new();

    let mut cursor = "0".to_string();
    loop {
        let (next_cursor, batch) = {
            let mut conn = pool.acquire().await?;
            conn.scan(&cursor, keys::global_scan_pattern(), SCAN_BATCH).await?
        };
        for key in batch {
            if !known_keys.insert(key.clone()) {
                continue;
            }
            let map = {
                let mut conn = pool.acquire().await?;
                conn.hgetall(&key).await?
            };
            if map.is_empty() {
                continue;
            }
            if let Ok(global) = codec::decode_global(&map) {
                report.globals_scanned += 1;
                known.push((global.xid, global.status));
            }
        }
        cursor = next_cursor;
        if cursor == "0" {
            break;
        }
    }

    // Drop status-list entries that no longer belong: either the record
    // moved on to a different status, or it's gone entirely.
    for status in GlobalStatus::ALL {
        let status_key = keys::status_key(status.into());
        let members = {
            let mut conn = pool.acquire().await?;
            conn.lrange(&status_key, 0, -1).await?
        };

        for xid in members {
            let current = known.iter().find(|(known_xid, _)| *known_xid == xid);
            let belongs = matches!(current, Some((_, known_status)) if *known_status == status);
            if belongs {
                continue;
            }

            let mut conn = pool.acquire().await?;
            conn.lrem(&status_key, &xid).await?;

            match current {
                Some(_) => {
                    report.index_entries_repaired += 1;
                    warn!(xid = %xid, stale_status = %status, "moved stray status-index entry");
                }
                None => {
                    report.stray_entries_removed += 1;
                    warn!(xid = %xid, status = %status, "removed status-index entry for a deleted global");
                }
            }
        }
    }

    // Re-add any record whose status list is missing its entry.
    for (xid, status) in &known {
        let status_key = keys::status_key((*status).into());
        let members = {
            let mut conn = pool.acquire().await?;
            conn.lrange(&status_key, 0, -1).await?
        };
        if members.iter().any(|member| member == xid) {
            continue;
        }
        let mut conn = pool.acquire().await?;
        conn.rpush(&status_key, xid).await?;
        report.index_entries_repaired += 1;
        info!(xid = %xid, status = %status, "re-added missing status-index entry");
    }

    Ok(report)
}
