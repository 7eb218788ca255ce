//! Key Codec: pure string functions mapping identities to backing-store keys.
//!
//! Prefixes are fixed and must never change across versions -- a downgrade
//! to an older build has to keep finding its own keys.

pub const GLOBAL_PREFIX: &str = "global:";
pub const BRANCH_PREFIX: &str = "branch:";
pub const BRANCHES_PREFIX: &str = "branches:";
pub const STATUS_PREFIX: &str = "status:";

pub fn global_key(transaction_id: i64) -> String {
    format!("{}{}", GLOBAL_PREFIX, transaction_id)
}

pub fn branch_key(branch_id: i64) -> String {
    format!("{}{}", BRANCH_PREFIX, branch_id)
}

pub fn branches_key(xid: &str) -> String {
    format!("{}{}", BRANCHES_PREFIX, xid)
}

pub fn status_key(status_code: i32) -> String {
    format!("{}{}", STATUS_PREFIX, status_code)
}

/// Cursor-scan pattern matching every global hash key.
pub fn global_scan_pattern() -> &'static str {
    "global:*"
}
