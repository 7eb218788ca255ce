//! Data model: global/branch transaction records, their status enums, and
//! the aggregate the query engine hands back to callers.

use serde::{Deserialize, Serialize};

/// Wire-stable status codes for a global transaction. These integers are
/// persisted in the backing store and must never be renumbered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(i32)]
pub enum GlobalStatus {
    UnKnown = 0,
    Begin = 1,
    Committing = 2,
    CommitRetrying = 3,
    Rollbacking = 4,
    RollbackRetrying = 5,
    TimeoutRollbacking = 6,
    TimeoutRollbackRetrying = 7,
    AsyncCommitting = 8,
    Committed = 9,
    CommitFailed = 10,
    Rollbacked = 11,
    RollbackFailed = 12,
    TimeoutRollbacked = 13,
    TimeoutRollbackFailed = 14,
    Finished = 15,
}

impl GlobalStatus {
    pub const ALL: [GlobalStatus; 16] = [
        GlobalStatus::UnKnown,
        GlobalStatus::Begin,
        GlobalStatus::Committing,
        GlobalStatus::CommitRetrying,
        GlobalStatus::Rollbacking,
        GlobalStatus::RollbackRetrying,
        GlobalStatus::TimeoutRollbacking,
        GlobalStatus::TimeoutRollbackRetrying,
        GlobalStatus::AsyncCommitting,
        GlobalStatus::Committed,
        GlobalStatus::CommitFailed,
        GlobalStatus::Rollbacked,
        GlobalStatus::RollbackFailed,
        GlobalStatus::TimeoutRollbacked,
        GlobalStatus::TimeoutRollbackFailed,
        GlobalStatus::Finished,
    ];
}

impl TryFrom<i32> for GlobalStatus {
    type Error = String;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        GlobalStatus::ALL
            .into_iter()
            .find(|s| *s as i32 == value)
            .ok_or_else(|| format!("unknown global status code: {}", value))
    }
}

impl From<GlobalStatus> for i32 {
    fn from(value: GlobalStatus) -> Self {
        value as i32
    }
}

impl std::fmt::Display for GlobalStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}({})", self, *self as i32)
    }
}

/// Branch transaction type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(i32)]
pub enum BranchType {
    AT = 0,
    TCC = 1,
    SAGA = 2,
    XA = 3,
}

impl TryFrom<i32> for BranchType {
    type Error = String;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(BranchType::AT),
            1 => Ok(BranchType::TCC),
            2 => Ok(BranchType::SAGA),
            3 => Ok(BranchType::XA),
            other => Err(format!("unknown branch type code: {}", other)),
        }
    }
}

impl From<BranchType> for i32 {
    fn from(value: BranchType) -> Self {
        value as i32
    }
}

/// Branch status. Not a closed enum in the original protocol (branches
/// report a variety of phase outcomes); kept as a raw integer code here
/// since the store never interprets it beyond storing and returning it.
pub type BranchStatus = i32;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GlobalRecord {
    pub xid: String,
    pub transaction_id: i64,
    pub status: GlobalStatus,
    pub application_id: String,
    pub service_group: String,
    pub tx_name: String,
    pub timeout: i64,
    pub begin_time: i64,
    pub application_data: Option<String>,
    pub gmt_create: i64,
    pub gmt_modified: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BranchRecord {
    pub branch_id: i64,
    pub xid: String,
    pub resource_group_id: String,
    pub resource_id: String,
    pub client_id: String,
    pub branch_type: BranchType,
    pub status: BranchStatus,
    pub application_data: Option<String>,
    pub gmt_create: i64,
    pub gmt_modified: i64,
}

/// A global transaction together with its (optionally hydrated) branches.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionAggregate {
    pub global: GlobalRecord,
    pub branches: Vec<BranchRecord>,
}

/// The tagged union of mutations the store engine accepts. Each variant
/// carries exactly the record its kind needs; matching is exhaustive so a
/// new kind can't silently fall through unhandled.
#[derive(Debug, Clone)]
pub enum WriteRequest {
    GlobalAdd(GlobalRecord),
    GlobalUpdate { xid: String, new_status: GlobalStatus },
    GlobalRemove { xid: String, status: GlobalStatus },
    BranchAdd(BranchRecord),
    BranchUpdate {
        branch_id: i64,
        new_status: BranchStatus,
        application_data: Option<String>,
    },
    BranchRemove { branch_id: i64 },
}

/// The union of read conditions `readSession(condition)` accepts: by xid,
/// by transaction id, by a single status, or by a set of statuses.
#[derive(Debug, Clone)]
pub enum SessionQuery {
    Xid(String),
    TransactionId(i64),
    Status(GlobalStatus),
    Statuses(Vec<GlobalStatus>),
}

/// Extract the transaction id embedded in an xid ("<ip>:<port>:<tid>"),
/// splitting on the *last* colon.
pub fn transaction_id_from_xid(xid: &str) -> Option<i64> {
    let idx = xid.rfind(':')?;
    xid[idx + 1..].parse::<i64>().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_round_trips_through_i32() {
        for status in GlobalStatus::ALL {
            let code: i32 = status.into();
            assert_eq!(GlobalStatus::try_from(code).unwrap(), status);
        }
    }

    #[test]
    fn unknown_status_code_errors() {
        assert!(GlobalStatus::try_from(99).is_err());
    }

    #[test]
    fn branch_type_round_trips() {
        for bt in [BranchType::AT, BranchType::TCC, BranchType::SAGA, BranchType::XA] {
            let code: i32 = bt.into();
            assert_eq!(BranchType::try_from(code).unwrap(), bt);
        }
    }

    #[test]
    fn xid_parses_last_colon() {
        assert_eq!(transaction_id_from_xid("1.1.1.1:8091:10"), Some(10));
        assert_eq!(transaction_id_from_xid("10.0.0.5:8091:123456789"), Some(123456789));
    }

    #[test]
    fn xid_parse_fails_without_colon() {
        assert_eq!(transaction_id_from_xid("garbage"), None);
    }
}
