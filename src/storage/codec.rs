//! Record Codec: hand-written translation between a session record and the
//! flat string-to-string field map used as a Redis hash payload.
//!
//! No reflection: every field is named explicitly on both the encode and
//! decode side. Decoding tolerates missing fields (they decode to the
//! field's zero value) and unknown extra fields (forward compatibility --
//! a newer writer's fields are simply not looked at by an older reader).
//! Absent optional fields are never written with an empty value; the key
//! itself is omitted from the map.

use std::collections::HashMap;

use super::model::{BranchRecord, BranchType, GlobalRecord, GlobalStatus};

type FieldMap = HashMap<String, String>;

fn get_str(map: &FieldMap, key: &str) -> String {
    map.get(key).cloned().unwrap_or_default()
}

fn get_i64(map: &FieldMap, key: &str) -> i64 {
    map.get(key).and_then(|v| v.parse().ok()).unwrap_or(0)
}

fn get_opt_str(map: &FieldMap, key: &str) -> Option<String> {
    map.get(key).cloned()
}

pub fn encode_global(record: &GlobalRecord) -> FieldMap {
    let mut map = FieldMap::new();
    map.insert("xid".to_string(), record.xid.clone());
    map.insert("transactionId".to_string(), record.transaction_id.to_string());
    map.insert("status".to_string(), (record.status as i32).to_string());
    map.insert("applicationId".to_string(), record.application_id.clone());
    map.insert("serviceGroup".to_string(), record.service_group.clone());
    map.insert("txName".to_string(), record.tx_name.clone());
    map.insert("timeout".to_string(), record.timeout.to_string());
    map.insert("beginTime".to_string(), record.begin_time.to_string());
    if let Some(data) = &record.application_data {
        map.insert("applicationData".to_string(), data.clone());
    }
    map.insert("gmtCreate".to_string(), record.gmt_create.to_string());
    map.insert("gmtModified".to_string(), record.gmt_modified.to_string());
    map
}

pub fn decode_global(map: &FieldMap) -> Result<GlobalRecord, String> {
    let status_code: i32 = get_i64(map, "status") as i32;
    let status = GlobalStatus::try_from(status_code)?;
    Ok(GlobalRecord {
        xid: get_str(map, "xid"),
        transaction_id: get_i64(map, "transactionId"),
        status,
        application_id: get_str(map, "applicationId"),
        service_group: get_str(map, "serviceGroup"),
        tx_name: get_str(map, "txName"),
        timeout: get_i64(map, "timeout"),
        begin_time: get_i64(map, "beginTime"),
        application_data: get_opt_str(map, "applicationData"),
        gmt_create: get_i64(map, "gmtCreate"),
        gmt_modified: get_i64(map, "gmtModified"),
    })
}

pub fn encode_branch(record: &BranchRecord) -> FieldMap {
    let mut map = FieldMap::new();
    map.insert("branchId".to_string(), record.branch_id.to_string());
    map.insert("xid".to_string(), record.xid.clone());
    map.insert("resourceGroupId".to_string(), record.resource_group_id.clone());
    map.insert("resourceId".to_string(), record.resource_id.clone());
    map.insert("clientId".to_string(), record.client_id.clone());
    map.insert("branchType".to_string(), (record.branch_type as i32).to_string());
    map.insert("status".to_string(), record.status.to_string());
    if let Some(data) = &record.application_data {
        map.insert("applicationData".to_string(), data.clone());
    }
    map.insert("gmtCreate".to_string(), record.gmt_create.to_string());
    map.insert("gmtModified".to_string(), record.gmt_modified.to_string());
    map
}

pub fn decode_branch(map: &FieldMap) -> Result<BranchRecord, String> {
    let branch_type_code = get_i64(map, "branchType") as i32;
    let branch_type = BranchType::try_from(branch_type_code)?;
    Ok(BranchRecord {
        branch_id: get_i64(map, "branchId"),
        xid: get_str(map, "xid"),
        resource_group_id: get_str(map, "resourceGroupId"),
        resource_id: get_str(map, "resourceId"),
        client_id: get_str(map, "clientId"),
        branch_type,
        status: get_i64(map, "status") as i32,
        application_data: get_opt_str(map, "applicationData"),
        gmt_create: get_i64(map, "gmtCreate"),
        gmt_modified: get_i64(map, "gmtModified"),
    })
}
