//! Statements the runner sends on the caller's behalf.
//!
//! Warehouse names come from
//! [`SnowflakeConfig::warehouse`](crate::config::SnowflakeConfig::warehouse)
//! and handles from [`QueryHandle::new`], both of which restrict their
//! characters, so plain interpolation is safe here.

use crate::status::QueryHandle;

pub fn use_warehouse(warehouse: &str) -> String {
    format!("use warehouse {warehouse}")
}

/// Status, compilation seconds and execution seconds for one query.
pub fn query_status(handle: &QueryHandle) -> String {
    format!(
        "select execution_status, compilation_time / 1000, execution_time / 1000 \
         from table(snowflake.information_schema.query_history()) \
         where query_id = '{handle}'"
    )
}

/// Re-read a finished query's result set from the result cache.
pub fn result_scan(handle: &QueryHandle) -> String {
    format!("SELECT * FROM TABLE(RESULT_SCAN('{handle}'))")
}

pub fn cancel_query(handle: &QueryHandle) -> String {
    format!("SELECT SYSTEM$CANCEL_QUERY('{handle}');")
}
