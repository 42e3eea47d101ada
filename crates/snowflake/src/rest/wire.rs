//! JSON bodies of the Snowflake v1 session API.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::result::Cell;

/// Response code for a statement that is still running.
pub const QUERY_IN_PROGRESS: &str = "333333";
/// Response code for an accepted asynchronous statement.
pub const QUERY_IN_PROGRESS_ASYNC: &str = "333334";

pub fn is_in_progress(code: Option<&str>) -> bool {
    matches!(code, Some(QUERY_IN_PROGRESS) | Some(QUERY_IN_PROGRESS_ASYNC))
}

// ── Envelope ─────────────────────────────────────────────────────

/// Every response is wrapped as `{data, code, message, success}`.
#[derive(Debug, Deserialize)]
pub struct Envelope<T> {
    pub data: Option<T>,
    pub code: Option<String>,
    pub message: Option<String>,
    #[serde(default)]
    pub success: bool,
}

// ── Login ────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct LoginRequest<'a> {
    pub data: LoginRequestData<'a>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct LoginRequestData<'a> {
    pub client_app_id: &'a str,
    pub client_app_version: &'a str,
    pub account_name: &'a str,
    pub login_name: &'a str,
    pub password: &'a str,
    pub session_parameters: HashMap<&'a str, Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponseData {
    pub token: Option<String>,
}

// ── Query ────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryRequest<'a> {
    pub sql_text: &'a str,
    pub async_exec: bool,
    pub sequence_id: u64,
    pub query_submission_time: i64,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryResponseData {
    pub query_id: Option<String>,
    #[serde(default)]
    pub rowtype: Vec<RowType>,
    #[serde(default)]
    pub rowset: Vec<Vec<Value>>,
    pub query_result_format: Option<String>,
    pub get_result_url: Option<String>,
    #[serde(default)]
    pub chunks: Vec<Chunk>,
    pub chunk_headers: Option<HashMap<String, String>>,
    /// Key for SSE-C encrypted chunks when no explicit headers are given.
    pub qrmk: Option<String>,
}

/// Column metadata; only the name is used.
#[derive(Debug, Deserialize)]
pub struct RowType {
    pub name: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Chunk {
    pub url: String,
    #[serde(default)]
    pub row_count: u64,
}

/// JSON row cell to [`Cell`]: strings pass through, null is NULL, anything
/// else keeps its JSON rendering.
pub fn to_cell(v: Value) -> Cell {
    match v {
        Value::Null => None,
        Value::String(s) => Some(s),
        other => Some(other.to_string()),
    }
}

pub fn to_rows(rowset: Vec<Vec<Value>>) -> Vec<Vec<Cell>> {
    rowset
        .into_iter()
        .map(|row| row.into_iter().map(to_cell).collect())
        .collect()
}

/// Chunk bodies are a comma-separated list of row arrays without the
/// enclosing brackets.
pub fn parse_chunk(body: &str) -> Result<Vec<Vec<Value>>, serde_json::Error> {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return Ok(Vec::new());
    }
    serde_json::from_str(&format!("[{trimmed}]"))
}
