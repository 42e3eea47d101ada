//! Query handles and execution status as reported by `QUERY_HISTORY`.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::SnowflakeError;

// ---------------------------------------------------------------------------
// Handle
// ---------------------------------------------------------------------------

/// Identifier Snowflake assigns to a submitted statement.
///
/// The handle is interpolated into status, `RESULT_SCAN` and cancel
/// statements, so only ASCII alphanumerics and `-` are accepted.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct QueryHandle(String);

impl QueryHandle {
    pub fn new(id: impl Into<String>) -> Result<Self, SnowflakeError> {
        let id = id.into();
        let valid = !id.is_empty() && id.chars().all(|c| c.is_ascii_alphanumeric() || c == '-');
        if !valid {
            return Err(SnowflakeError::InvalidHandle(id));
        }
        Ok(Self(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for QueryHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for QueryHandle {
    type Error = SnowflakeError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl From<QueryHandle> for String {
    fn from(h: QueryHandle) -> Self {
        h.0
    }
}

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

/// `EXECUTION_STATUS` values from `INFORMATION_SCHEMA.QUERY_HISTORY`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum QueryStatus {
    Running,
    Success,
    FailedWithError,
    Aborted,
    Queued,
    ResumingWarehouse,
    Blocked,
    FailedWithIncident,
    Disconnected,
    Restarted,
    /// A status this crate does not know about yet.
    Other(String),
}

impl QueryStatus {
    /// SUCCESS, FAILED_WITH_ERROR and ABORTED end the polling loop.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            QueryStatus::Success | QueryStatus::FailedWithError | QueryStatus::Aborted
        )
    }

    pub fn as_str(&self) -> &str {
        match self {
            QueryStatus::Running => "RUNNING",
            QueryStatus::Success => "SUCCESS",
            QueryStatus::FailedWithError => "FAILED_WITH_ERROR",
            QueryStatus::Aborted => "ABORTED",
            QueryStatus::Queued => "QUEUED",
            QueryStatus::ResumingWarehouse => "RESUMING_WAREHOUSE",
            QueryStatus::Blocked => "BLOCKED",
            QueryStatus::FailedWithIncident => "FAILED_WITH_INCIDENT",
            QueryStatus::Disconnected => "DISCONNECTED",
            QueryStatus::Restarted => "RESTARTED",
            QueryStatus::Other(s) => s,
        }
    }
}

impl FromStr for QueryStatus {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.trim().to_ascii_uppercase().as_str() {
            "RUNNING" => QueryStatus::Running,
            "SUCCESS" => QueryStatus::Success,
            "FAILED_WITH_ERROR" => QueryStatus::FailedWithError,
            "ABORTED" => QueryStatus::Aborted,
            "QUEUED" => QueryStatus::Queued,
            "RESUMING_WAREHOUSE" => QueryStatus::ResumingWarehouse,
            "BLOCKED" => QueryStatus::Blocked,
            "FAILED_WITH_INCIDENT" => QueryStatus::FailedWithIncident,
            "DISCONNECTED" => QueryStatus::Disconnected,
            "RESTARTED" => QueryStatus::Restarted,
            other => QueryStatus::Other(other.to_string()),
        })
    }
}

impl From<String> for QueryStatus {
    fn from(s: String) -> Self {
        match s.parse() {
            Ok(status) => status,
            Err(never) => match never {},
        }
    }
}

impl From<QueryStatus> for String {
    fn from(s: QueryStatus) -> Self {
        s.as_str().to_string()
    }
}

impl fmt::Display for QueryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Status record
// ---------------------------------------------------------------------------

/// One row of the status lookup. Times are in seconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusRecord {
    pub status: QueryStatus,
    pub compilation_time: f64,
    pub execution_time: f64,
}

impl StatusRecord {
    /// Build a record from the `(status, compilation_time, execution_time)`
    /// row returned by the status lookup. Missing or unparseable timings
    /// count as zero.
    pub fn from_row(row: &[Option<String>]) -> Result<Self, SnowflakeError> {
        let status = row
            .first()
            .and_then(|c| c.as_deref())
            .ok_or_else(|| SnowflakeError::Parse("status row has no EXECUTION_STATUS".into()))?;
        let seconds = |idx: usize| {
            row.get(idx)
                .and_then(|c| c.as_deref())
                .and_then(|v| v.trim().parse::<f64>().ok())
                .unwrap_or(0.0)
        };

        Ok(Self {
            status: QueryStatus::from(status.to_string()),
            compilation_time: seconds(1),
            execution_time: seconds(2),
        })
    }

    /// Which phase a still-running query is in, for progress reporting.
    ///
    /// Execution time wins once it passes one second, then compilation time;
    /// before either, the wall-clock time since submission is reported as
    /// compilation.
    pub fn progress(&self, since_submit: Duration) -> Progress {
        if self.execution_time > 1.0 {
            Progress::Executing(secs(self.execution_time))
        } else if self.compilation_time > 1.0 {
            Progress::Compiling(secs(self.compilation_time))
        } else {
            Progress::Compiling(since_submit)
        }
    }
}

fn secs(v: f64) -> Duration {
    Duration::try_from_secs_f64(v).unwrap_or(Duration::MAX)
}

/// Phase and elapsed time of a running query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Progress {
    Compiling(Duration),
    Executing(Duration),
}

impl fmt::Display for Progress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Progress::Compiling(d) => {
                write!(f, "The query has taken {} to compile...", format_min_sec(*d))
            }
            Progress::Executing(d) => {
                write!(f, "The query has taken {} to execute...", format_min_sec(*d))
            }
        }
    }
}

/// Render a duration as `"{m}m {s}s"`, dropping the minutes when zero.
pub fn format_min_sec(d: Duration) -> String {
    let total = d.as_secs();
    let (minutes, seconds) = (total / 60, total % 60);
    if minutes == 0 {
        format!("{seconds}s")
    } else {
        format!("{minutes}m {seconds}s")
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
