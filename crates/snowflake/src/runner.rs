//! Submit a statement, poll `QUERY_HISTORY` until it finishes, fetch the
//! cached result.
//!
//! [`QueryRunner::execute`] reports every outcome explicitly.
//! [`QueryRunner::query`] collapses everything that is not a non-empty
//! result into `None` for callers that only care about rows.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::{SnowflakeConfig, WarehouseSelector};
use crate::connection::{Connection, Connector, ExecMode};
use crate::error::SnowflakeError;
use crate::rest::RestConnector;
use crate::result::{Cell, ResultTable};
use crate::sql;
use crate::status::{format_min_sec, QueryHandle, QueryStatus, StatusRecord};

// ---------------------------------------------------------------------------
// Options
// ---------------------------------------------------------------------------

/// Per-call settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryOptions {
    /// Seconds to wait before the first status check and between checks.
    /// Falls back to the configured poll delay.
    #[serde(default)]
    pub delay_seconds: Option<u64>,
    #[serde(default)]
    pub warehouse: WarehouseSelector,
    /// Submit without waiting for completion.
    #[serde(default = "default_true")]
    pub execute_async: bool,
}

fn default_true() -> bool {
    true
}

impl Default for QueryOptions {
    fn default() -> Self {
        Self {
            delay_seconds: None,
            warehouse: WarehouseSelector::default(),
            execute_async: true,
        }
    }
}

impl QueryOptions {
    pub fn with_delay(mut self, seconds: u64) -> Self {
        self.delay_seconds = Some(seconds);
        self
    }

    pub fn with_warehouse(mut self, warehouse: WarehouseSelector) -> Self {
        self.warehouse = warehouse;
        self
    }

    pub fn synchronous(mut self) -> Self {
        self.execute_async = false;
        self
    }

    fn delay(&self, config: &SnowflakeConfig) -> Duration {
        self.delay_seconds
            .map(Duration::from_secs)
            .unwrap_or_else(|| config.poll_delay())
    }
}

// ---------------------------------------------------------------------------
// Outcome
// ---------------------------------------------------------------------------

/// How a submitted query ended.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryOutcome {
    /// SUCCESS with at least one row.
    Rows(ResultTable),
    /// SUCCESS without rows.
    Empty,
    /// FAILED_WITH_ERROR or ABORTED.
    Failed { status: QueryStatus },
    /// Still running when the timeout passed; a cancellation was issued.
    TimedOut,
    /// The caller's token fired; a cancellation was issued.
    Cancelled,
}

/// Bookkeeping for one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryStats {
    pub handle: QueryHandle,
    /// Number of status lookups performed.
    pub polls: u32,
    /// Time from submission until the outcome was known.
    pub elapsed: Duration,
}

#[derive(Debug, Clone, PartialEq)]
pub struct QueryReport {
    pub outcome: QueryOutcome,
    pub stats: QueryStats,
}

impl QueryReport {
    /// The result table, if the query produced rows.
    pub fn into_table(self) -> Option<ResultTable> {
        match self.outcome {
            QueryOutcome::Rows(table) => Some(table),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Runner
// ---------------------------------------------------------------------------

/// Warehouse names for one run, already checked by
/// [`SnowflakeConfig::warehouse`].
struct Warehouses {
    submit: String,
    status: String,
    fetch: String,
}

/// Runs queries through a [`Connector`], one session per call.
pub struct QueryRunner<C: Connector> {
    connector: C,
    config: SnowflakeConfig,
}

impl QueryRunner<RestConnector> {
    /// Runner backed by the REST API. Fails if `config` does not validate.
    pub fn from_config(config: SnowflakeConfig) -> Result<Self, SnowflakeError> {
        let connector = RestConnector::new(config.clone())?;
        Ok(Self::new(connector, config))
    }
}

impl<C: Connector> QueryRunner<C> {
    pub fn new(connector: C, config: SnowflakeConfig) -> Self {
        Self { connector, config }
    }

    pub fn config(&self) -> &SnowflakeConfig {
        &self.config
    }

    /// Run `sql` and return the rows with the header row first, or `None`
    /// when the query produced no rows, failed, timed out, or any error
    /// occurred. The cause is logged.
    pub async fn query(&self, sql: &str, options: &QueryOptions) -> Option<Vec<Vec<Cell>>> {
        match self.execute(sql, options).await {
            Ok(report) => {
                let query_id = report.stats.handle.clone();
                match report.outcome {
                    QueryOutcome::Rows(table) => Some(table.into_rows_with_header()),
                    other => {
                        debug!(query_id = %query_id, outcome = ?other, "Query produced no rows");
                        None
                    }
                }
            }
            Err(e) => {
                warn!(error = %e, "Snowflake query failed");
                None
            }
        }
    }

    /// Run `sql` to completion.
    pub async fn execute(
        &self,
        sql: &str,
        options: &QueryOptions,
    ) -> Result<QueryReport, SnowflakeError> {
        self.execute_with_cancel(sql, options, &CancellationToken::new()).await
    }

    /// Run `sql` to completion, or until `cancel` fires.
    ///
    /// Every warehouse the run will switch to is checked before connecting.
    /// The session is closed on every path once it has been opened; a close
    /// failure is logged and does not replace the outcome.
    pub async fn execute_with_cancel(
        &self,
        sql: &str,
        options: &QueryOptions,
        cancel: &CancellationToken,
    ) -> Result<QueryReport, SnowflakeError> {
        let warehouses = Warehouses {
            submit: self.config.warehouse(&options.warehouse)?,
            status: self.config.warehouse(&WarehouseSelector::Status)?,
            fetch: self.config.warehouse(&WarehouseSelector::Default)?,
        };

        let mut conn = self.connector.connect().await?;
        let result = self.run(&mut conn, sql, &warehouses, options, cancel).await;
        if let Err(e) = conn.close().await {
            warn!(error = %e, "Failed to close Snowflake session");
        }
        result
    }

    async fn run(
        &self,
        conn: &mut C::Conn,
        sql: &str,
        warehouses: &Warehouses,
        options: &QueryOptions,
        cancel: &CancellationToken,
    ) -> Result<QueryReport, SnowflakeError> {
        conn.execute(&sql::use_warehouse(&warehouses.submit), ExecMode::Sync)
            .await?;

        let mode = if options.execute_async {
            ExecMode::Async
        } else {
            ExecMode::Sync
        };
        let submitted = conn.execute(sql, mode).await?;
        let handle = QueryHandle::new(submitted.query_id)?;
        let start = Instant::now();
        let delay = options.delay(&self.config);
        let timeout = self.config.timeout();

        info!(
            query_id = %handle,
            warehouse = %warehouses.submit,
            execute_async = options.execute_async,
            delay_s = delay.as_secs(),
            "Query submitted"
        );

        let mut polls: u32 = 0;
        let report = |outcome: QueryOutcome, polls: u32| QueryReport {
            outcome,
            stats: QueryStats {
                handle: handle.clone(),
                polls,
                elapsed: start.elapsed(),
            },
        };

        if !pause(delay, cancel).await {
            self.cancel_query(conn, &handle).await;
            return Ok(report(QueryOutcome::Cancelled, polls));
        }

        loop {
            let record = self.check_status(conn, &handle, &warehouses.status).await?;
            polls += 1;

            debug!(
                query_id = %handle,
                status = %record.status,
                polls,
                elapsed_s = start.elapsed().as_secs(),
                "Polled query status"
            );

            match record.status {
                QueryStatus::Success => {
                    let table = self.fetch_results(conn, &handle, &warehouses.fetch).await?;
                    info!(
                        query_id = %handle,
                        rows = table.row_count(),
                        elapsed = %format_min_sec(start.elapsed()),
                        "Query completed"
                    );
                    let outcome = if table.is_empty() {
                        QueryOutcome::Empty
                    } else {
                        QueryOutcome::Rows(table)
                    };
                    return Ok(report(outcome, polls));
                }
                QueryStatus::FailedWithError | QueryStatus::Aborted => {
                    warn!(query_id = %handle, status = %record.status, "Query did not succeed");
                    return Ok(report(QueryOutcome::Failed { status: record.status }, polls));
                }
                _ => {
                    info!(query_id = %handle, "{}", record.progress(start.elapsed()));
                    if !pause(delay, cancel).await {
                        self.cancel_query(conn, &handle).await;
                        return Ok(report(QueryOutcome::Cancelled, polls));
                    }
                }
            }

            // Only reached after a non-terminal status and its sleep.
            if start.elapsed() > timeout {
                warn!(
                    query_id = %handle,
                    timeout_s = timeout.as_secs(),
                    "Query timed out, cancelling"
                );
                self.cancel_query(conn, &handle).await;
                return Ok(report(QueryOutcome::TimedOut, polls));
            }
        }
    }

    /// Look up the query's row in `QUERY_HISTORY` on the status warehouse.
    async fn check_status(
        &self,
        conn: &mut C::Conn,
        handle: &QueryHandle,
        warehouse: &str,
    ) -> Result<StatusRecord, SnowflakeError> {
        let lookup_failed = |e: SnowflakeError| SnowflakeError::StatusLookup {
            query_id: handle.to_string(),
            reason: e.to_string(),
        };

        conn.execute(&sql::use_warehouse(warehouse), ExecMode::Sync)
            .await
            .map_err(lookup_failed)?;
        let result = conn
            .execute(&sql::query_status(handle), ExecMode::Sync)
            .await
            .map_err(lookup_failed)?;

        let row = result
            .rows
            .first()
            .ok_or_else(|| SnowflakeError::StatusNotFound {
                query_id: handle.to_string(),
            })?;
        StatusRecord::from_row(row).map_err(lookup_failed)
    }

    /// Re-read the finished result through `RESULT_SCAN` on the default warehouse.
    async fn fetch_results(
        &self,
        conn: &mut C::Conn,
        handle: &QueryHandle,
        warehouse: &str,
    ) -> Result<ResultTable, SnowflakeError> {
        let fetch_failed = |e: SnowflakeError| SnowflakeError::Fetch {
            query_id: handle.to_string(),
            reason: e.to_string(),
        };

        conn.execute(&sql::use_warehouse(warehouse), ExecMode::Sync)
            .await
            .map_err(fetch_failed)?;
        let result = conn
            .execute(&sql::result_scan(handle), ExecMode::Sync)
            .await
            .map_err(fetch_failed)?;
        Ok(result.into_table())
    }

    /// Ask Snowflake to cancel the query. Errors are logged and dropped.
    async fn cancel_query(&self, conn: &mut C::Conn, handle: &QueryHandle) {
        match conn.execute(&sql::cancel_query(handle), ExecMode::Sync).await {
            Ok(_) => info!(query_id = %handle, "Query cancellation requested"),
            Err(e) => warn!(query_id = %handle, error = %e, "Query cancellation failed"),
        }
    }
}

/// Sleep for `delay`. Returns `false` if `cancel` fired first.
async fn pause(delay: Duration, cancel: &CancellationToken) -> bool {
    tokio::select! {
        _ = tokio::time::sleep(delay) => true,
        _ = cancel.cancelled() => false,
    }
}

// ---------------------------------------------------------------------------
// Tests: option handling only. Polling behaviour is covered by the
// integration tests with a scripted connection.
// ---------------------------------------------------------------------------
