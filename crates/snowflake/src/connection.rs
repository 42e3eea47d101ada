//! The seam between the query runner and a Snowflake session.
//!
//! [`RestConnector`](crate::rest::RestConnector) talks to the real service;
//! tests plug in scripted implementations.

use async_trait::async_trait;

use crate::error::SnowflakeError;
use crate::result::{Cell, ResultTable};

/// How a statement should be submitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecMode {
    /// Wait for the statement to finish and return its rows.
    Sync,
    /// Return as soon as Snowflake has accepted the statement.
    Async,
}

/// What a session returns for one statement.
///
/// For [`ExecMode::Async`] submissions only `query_id` is meaningful.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StatementResult {
    pub query_id: String,
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Cell>>,
}

impl StatementResult {
    pub fn into_table(self) -> ResultTable {
        ResultTable::new(self.columns, self.rows)
    }
}

/// An open session.
#[async_trait]
pub trait Connection: Send {
    /// Run one SQL statement.
    async fn execute(
        &mut self,
        sql: &str,
        mode: ExecMode,
    ) -> Result<StatementResult, SnowflakeError>;

    /// Release the session. Called exactly once per connection by the runner.
    async fn close(&mut self) -> Result<(), SnowflakeError>;
}

/// Opens sessions. Each query run gets its own connection.
#[async_trait]
pub trait Connector: Send + Sync {
    type Conn: Connection;

    async fn connect(&self) -> Result<Self::Conn, SnowflakeError>;
}
