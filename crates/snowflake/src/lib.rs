pub mod config;
pub mod connection;
pub mod error;
pub mod rest;
pub mod result;
pub mod runner;
pub mod sql;
pub mod status;

pub use config::{SnowflakeConfig, WarehouseSelector};
pub use connection::{Connection, Connector, ExecMode, StatementResult};
pub use error::SnowflakeError;
pub use rest::{RestConnection, RestConnector};
pub use result::{Cell, ResultTable};
pub use runner::{QueryOptions, QueryOutcome, QueryReport, QueryRunner, QueryStats};
pub use status::{format_min_sec, Progress, QueryHandle, QueryStatus, StatusRecord};

pub use snowpoll_core::to_column_name;
pub use tokio_util::sync::CancellationToken;
