use snowpoll_core::ConfigError;

/// Errors that can occur while talking to Snowflake.
///
/// Query outcomes that are part of normal operation (failed, aborted,
/// timed out, empty) are reported through
/// [`QueryOutcome`](crate::runner::QueryOutcome) instead.
#[derive(Debug, thiserror::Error)]
pub enum SnowflakeError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// The session could not be opened.
    #[error("Connection failed: {0}")]
    Connection(String),

    /// The login request was rejected.
    #[error("Authentication failed: {message}")]
    Auth { code: Option<String>, message: String },

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Snowflake answered with `success: false`.
    #[error("Snowflake error {code}: {message}")]
    Api { code: String, message: String },

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Invalid query handle: {0:?}")]
    InvalidHandle(String),

    /// The status lookup returned no row for the query.
    #[error("No status found for query {query_id}")]
    StatusNotFound { query_id: String },

    #[error("Status lookup for query {query_id} failed: {reason}")]
    StatusLookup { query_id: String, reason: String },

    #[error("Fetching results for query {query_id} failed: {reason}")]
    Fetch { query_id: String, reason: String },

    #[error("Unsupported result format: {0}")]
    UnsupportedFormat(String),
}

impl From<serde_json::Error> for SnowflakeError {
    fn from(e: serde_json::Error) -> Self {
        SnowflakeError::Parse(e.to_string())
    }
}
