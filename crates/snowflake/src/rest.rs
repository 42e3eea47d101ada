//! Snowflake session over the v1 REST API.
//!
//! Login, statement submission, result-chunk download and logout, using
//! the same endpoints the official connectors use.

mod wire;

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT, AUTHORIZATION};
use reqwest::{RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde_json::json;
use tokio::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::SnowflakeConfig;
use crate::connection::{Connection, Connector, ExecMode, StatementResult};
use crate::error::SnowflakeError;

use wire::{
    Envelope, LoginRequest, LoginRequestData, LoginResponseData, QueryRequest, QueryResponseData,
};

const CLIENT_APP_ID: &str = "snowpoll";
const SNOWFLAKE_ACCEPT: &str = "application/snowflake";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);
/// First pause before following `getResultUrl`.
const RESULT_BACKOFF_START: Duration = Duration::from_millis(50);
const RESULT_BACKOFF_MAX: Duration = Duration::from_secs(2);

// ---------------------------------------------------------------------------
// Connector
// ---------------------------------------------------------------------------

/// Opens authenticated sessions against a Snowflake account.
pub struct RestConnector {
    config: SnowflakeConfig,
    http: reqwest::Client,
    result_timeout: Duration,
}

impl RestConnector {
    /// Validate `config` and build the HTTP client.
    pub fn new(config: SnowflakeConfig) -> Result<Self, SnowflakeError> {
        config.validate()?;
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent(format!("{}/{}", CLIENT_APP_ID, env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| SnowflakeError::Connection(e.to_string()))?;

        Ok(Self {
            config,
            http,
            result_timeout: REQUEST_TIMEOUT,
        })
    }

    /// How long a synchronous statement may stay in progress before
    /// [`Connection::execute`] gives up on it. Defaults to two minutes.
    pub fn with_result_timeout(mut self, timeout: Duration) -> Self {
        self.result_timeout = timeout;
        self
    }

    pub fn config(&self) -> &SnowflakeConfig {
        &self.config
    }
}

#[async_trait]
impl Connector for RestConnector {
    type Conn = RestConnection;

    async fn connect(&self) -> Result<RestConnection, SnowflakeError> {
        let cfg = &self.config;
        let base_url = cfg.base_url();
        let url = format!("{base_url}/session/v1/login-request");

        let mut params = vec![
            ("requestId", Uuid::new_v4().to_string()),
            ("databaseName", cfg.database.clone()),
            ("schemaName", cfg.schema.clone()),
            ("warehouse", cfg.default_warehouse.clone()),
        ];
        if let Some(role) = &cfg.role {
            params.push(("roleName", role.clone()));
        }

        let body = LoginRequest {
            data: LoginRequestData {
                client_app_id: CLIENT_APP_ID,
                client_app_version: env!("CARGO_PKG_VERSION"),
                account_name: account_name(&cfg.account),
                login_name: &cfg.user,
                password: &cfg.password,
                session_parameters: HashMap::from([("QUERY_RESULT_FORMAT", json!("JSON"))]),
            },
        };

        debug!(url = %url, user = %cfg.user, "Logging in to Snowflake");

        let resp = self
            .http
            .post(&url)
            .query(&params)
            .header(ACCEPT, "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| SnowflakeError::Connection(e.to_string()))?;

        let env: Envelope<LoginResponseData> = read_envelope(resp)
            .await
            .map_err(|e| match e {
                SnowflakeError::Api { code, message } => SnowflakeError::Auth {
                    code: Some(code),
                    message,
                },
                other => SnowflakeError::Connection(other.to_string()),
            })?;

        if !env.success {
            return Err(SnowflakeError::Auth {
                code: env.code,
                message: env.message.unwrap_or_else(|| "login rejected".into()),
            });
        }

        let token = env
            .data
            .and_then(|d| d.token)
            .ok_or_else(|| SnowflakeError::Auth {
                code: env.code,
                message: "login response carried no session token".into(),
            })?;

        info!(
            account = %cfg.account,
            database = %cfg.database,
            schema = %cfg.schema,
            warehouse = %cfg.default_warehouse,
            "Snowflake session opened"
        );

        Ok(RestConnection {
            http: self.http.clone(),
            base_url,
            token,
            sequence_id: 0,
            result_timeout: self.result_timeout,
            closed: false,
        })
    }
}

/// The login body wants the account locator without region/cloud suffix.
fn account_name(account: &str) -> &str {
    account.split('.').next().unwrap_or(account)
}

// ---------------------------------------------------------------------------
// Connection
// ---------------------------------------------------------------------------

/// An authenticated Snowflake session.
pub struct RestConnection {
    http: reqwest::Client,
    base_url: String,
    token: String,
    sequence_id: u64,
    result_timeout: Duration,
    closed: bool,
}

impl RestConnection {
    fn authorized(&self, builder: RequestBuilder) -> RequestBuilder {
        builder
            .header(AUTHORIZATION, format!("Snowflake Token=\"{}\"", self.token))
            .header(ACCEPT, SNOWFLAKE_ACCEPT)
    }

    /// Follow `getResultUrl` until the statement is no longer in progress.
    ///
    /// Waits between requests grow from [`RESULT_BACKOFF_START`] up to
    /// [`RESULT_BACKOFF_MAX`]; after `result_timeout` the statement is
    /// reported as an API error with the in-progress code.
    async fn wait_for_result(
        &self,
        mut env: Envelope<QueryResponseData>,
    ) -> Result<Envelope<QueryResponseData>, SnowflakeError> {
        let deadline = Instant::now() + self.result_timeout;
        let mut backoff = RESULT_BACKOFF_START;

        while env.success && wire::is_in_progress(env.code.as_deref()) {
            if Instant::now() >= deadline {
                return Err(SnowflakeError::Api {
                    code: env.code.unwrap_or_default(),
                    message: format!(
                        "statement still running after {}s",
                        self.result_timeout.as_secs_f64()
                    ),
                });
            }
            let path = env
                .data
                .as_ref()
                .and_then(|d| d.get_result_url.clone())
                .ok_or_else(|| {
                    SnowflakeError::Parse("in-progress response without getResultUrl".into())
                })?;
            let url = if path.starts_with("http") {
                path
            } else {
                format!("{}{}", self.base_url, path)
            };

            tokio::time::sleep(backoff).await;
            backoff = (backoff * 2).min(RESULT_BACKOFF_MAX);

            debug!(url = %url, "Statement still running, fetching result");
            let resp = self.authorized(self.http.get(&url)).send().await?;
            env = read_envelope(resp).await?;
        }
        Ok(env)
    }

    /// Download result chunks referenced by the first response page.
    async fn download_chunks(
        &self,
        data: &QueryResponseData,
    ) -> Result<Vec<Vec<serde_json::Value>>, SnowflakeError> {
        let mut headers = HeaderMap::new();
        match &data.chunk_headers {
            Some(chunk_headers) => {
                for (k, v) in chunk_headers {
                    let name = HeaderName::from_bytes(k.as_bytes())
                        .map_err(|e| SnowflakeError::Parse(e.to_string()))?;
                    let value =
                        HeaderValue::from_str(v).map_err(|e| SnowflakeError::Parse(e.to_string()))?;
                    headers.insert(name, value);
                }
            }
            None => {
                if let Some(qrmk) = &data.qrmk {
                    headers.insert(
                        "x-amz-server-side-encryption-customer-algorithm",
                        HeaderValue::from_static("AES256"),
                    );
                    let key = HeaderValue::from_str(qrmk)
                        .map_err(|e| SnowflakeError::Parse(e.to_string()))?;
                    headers.insert("x-amz-server-side-encryption-customer-key", key);
                }
            }
        }

        let mut rows = Vec::new();
        for (idx, chunk) in data.chunks.iter().enumerate() {
            debug!(chunk = idx, expected_rows = chunk.row_count, "Downloading result chunk");
            let resp = self.http.get(&chunk.url).headers(headers.clone()).send().await?;
            let status = resp.status();
            let body = resp.text().await?;
            if !status.is_success() {
                return Err(SnowflakeError::Api {
                    code: status.as_u16().to_string(),
                    message: format!("chunk {idx} download failed: {body}"),
                });
            }
            rows.extend(wire::parse_chunk(&body)?);
        }
        Ok(rows)
    }
}

#[async_trait]
impl Connection for RestConnection {
    async fn execute(
        &mut self,
        sql: &str,
        mode: ExecMode,
    ) -> Result<StatementResult, SnowflakeError> {
        self.sequence_id += 1;
        let url = format!("{}/queries/v1/query-request", self.base_url);
        let body = QueryRequest {
            sql_text: sql,
            async_exec: mode == ExecMode::Async,
            sequence_id: self.sequence_id,
            query_submission_time: chrono::Utc::now().timestamp_millis(),
        };

        let resp = self
            .authorized(self.http.post(&url))
            .query(&[("requestId", Uuid::new_v4().to_string())])
            .json(&body)
            .send()
            .await?;
        let mut env: Envelope<QueryResponseData> = read_envelope(resp).await?;

        if mode == ExecMode::Sync {
            env = self.wait_for_result(env).await?;
        }

        if !env.success {
            return Err(SnowflakeError::Api {
                code: env.code.unwrap_or_default(),
                message: env.message.unwrap_or_default(),
            });
        }

        let data = env.data.unwrap_or_default();
        let query_id = data
            .query_id
            .clone()
            .ok_or_else(|| SnowflakeError::Parse("query response carried no queryId".into()))?;

        if mode == ExecMode::Async {
            return Ok(StatementResult {
                query_id,
                ..Default::default()
            });
        }

        if let Some(format) = data.query_result_format.as_deref() {
            if !format.eq_ignore_ascii_case("json") {
                return Err(SnowflakeError::UnsupportedFormat(format.to_string()));
            }
        }

        let chunk_rows = self.download_chunks(&data).await?;
        let columns = data.rowtype.into_iter().map(|rt| rt.name).collect();
        let mut rows = wire::to_rows(data.rowset);
        rows.extend(wire::to_rows(chunk_rows));

        Ok(StatementResult {
            query_id,
            columns,
            rows,
        })
    }

    async fn close(&mut self) -> Result<(), SnowflakeError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;

        let url = format!("{}/session", self.base_url);
        let resp = self
            .authorized(self.http.post(&url))
            .query(&[("delete", "true")])
            .send()
            .await?;
        let env: Envelope<serde_json::Value> = read_envelope(resp).await?;
        if !env.success {
            warn!(code = ?env.code, message = ?env.message, "Session close was not acknowledged");
            return Err(SnowflakeError::Api {
                code: env.code.unwrap_or_default(),
                message: env.message.unwrap_or_default(),
            });
        }
        debug!("Snowflake session closed");
        Ok(())
    }
}

/// Decode a response envelope, turning non-2xx statuses into [`SnowflakeError::Api`].
async fn read_envelope<T: DeserializeOwned>(resp: Response) -> Result<Envelope<T>, SnowflakeError> {
    let status = resp.status();
    let body = resp.text().await?;
    if !status.is_success() {
        return Err(SnowflakeError::Api {
            code: status.as_u16().to_string(),
            message: body,
        });
    }
    Ok(serde_json::from_str(&body)?)
}
