use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use snowpoll_core::config::{profiled_env_opt, profiled_env_u64};
use snowpoll_core::{active_profile, ConfigError};

/// Seconds between status checks (and before the first one).
pub const DEFAULT_POLL_DELAY_SECONDS: u64 = 15;

/// Queries still running after this long are cancelled.
pub const DEFAULT_TIMEOUT_SECONDS: u64 = 3600;

// ── SnowflakeConfig ──────────────────────────────────────────────

/// Connection and polling settings for Snowflake.
///
/// Reads from environment variables with optional profile prefix.
/// When `SNOWPOLL_PROFILE=PROD`, checks `PROD_SNOWFLAKE_DATABASE` before
/// `SNOWFLAKE_DATABASE`. Call [`validate`](Self::validate) (or use
/// [`load`](Self::load)) before handing the config to a connector.
#[derive(Clone, Serialize, Deserialize)]
pub struct SnowflakeConfig {
    /// Account identifier, e.g. `xy12345.eu-west-1`.
    pub account: String,
    pub user: String,
    /// Never serialized.
    #[serde(skip_serializing, default)]
    pub password: String,
    pub role: Option<String>,
    /// Warehouse used when the session is opened and for result fetches.
    pub default_warehouse: String,
    /// Warehouse heavy queries run on by default.
    pub async_warehouse: String,
    /// Small warehouse used for status lookups.
    pub status_warehouse: String,
    pub database: String,
    pub schema: String,
    /// Host override; may include a scheme (`http://127.0.0.1:8080`).
    pub host: Option<String>,
    pub poll_delay_seconds: u64,
    pub timeout_seconds: u64,
}

impl SnowflakeConfig {
    /// Build config from environment variables using the active profile.
    pub fn from_env() -> Self {
        Self::from_env_profiled(&active_profile())
    }

    /// Build config for a specific named profile.
    ///
    /// `SNOWFLAKE_WAREHOUSE2XL` and `SNOWFLAKE_WAREHOUSEXSM` fall back to the
    /// default warehouse (`SNOWFLAKE_WAREHOUSEM`) when unset.
    pub fn from_env_profiled(profile: &str) -> Self {
        let var = |key: &str| profiled_env_opt(profile, key).unwrap_or_default();
        let default_warehouse = var("SNOWFLAKE_WAREHOUSEM");

        Self {
            account: var("SNOWFLAKE_ACCOUNT"),
            user: var("SNOWFLAKE_USERNAME"),
            password: var("SNOWFLAKE_PASSWORD"),
            role: profiled_env_opt(profile, "SNOWFLAKE_ROLE"),
            async_warehouse: profiled_env_opt(profile, "SNOWFLAKE_WAREHOUSE2XL")
                .unwrap_or_else(|| default_warehouse.clone()),
            status_warehouse: profiled_env_opt(profile, "SNOWFLAKE_WAREHOUSEXSM")
                .unwrap_or_else(|| default_warehouse.clone()),
            default_warehouse,
            database: var("SNOWFLAKE_DATABASE"),
            schema: var("SNOWFLAKE_SCHEMA"),
            host: profiled_env_opt(profile, "SNOWFLAKE_HOST"),
            poll_delay_seconds: profiled_env_u64(
                profile,
                "SNOWFLAKE_POLL_DELAY_SECONDS",
                DEFAULT_POLL_DELAY_SECONDS,
            ),
            timeout_seconds: profiled_env_u64(
                profile,
                "SNOWFLAKE_TIMEOUT_SECONDS",
                DEFAULT_TIMEOUT_SECONDS,
            ),
        }
    }

    /// [`from_env`](Self::from_env) followed by [`validate`](Self::validate).
    pub fn load() -> Result<Self, ConfigError> {
        let cfg = Self::from_env();
        cfg.validate()?;
        Ok(cfg)
    }

    /// Check that every required field is present and every warehouse name
    /// is a plain identifier. All missing keys are reported together.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let required = [
            ("SNOWFLAKE_ACCOUNT", &self.account),
            ("SNOWFLAKE_USERNAME", &self.user),
            ("SNOWFLAKE_PASSWORD", &self.password),
            ("SNOWFLAKE_WAREHOUSEM", &self.default_warehouse),
            ("SNOWFLAKE_DATABASE", &self.database),
            ("SNOWFLAKE_SCHEMA", &self.schema),
        ];
        let missing: Vec<String> = required
            .iter()
            .filter(|(_, value)| value.trim().is_empty())
            .map(|(key, _)| key.to_string())
            .collect();
        if !missing.is_empty() {
            return Err(ConfigError::Missing(missing));
        }

        for (key, name) in [
            ("SNOWFLAKE_WAREHOUSEM", &self.default_warehouse),
            ("SNOWFLAKE_WAREHOUSE2XL", &self.async_warehouse),
            ("SNOWFLAKE_WAREHOUSEXSM", &self.status_warehouse),
        ] {
            if !is_plain_identifier(name) {
                return Err(ConfigError::Invalid {
                    key: key.to_string(),
                    reason: format!("{name:?} is not a plain warehouse identifier"),
                });
            }
        }

        if self.poll_delay_seconds == 0 {
            return Err(ConfigError::Invalid {
                key: "SNOWFLAKE_POLL_DELAY_SECONDS".into(),
                reason: "must be at least 1".into(),
            });
        }

        Ok(())
    }

    /// Base URL of the account's REST endpoint, without a trailing slash.
    pub fn base_url(&self) -> String {
        match &self.host {
            Some(host) if host.contains("://") => host.trim_end_matches('/').to_string(),
            Some(host) => format!("https://{}", host.trim_end_matches('/')),
            None => format!("https://{}.snowflakecomputing.com", self.account),
        }
    }

    pub fn poll_delay(&self) -> Duration {
        Duration::from_secs(self.poll_delay_seconds)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }

    /// Resolve a selector to a concrete warehouse name.
    ///
    /// Named warehouses are checked with the same identifier rule as the
    /// configured ones, since the name ends up in a `use warehouse` statement.
    pub fn warehouse(&self, selector: &WarehouseSelector) -> Result<String, ConfigError> {
        let name = match selector {
            WarehouseSelector::Default => &self.default_warehouse,
            WarehouseSelector::Async => &self.async_warehouse,
            WarehouseSelector::Status => &self.status_warehouse,
            WarehouseSelector::Named(name) => name,
        };
        if !is_plain_identifier(name) {
            return Err(ConfigError::Invalid {
                key: "warehouse".into(),
                reason: format!("{name:?} is not a plain warehouse identifier"),
            });
        }
        Ok(name.clone())
    }
}

impl fmt::Debug for SnowflakeConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SnowflakeConfig")
            .field("account", &self.account)
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .field("role", &self.role)
            .field("default_warehouse", &self.default_warehouse)
            .field("async_warehouse", &self.async_warehouse)
            .field("status_warehouse", &self.status_warehouse)
            .field("database", &self.database)
            .field("schema", &self.schema)
            .field("host", &self.host)
            .field("poll_delay_seconds", &self.poll_delay_seconds)
            .field("timeout_seconds", &self.timeout_seconds)
            .finish()
    }
}

/// Unquoted Snowflake identifier: a letter or `_`, then letters, digits, `_` or `$`.
fn is_plain_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$')
}

// ── WarehouseSelector ────────────────────────────────────────────

/// Which warehouse a query should run on.
///
/// Parses `"default"`, `"async"` and `"status"` (case-insensitive) to the
/// configured warehouses; anything else is taken as a literal warehouse name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum WarehouseSelector {
    Default,
    #[default]
    Async,
    Status,
    Named(String),
}

impl FromStr for WarehouseSelector {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.to_ascii_lowercase().as_str() {
            "default" => WarehouseSelector::Default,
            "async" => WarehouseSelector::Async,
            "status" => WarehouseSelector::Status,
            _ => WarehouseSelector::Named(s.to_string()),
        })
    }
}

impl From<String> for WarehouseSelector {
    fn from(s: String) -> Self {
        match s.parse() {
            Ok(sel) => sel,
            Err(never) => match never {},
        }
    }
}

impl From<WarehouseSelector> for String {
    fn from(sel: WarehouseSelector) -> Self {
        sel.to_string()
    }
}

impl fmt::Display for WarehouseSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WarehouseSelector::Default => write!(f, "default"),
            WarehouseSelector::Async => write!(f, "async"),
            WarehouseSelector::Status => write!(f, "status"),
            WarehouseSelector::Named(name) => write!(f, "{name}"),
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────
