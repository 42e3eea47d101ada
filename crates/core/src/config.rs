//! Environment helpers shared by every snowpoll crate.
//!
//! All lookups are profile-aware: with `SNOWPOLL_PROFILE=PROD`, a key such as
//! `SNOWFLAKE_ACCOUNT` is first read as `PROD_SNOWFLAKE_ACCOUNT` and only then
//! as `SNOWFLAKE_ACCOUNT`.

use std::env;
use std::path::PathBuf;

/// Env var naming the active profile.
pub const PROFILE_ENV: &str = "SNOWPOLL_PROFILE";

/// Well-known env keys that identify a profile when prefixed.
const PROFILE_MARKER_KEYS: &[&str] = &["SNOWFLAKE_ACCOUNT", "SNOWFLAKE_USERNAME"];

/// Load .env file (silently ignores if missing). Returns the file's path
/// when one was loaded.
///
/// Values from the file override the process environment, so a checked-out
/// `.env` always wins over stale shell exports.
pub fn load_dotenv() -> Option<PathBuf> {
    dotenvy::dotenv_override().ok()
}

pub fn env_opt(key: &str) -> Option<String> {
    env::var(key).ok().filter(|s| !s.is_empty())
}

/// Read a profiled env var: tries `{PROFILE}_{KEY}` first, falls back to `{KEY}`.
pub fn profiled_env_opt(profile: &str, key: &str) -> Option<String> {
    if !profile.is_empty() {
        let prefixed = format!("{}_{}", profile, key);
        if let Some(v) = env_opt(&prefixed) {
            return Some(v);
        }
    }
    env_opt(key)
}

pub fn profiled_env_or(profile: &str, key: &str, default: &str) -> String {
    profiled_env_opt(profile, key).unwrap_or_else(|| default.to_string())
}

pub fn profiled_env_u64(profile: &str, key: &str, default: u64) -> u64 {
    profiled_env_opt(profile, key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Active profile from `SNOWPOLL_PROFILE`, upper-cased (empty = default).
pub fn active_profile() -> String {
    env_opt(PROFILE_ENV)
        .map(|s| s.to_uppercase())
        .unwrap_or_default()
}

/// Discover available profiles by scanning env vars for `{PREFIX}_{MARKER_KEY}` patterns.
/// Always includes "default" (the unprefixed config).
pub fn available_profiles() -> Vec<String> {
    let mut profiles = std::collections::BTreeSet::new();
    profiles.insert("default".to_string());

    for (key, _) in env::vars() {
        for marker in PROFILE_MARKER_KEYS {
            if let Some(prefix) = key.strip_suffix(&format!("_{}", marker)) {
                if !prefix.is_empty()
                    && prefix.chars().all(|c| c.is_ascii_uppercase() || c == '_')
                {
                    profiles.insert(prefix.to_string());
                }
            }
        }
    }

    profiles.into_iter().collect()
}
