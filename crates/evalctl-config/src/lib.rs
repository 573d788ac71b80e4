//! Environment-variable-driven configuration shared by every service
//! binary. Deliberately flat (one env var per setting) rather than a
//! layered-file merge, since that is the contract the external interfaces
//! expose: a reverse proxy or orchestrator wires these in directly.

use std::collections::HashMap;
use std::env;
use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    Missing(&'static str),
    #[error("invalid value for {name}: {value:?} ({reason})")]
    Invalid {
        name: &'static str,
        value: String,
        reason: String,
    },
}

/// Resolved configuration for whichever service binary reads it. Every
/// field maps to one environment variable; services read only the subset
/// relevant to them.
#[derive(Debug, Clone)]
pub struct Config {
    pub queue_url: String,
    pub store_url: String,
    pub index_url: String,
    pub bus_url: String,
    pub max_source_bytes: u64,
    pub max_request_bytes: u64,
    pub min_timeout_s: u32,
    pub max_timeout_s: u32,
    pub default_timeout_s: u32,
    pub queue_high_watermark: u64,
    pub output_inline_max_bytes: u64,
    pub runner_heartbeat_s: u64,
    pub runner_liveness_s: u64,
    pub reconcile_sweep_s: u64,
    pub retry_max: u32,
    pub retry_base_s: u64,
    pub dispatch_deadline_s: u64,
    pub index_grace_s: u64,
    pub audit_log_dir: String,
    pub runner_pools: HashMap<String, Vec<String>>,
    pub bind_addr: String,
}

fn env_var(name: &'static str) -> Result<String, ConfigError> {
    env::var(name).map_err(|_| ConfigError::Missing(name))
}

fn env_or(name: &'static str, default: &str) -> String {
    env::var(name).unwrap_or_else(|_| default.to_string())
}

fn env_parse<T: std::str::FromStr>(name: &'static str, default: T) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    match env::var(name) {
        Ok(raw) => raw.parse().map_err(|e: T::Err| ConfigError::Invalid {
            name,
            value: raw,
            reason: e.to_string(),
        }),
        Err(_) => Ok(default),
    }
}

/// Parses `RUNNER_POOLS` of the shape
/// `default=http://r1:9000,http://r2:9000;ml=http://r3:9000` into a map
/// from resource class name to its Runner URL list.
fn parse_runner_pools(raw: &str) -> Result<HashMap<String, Vec<String>>, ConfigError> {
    let mut pools = HashMap::new();
    if raw.trim().is_empty() {
        return Ok(pools);
    }
    for clause in raw.split(';').filter(|c| !c.trim().is_empty()) {
        let (class, urls) = clause.split_once('=').ok_or_else(|| ConfigError::Invalid {
            name: "RUNNER_POOLS",
            value: raw.to_string(),
            reason: format!("clause {clause:?} missing '='"),
        })?;
        let urls: Vec<String> = urls
            .split(',')
            .map(str::trim)
            .filter(|u| !u.is_empty())
            .map(str::to_string)
            .collect();
        pools.insert(class.trim().to_string(), urls);
    }
    Ok(pools)
}

impl Config {
    /// Loads an optional `.env.local` file (for local development only —
    /// never required in a deployed environment) then reads every setting
    /// from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        let _ = dotenvy::from_filename(".env.local");

        Ok(Config {
            queue_url: env_var("QUEUE_URL")?,
            store_url: env_var("STORE_URL")?,
            index_url: env_var("INDEX_URL")?,
            bus_url: env_var("BUS_URL")?,
            max_source_bytes: env_parse("MAX_SOURCE_BYTES", 1_000_000)?,
            max_request_bytes: env_parse("MAX_REQUEST_BYTES", 2_000_000)?,
            min_timeout_s: env_parse("MIN_TIMEOUT_S", 1)?,
            max_timeout_s: env_parse("MAX_TIMEOUT_S", 900)?,
            default_timeout_s: env_parse("DEFAULT_TIMEOUT_S", 10)?,
            queue_high_watermark: env_parse("QUEUE_HIGH_WATERMARK", 1_000)?,
            output_inline_max_bytes: env_parse("OUTPUT_INLINE_MAX_BYTES", 100 * 1024)?,
            runner_heartbeat_s: env_parse("RUNNER_HEARTBEAT_S", 5)?,
            runner_liveness_s: env_parse("RUNNER_LIVENESS_S", 15)?,
            reconcile_sweep_s: env_parse("RECONCILE_SWEEP_S", 30)?,
            retry_max: env_parse("RETRY_MAX", 3)?,
            retry_base_s: env_parse("RETRY_BASE_S", 60)?,
            dispatch_deadline_s: env_parse("DISPATCH_DEADLINE_S", 10)?,
            index_grace_s: env_parse("INDEX_GRACE_S", 60)?,
            audit_log_dir: env_or("AUDIT_LOG_DIR", "./audit-log"),
            runner_pools: parse_runner_pools(&env_or("RUNNER_POOLS", ""))?,
            bind_addr: env_or("BIND_ADDR", "127.0.0.1:8080"),
        })
    }

    pub fn runner_heartbeat(&self) -> Duration {
        Duration::from_secs(self.runner_heartbeat_s)
    }

    pub fn runner_liveness(&self) -> Duration {
        Duration::from_secs(self.runner_liveness_s)
    }

    pub fn reconcile_sweep(&self) -> Duration {
        Duration::from_secs(self.reconcile_sweep_s)
    }

    pub fn dispatch_deadline(&self) -> Duration {
        Duration::from_secs(self.dispatch_deadline_s)
    }

    pub fn index_grace(&self) -> Duration {
        Duration::from_secs(self.index_grace_s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_multi_class_runner_pools() {
        let pools = parse_runner_pools("default=http://r1:9000,http://r2:9000;ml=http://r3:9000")
            .unwrap();
        assert_eq!(
            pools.get("default").unwrap(),
            &vec!["http://r1:9000".to_string(), "http://r2:9000".to_string()]
        );
        assert_eq!(pools.get("ml").unwrap(), &vec!["http://r3:9000".to_string()]);
    }

    #[test]
    fn empty_runner_pools_is_empty_map() {
        assert!(parse_runner_pools("").unwrap().is_empty());
    }

    #[test]
    fn malformed_clause_is_rejected() {
        assert!(parse_runner_pools("default-http://r1:9000").is_err());
    }
}
