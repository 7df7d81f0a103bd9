// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::error::LogsError;
use crate::tail::{RotationPolicy, TailConfig};

const DEFAULT_ENDPOINT: &str = "http://127.0.0.1:8080";
const DEFAULT_NUM_LINES: u64 = 10_000;
const DEFAULT_BACKOFF_SECS: u64 = 5;

/// Database engine whose logs are tailed. Decides how segments rotate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DbType {
    MySql,
    PostgreSql,
    /// Audit logs, which rotate on size rather than time.
    Audit,
}

impl DbType {
    pub fn rotation_policy(self) -> RotationPolicy {
        match self {
            // The newest postgres segment is named by date, so a new one appears
            // every rotation; the mysql segment keeps its name.
            DbType::PostgreSql => RotationPolicy::TimeKeyed,
            DbType::Audit => RotationPolicy::SizeKeyed,
            DbType::MySql => RotationPolicy::None,
        }
    }
}

impl FromStr for DbType {
    type Err = LogsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "mysql" => Ok(DbType::MySql),
            "postgresql" | "postgres" => Ok(DbType::PostgreSql),
            "audit" => Ok(DbType::Audit),
            other => Err(LogsError::InvalidConfig(format!(
                "Unknown db type '{other}'. Accepted values are mysql, postgresql and audit"
            ))),
        }
    }
}

/// Where tailed data goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Output {
    Stdout,
    Publish,
}

impl FromStr for Output {
    type Err = LogsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "stdout" => Ok(Output::Stdout),
            "publish" => Ok(Output::Publish),
            other => Err(LogsError::InvalidConfig(format!(
                "output target '{other}' not recognized. Accepted values are stdout and publish"
            ))),
        }
    }
}

/// Configuration for the rdslogs binary.
#[derive(Debug, Clone)]
pub struct Config {
    /// Base URL of the log gateway
    pub endpoint: String,
    /// Instance whose logs are read
    pub instance_id: Option<String>,
    /// Segment name or name prefix
    pub log_file: String,
    pub db_type: DbType,
    /// Download old segments instead of tailing the current one
    pub download: bool,
    pub download_dir: PathBuf,
    /// Lines requested per marker fetch
    pub num_lines: u64,
    /// Pause after being rate limited
    pub backoff: Duration,
    pub output: Output,
    pub intake_url: Option<String>,
    pub api_key: Option<String>,
    /// Publish one line out of every N
    pub sample_rate: u32,
    /// Hash the `query` field of published events
    pub scrub_query: bool,
    pub https_proxy: Option<String>,
    /// Log level (e.g., trace, debug, info, warn, error)
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            instance_id: None,
            log_file: String::new(),
            db_type: DbType::MySql,
            download: false,
            download_dir: PathBuf::from("./"),
            num_lines: DEFAULT_NUM_LINES,
            backoff: Duration::from_secs(DEFAULT_BACKOFF_SECS),
            output: Output::Stdout,
            intake_url: None,
            api_key: None,
            sample_rate: 1,
            scrub_query: false,
            https_proxy: None,
            log_level: "info".to_string(),
        }
    }
}

impl Config {
    /// Create configuration from environment variables
    pub fn from_env() -> Result<Self, LogsError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Create configuration from an arbitrary variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, LogsError> {
        let defaults = Self::default();

        let num_lines = match lookup("RDSLOGS_NUM_LINES") {
            Some(val) => parse_number("RDSLOGS_NUM_LINES", &val)?,
            None => defaults.num_lines,
        };
        let backoff = match lookup("RDSLOGS_BACKOFF_SECS") {
            Some(val) => Duration::from_secs(parse_number("RDSLOGS_BACKOFF_SECS", &val)?),
            None => defaults.backoff,
        };
        let sample_rate = match lookup("RDSLOGS_SAMPLE_RATE") {
            Some(val) => parse_number("RDSLOGS_SAMPLE_RATE", &val)?,
            None => defaults.sample_rate,
        };

        let config = Self {
            endpoint: lookup("RDSLOGS_ENDPOINT").unwrap_or(defaults.endpoint),
            instance_id: lookup("RDSLOGS_INSTANCE").filter(|val| !val.is_empty()),
            log_file: lookup("RDSLOGS_LOG_FILE").unwrap_or(defaults.log_file),
            db_type: lookup("RDSLOGS_DB_TYPE")
                .map(|val| val.parse())
                .transpose()?
                .unwrap_or(defaults.db_type),
            download: lookup("RDSLOGS_DOWNLOAD")
                .map(|val| val.to_lowercase() == "true")
                .unwrap_or(defaults.download),
            download_dir: lookup("RDSLOGS_DOWNLOAD_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.download_dir),
            num_lines,
            backoff,
            output: lookup("RDSLOGS_OUTPUT")
                .map(|val| val.parse())
                .transpose()?
                .unwrap_or(defaults.output),
            intake_url: lookup("RDSLOGS_INTAKE_URL"),
            api_key: lookup("RDSLOGS_API_KEY"),
            sample_rate,
            scrub_query: lookup("RDSLOGS_SCRUB_QUERY")
                .map(|val| val.to_lowercase() == "true")
                .unwrap_or(defaults.scrub_query),
            https_proxy: lookup("RDSLOGS_PROXY_HTTPS").or_else(|| lookup("HTTPS_PROXY")),
            log_level: lookup("RDSLOGS_LOG_LEVEL")
                .map(|val| val.to_lowercase())
                .unwrap_or(defaults.log_level),
        };

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), LogsError> {
        if self.endpoint.trim().is_empty() {
            return Err(LogsError::InvalidConfig(
                "RDSLOGS_ENDPOINT cannot be empty".to_string(),
            ));
        }

        if self.num_lines == 0 {
            return Err(LogsError::InvalidConfig(
                "RDSLOGS_NUM_LINES must be greater than 0".to_string(),
            ));
        }

        if self.sample_rate == 0 {
            return Err(LogsError::InvalidConfig(
                "Sample rate must be a positive integer".to_string(),
            ));
        }

        if self.output == Output::Publish
            && (self.intake_url.as_deref().unwrap_or_default().is_empty()
                || self.api_key.as_deref().unwrap_or_default().is_empty())
        {
            return Err(LogsError::InvalidConfig(
                "RDSLOGS_INTAKE_URL and RDSLOGS_API_KEY are required when output is 'publish'"
                    .to_string(),
            ));
        }

        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&self.log_level.as_str()) {
            return Err(LogsError::InvalidConfig(format!(
                "Invalid log level '{}'. Must be one of: trace, debug, info, warn, error",
                self.log_level
            )));
        }

        Ok(())
    }

    /// Tail driver settings derived from this configuration.
    pub fn tail_config(&self, instance_id: &str) -> TailConfig {
        TailConfig {
            instance_id: instance_id.to_string(),
            segment_prefix: self.log_file.clone(),
            page_lines: self.num_lines,
            rate_limit_backoff: self.backoff,
            rotation: self.db_type.rotation_policy(),
            ..TailConfig::default()
        }
    }
}

fn parse_number<T: FromStr>(key: &str, val: &str) -> Result<T, LogsError> {
    val.trim()
        .parse()
        .map_err(|_| LogsError::InvalidConfig(format!("{key} must be a number, got '{val}'")))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_lookup_defaults() {
        let config = Config::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.endpoint, "http://127.0.0.1:8080");
        assert_eq!(config.num_lines, 10_000);
        assert_eq!(config.backoff, Duration::from_secs(5));
        assert_eq!(config.output, Output::Stdout);
        assert_eq!(config.db_type, DbType::MySql);
        assert!(!config.download);
        assert!(!config.scrub_query);
        assert_eq!(config.instance_id, None);
    }

    #[test]
    fn test_from_lookup_overrides() {
        let config = Config::from_lookup(lookup(&[
            ("RDSLOGS_INSTANCE", "db-1"),
            ("RDSLOGS_LOG_FILE", "error/postgresql.log"),
            ("RDSLOGS_DB_TYPE", "PostgreSQL"),
            ("RDSLOGS_DOWNLOAD", "TRUE"),
            ("RDSLOGS_DOWNLOAD_DIR", "/tmp/logs"),
            ("RDSLOGS_NUM_LINES", "500"),
            ("RDSLOGS_BACKOFF_SECS", "2"),
            ("RDSLOGS_LOG_LEVEL", "DEBUG"),
            ("RDSLOGS_SCRUB_QUERY", "true"),
            ("HTTPS_PROXY", "http://proxy:3128"),
        ]))
        .unwrap();
        assert_eq!(config.instance_id.as_deref(), Some("db-1"));
        assert_eq!(config.log_file, "error/postgresql.log");
        assert_eq!(config.db_type, DbType::PostgreSql);
        assert!(config.download);
        assert_eq!(config.download_dir, PathBuf::from("/tmp/logs"));
        assert_eq!(config.num_lines, 500);
        assert_eq!(config.backoff, Duration::from_secs(2));
        assert_eq!(config.log_level, "debug");
        assert!(config.scrub_query);
        assert_eq!(config.https_proxy.as_deref(), Some("http://proxy:3128"));
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        assert!(Config::from_lookup(lookup(&[("RDSLOGS_NUM_LINES", "many")])).is_err());
        assert!(Config::from_lookup(lookup(&[("RDSLOGS_NUM_LINES", "0")])).is_err());
        assert!(Config::from_lookup(lookup(&[("RDSLOGS_SAMPLE_RATE", "0")])).is_err());
        assert!(Config::from_lookup(lookup(&[("RDSLOGS_DB_TYPE", "oracle")])).is_err());
        assert!(Config::from_lookup(lookup(&[("RDSLOGS_OUTPUT", "honeycomb")])).is_err());
        assert!(Config::from_lookup(lookup(&[("RDSLOGS_LOG_LEVEL", "loud")])).is_err());
    }

    #[test]
    fn test_publish_requires_intake_and_key() {
        assert!(Config::from_lookup(lookup(&[("RDSLOGS_OUTPUT", "publish")])).is_err());
        assert!(Config::from_lookup(lookup(&[
            ("RDSLOGS_OUTPUT", "publish"),
            ("RDSLOGS_INTAKE_URL", "https://intake.example.com/events"),
        ]))
        .is_err());
        let config = Config::from_lookup(lookup(&[
            ("RDSLOGS_OUTPUT", "publish"),
            ("RDSLOGS_INTAKE_URL", "https://intake.example.com/events"),
            ("RDSLOGS_API_KEY", "key"),
        ]))
        .unwrap();
        assert_eq!(config.output, Output::Publish);
    }

    #[test]
    fn test_rotation_policy_by_db_type() {
        assert_eq!(DbType::PostgreSql.rotation_policy(), RotationPolicy::TimeKeyed);
        assert_eq!(DbType::Audit.rotation_policy(), RotationPolicy::SizeKeyed);
        assert_eq!(DbType::MySql.rotation_policy(), RotationPolicy::None);
    }

    #[test]
    fn test_tail_config_carries_settings() {
        let config = Config {
            log_file: "audit/server_audit.log".to_string(),
            db_type: DbType::Audit,
            num_lines: 42,
            backoff: Duration::from_secs(9),
            ..Default::default()
        };
        let tail = config.tail_config("db-1");
        assert_eq!(tail.instance_id, "db-1");
        assert_eq!(tail.segment_prefix, "audit/server_audit.log");
        assert_eq!(tail.page_lines, 42);
        assert_eq!(tail.rate_limit_backoff, Duration::from_secs(9));
        assert_eq!(tail.rotation, RotationPolicy::SizeKeyed);
    }
}
