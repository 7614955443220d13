// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Drain Configuration
//!
//! This module builds the immutable configuration for a drain run from
//! environment variables with code-level defaults. Every knob uses the
//! `DRAIN_` prefix:
//!
//! - `DRAIN_AMQP_HOST`, `DRAIN_AMQP_PORT`, `DRAIN_AMQP_VHOST`,
//!   `DRAIN_AMQP_TLS`, `DRAIN_AMQP_USER`, `DRAIN_AMQP_PASSWORD`
//! - `DRAIN_QUEUE`, `DRAIN_QUEUE_DURABLE`, `DRAIN_QUEUE_TTL_MS`
//! - `DRAIN_MODE` (persist, count or echo), `DRAIN_WINDOW_SECS`
//! - `DRAIN_OUTPUT_PATH`, `DRAIN_LOG_PATH`
//!
//! When the two paths are not both set, defaults come from the platform
//! profile: linux hosts use the DBFS pair under `/dbfs/tmp`, macos hosts the
//! local pair under `/tmp`. Running on any other platform without explicit
//! paths is a configuration error reported to the operator, never a panic.

use crate::queue::QueueSpec;
use std::{env, fmt, path::PathBuf, str::FromStr, time::Duration};
use thiserror::Error;

/// Represents errors found while assembling the configuration.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    /// The platform has no default path profile
    #[error("unrecognized platform `{0}`, set DRAIN_OUTPUT_PATH and DRAIN_LOG_PATH explicitly")]
    UnsupportedPlatform(String),

    /// An environment variable holds a value that cannot be parsed
    #[error("invalid value `{value}` for `{key}`")]
    Invalid { key: String, value: String },
}

/// Connection parameters for the broker endpoint.
///
/// The struct is immutable once built. Its `Debug` output redacts the
/// password so endpoint dumps are safe to log.
#[derive(Clone)]
pub struct EndpointConfig {
    pub host: String,
    pub port: u16,
    pub vhost: String,
    pub tls: bool,
    pub username: String,
    pub password: String,
}

impl Default for EndpointConfig {
    fn default() -> Self {
        EndpointConfig {
            host: "localhost".to_owned(),
            port: 5672,
            vhost: "/".to_owned(),
            tls: false,
            username: "guest".to_owned(),
            password: "guest".to_owned(),
        }
    }
}

impl fmt::Debug for EndpointConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EndpointConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("vhost", &self.vhost)
            .field("tls", &self.tls)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Selects which termination policy and handler the binary pairs up.
///
/// The pairing is an explicit construction-time parameter; the library never
/// guesses it from the environment at consume time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrainMode {
    /// Deadline-bounded run persisting each record to the output sink
    Persist,
    /// Queue-depth-bounded run echoing records to stdout
    Count,
    /// Deadline-bounded run echoing record sizes to stdout
    Echo,
}

impl DrainMode {
    /// Parses a mode name, case-insensitively.
    ///
    /// # Parameters
    /// * `value` - One of `persist`, `count` or `echo`
    ///
    /// # Returns
    /// The matching mode, or `None` for anything else
    pub fn parse(value: &str) -> Option<DrainMode> {
        match value.to_ascii_lowercase().as_str() {
            "persist" => Some(DrainMode::Persist),
            "count" => Some(DrainMode::Count),
            "echo" => Some(DrainMode::Echo),
            _ => None,
        }
    }
}

/// The full configuration for one drain run.
#[derive(Debug, Clone)]
pub struct DrainConfig {
    pub endpoint: EndpointConfig,
    pub queue: QueueSpec,
    pub mode: DrainMode,
    pub window: Duration,
    pub output_path: PathBuf,
    pub log_path: PathBuf,
}

impl DrainConfig {
    /// Assembles the configuration from the environment.
    ///
    /// Missing variables fall back to their defaults; malformed values are
    /// reported as `ConfigError::Invalid` naming the offending variable.
    ///
    /// # Returns
    /// * `Result<DrainConfig, ConfigError>` - The immutable run configuration
    pub fn from_env() -> Result<DrainConfig, ConfigError> {
        let endpoint = EndpointConfig {
            host: env_or("DRAIN_AMQP_HOST", "localhost"),
            port: parse_env("DRAIN_AMQP_PORT", "5672")?,
            vhost: env_or("DRAIN_AMQP_VHOST", "/"),
            tls: parse_bool("DRAIN_AMQP_TLS", false)?,
            username: env_or("DRAIN_AMQP_USER", "guest"),
            password: env_or("DRAIN_AMQP_PASSWORD", "guest"),
        };

        let ttl = parse_env::<i32>("DRAIN_QUEUE_TTL_MS", "60000")?;
        if ttl <= 0 {
            return Err(ConfigError::Invalid {
                key: "DRAIN_QUEUE_TTL_MS".to_owned(),
                value: ttl.to_string(),
            });
        }

        let mut queue = QueueSpec::new(&env_or("DRAIN_QUEUE", "incoming_sensor_name")).ttl(ttl);
        if parse_bool("DRAIN_QUEUE_DURABLE", true)? {
            queue = queue.durable();
        }

        let raw_mode = env_or("DRAIN_MODE", "persist");
        let mode = DrainMode::parse(&raw_mode).ok_or(ConfigError::Invalid {
            key: "DRAIN_MODE".to_owned(),
            value: raw_mode,
        })?;

        let window = Duration::from_secs(parse_env("DRAIN_WINDOW_SECS", "30")?);

        let (output_path, log_path) = resolve_paths()?;

        Ok(DrainConfig {
            endpoint,
            queue,
            mode,
            window,
            output_path,
            log_path,
        })
    }
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_owned())
}

fn parse_env<T: FromStr>(key: &str, default: &str) -> Result<T, ConfigError> {
    let raw = env_or(key, default);
    match raw.parse::<T>() {
        Ok(value) => Ok(value),
        Err(_) => Err(ConfigError::Invalid {
            key: key.to_owned(),
            value: raw,
        }),
    }
}

fn parse_bool(key: &str, default: bool) -> Result<bool, ConfigError> {
    let raw = env_or(key, if default { "true" } else { "false" });
    match raw.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" => Ok(true),
        "0" | "false" | "no" => Ok(false),
        _ => Err(ConfigError::Invalid {
            key: key.to_owned(),
            value: raw,
        }),
    }
}

fn resolve_paths() -> Result<(PathBuf, PathBuf), ConfigError> {
    let output = env::var("DRAIN_OUTPUT_PATH").ok().map(PathBuf::from);
    let log = env::var("DRAIN_LOG_PATH").ok().map(PathBuf::from);

    match (output, log) {
        (Some(output), Some(log)) => Ok((output, log)),
        (output, log) => {
            let (default_output, default_log) = default_paths(env::consts::OS)?;
            Ok((output.unwrap_or(default_output), log.unwrap_or(default_log)))
        }
    }
}

fn default_paths(os: &str) -> Result<(PathBuf, PathBuf), ConfigError> {
    match os {
        "linux" => Ok((
            PathBuf::from("/dbfs/tmp/sensor_incoming.json"),
            PathBuf::from("/dbfs/tmp/sensor_incoming_log.txt"),
        )),
        "macos" => Ok((
            PathBuf::from("/tmp/sensor_incoming.json"),
            PathBuf::from("/tmp/sensor_incoming_log.txt"),
        )),
        other => Err(ConfigError::UnsupportedPlatform(other.to_owned())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn linux_profile_maps_to_the_dbfs_pair() {
        let (output, log) = default_paths("linux").unwrap();
        assert_eq!(output, PathBuf::from("/dbfs/tmp/sensor_incoming.json"));
        assert_eq!(log, PathBuf::from("/dbfs/tmp/sensor_incoming_log.txt"));
    }

    #[test]
    fn macos_profile_maps_to_the_local_pair() {
        let (output, log) = default_paths("macos").unwrap();
        assert_eq!(output, PathBuf::from("/tmp/sensor_incoming.json"));
        assert_eq!(log, PathBuf::from("/tmp/sensor_incoming_log.txt"));
    }

    #[test]
    fn unrecognized_platform_is_a_config_error() {
        assert_eq!(
            default_paths("freebsd"),
            Err(ConfigError::UnsupportedPlatform("freebsd".to_owned()))
        );
    }

    #[test]
    fn accepts_the_documented_boolean_forms() {
        env::set_var("DRAIN_TEST_FLAG_FORMS", "YES");
        assert_eq!(parse_bool("DRAIN_TEST_FLAG_FORMS", false), Ok(true));
        env::set_var("DRAIN_TEST_FLAG_FORMS", "0");
        assert_eq!(parse_bool("DRAIN_TEST_FLAG_FORMS", true), Ok(false));
        env::remove_var("DRAIN_TEST_FLAG_FORMS");
        assert_eq!(parse_bool("DRAIN_TEST_FLAG_FORMS", true), Ok(true));
    }

    #[test]
    fn malformed_values_name_the_offending_key() {
        env::set_var("DRAIN_TEST_PORT_MALFORMED", "not-a-port");
        let err = parse_env::<u16>("DRAIN_TEST_PORT_MALFORMED", "5672").unwrap_err();
        assert_eq!(
            err,
            ConfigError::Invalid {
                key: "DRAIN_TEST_PORT_MALFORMED".to_owned(),
                value: "not-a-port".to_owned(),
            }
        );
        env::remove_var("DRAIN_TEST_PORT_MALFORMED");
    }

    #[test]
    fn mode_names_parse_case_insensitively() {
        assert_eq!(DrainMode::parse("Persist"), Some(DrainMode::Persist));
        assert_eq!(DrainMode::parse("COUNT"), Some(DrainMode::Count));
        assert_eq!(DrainMode::parse("echo"), Some(DrainMode::Echo));
        assert_eq!(DrainMode::parse("firehose"), None);
    }

    #[test]
    fn endpoint_debug_redacts_the_password() {
        let endpoint = EndpointConfig {
            password: "s3cret".to_owned(),
            ..EndpointConfig::default()
        };
        let dump = format!("{endpoint:?}");
        assert!(dump.contains("<redacted>"));
        assert!(!dump.contains("s3cret"));
    }
}
