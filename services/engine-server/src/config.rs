//! Environment-driven configuration.

use std::env;
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Config {
    pub listen_addr: String,
    pub environment: String,
    pub shutdown_timeout: Duration,
    pub valkey_host: String,
    pub valkey_port: u16,
    pub valkey_stream_name: String,
    pub valkey_request_timeout_ms: u64,
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            listen_addr: normalize_addr(&get_env("GRPC_ADDR", ":50051")),
            environment: get_env("ENVIRONMENT", "development"),
            shutdown_timeout: get_duration_env("SHUTDOWN_TIMEOUT", Duration::from_secs(30)),
            valkey_host: get_env("VALKEY_HOST", "localhost"),
            valkey_port: get_parsed_env("VALKEY_PORT", 6379),
            valkey_stream_name: get_env("VALKEY_STREAM_NAME", "matching_engine_stream"),
            valkey_request_timeout_ms: get_parsed_env("VALKEY_REQUEST_TIMEOUT", 2000),
        }
    }
}

fn get_env(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn get_parsed_env<T: FromStr + Copy>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|value| value.parse().ok())
        .unwrap_or(default)
}

fn get_duration_env(key: &str, default: Duration) -> Duration {
    env::var(key)
        .ok()
        .and_then(|value| parse_duration(&value))
        .unwrap_or(default)
}

/// Accepts Go-style duration strings: "30s", "500ms", "2m". A bare number
/// is taken as seconds.
fn parse_duration(value: &str) -> Option<Duration> {
    let value = value.trim();
    if let Some(millis) = value.strip_suffix("ms") {
        return millis.parse().ok().map(Duration::from_millis);
    }
    if let Some(secs) = value.strip_suffix('s') {
        return secs.parse().ok().map(Duration::from_secs);
    }
    if let Some(mins) = value.strip_suffix('m') {
        return mins.parse::<u64>().ok().map(|m| Duration::from_secs(m * 60));
    }
    value.parse().ok().map(Duration::from_secs)
}

/// A listen address beginning with ':' means all interfaces.
fn normalize_addr(addr: &str) -> String {
    match addr.strip_prefix(':') {
        Some(port) => format!("0.0.0.0:{port}"),
        None => addr.to_string(),
    }
}
