//! Environment-driven configuration.

use std::env;

#[derive(Debug, Clone)]
pub struct Config {
    pub environment: String,
    pub database_url: String,
    pub valkey_host: String,
    pub valkey_port: u16,
    pub valkey_stream_name: String,
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            environment: get_env("ENVIRONMENT", "development"),
            database_url: get_env("DATABASE_URL", "postgres://localhost/trading"),
            valkey_host: get_env("VALKEY_HOST", "localhost"),
            valkey_port: env::var("VALKEY_PORT")
                .ok()
                .and_then(|value| value.parse().ok())
                .unwrap_or(6379),
            valkey_stream_name: get_env("VALKEY_STREAM_NAME", "matching_engine_stream"),
        }
    }
}

fn get_env(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}
