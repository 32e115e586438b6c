use std::{env, net::SocketAddr};

use thiserror::Error;

pub const DEFAULT_SESSION_BUFFER: usize = 64;
pub const DEFAULT_MAX_INFLIGHT_PER_SESSION: usize = 8;
pub const DEFAULT_MAX_ROWS: usize = 1000;

#[derive(Debug, Clone)]
pub struct Config {
    pub bind_addr: String,
    pub bind_port: u16,
    pub database_path: String,
    pub session_buffer: usize,
    pub max_inflight_per_session: usize,
    pub max_rows: usize,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("BIND_PORT must be a valid u16")]
    InvalidPort,
    #[error("{0} must be a positive integer")]
    InvalidLimit(&'static str),
    #[error("invalid bind address or port")]
    InvalidSocket,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the config from an arbitrary key lookup, so tests don't have to
    /// touch the process environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let bind_addr = lookup("BIND_ADDR").unwrap_or_else(|| "127.0.0.1".to_string());
        let bind_port = lookup("BIND_PORT")
            .map(|value| value.trim().parse::<u16>().map_err(|_| ConfigError::InvalidPort))
            .transpose()?
            .unwrap_or(8080);
        let database_path = lookup("MCP_DATABASE_PATH")
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
            .unwrap_or_else(|| ":memory:".to_string());

        let config = Self {
            bind_addr,
            bind_port,
            database_path,
            session_buffer: positive(&lookup, "MCP_SESSION_BUFFER", DEFAULT_SESSION_BUFFER)?,
            max_inflight_per_session: positive(
                &lookup,
                "MCP_MAX_INFLIGHT_PER_SESSION",
                DEFAULT_MAX_INFLIGHT_PER_SESSION,
            )?,
            max_rows: positive(&lookup, "MCP_MAX_ROWS", DEFAULT_MAX_ROWS)?,
        };

        let _ = config.bind_socket()?;
        Ok(config)
    }

    pub fn bind_socket(&self) -> Result<SocketAddr, ConfigError> {
        format!("{}:{}", self.bind_addr, self.bind_port)
            .parse::<SocketAddr>()
            .map_err(|_| ConfigError::InvalidSocket)
    }
}

fn positive<F>(lookup: &F, key: &'static str, default: usize) -> Result<usize, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        None => Ok(default),
        Some(value) => value
            .trim()
            .parse::<usize>()
            .ok()
            .filter(|parsed| *parsed > 0)
            .ok_or(ConfigError::InvalidLimit(key)),
    }
}
