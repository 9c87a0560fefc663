/// Server Configuration
///
/// All settings come from environment variables and are read once at
/// startup into a typed [`Config`]. Parsing goes through [`Config::from_lookup`]
/// so it can be exercised without touching the process environment.
///
/// Environment Variables:
/// - SERVER_NAME / MCP_SERVER_NAME: Name of the server (default: "Supabase MCP Server")
/// - SERVER_VERSION / MCP_SERVER_VERSION: Version string (default: crate version)
/// - MCP_TRANSPORT_MODE: "http", "stdio", or "both" (default: "http")
/// - HOST: Bind address for HTTP mode (default: "0.0.0.0")
/// - PORT: Port number for HTTP mode (default: 8000)
/// - WORKER_THREADS: HTTP worker count (default: CPU count, max 16)
/// - MAX_BODY_BYTES: Largest accepted request body (default: 1 MiB)
/// - DATABASE_URL / SUPABASE_DB_URL: Postgres connection string
/// - SQL_TIMEOUT_SECS: Bound on connecting and on each query (default: 5)
/// - MCP_SIMULATION_MODE: Serve canned data when no database is configured
/// - MCP_TOOLS_ALLOWLIST: Path of a file restricting the exposed tools
/// - SUPABASE_ANON_KEY, SUPABASE_SERVICE_KEY: Secrets kept out of logs
/// - MCP_REDACT_ENV: Comma separated names of further env vars holding secrets

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::core::error::{ServerError, ServerResult};
use crate::core::redact::{Redactor, url_password};

const DEFAULT_SERVER_NAME: &str = "Supabase MCP Server";
const DEFAULT_PORT: u16 = 8000;
const DEFAULT_MAX_BODY_BYTES: usize = 1024 * 1024;
const DEFAULT_SQL_TIMEOUT_SECS: u64 = 5;
const MAX_WORKERS: usize = 16;

/// Env vars whose values are always treated as secrets
const SECRET_VARS: &[&str] = &["SUPABASE_ANON_KEY", "SUPABASE_SERVICE_KEY"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transport {
    Http,
    Stdio,
    Both,
}

impl FromStr for Transport {
    type Err = ServerError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "http" => Ok(Transport::Http),
            "stdio" => Ok(Transport::Stdio),
            "both" => Ok(Transport::Both),
            other => Err(ServerError::Config(format!(
                "invalid transport mode '{}': must be 'stdio', 'http', or 'both'",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub server_name: String,
    pub server_version: String,
    pub transport: Transport,
    pub host: String,
    pub port: u16,
    pub workers: usize,
    pub max_body_bytes: usize,
    pub database_url: Option<String>,
    pub sql_timeout: Duration,
    pub simulation_mode: bool,
    pub allowlist_path: Option<PathBuf>,
    /// Secret values to scrub from logs and error messages
    pub secrets: Vec<String>,
}

impl Config {
    pub fn from_env() -> ServerResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> ServerResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let database_url = get("DATABASE_URL").or_else(|| get("SUPABASE_DB_URL"));

        let mut secrets: Vec<String> = SECRET_VARS.iter().filter_map(|key| get(*key)).collect();
        if let Some(extra) = get("MCP_REDACT_ENV") {
            secrets.extend(
                extra
                    .split(',')
                    .map(str::trim)
                    .filter(|key| !key.is_empty())
                    .filter_map(|key| get(key)),
            );
        }
        if let Some(url) = &database_url {
            secrets.push(url.clone());
            if let Some(password) = url_password(url) {
                secrets.push(password.to_string());
            }
        }

        let workers = match get("WORKER_THREADS") {
            Some(raw) => parse_value::<usize>("WORKER_THREADS", &raw)?.max(1),
            None => num_cpus::get().clamp(1, MAX_WORKERS),
        };

        Ok(Self {
            server_name: get("SERVER_NAME")
                .or_else(|| get("MCP_SERVER_NAME"))
                .unwrap_or_else(|| DEFAULT_SERVER_NAME.to_string()),
            server_version: get("SERVER_VERSION")
                .or_else(|| get("MCP_SERVER_VERSION"))
                .unwrap_or_else(|| env!("CARGO_PKG_VERSION").to_string()),
            transport: get("MCP_TRANSPORT_MODE")
                .map(|raw| raw.parse())
                .transpose()?
                .unwrap_or(Transport::Http),
            host: get("HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
            port: parse_or("PORT", get("PORT"), DEFAULT_PORT)?,
            workers,
            max_body_bytes: parse_or("MAX_BODY_BYTES", get("MAX_BODY_BYTES"), DEFAULT_MAX_BODY_BYTES)?,
            database_url,
            sql_timeout: Duration::from_secs(parse_or(
                "SQL_TIMEOUT_SECS",
                get("SQL_TIMEOUT_SECS"),
                DEFAULT_SQL_TIMEOUT_SECS,
            )?),
            simulation_mode: get("MCP_SIMULATION_MODE")
                .map(|raw| parse_flag("MCP_SIMULATION_MODE", &raw))
                .transpose()?
                .unwrap_or(false),
            allowlist_path: get("MCP_TOOLS_ALLOWLIST").map(PathBuf::from),
            secrets,
        })
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn redactor(&self) -> Redactor {
        Redactor::new(self.secrets.iter().cloned())
    }
}

fn parse_value<T: FromStr>(key: &str, raw: &str) -> ServerResult<T> {
    raw.parse()
        .map_err(|_| ServerError::Config(format!("{} has an invalid value: '{}'", key, raw)))
}

fn parse_or<T: FromStr>(key: &str, raw: Option<String>, default: T) -> ServerResult<T> {
    match raw {
        Some(raw) => parse_value(key, &raw),
        None => Ok(default),
    }
}

fn parse_flag(key: &str, raw: &str) -> ServerResult<bool> {
    match raw.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ServerError::Config(format!("{} must be a boolean, got '{}'", key, raw))),
    }
}
