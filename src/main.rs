/// MCP Server Entry Point
///
/// Reads configuration from the environment (see `core::config` for the
/// full list of variables), builds the data store and the tool registry,
/// then starts the transport(s) selected by `MCP_TRANSPORT_MODE`.
///
/// Logs go to stderr: compact text by default, JSON lines when
/// `LOG_FORMAT=json`. `RUST_LOG` controls the filter (default: "info").

mod core;
mod store;
mod tools;

use std::process::ExitCode;
use std::sync::Arc;

use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use crate::core::allowlist::AllowList;
use crate::core::config::{Config, Transport};
use crate::core::error::ServerResult;
use crate::core::gateway::{Gateway, ServerInfo};
use crate::core::registry::ToolRegistry;
use crate::core::server;
use crate::store::StoreMode;

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let json = std::env::var("LOG_FORMAT").is_ok_and(|format| format.eq_ignore_ascii_case("json"));

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(fmt::layer().json().with_writer(std::io::stderr)).init();
    } else {
        registry.with(fmt::layer().with_writer(std::io::stderr)).init();
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    init_logging();

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("{}", e);
            return ExitCode::FAILURE;
        }
    };

    let redactor = config.redactor();
    match run(config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", redactor.redact(&e.to_string()));
            ExitCode::FAILURE
        }
    }
}

async fn run(config: Config) -> ServerResult<()> {
    let store = store::from_config(&config)?;
    match store.mode() {
        StoreMode::Postgres => info!(timeout_secs = config.sql_timeout.as_secs(), "using Postgres data store"),
        StoreMode::Simulation => warn!("simulation mode enabled: tools return canned data"),
        StoreMode::Unconfigured => {
            warn!("no DATABASE_URL set and simulation mode is off: every tool call will fail")
        }
    }

    let mut registry = ToolRegistry::new();
    tools::register_all(&mut registry, &store)?;
    if let Some(path) = &config.allowlist_path {
        let allow_list = AllowList::from_file(path)?;
        registry = registry.restrict(&allow_list);
        info!(
            path = %path.display(),
            entries = allow_list.len(),
            exposed = registry.len(),
            "tool allow-list applied"
        );
    }

    let gateway = Arc::new(Gateway::new(
        ServerInfo {
            name: config.server_name.clone(),
            version: config.server_version.clone(),
        },
        Arc::new(registry),
        store.mode(),
        config.redactor(),
    ));

    match config.transport {
        Transport::Stdio => server::run_server_stdio(gateway).await?,
        Transport::Http => server::run_server_http(&config, gateway).await?,
        Transport::Both => {
            // STDIO in the background for local inspectors, HTTP in the foreground
            let stdio_gateway = Arc::clone(&gateway);
            let stdio_handle = tokio::spawn(async move {
                if let Err(e) = server::run_server_stdio(stdio_gateway).await {
                    error!("STDIO server error: {}", e);
                }
            });

            let http_result = server::run_server_http(&config, gateway).await;
            stdio_handle.abort();
            http_result?
        }
    }

    Ok(())
}
