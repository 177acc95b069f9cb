/// MCP Demo Server Entry Point
///
/// Resolves the run configuration from the environment (and an optional
/// `.env` file), then starts the selected transport.
///
/// Environment Variables:
/// - MCP_TRANSPORT: "stdio", "sse" or "streamable-http" (default: "streamable-http")
/// - MCP_HOST: Bind address for HTTP transports (default: "0.0.0.0")
/// - MCP_PORT: Port for HTTP transports (default: 8000)
/// - SERVER_NAME / SERVER_VERSION: reported by `initialize`
/// - WORKER_THREADS: HTTP worker count (default: CPU count, max 16)
/// - RUST_LOG: log filter (default: "info")
///
/// Exit codes: 0 on success or Ctrl-C, 1 on configuration or server error.

mod core;
mod tools;

use std::process::ExitCode;

use tracing::{error, info};

use crate::core::config::{self, EnvProvider, RunConfiguration, SystemEnv, Transport};
use crate::core::protocol::AppState;
use crate::core::{server, stdio, utils};
use crate::tools::Pacing;

#[tokio::main]
async fn main() -> ExitCode {
    // `.env` first so it can carry RUST_LOG.
    let env = SystemEnv::with_dotenv(".env");
    utils::init_logging(&env);
    env.log_load_status();

    let config = match load_config(&env) {
        Ok(config) => config,
        Err(code) => return code,
    };

    info!("{}", "=".repeat(60));
    info!("Starting MCP Server");
    info!("{}", "=".repeat(60));
    config.log_config();
    info!("{}", "=".repeat(60));

    let state = utils::app_state(&env, server::initialize_tools(Pacing::default()));
    let result = run(config, state, utils::worker_threads(&env)).await;
    exit_code(&result)
}

/// Resolve the run configuration, mapping a `ConfigError` to exit code 1.
fn load_config(env: &impl EnvProvider) -> Result<RunConfiguration, ExitCode> {
    config::resolve(env).map_err(|e| {
        error!("Configuration error: {}", e);
        eprintln!("Configuration error: {}", e);
        ExitCode::from(1)
    })
}

/// Exit code for a finished server: 0 on a clean stop (including Ctrl-C),
/// 1 on a server error.
fn exit_code(result: &std::io::Result<()>) -> ExitCode {
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("Server error: {}", e);
            eprintln!("Server error: {}", e);
            ExitCode::from(1)
        }
    }
}

async fn run(
    config: RunConfiguration,
    state: AppState,
    workers: usize,
) -> std::io::Result<()> {
    let params = config.run_parameters();
    match params.transport {
        Transport::Stdio => {
            tokio::select! {
                result = stdio::run_server_stdio(state) => result,
                _ = tokio::signal::ctrl_c() => {
                    info!("Server shutdown requested by user");
                    Ok(())
                }
            }
        }
        // Actix handles Ctrl-C itself and shuts down gracefully.
        Transport::Sse | Transport::StreamableHttp => {
            server::run_server_http(state, &params, workers).await
        }
    }
}
