//! Utility Functions for Environment and Logging Setup

use std::sync::Arc;

use tracing_subscriber::EnvFilter;

use crate::core::config::EnvProvider;
use crate::core::protocol::AppState;
use crate::core::registry::ToolRegistry;

pub const DEFAULT_SERVER_NAME: &str = "mcp-protocol-demo";
pub const DEFAULT_LOG_FILTER: &str = "info";

/// Install the global tracing subscriber.
///
/// Output goes to stderr so the STDIO transport keeps stdout for protocol
/// messages. The filter comes from [`log_filter`].
pub fn init_logging(env: &impl EnvProvider) {
    let filter = log_filter(env);
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

/// Log filter from `RUST_LOG`, read through `env` so a `.env` file can set
/// it. Missing or unparsable directives fall back to `info`.
pub fn log_filter(env: &impl EnvProvider) -> EnvFilter {
    env.get("RUST_LOG")
        .and_then(|directives| EnvFilter::try_new(directives).ok())
        .unwrap_or_else(|| EnvFilter::new(DEFAULT_LOG_FILTER))
}

/// Get a value from the environment with a default fallback.
pub fn get_env_var(env: &impl EnvProvider, key: &str, default: &str) -> String {
    env.get(key).unwrap_or_else(|| default.to_string())
}

/// Worker thread count for the HTTP server.
///
/// `WORKER_THREADS` overrides; otherwise the CPU count capped at 16.
pub fn worker_threads(env: &impl EnvProvider) -> usize {
    env.get("WORKER_THREADS")
        .and_then(|s| s.trim().parse::<usize>().ok())
        .filter(|&n| n > 0)
        .unwrap_or_else(|| num_cpus::get().clamp(1, 16))
}

/// Build the shared server state from `SERVER_NAME` / `SERVER_VERSION`.
pub fn app_state(env: &impl EnvProvider, registry: Arc<ToolRegistry>) -> AppState {
    AppState {
        server_name: get_env_var(env, "SERVER_NAME", DEFAULT_SERVER_NAME),
        server_version: get_env_var(env, "SERVER_VERSION", env!("CARGO_PKG_VERSION")),
        registry,
    }
}
