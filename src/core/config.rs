//! Run Configuration Resolution
//!
//! Resolves the transport, host and port the server should run with. Values are
//! read from the process environment first, then from an optional `.env` file,
//! then fall back to built-in defaults. The resolved configuration is validated
//! eagerly and is immutable afterwards.

use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

use serde::Serialize;
use tracing::{debug, error, info, warn};

/// Environment variable selecting the transport.
pub const TRANSPORT_VAR: &str = "MCP_TRANSPORT";
/// Environment variable holding the bind host for HTTP transports.
pub const HOST_VAR: &str = "MCP_HOST";
/// Environment variable holding the bind port for HTTP transports.
pub const PORT_VAR: &str = "MCP_PORT";

pub const DEFAULT_TRANSPORT: Transport = Transport::StreamableHttp;
pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 8000;

/// Errors detected while resolving the run configuration.
///
/// All of these are fatal at startup.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid transport '{0}': must be one of stdio, sse, streamable-http")]
    InvalidTransport(String),
    #[error("invalid port '{0}': must be an integer between 1 and 65535")]
    InvalidPort(String),
}

/// Supported MCP transports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Transport {
    /// Newline-delimited JSON-RPC over stdin/stdout.
    #[serde(rename = "stdio")]
    Stdio,
    /// Legacy Server-Sent Events transport (`GET /sse` + `POST /messages`).
    #[serde(rename = "sse")]
    Sse,
    /// Streamable HTTP transport (`POST /mcp`).
    #[serde(rename = "streamable-http")]
    StreamableHttp,
}

impl Transport {
    pub const ALL: [Transport; 3] = [Transport::Stdio, Transport::Sse, Transport::StreamableHttp];

    /// Canonical lowercase name of the transport.
    pub fn as_str(&self) -> &'static str {
        match self {
            Transport::Stdio => "stdio",
            Transport::Sse => "sse",
            Transport::StreamableHttp => "streamable-http",
        }
    }

    /// Whether this transport listens on a network address.
    pub fn is_network(&self) -> bool {
        !matches!(self, Transport::Stdio)
    }
}

impl fmt::Display for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Transport {
    type Err = ConfigError;

    /// Parses a transport name, ignoring case and surrounding whitespace.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase();
        Transport::ALL
            .into_iter()
            .find(|t| t.as_str() == normalized)
            .ok_or(ConfigError::InvalidTransport(normalized))
    }
}

/// Parses a port number and checks it lies within 1..=65535.
pub fn parse_port(raw: &str) -> Result<u16, ConfigError> {
    let trimmed = raw.trim();
    match trimmed.parse::<i64>() {
        Ok(port) if (1..=65535).contains(&port) => Ok(port as u16),
        _ => Err(ConfigError::InvalidPort(trimmed.to_string())),
    }
}

/// Source of configuration values, injectable for testing.
pub trait EnvProvider {
    /// Get a configuration value by key.
    fn get(&self, key: &str) -> Option<String>;
}

/// Reads the process environment, falling back to values loaded from a
/// `.env` file. Process variables always win over `.env` entries.
///
/// The file is read before logging is set up (it may carry `RUST_LOG`), so
/// problems loading it are kept and reported by [`SystemEnv::log_load_status`].
#[derive(Debug, Default)]
pub struct SystemEnv {
    dotenv: HashMap<String, String>,
    load_error: Option<String>,
}

impl SystemEnv {
    /// Process environment layered over the given `.env` file.
    ///
    /// A missing file is not an error. A malformed file is ignored as a whole
    /// and the failure recorded for [`SystemEnv::log_load_status`].
    pub fn with_dotenv(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        let iter = match dotenvy::from_path_iter(path) {
            Ok(iter) => iter,
            Err(e) if e.not_found() => return Self::default(),
            Err(e) => return Self::failed(path, e),
        };

        let mut dotenv = HashMap::new();
        for item in iter {
            match item {
                Ok((key, value)) => {
                    dotenv.insert(key, value);
                }
                Err(e) => return Self::failed(path, e),
            }
        }
        Self {
            dotenv,
            load_error: None,
        }
    }

    fn failed(path: &Path, err: dotenvy::Error) -> Self {
        Self {
            dotenv: HashMap::new(),
            load_error: Some(format!("Ignoring env file {}: {}", path.display(), err)),
        }
    }

    /// Why the `.env` file was ignored, if it was.
    pub fn load_error(&self) -> Option<&str> {
        self.load_error.as_deref()
    }

    /// Report the outcome of loading the `.env` file. Call once logging is up.
    pub fn log_load_status(&self) {
        match &self.load_error {
            Some(e) => warn!("{}", e),
            None => debug!("Loaded {} entries from env file", self.dotenv.len()),
        }
    }
}

impl EnvProvider for SystemEnv {
    fn get(&self, key: &str) -> Option<String> {
        std::env::var(key)
            .ok()
            .or_else(|| self.dotenv.get(key).cloned())
    }
}

/// Test environment provider with predefined variables.
#[cfg(test)]
#[derive(Default)]
pub struct MockEnv {
    vars: HashMap<String, String>,
}

#[cfg(test)]
impl MockEnv {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_var(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.vars.insert(key.into(), value.into());
        self
    }
}

#[cfg(test)]
impl EnvProvider for MockEnv {
    fn get(&self, key: &str) -> Option<String> {
        self.vars.get(key).cloned()
    }
}

/// Validated configuration the server is started with.
///
/// Built once at startup and handed to whichever transport runs the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunConfiguration {
    pub transport: Transport,
    pub host: String,
    pub port: u16,
}

impl Default for RunConfiguration {
    fn default() -> Self {
        Self {
            transport: DEFAULT_TRANSPORT,
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
        }
    }
}

/// Transport-specific parameters derived from a [`RunConfiguration`].
///
/// Serializes to `{"transport": "stdio"}` for the pipe transport and to
/// `{"transport", "host", "port"}` for network transports.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunParameters {
    pub transport: Transport,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
}

impl RunParameters {
    /// `host:port` for network transports.
    pub fn bind_addr(&self) -> Option<String> {
        match (&self.host, self.port) {
            (Some(host), Some(port)) => Some(format!("{}:{}", host, port)),
            _ => None,
        }
    }
}

impl RunConfiguration {
    /// Build a configuration from raw strings, validating each field.
    pub fn from_parts(transport: &str, host: &str, port: &str) -> Result<Self, ConfigError> {
        let transport = transport.parse::<Transport>()?;
        let port = parse_port(port)?;
        Ok(Self {
            transport,
            host: host.to_string(),
            port,
        })
    }

    /// Parameters the selected transport actually accepts.
    ///
    /// The stdio transport has no network address, so host and port are dropped.
    pub fn run_parameters(&self) -> RunParameters {
        if !self.transport.is_network() {
            debug!("stdio transport: excluding host and port");
            return RunParameters {
                transport: self.transport,
                host: None,
                port: None,
            };
        }
        RunParameters {
            transport: self.transport,
            host: Some(self.host.clone()),
            port: Some(self.port),
        }
    }

    pub fn log_config(&self) {
        info!("MCP Transport: {}", self.transport);
        info!("MCP Host: {}", self.host);
        info!("MCP Port: {}", self.port);
    }
}

impl fmt::Display for RunConfiguration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "RunConfiguration(transport={}, host={}, port={})",
            self.transport, self.host, self.port
        )
    }
}

/// Resolve the run configuration from the given environment.
///
/// Unset keys fall back to `streamable-http`, `0.0.0.0` and `8000`.
pub fn resolve(env: &impl EnvProvider) -> Result<RunConfiguration, ConfigError> {
    let transport = env
        .get(TRANSPORT_VAR)
        .unwrap_or_else(|| DEFAULT_TRANSPORT.as_str().to_string());
    let host = env.get(HOST_VAR).unwrap_or_else(|| DEFAULT_HOST.to_string());
    let port = env.get(PORT_VAR).unwrap_or_else(|| DEFAULT_PORT.to_string());

    match RunConfiguration::from_parts(&transport, &host, &port) {
        Ok(config) => {
            debug!("Configuration resolved: {}", config);
            Ok(config)
        }
        Err(e) => {
            error!("Failed to resolve configuration: {}", e);
            Err(e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::Write;

    #[test]
    fn transport_names_are_canonical() {
        assert_eq!(Transport::Stdio.as_str(), "stdio");
        assert_eq!(Transport::Sse.as_str(), "sse");
        assert_eq!(Transport::StreamableHttp.as_str(), "streamable-http");
    }

    #[test]
    fn defaults_when_environment_is_empty() {
        let config = resolve(&MockEnv::new()).unwrap();
        assert_eq!(config, RunConfiguration::default());
        assert_eq!(config.transport, Transport::StreamableHttp);
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 8000);
    }

    #[test]
    fn transport_is_case_and_whitespace_insensitive() {
        for raw in ["stdio", "STDIO", "  stdio  ", "\tStdIo\n"] {
            assert_eq!(raw.parse::<Transport>().unwrap(), Transport::Stdio, "{raw:?}");
        }
        assert_eq!(" SSE ".parse::<Transport>().unwrap(), Transport::Sse);
        assert_eq!(
            "Streamable-HTTP".parse::<Transport>().unwrap(),
            Transport::StreamableHttp
        );
    }

    #[test]
    fn unknown_transport_is_rejected() {
        for raw in ["invalid-transport", "http", "", "streamable_http", "websocket"] {
            let err = raw.parse::<Transport>().unwrap_err();
            assert!(matches!(err, ConfigError::InvalidTransport(_)), "{raw:?}");
        }

        let env = MockEnv::new().with_var(TRANSPORT_VAR, "invalid");
        assert_eq!(
            resolve(&env).unwrap_err(),
            ConfigError::InvalidTransport("invalid".to_string())
        );
    }

    #[test]
    fn port_out_of_range_is_rejected() {
        for raw in ["0", "65536", "-1", "100000"] {
            assert_eq!(
                parse_port(raw).unwrap_err(),
                ConfigError::InvalidPort(raw.to_string())
            );
        }
    }

    #[test]
    fn non_numeric_port_is_rejected() {
        for raw in ["abc", "80a", "", "8000.5"] {
            assert!(matches!(parse_port(raw), Err(ConfigError::InvalidPort(_))), "{raw:?}");
        }
        let env = MockEnv::new().with_var(PORT_VAR, "eighty");
        assert!(matches!(resolve(&env), Err(ConfigError::InvalidPort(_))));
    }

    #[test]
    fn port_in_range_is_preserved() {
        for port in [1u16, 80, 3000, 8000, 65535] {
            assert_eq!(parse_port(&port.to_string()).unwrap(), port);
        }
        assert_eq!(parse_port(" 9000 ").unwrap(), 9000);
    }

    #[test]
    fn resolve_reads_environment() {
        let env = MockEnv::new()
            .with_var(TRANSPORT_VAR, "stdio")
            .with_var(HOST_VAR, "localhost")
            .with_var(PORT_VAR, "5000");
        let config = resolve(&env).unwrap();
        assert_eq!(config.transport, Transport::Stdio);
        assert_eq!(config.host, "localhost");
        assert_eq!(config.port, 5000);
    }

    #[test]
    fn stdio_parameters_contain_only_transport() {
        let config = RunConfiguration::from_parts("stdio", "ignored-host", "9999").unwrap();
        let params = config.run_parameters();
        assert_eq!(serde_json::to_value(&params).unwrap(), json!({ "transport": "stdio" }));
        assert_eq!(params.bind_addr(), None);
    }

    #[test]
    fn streamable_http_parameters_include_address() {
        let config =
            RunConfiguration::from_parts("streamable-http", "192.168.1.1", "3000").unwrap();
        let params = config.run_parameters();
        assert_eq!(
            serde_json::to_value(&params).unwrap(),
            json!({ "transport": "streamable-http", "host": "192.168.1.1", "port": 3000 })
        );
        assert_eq!(params.bind_addr().as_deref(), Some("192.168.1.1:3000"));
    }

    #[test]
    fn sse_parameters_include_address() {
        let config = RunConfiguration::from_parts("sse", "127.0.0.1", "8000").unwrap();
        assert_eq!(
            serde_json::to_value(config.run_parameters()).unwrap(),
            json!({ "transport": "sse", "host": "127.0.0.1", "port": 8000 })
        );
    }

    #[test]
    fn display_names_every_field() {
        let config = RunConfiguration::from_parts("stdio", "localhost", "3000").unwrap();
        let rendered = config.to_string();
        assert!(rendered.contains("RunConfiguration"));
        assert!(rendered.contains("stdio"));
        assert!(rendered.contains("localhost"));
        assert!(rendered.contains("3000"));
    }

    #[test]
    fn log_config_does_not_panic() {
        RunConfiguration::default().log_config();
    }

    #[test]
    fn dotenv_supplies_values_absent_from_process() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "MCP_DEMO_TEST_ONLY_KEY=from-dotenv").unwrap();
        writeln!(file, "PATH=from-dotenv").unwrap();

        let env = SystemEnv::with_dotenv(file.path());
        assert_eq!(env.get("MCP_DEMO_TEST_ONLY_KEY").as_deref(), Some("from-dotenv"));
        // Process variables take priority over the file.
        assert_ne!(env.get("PATH").as_deref(), Some("from-dotenv"));
    }

    #[test]
    fn missing_dotenv_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let env = SystemEnv::with_dotenv(dir.path().join(".env"));
        assert_eq!(env.get("MCP_DEMO_TEST_ONLY_KEY"), None);
        assert_eq!(env.load_error(), None);
    }

    #[test]
    fn malformed_dotenv_is_ignored_and_reported() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "MCP_DEMO_TEST_ONLY_GOOD=1").unwrap();
        writeln!(file, "this line is not an assignment").unwrap();

        let env = SystemEnv::with_dotenv(file.path());
        assert_eq!(env.get("MCP_DEMO_TEST_ONLY_GOOD"), None);
        assert!(env.load_error().unwrap().starts_with("Ignoring env file"));
        env.log_load_status();
    }
}
