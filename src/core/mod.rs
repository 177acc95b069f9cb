//! Core Server Framework Module
//!
//! - config.rs: run configuration resolution and validation
//! - protocol.rs: JSON-RPC types and MCP method dispatch
//! - registry.rs: tool definitions and handlers
//! - server.rs: HTTP transports (streamable-http, legacy SSE, direct tool routes)
//! - stdio.rs: STDIO transport
//! - utils.rs: environment helpers and logging setup

pub mod config;
pub mod protocol;
pub mod registry;
pub mod server;
pub mod stdio;
pub mod utils;
