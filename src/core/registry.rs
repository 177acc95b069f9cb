//! Tool Registry
//!
//! Holds every tool the server exposes: its metadata for `tools/list` and the
//! handler that runs it for `tools/call`. Handlers are either single-shot
//! (one JSON value back) or progressive (an async stream of events ending in
//! a final value).

use std::collections::HashMap;

use futures_util::stream::BoxStream;
use serde::Serialize;
use serde_json::Value;

/// MCP tool definition.
///
/// Serialized as-is in `tools/list` responses.
#[derive(Serialize, Debug, Clone)]
pub struct MCPTool {
    /// Unique tool identifier (e.g., "add", "countdown")
    pub name: String,
    /// Human-readable description of what the tool does
    pub description: String,
    /// JSON Schema defining the tool's input parameters
    #[serde(rename = "inputSchema")]
    pub input_schema: Value,
    /// How the direct `/tools/{name}` route delivers results
    #[serde(skip)]
    pub style: ResponseStyle,
}

/// Delivery style used when a tool is called through its direct HTTP route.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResponseStyle {
    /// One JSON body.
    #[default]
    Single,
    /// `text/event-stream`, one `data:` event per element.
    EventStream,
    /// Chunked body, one JSON document per line.
    Chunked,
}

/// One element of a progressive tool's output.
#[derive(Debug, Clone, PartialEq)]
pub enum ToolEvent {
    /// Intermediate value; `progress` counts up from 1.
    Progress {
        progress: u64,
        total: Option<u64>,
        /// Human-readable summary sent as the progress notification message
        message: String,
        data: Value,
    },
    /// Terminal value. Nothing follows it.
    Done(Value),
}

impl ToolEvent {
    /// The JSON payload carried by this event.
    pub fn data(&self) -> &Value {
        match self {
            ToolEvent::Progress { data, .. } => data,
            ToolEvent::Done(data) => data,
        }
    }

    /// Consume the event, keeping only its JSON payload.
    pub fn into_data(self) -> Value {
        match self {
            ToolEvent::Progress { data, .. } => data,
            ToolEvent::Done(data) => data,
        }
    }
}

pub type ToolStream = BoxStream<'static, ToolEvent>;

/// Tool handler function types.
///
/// Handlers receive the JSON arguments and return either a result or an
/// error string. Argument validation happens before any stream is built, so
/// a progressive handler that returns `Ok` always produces a `Done` event.
pub enum ToolHandler {
    Single(Box<dyn Fn(Value) -> Result<Value, String> + Send + Sync>),
    Progressive(Box<dyn Fn(Value) -> Result<ToolStream, String> + Send + Sync>),
}

impl ToolHandler {
    /// Run the handler, presenting both kinds as a stream of events.
    pub fn invoke(&self, args: Value) -> Result<ToolStream, String> {
        match self {
            ToolHandler::Single(f) => {
                let value = f(args)?;
                Ok(Box::pin(futures_util::stream::once(async move {
                    ToolEvent::Done(value)
                })))
            }
            ToolHandler::Progressive(f) => f(args),
        }
    }
}

/// Registry of available MCP tools.
///
/// The tool list keeps registration order for `tools/list`; handlers are
/// looked up by name for `tools/call`.
#[derive(Default)]
pub struct ToolRegistry {
    pub tools: Vec<MCPTool>,
    pub handlers: HashMap<String, ToolHandler>,
}

impl ToolRegistry {
    /// Create a new empty tool registry.
    ///
    /// Tools are added with [`ToolRegistry::register`] during server
    /// initialization.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool with the registry.
    ///
    /// The definition is appended to the tools list and the handler stored
    /// under the tool's name. A later registration under the same name
    /// replaces the earlier one.
    ///
    /// # Arguments
    /// * `tool` - Tool definition with name, description, and input schema
    /// * `handler` - Function that executes the tool when called
    pub fn register(&mut self, tool: MCPTool, handler: ToolHandler) {
        let name = tool.name.clone();
        self.tools.retain(|t| t.name != name);
        self.tools.push(tool);
        self.handlers.insert(name, handler);
    }

    /// Look up a tool definition and its handler by name.
    ///
    /// # Returns
    /// `None` if no tool with that name has been registered.
    pub fn get(&self, name: &str) -> Option<(&MCPTool, &ToolHandler)> {
        let tool = self.tools.iter().find(|t| t.name == name)?;
        let handler = self.handlers.get(name)?;
        Some((tool, handler))
    }
}
