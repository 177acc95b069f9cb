//! MCP Protocol Handling
//!
//! JSON-RPC 2.0 message types and the method dispatcher shared by every
//! transport. Dispatching a request yields a stream of outbound messages:
//! zero or more `notifications/progress` messages followed by the response.
//! Transports decide how to deliver that stream (stdout lines, one JSON body,
//! or SSE events).

use std::sync::Arc;

use futures_util::StreamExt;
use futures_util::stream::BoxStream;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{debug, warn};

use crate::core::registry::{ToolEvent, ToolRegistry};

pub const PROTOCOL_VERSION: &str = "2024-11-05";

pub const PARSE_ERROR: i32 = -32700;
pub const INVALID_REQUEST: i32 = -32600;
pub const METHOD_NOT_FOUND: i32 = -32601;
pub const INVALID_PARAMS: i32 = -32602;
pub const INTERNAL_ERROR: i32 = -32603;

/// State shared by every transport and worker.
#[derive(Clone)]
pub struct AppState {
    /// Server name as reported in MCP initialize responses
    pub server_name: String,
    /// Server version string as reported in MCP initialize responses
    pub server_version: String,
    pub registry: Arc<ToolRegistry>,
}

/// JSON-RPC 2.0 request. A missing `id` marks a notification.
#[derive(Deserialize, Debug, Clone)]
pub struct MCPRequest {
    #[serde(default)]
    pub jsonrpc: String,
    #[serde(default)]
    pub id: Option<Value>,
    pub method: String,
    #[serde(default)]
    pub params: Option<Value>,
}

impl MCPRequest {
    pub fn is_notification(&self) -> bool {
        self.id.is_none()
    }
}

/// JSON-RPC 2.0 response. Exactly one of `result` and `error` is present.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct MCPResponse {
    pub jsonrpc: String,
    pub id: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<MCPError>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct MCPError {
    pub code: i32,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl MCPResponse {
    pub fn result(id: Option<Value>, result: Value) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            result: Some(result),
            error: None,
        }
    }

    pub fn error(id: Option<Value>, code: i32, message: impl Into<String>) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            result: None,
            error: Some(MCPError {
                code,
                message: message.into(),
                data: None,
            }),
        }
    }
}

/// Server-initiated JSON-RPC notification.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct MCPNotification {
    pub jsonrpc: String,
    pub method: String,
    pub params: Value,
}

impl MCPNotification {
    /// Build a `notifications/progress` message for the given token.
    ///
    /// `total` is omitted from the params when unknown.
    pub fn progress(token: Value, progress: u64, total: Option<u64>, message: String) -> Self {
        let mut params = json!({
            "progressToken": token,
            "progress": progress,
            "message": message,
        });
        if let Some(total) = total {
            params["total"] = json!(total);
        }
        Self {
            jsonrpc: "2.0".to_string(),
            method: "notifications/progress".to_string(),
            params,
        }
    }
}

/// A message the server sends to a client.
#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(untagged)]
pub enum Outbound {
    Notification(MCPNotification),
    Response(MCPResponse),
}

impl Outbound {
    pub fn to_json(&self) -> String {
        // Both variants are plain data; serialization cannot fail.
        serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string())
    }
}

/// Parse one incoming JSON-RPC message.
pub fn parse_request(raw: &[u8]) -> Result<MCPRequest, serde_json::Error> {
    serde_json::from_slice(raw)
}

/// Build a parse-error reply if the malformed message still carries an id.
pub fn parse_error_response(raw: &[u8], err: &serde_json::Error) -> Option<MCPResponse> {
    let partial = serde_json::from_slice::<Value>(raw).ok()?;
    let id = partial.get("id")?.clone();
    Some(MCPResponse::error(
        Some(id),
        PARSE_ERROR,
        format!("Parse error: {}", err),
    ))
}

/// Route a request to its method handler.
///
/// Notifications produce an empty stream.
pub fn dispatch(state: AppState, req: MCPRequest) -> BoxStream<'static, Outbound> {
    if req.is_notification() {
        debug!("Notification received: {}", req.method);
        return Box::pin(futures_util::stream::empty());
    }
    if req.jsonrpc != "2.0" {
        let response = MCPResponse::error(
            req.id,
            INVALID_REQUEST,
            "Invalid Request: jsonrpc must be \"2.0\"",
        );
        return Box::pin(futures_util::stream::once(async move {
            Outbound::Response(response)
        }));
    }

    let response = match req.method.as_str() {
        "initialize" => handle_initialize(&state, req.id),
        "ping" => MCPResponse::result(req.id, json!({})),
        "tools/list" => handle_tools_list(&state, req.id),
        "tools/call" => return handle_tools_call(state, req.id, req.params),
        _ => MCPResponse::error(
            req.id,
            METHOD_NOT_FOUND,
            format!("Method not found: {}", req.method),
        ),
    };
    Box::pin(futures_util::stream::once(async move {
        Outbound::Response(response)
    }))
}

/// Dispatch a request and keep only its final response.
pub async fn respond(state: AppState, req: MCPRequest) -> Option<MCPResponse> {
    let mut outbound = dispatch(state, req);
    let mut last = None;
    while let Some(message) = outbound.next().await {
        if let Outbound::Response(response) = message {
            last = Some(response);
        }
    }
    last
}

fn handle_initialize(state: &AppState, id: Option<Value>) -> MCPResponse {
    MCPResponse::result(
        id,
        json!({
            "protocolVersion": PROTOCOL_VERSION,
            "capabilities": {
                "tools": {}
            },
            "serverInfo": {
                "name": state.server_name,
                "version": state.server_version
            }
        }),
    )
}

fn handle_tools_list(state: &AppState, id: Option<Value>) -> MCPResponse {
    MCPResponse::result(id, json!({ "tools": state.registry.tools }))
}

fn tool_result(id: Option<Value>, text: String, is_error: bool) -> MCPResponse {
    MCPResponse::result(
        id,
        json!({
            "content": [
                {
                    "type": "text",
                    "text": text
                }
            ],
            "isError": is_error
        }),
    )
}

fn handle_tools_call(
    state: AppState,
    id: Option<Value>,
    params: Option<Value>,
) -> BoxStream<'static, Outbound> {
    Box::pin(async_stream::stream! {
        let Some(params) = params else {
            yield Outbound::Response(MCPResponse::error(id, INVALID_PARAMS, "Invalid params"));
            return;
        };

        let tool_name = params
            .get("name")
            .and_then(|v| v.as_str())
            .unwrap_or("")
            .to_string();
        let arguments = params.get("arguments").cloned().unwrap_or_else(|| json!({}));
        let progress_token = params
            .get("_meta")
            .and_then(|meta| meta.get("progressToken"))
            .cloned();

        let Some((_, handler)) = state.registry.get(&tool_name) else {
            yield Outbound::Response(MCPResponse::error(
                id,
                METHOD_NOT_FOUND,
                format!("Unknown tool: {}", tool_name),
            ));
            return;
        };

        let mut events = match handler.invoke(arguments) {
            Ok(events) => events,
            Err(e) => {
                debug!("Tool {} failed: {}", tool_name, e);
                yield Outbound::Response(tool_result(id, format!("Error: {}", e), true));
                return;
            }
        };

        while let Some(event) = events.next().await {
            match event {
                ToolEvent::Progress { progress, total, message, .. } => {
                    if let Some(token) = &progress_token {
                        yield Outbound::Notification(MCPNotification::progress(
                            token.clone(),
                            progress,
                            total,
                            message,
                        ));
                    }
                }
                ToolEvent::Done(value) => {
                    yield Outbound::Response(tool_result(id, value.to_string(), false));
                    return;
                }
            }
        }

        warn!("Tool {} finished without a result", tool_name);
        yield Outbound::Response(MCPResponse::error(
            id,
            INTERNAL_ERROR,
            format!("Tool {} produced no result", tool_name),
        ));
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::tools::{self, Pacing};

    pub(crate) fn test_state() -> AppState {
        let mut registry = ToolRegistry::new();
        tools::register_all(&mut registry, Pacing::immediate());
        AppState {
            server_name: "mcp-protocol-demo".to_string(),
            server_version: "0.1.0".to_string(),
            registry: Arc::new(registry),
        }
    }

    fn request(id: Option<Value>, method: &str, params: Option<Value>) -> MCPRequest {
        MCPRequest {
            jsonrpc: "2.0".to_string(),
            id,
            method: method.to_string(),
            params,
        }
    }

    async fn collect(req: MCPRequest) -> Vec<Value> {
        dispatch(test_state(), req)
            .map(|m| serde_json::to_value(m).unwrap())
            .collect()
            .await
    }

    #[tokio::test]
    async fn initialize_reports_server_info() {
        let out = collect(request(Some(json!(1)), "initialize", None)).await;
        assert_eq!(
            out,
            vec![json!({
                "jsonrpc": "2.0",
                "id": 1,
                "result": {
                    "protocolVersion": "2024-11-05",
                    "capabilities": { "tools": {} },
                    "serverInfo": { "name": "mcp-protocol-demo", "version": "0.1.0" }
                }
            })]
        );
    }

    #[tokio::test]
    async fn tools_list_names_every_tool() {
        let out = collect(request(Some(json!("a")), "tools/list", None)).await;
        let tools = out[0]["result"]["tools"].as_array().unwrap();
        let names: Vec<_> = tools.iter().map(|t| t["name"].as_str().unwrap()).collect();
        assert_eq!(names, ["add", "countdown", "stream_sum"]);
        assert!(tools[0].get("inputSchema").is_some());
    }

    #[tokio::test]
    async fn add_call_returns_text_content() {
        let params = json!({ "name": "add", "arguments": { "a": 3, "b": 4 } });
        let out = collect(request(Some(json!(7)), "tools/call", Some(params))).await;
        assert_eq!(out.len(), 1);
        let result = &out[0]["result"];
        assert_eq!(result["isError"], json!(false));
        let text = result["content"][0]["text"].as_str().unwrap();
        let payload: Value = serde_json::from_str(text).unwrap();
        assert_eq!(payload, json!({ "a": 3.0, "b": 4.0, "sum": 7.0 }));
    }

    #[tokio::test]
    async fn progressive_call_without_token_sends_only_the_result() {
        let params = json!({ "name": "stream_sum", "arguments": { "n": 5 } });
        let out = collect(request(Some(json!(2)), "tools/call", Some(params))).await;
        assert_eq!(out.len(), 1);
        let text = out[0]["result"]["content"][0]["text"].as_str().unwrap();
        assert_eq!(serde_json::from_str::<Value>(text).unwrap(), json!({ "final_sum": 15 }));
    }

    #[tokio::test]
    async fn progressive_call_with_token_reports_progress_first() {
        let params = json!({
            "name": "countdown",
            "arguments": { "start": 3 },
            "_meta": { "progressToken": "tok" }
        });
        let out = collect(request(Some(json!(3)), "tools/call", Some(params))).await;
        assert_eq!(out.len(), 4);
        for (i, note) in out[..3].iter().enumerate() {
            assert_eq!(note["method"], json!("notifications/progress"));
            assert_eq!(note["params"]["progressToken"], json!("tok"));
            assert_eq!(note["params"]["progress"], json!(i + 1));
            assert_eq!(note["params"]["total"], json!(3));
            assert!(note.get("id").is_none());
        }
        assert_eq!(out[0]["params"]["message"], json!("Counting down: 3"));
        assert_eq!(out[3]["id"], json!(3));
        assert_eq!(out[3]["result"]["content"][0]["text"], json!(r#"{"done":true}"#));
    }

    #[tokio::test]
    async fn bad_arguments_are_tool_errors() {
        let params = json!({ "name": "countdown", "arguments": {} });
        let out = collect(request(Some(json!(4)), "tools/call", Some(params))).await;
        assert_eq!(out[0]["result"]["isError"], json!(true));
        assert_eq!(
            out[0]["result"]["content"][0]["text"],
            json!("Error: Missing required parameter: start")
        );
    }

    #[tokio::test]
    async fn overflowing_add_is_a_tool_error() {
        let params = json!({ "name": "add", "arguments": { "a": 1e308, "b": 1e308 } });
        let out = collect(request(Some(json!(12)), "tools/call", Some(params))).await;
        assert_eq!(out[0]["result"]["isError"], json!(true));
        assert_eq!(out[0]["result"]["content"][0]["text"], json!("Error: Result out of range"));
    }

    #[tokio::test]
    async fn protocol_errors_use_json_rpc_codes() {
        let out = collect(request(Some(json!(5)), "tools/call", None)).await;
        assert_eq!(out[0]["error"]["code"], json!(INVALID_PARAMS));

        let params = json!({ "name": "nope" });
        let out = collect(request(Some(json!(6)), "tools/call", Some(params))).await;
        assert_eq!(out[0]["error"]["code"], json!(METHOD_NOT_FOUND));
        assert_eq!(out[0]["error"]["message"], json!("Unknown tool: nope"));

        let out = collect(request(Some(json!(7)), "resources/list", None)).await;
        assert_eq!(out[0]["error"]["code"], json!(METHOD_NOT_FOUND));

        let mut req = request(Some(json!(8)), "ping", None);
        req.jsonrpc = "1.0".to_string();
        let out = collect(req).await;
        assert_eq!(out[0]["error"]["code"], json!(INVALID_REQUEST));
    }

    #[tokio::test]
    async fn notifications_get_no_reply() {
        let out = collect(request(None, "notifications/initialized", None)).await;
        assert!(out.is_empty());
    }

    #[tokio::test]
    async fn respond_keeps_only_the_response() {
        let params = json!({
            "name": "stream_sum",
            "arguments": { "n": 2 },
            "_meta": { "progressToken": 1 }
        });
        let response = respond(test_state(), request(Some(json!(9)), "tools/call", Some(params)))
            .await
            .unwrap();
        assert_eq!(response.id, Some(json!(9)));
        assert!(response.error.is_none());
    }

    #[test]
    fn parse_errors_echo_the_id_when_present() {
        let raw = br#"{"jsonrpc":"2.0","id":11}"#;
        let err = parse_request(raw).unwrap_err();
        let reply = parse_error_response(raw, &err).unwrap();
        assert_eq!(reply.id, Some(json!(11)));
        assert_eq!(reply.error.unwrap().code, PARSE_ERROR);

        let raw = b"not json";
        let err = parse_request(raw).unwrap_err();
        assert!(parse_error_response(raw, &err).is_none());
    }
}
