//! HTTP Server Implementation
//!
//! Actix Web transports for the MCP server:
//! - streamable-http: `POST /mcp` answers with JSON, or with an event stream
//!   when the client accepts `text/event-stream`
//! - sse (legacy): `GET /sse` opens a push channel, `POST /messages` feeds it
//! - direct tool routes: `/tools/{name}` delivers results in the tool's own
//!   style (single JSON body, SSE events or chunked lines)
//! - `/health` and `/metrics` on every HTTP transport

use std::collections::HashMap;
use std::convert::Infallible;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use actix_web::{
    App, HttpRequest, HttpResponse, HttpServer, Result,
    http::header::{self, ContentEncoding},
    middleware::{Compress, DefaultHeaders, Logger},
    web,
};
use bytes::Bytes;
use futures_util::{Stream, StreamExt};
use serde::Deserialize;
use serde_json::{Value, json};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::core::config::{RunParameters, Transport};
use crate::core::protocol::{self, AppState, MCPResponse};
use crate::core::registry::{ResponseStyle, ToolEvent, ToolRegistry};
use crate::tools::{self, Pacing};

/// Messages buffered per SSE session before senders wait.
const SSE_CHANNEL_CAPACITY: usize = 64;

/// Initialize and register all tools.
///
/// # Arguments
/// * `pacing` - Delays used by the progressive tools
///
/// # Returns
/// The registry, shared between workers and transports.
pub fn initialize_tools(pacing: Pacing) -> Arc<ToolRegistry> {
    let mut registry = ToolRegistry::new();
    tools::register_all(&mut registry, pacing);
    Arc::new(registry)
}

/// Open legacy SSE sessions, keyed by session id.
///
/// Shared by every worker so a `POST /messages` can reach a stream opened on
/// another worker.
#[derive(Default)]
pub struct SseSessions {
    senders: Mutex<HashMap<String, mpsc::Sender<String>>>,
}

impl SseSessions {
    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, mpsc::Sender<String>>> {
        self.senders.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn insert(&self, id: String, sender: mpsc::Sender<String>) {
        self.lock().insert(id, sender);
    }

    fn get(&self, id: &str) -> Option<mpsc::Sender<String>> {
        self.lock().get(id).cloned()
    }

    fn remove(&self, id: &str) {
        self.lock().remove(id);
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }
}

/// Removes its session when the event stream holding it is dropped.
struct SessionGuard {
    sessions: web::Data<SseSessions>,
    id: String,
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        self.sessions.remove(&self.id);
        info!("SSE session {} closed", self.id);
    }
}

/// Format one Server-Sent Event.
fn sse_event(event: Option<&str>, data: &str) -> Bytes {
    let mut frame = String::with_capacity(data.len() + 32);
    if let Some(event) = event {
        frame.push_str("event: ");
        frame.push_str(event);
        frame.push('\n');
    }
    for line in data.lines() {
        frame.push_str("data: ");
        frame.push_str(line);
        frame.push('\n');
    }
    frame.push('\n');
    Bytes::from(frame)
}

fn event_stream_response<S>(stream: S) -> HttpResponse
where
    S: Stream<Item = Result<Bytes, Infallible>> + 'static,
{
    HttpResponse::Ok()
        .content_type("text/event-stream")
        // Compressing would buffer events
        .insert_header(ContentEncoding::Identity)
        .insert_header(header::CacheControl(vec![
            header::CacheDirective::NoCache,
            header::CacheDirective::NoStore,
            header::CacheDirective::MustRevalidate,
        ]))
        // Disable nginx buffering for real-time streaming
        .insert_header(("x-accel-buffering", "no"))
        .streaming(stream)
}

fn accepts_event_stream(req: &HttpRequest) -> bool {
    req.headers()
        .get(header::ACCEPT)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.contains("text/event-stream"))
}

fn bad_request_reply(body: &[u8], err: &serde_json::Error) -> MCPResponse {
    protocol::parse_error_response(body, err).unwrap_or_else(|| {
        MCPResponse::error(None, protocol::PARSE_ERROR, format!("Parse error: {}", err))
    })
}

/// Health check endpoint handler.
async fn health() -> Result<HttpResponse> {
    Ok(HttpResponse::Ok().json(json!({
        "status": "ok",
        "service": "mcp-protocol-demo"
    })))
}

/// Returns the number of MCP and tool requests handled since start.
async fn metrics_handler(counter: web::Data<AtomicU64>) -> Result<HttpResponse> {
    let count = counter.load(Ordering::Relaxed);
    Ok(HttpResponse::Ok().json(json!({
        "requests_total": count,
        "status": "ok"
    })))
}

/// Streamable HTTP endpoint.
///
/// Handles each POSTed JSON-RPC message:
/// 1. Parses the body, answering 400 with a parse error on failure
/// 2. Acknowledges notifications with 202 and no body
/// 3. Streams `tools/call` as SSE (progress, then the response) when the
///    client accepts `text/event-stream`
/// 4. Otherwise answers with the single JSON-RPC response
///
/// # Arguments
/// * `state` - Shared server state
/// * `counter` - Request counter reported by `/metrics`
/// * `req` - Incoming request, consulted for its `Accept` header
/// * `body` - Raw JSON-RPC message
async fn mcp_handler(
    state: web::Data<AppState>,
    counter: web::Data<AtomicU64>,
    req: HttpRequest,
    body: web::Bytes,
) -> Result<HttpResponse> {
    counter.fetch_add(1, Ordering::Relaxed);

    let request = match protocol::parse_request(&body) {
        Ok(request) => request,
        Err(e) => {
            warn!("Parse error: {}", e);
            return Ok(HttpResponse::BadRequest().json(bad_request_reply(&body, &e)));
        }
    };

    if request.is_notification() {
        debug!("Accepted notification {}", request.method);
        return Ok(HttpResponse::Accepted().finish());
    }

    if request.method == "tools/call" && accepts_event_stream(&req) {
        let stream = protocol::dispatch(state.get_ref().clone(), request)
            .map(|message| Ok::<_, Infallible>(sse_event(Some("message"), &message.to_json())));
        return Ok(event_stream_response(stream));
    }

    match protocol::respond(state.get_ref().clone(), request).await {
        Some(response) => Ok(HttpResponse::Ok().json(response)),
        None => Ok(HttpResponse::Accepted().finish()),
    }
}

/// Legacy SSE transport: open a session and push replies over it.
///
/// The first event is `endpoint`, carrying the URL the client must POST its
/// requests to. Every later event is a `message` holding one JSON-RPC
/// notification or response. The session is removed when the client
/// disconnects and the stream is dropped.
async fn sse_connect(sessions: web::Data<SseSessions>) -> Result<HttpResponse> {
    let session_id = uuid::Uuid::new_v4().simple().to_string();
    let (tx, mut rx) = mpsc::channel::<String>(SSE_CHANNEL_CAPACITY);
    sessions.insert(session_id.clone(), tx);
    info!("SSE session {} opened ({} active)", session_id, sessions.len());

    let endpoint = format!("/messages?session_id={}", session_id);
    let guard = SessionGuard {
        sessions: sessions.clone(),
        id: session_id,
    };

    let stream = async_stream::stream! {
        let _guard = guard;
        yield Ok::<_, Infallible>(sse_event(Some("endpoint"), &endpoint));
        while let Some(message) = rx.recv().await {
            yield Ok(sse_event(Some("message"), &message));
        }
    };
    Ok(event_stream_response(stream))
}

#[derive(Deserialize)]
struct SessionQuery {
    session_id: String,
}

/// Legacy SSE transport: accept a request for an open session.
///
/// The reply (and any progress notifications) are delivered on the session's
/// event stream, not in this response.
async fn sse_message(
    state: web::Data<AppState>,
    sessions: web::Data<SseSessions>,
    counter: web::Data<AtomicU64>,
    query: web::Query<SessionQuery>,
    body: web::Bytes,
) -> Result<HttpResponse> {
    counter.fetch_add(1, Ordering::Relaxed);

    let Some(sender) = sessions.get(&query.session_id) else {
        return Ok(HttpResponse::NotFound().json(json!({
            "error": format!("Unknown session: {}", query.session_id)
        })));
    };

    let request = match protocol::parse_request(&body) {
        Ok(request) => request,
        Err(e) => {
            warn!("Parse error: {}", e);
            return Ok(HttpResponse::BadRequest().json(bad_request_reply(&body, &e)));
        }
    };

    let mut outbound = protocol::dispatch(state.get_ref().clone(), request);
    actix_rt::spawn(async move {
        while let Some(message) = outbound.next().await {
            if sender.send(message.to_json()).await.is_err() {
                debug!("SSE session went away mid-reply");
                break;
            }
        }
    });

    Ok(HttpResponse::Accepted().finish())
}

/// Direct tool endpoint.
///
/// Arguments come from the query string, overridden by a JSON object body.
/// The response format follows the tool's [`ResponseStyle`]:
/// - `Single`: one JSON body with the final value
/// - `EventStream`: one `data:` event per element
/// - `Chunked`: one JSON document per line
///
/// Unknown tools get 404; argument errors (and a failed `add`) get 400.
async fn tool_route(
    state: web::Data<AppState>,
    counter: web::Data<AtomicU64>,
    path: web::Path<String>,
    query: web::Query<HashMap<String, String>>,
    body: web::Bytes,
) -> Result<HttpResponse> {
    counter.fetch_add(1, Ordering::Relaxed);
    let name = path.into_inner();

    let mut args: serde_json::Map<String, Value> = query
        .into_inner()
        .into_iter()
        .map(|(k, v)| (k, Value::String(v)))
        .collect();
    if !body.is_empty() {
        match serde_json::from_slice::<Value>(&body) {
            Ok(Value::Object(fields)) => args.extend(fields),
            Ok(_) => {
                return Ok(HttpResponse::BadRequest().json(json!({
                    "error": "Request body must be a JSON object"
                })));
            }
            Err(e) => {
                return Ok(HttpResponse::BadRequest().json(json!({
                    "error": format!("Invalid JSON body: {}", e)
                })));
            }
        }
    }

    let Some((tool, handler)) = state.registry.get(&name) else {
        return Ok(HttpResponse::NotFound().json(json!({
            "error": format!("Unknown tool: {}", name)
        })));
    };

    let mut events = match handler.invoke(Value::Object(args)) {
        Ok(events) => events,
        Err(e) => return Ok(HttpResponse::BadRequest().json(json!({ "error": e }))),
    };

    match tool.style {
        ResponseStyle::Single => {
            let mut result = Value::Null;
            while let Some(event) = events.next().await {
                result = event.into_data();
            }
            Ok(HttpResponse::Ok().json(result))
        }
        ResponseStyle::EventStream => {
            let stream = events
                .map(|event| Ok::<_, Infallible>(sse_event(None, &event.data().to_string())));
            Ok(event_stream_response(stream))
        }
        ResponseStyle::Chunked => {
            let stream = events.map(|event: ToolEvent| {
                let mut line = event.into_data().to_string();
                line.push('\n');
                Ok::<_, Infallible>(Bytes::from(line))
            });
            Ok(HttpResponse::Ok()
                .content_type("application/x-ndjson")
                .insert_header(ContentEncoding::Identity)
                .insert_header(("x-accel-buffering", "no"))
                .streaming(stream))
        }
    }
}

/// Routes served for the given HTTP transport.
///
/// `/health`, `/metrics` and `/tools/{name}` are always present. The MCP
/// endpoints depend on the transport: `/sse` + `/messages` for the legacy
/// SSE transport, `/mcp` (and `POST /`) for streamable HTTP.
pub fn routes(transport: Transport) -> impl Fn(&mut web::ServiceConfig) + Clone {
    move |cfg: &mut web::ServiceConfig| {
        cfg.route("/health", web::get().to(health))
            .route("/metrics", web::get().to(metrics_handler))
            .service(
                web::resource("/tools/{name}")
                    .route(web::get().to(tool_route))
                    .route(web::post().to(tool_route)),
            );
        match transport {
            Transport::Sse => {
                cfg.route("/sse", web::get().to(sse_connect))
                    .route("/messages", web::post().to(sse_message));
            }
            Transport::StreamableHttp | Transport::Stdio => {
                cfg.route("/mcp", web::post().to(mcp_handler))
                    .route("/", web::post().to(mcp_handler));
            }
        }
        cfg.route("/", web::get().to(health));
    }
}

/// Run the MCP server over HTTP.
///
/// # Configuration
/// - Worker threads: as given (see `utils::worker_threads`)
/// - Max connections: 10,000 concurrent connections
/// - Connection rate limit: 1,000 connections per second
/// - Keep-alive: 30 seconds
/// - Request timeout: 30 seconds
/// - Shutdown timeout: 10 seconds
pub async fn run_server_http(
    state: AppState,
    params: &RunParameters,
    workers: usize,
) -> std::io::Result<()> {
    let Some(bind_addr) = params.bind_addr() else {
        return Err(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            format!("transport {} has no network address", params.transport),
        ));
    };
    let transport = params.transport;

    let app_state = web::Data::new(state);
    let sessions = web::Data::new(SseSessions::default());
    let request_count = web::Data::new(AtomicU64::new(0));

    info!("MCP Server Starting (HTTP mode)");
    info!("  Name: {}", app_state.server_name);
    info!("  Version: {}", app_state.server_version);
    info!("  Transport: {}", transport);
    info!("  Bind Address: {}", bind_addr);
    info!("  Worker Threads: {}", workers);
    match transport {
        Transport::Sse => info!("  Endpoints: GET /sse, POST /messages"),
        _ => info!("  Endpoint: POST /mcp"),
    }

    HttpServer::new(move || {
        App::new()
            .app_data(app_state.clone())
            .app_data(sessions.clone())
            .app_data(request_count.clone())
            .wrap(Compress::default())
            .wrap(
                DefaultHeaders::new()
                    .add(("X-Content-Type-Options", "nosniff"))
                    .add(("X-Frame-Options", "DENY"))
                    .add(("X-XSS-Protection", "1; mode=block")),
            )
            // %r = request line, %s = status, %Dms = duration in milliseconds
            .wrap(Logger::new("%r %s %Dms"))
            .configure(routes(transport))
    })
    .workers(workers)
    .max_connections(10000)
    .max_connection_rate(1000)
    .keep_alive(Duration::from_secs(30))
    .client_request_timeout(Duration::from_secs(30))
    .client_disconnect_timeout(Duration::from_secs(2))
    .shutdown_timeout(10)
    .bind(&bind_addr)?
    .run()
    .await
}
