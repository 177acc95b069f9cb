//! STDIO Transport
//!
//! Newline-delimited JSON-RPC over stdin/stdout. Stdout carries protocol
//! messages only; all logging goes to stderr.

use futures_util::StreamExt;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader, BufWriter};
use tokio::sync::mpsc;
use tracing::{debug, error, info};

use crate::core::protocol::{self, AppState, Outbound};

/// Messages buffered between in-flight requests and the stdout writer.
const OUTBOUND_CAPACITY: usize = 64;

/// Run the MCP server over the process's stdin and stdout.
pub async fn run_server_stdio(state: AppState) -> std::io::Result<()> {
    info!("MCP Server Starting (STDIO mode)");
    info!("  Name: {}", state.server_name);
    info!("  Version: {}", state.server_version);
    info!("  MCP Protocol: JSON-RPC 2.0");

    serve(state, tokio::io::stdin(), tokio::io::stdout()).await
}

/// Serve requests read line by line from `reader`, writing replies to `writer`.
///
/// Each request is dispatched on its own task, so a long-running tool call
/// does not hold up the requests behind it. A single writer drains every
/// task's output, which keeps each message whole on the wire; progress
/// notifications for a call still precede its response.
///
/// # Arguments
/// * `state` - Shared server state (name, version, tool registry)
/// * `reader` - Source of newline-delimited requests
/// * `writer` - Sink for newline-delimited replies
///
/// # Returns
/// `Ok(())` once the reader hits EOF and every in-flight call has finished.
/// Lines that are not valid JSON (or not UTF-8) are logged and skipped; only
/// I/O failures end the loop early.
pub async fn serve<R, W>(state: AppState, reader: R, writer: W) -> std::io::Result<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let (tx, mut rx) = mpsc::channel::<Outbound>(OUTBOUND_CAPACITY);

    let read_loop = async move {
        let mut reader = BufReader::with_capacity(8192, reader);
        let mut buf = Vec::with_capacity(8192);

        loop {
            buf.clear();
            if reader.read_until(b'\n', &mut buf).await? == 0 {
                break;
            }
            let line = buf.trim_ascii();
            if line.is_empty() {
                continue;
            }

            let request = match protocol::parse_request(line) {
                Ok(req) => req,
                Err(e) => {
                    error!("Parse error: {}", e);
                    if let Some(reply) = protocol::parse_error_response(line, &e) {
                        if tx.send(Outbound::Response(reply)).await.is_err() {
                            break;
                        }
                    }
                    continue;
                }
            };

            debug!("Received request: {}", request.method);
            let mut outbound = protocol::dispatch(state.clone(), request);
            let tx = tx.clone();
            tokio::spawn(async move {
                while let Some(message) = outbound.next().await {
                    if tx.send(message).await.is_err() {
                        break;
                    }
                }
            });
        }

        debug!("stdin closed, stopping STDIO server");
        Ok::<_, std::io::Error>(())
    };

    // Ends once the read loop and every spawned call have dropped their sender.
    let write_loop = async move {
        let mut writer = BufWriter::with_capacity(8192, writer);
        while let Some(message) = rx.recv().await {
            write_message(&mut writer, &message).await?;
        }
        Ok::<_, std::io::Error>(())
    };

    tokio::try_join!(read_loop, write_loop)?;
    Ok(())
}

async fn write_message<W>(writer: &mut W, message: &Outbound) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(message.to_json().as_bytes()).await?;
    writer.write_all(b"\n").await?;
    // Flush per message so clients see progress as it happens.
    writer.flush().await
}
