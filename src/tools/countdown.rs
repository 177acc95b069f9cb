//! Countdown Tool
//!
//! Event-stream tool: counts down from `start` to 1, one event per interval,
//! then signals completion.

use std::time::Duration;

use crate::core::registry::{MCPTool, ResponseStyle, ToolEvent, ToolHandler, ToolRegistry, ToolStream};
use crate::tools::integer_arg;
use serde_json::{Value, json};
use tracing::{debug, info};

/// Lazily yields `{count: start}` .. `{count: 1}` then `{done: true}`.
///
/// Sleeps `interval` after every count. A `start` of zero or less yields only
/// the completion event.
pub fn countdown(start: i64, interval: Duration) -> ToolStream {
    Box::pin(async_stream::stream! {
        let total = start.max(0) as u64;
        for (step, count) in (1..=start).rev().enumerate() {
            debug!("countdown: {}", count);
            yield ToolEvent::Progress {
                progress: step as u64 + 1,
                total: Some(total),
                message: format!("Counting down: {}", count),
                data: json!({ "count": count }),
            };
            tokio::time::sleep(interval).await;
        }
        yield ToolEvent::Done(json!({ "done": true }));
    })
}

/// Register the countdown tool with the tool registry.
///
/// The tool is progressive: each count becomes a progress event, so MCP
/// clients that send a progress token see the countdown live, and the direct
/// `/tools/countdown` route streams it as server-sent events.
///
/// # Arguments
/// * `registry` - Registry to add the tool to
/// * `interval` - Delay between consecutive counts
pub fn register(registry: &mut ToolRegistry, interval: Duration) {
    let tool = MCPTool {
        name: "countdown".to_string(),
        description: "Stream countdown numbers".to_string(),
        input_schema: json!({
            "type": "object",
            "properties": {
                "start": { "type": "integer", "description": "Number to count down from" }
            },
            "required": ["start"]
        }),
        style: ResponseStyle::EventStream,
    };

    let handler = ToolHandler::Progressive(Box::new(move |args: Value| {
        let start = integer_arg(&args, "start")?;
        info!("Starting countdown from {}", start);
        Ok(countdown(start, interval))
    }));

    registry.register(tool, handler);
}
