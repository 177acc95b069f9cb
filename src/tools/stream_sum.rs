//! Progressive Sum Tool
//!
//! Chunked-transfer tool: emits the running sum of 1..=n one chunk at a time,
//! then the final total.

use std::time::Duration;

use crate::core::registry::{MCPTool, ResponseStyle, ToolEvent, ToolHandler, ToolRegistry, ToolStream};
use crate::tools::integer_arg;
use serde_json::{Value, json};
use tracing::{debug, info};

/// Lazily yields `{partial_sum: 1+..+i}` for i in 1..=n, then `{final_sum}`.
pub fn progressive_sum(n: i64, interval: Duration) -> ToolStream {
    Box::pin(async_stream::stream! {
        let total_steps = n.max(0) as u64;
        let mut total: i64 = 0;
        for i in 1..=n {
            total = total.saturating_add(i);
            debug!("stream_sum progress: {}/{}, running total {}", i, n, total);
            yield ToolEvent::Progress {
                progress: i as u64,
                total: Some(total_steps),
                message: format!("Computed sum up to {}: {}", i, total),
                data: json!({ "partial_sum": total }),
            };
            tokio::time::sleep(interval).await;
        }
        info!("Completed stream_sum: final_sum={}", total);
        yield ToolEvent::Done(json!({ "final_sum": total }));
    })
}

/// Register the stream_sum tool with the tool registry.
///
/// # Arguments
/// * `registry` - Registry to add the tool to
/// * `interval` - Delay between consecutive partial sums
pub fn register(registry: &mut ToolRegistry, interval: Duration) {
    let tool = MCPTool {
        name: "stream_sum".to_string(),
        description: "Stream progressive sum".to_string(),
        input_schema: json!({
            "type": "object",
            "properties": {
                "n": { "type": "integer", "description": "Upper limit of the sum" }
            },
            "required": ["n"]
        }),
        style: ResponseStyle::Chunked,
    };

    let handler = ToolHandler::Progressive(Box::new(move |args: Value| {
        let n = integer_arg(&args, "n")?;
        info!("Starting stream_sum calculation for n={}", n);
        Ok(progressive_sum(n, interval))
    }));

    registry.register(tool, handler);
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::StreamExt;
    use tokio::time::Instant;

    #[tokio::test]
    async fn yields_prefix_sums_then_total() {
        let values: Vec<Value> = progressive_sum(5, Duration::ZERO)
            .map(ToolEvent::into_data)
            .collect()
            .await;
        assert_eq!(
            values,
            vec![
                json!({ "partial_sum": 1 }),
                json!({ "partial_sum": 3 }),
                json!({ "partial_sum": 6 }),
                json!({ "partial_sum": 10 }),
                json!({ "partial_sum": 15 }),
                json!({ "final_sum": 15 }),
            ]
        );
    }

    #[tokio::test]
    async fn final_sum_matches_closed_form() {
        for n in [1i64, 2, 10, 100] {
            let events: Vec<ToolEvent> = progressive_sum(n, Duration::ZERO).collect().await;
            assert_eq!(events.len() as i64, n + 1);
            assert_eq!(
                events.last(),
                Some(&ToolEvent::Done(json!({ "final_sum": n * (n + 1) / 2 })))
            );
        }
    }

    #[tokio::test]
    async fn zero_yields_only_final() {
        let events: Vec<ToolEvent> = progressive_sum(0, Duration::ZERO).collect().await;
        assert_eq!(events, vec![ToolEvent::Done(json!({ "final_sum": 0 }))]);
    }

    #[tokio::test]
    async fn progress_messages_describe_each_step() {
        let messages: Vec<String> = progressive_sum(3, Duration::ZERO)
            .filter_map(|event| async move {
                match event {
                    ToolEvent::Progress { message, .. } => Some(message),
                    ToolEvent::Done(_) => None,
                }
            })
            .collect()
            .await;
        assert_eq!(
            messages,
            [
                "Computed sum up to 1: 1",
                "Computed sum up to 2: 3",
                "Computed sum up to 3: 6",
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn paces_half_a_second_per_step() {
        let started = Instant::now();
        let _: Vec<ToolEvent> = progressive_sum(4, Duration::from_millis(500)).collect().await;
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_secs(2), "{elapsed:?}");
        assert!(elapsed < Duration::from_millis(2500), "{elapsed:?}");
    }

    #[test]
    fn handler_requires_n() {
        let mut registry = ToolRegistry::new();
        register(&mut registry, Duration::ZERO);
        let (_, handler) = registry.get("stream_sum").unwrap();
        assert_eq!(
            handler.invoke(json!({})).err().as_deref(),
            Some("Missing required parameter: n")
        );
    }
}
