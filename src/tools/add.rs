//! Add Tool
//!
//! Plain request/response tool: adds two numbers and echoes the inputs back
//! alongside the sum.

use crate::core::registry::{MCPTool, ResponseStyle, ToolHandler, ToolRegistry};
use crate::tools::number_arg;
use serde_json::Value;
use tracing::info;

/// Add two numbers, echoing the operands alongside the sum.
///
/// # Arguments
/// * `a` - First number
/// * `b` - Second number
///
/// # Returns
/// `{a, b, sum}`, or an error if the sum overflows `f64`. JSON has no
/// infinity, so an overflowed sum would otherwise serialize as `null`.
pub fn add(a: f64, b: f64) -> Result<Value, String> {
    let sum = a + b;
    if !sum.is_finite() {
        return Err("Result out of range".to_string());
    }
    Ok(serde_json::json!({ "a": a, "b": b, "sum": sum }))
}

/// Register the add tool with the tool registry.
///
/// The handler:
/// 1. Extracts `a` and `b` (numbers or numeric strings)
/// 2. Computes the sum, rejecting results outside the `f64` range
///
/// # Arguments
/// * `registry` - Registry to add the tool to
pub fn register(registry: &mut ToolRegistry) {
    let tool = MCPTool {
        name: "add".to_string(),
        description: "Add two numbers (plain HTTP)".to_string(),
        input_schema: serde_json::json!({
            "type": "object",
            "properties": {
                "a": { "type": "number", "description": "First number" },
                "b": { "type": "number", "description": "Second number" }
            },
            "required": ["a", "b"]
        }),
        style: ResponseStyle::Single,
    };

    let handler = ToolHandler::Single(Box::new(|args: Value| -> Result<Value, String> {
        let a = number_arg(&args, "a")?;
        let b = number_arg(&args, "b")?;
        info!("Adding {} + {}", a, b);
        add(a, b)
    }));

    registry.register(tool, handler);
}
