//! Tools Module
//!
//! Every example tool lives in its own module and exports a `register`
//! function that adds it to the registry during server initialization.

pub mod add;
pub mod countdown;
pub mod stream_sum;

use std::time::Duration;

use serde_json::Value;

use crate::core::registry::ToolRegistry;

/// Delay between elements of the progressive tools.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pacing {
    pub countdown: Duration,
    pub stream_sum: Duration,
}

impl Default for Pacing {
    fn default() -> Self {
        Self {
            countdown: Duration::from_secs(1),
            stream_sum: Duration::from_millis(500),
        }
    }
}

#[cfg(test)]
impl Pacing {
    /// No delay at all; sequences complete as fast as they are polled.
    pub fn immediate() -> Self {
        Self {
            countdown: Duration::ZERO,
            stream_sum: Duration::ZERO,
        }
    }
}

/// Register all available tools.
pub fn register_all(registry: &mut ToolRegistry, pacing: Pacing) {
    add::register(registry);
    countdown::register(registry, pacing.countdown);
    stream_sum::register(registry, pacing.stream_sum);
}

/// Extract a required numeric argument.
///
/// Numeric strings are accepted because arguments taken from a query string
/// arrive as text.
pub(crate) fn number_arg(args: &Value, name: &str) -> Result<f64, String> {
    let value = args
        .get(name)
        .ok_or_else(|| format!("Missing required parameter: {}", name))?;
    value
        .as_f64()
        .or_else(|| value.as_str().and_then(|s| s.trim().parse::<f64>().ok()))
        .filter(|n| n.is_finite())
        .ok_or_else(|| format!("Invalid parameter {}: expected a number", name))
}

/// Extract a required integer argument. Numeric strings are accepted.
pub(crate) fn integer_arg(args: &Value, name: &str) -> Result<i64, String> {
    let value = args
        .get(name)
        .ok_or_else(|| format!("Missing required parameter: {}", name))?;
    value
        .as_i64()
        .or_else(|| value.as_str().and_then(|s| s.trim().parse::<i64>().ok()))
        .ok_or_else(|| format!("Invalid parameter {}: expected an integer", name))
}
