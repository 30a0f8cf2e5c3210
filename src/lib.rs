pub mod error;
pub mod javascript;
pub mod logger;
pub mod trace;

use log::info;
use serde::Deserialize;

pub use error::{ParseError, TraceError};
pub use trace::controller::{ControllerState, StepController};
pub use trace::{ExecutionMode, ExecutionResult, ExecutionSnapshot};

/// Program traced when no source is supplied.
pub const DEMO_SOURCE: &str = r#"// Try a simple function example
function factorial(n) {
  if (n <= 1) return 1;
  return n * factorial(n - 1);
}

// Calculate factorial of 5
const result = factorial(5);
console.log("Factorial result:", result);
"#;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct TracerConfig {
    /// Deepest user call allowed before the run fails with a stack overflow.
    pub max_call_depth: usize,
    /// Most snapshots a single run may produce.
    pub max_steps: usize,
    /// Most iterations any one loop may run.
    pub max_loop_iterations: usize,
    /// List a `return value` entry at each `return` suspension.
    pub record_return_values: bool,
}

impl Default for TracerConfig {
    fn default() -> Self {
        Self {
            max_call_depth: 256,
            max_steps: 10_000,
            max_loop_iterations: 10_000,
            record_return_values: true,
        }
    }
}

/// Trace `source` to completion.
pub fn trace_source(source: &str, config: &TracerConfig) -> ExecutionResult {
    info!(target: "trace", "Tracing {} lines of source", source.lines().count());
    StepController::new(source, config.clone()).execute()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults_fill_missing_fields() {
        let config: TracerConfig =
            serde_json::from_str(r#"{ "max_call_depth": 8 }"#).expect("valid config");
        assert_eq!(
            config,
            TracerConfig {
                max_call_depth: 8,
                ..TracerConfig::default()
            }
        );
    }

    #[test]
    fn test_demo_traces_factorial() {
        let result = trace_source(DEMO_SOURCE, &TracerConfig::default());
        assert_eq!(result.mode, ExecutionMode::Interpreted);
        let last = result.final_state().expect("final state");
        assert_eq!(last.source_line, 8);
        assert_eq!(
            last.console_output.last().map(|c| c.content.as_str()),
            Some("Factorial result: 120")
        );
    }
}
