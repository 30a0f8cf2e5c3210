//! Execution snapshots and the trace they form.
//!
//! The evaluator hands every snapshot to a [`Recorder`]; the default
//! [`TraceRecorder`] keeps them in order so the step controller can replay
//! them. Snapshots are plain copies: nothing in them points back into the
//! live interpreter state.

pub mod controller;
pub mod fallback;
pub mod stream;

use crate::TracerConfig;
use crate::error::{ParseError, TraceError};
use crate::javascript::{Runtime, parse};
use chrono::{DateTime, Utc};
use log::{trace, warn};
use serde::{Deserialize, Serialize};

/// One variable as the variables panel lists it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariableRecord {
    pub name: String,
    /// Display-ready value, e.g. `"120"` or `"[Function: factorial]"`.
    pub value: String,
    #[serde(rename = "type")]
    pub type_tag: String,
    /// Name of the owning scope (`"global"` or a function name).
    pub scope: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Log,
    Error,
    Warning,
    Info,
}

impl Severity {
    /// Severity of a `console.<method>` call, if the method is supported.
    pub fn from_console_method(method: &str) -> Option<Self> {
        match method {
            "log" | "debug" => Some(Severity::Log),
            "error" => Some(Severity::Error),
            "warn" => Some(Severity::Warning),
            "info" => Some(Severity::Info),
            _ => None,
        }
    }

    pub fn log_level(self) -> log::Level {
        match self {
            Severity::Log | Severity::Info => log::Level::Info,
            Severity::Warning => log::Level::Warn,
            Severity::Error => log::Level::Error,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsoleRecord {
    #[serde(rename = "type")]
    pub severity: Severity,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

impl ConsoleRecord {
    pub fn new(severity: Severity, content: impl Into<String>) -> Self {
        Self {
            severity,
            content: content.into(),
            timestamp: Utc::now(),
        }
    }
}

/// Records compare equal regardless of when they were written.
impl PartialEq for ConsoleRecord {
    fn eq(&self, other: &Self) -> bool {
        self.severity == other.severity && self.content == other.content
    }
}

impl Eq for ConsoleRecord {}

/// The interpreter state at one suspension point.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionSnapshot {
    /// 0-based line of the statement that produced the snapshot.
    pub source_line: usize,
    pub variables: Vec<VariableRecord>,
    pub call_stack: Vec<String>,
    pub console_output: Vec<ConsoleRecord>,
}

impl ExecutionSnapshot {
    pub fn variable(&self, name: &str) -> Option<&VariableRecord> {
        self.variables.iter().rev().find(|v| v.name == name)
    }
}

/// Receives snapshots in program order as the evaluator suspends.
pub trait Recorder {
    fn record(&mut self, snapshot: ExecutionSnapshot);
}

/// Keeps every snapshot of a run in memory.
#[derive(Debug, Default)]
pub struct TraceRecorder {
    snapshots: Vec<ExecutionSnapshot>,
}

impl TraceRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }

    pub fn finish(self) -> ExecutionTrace {
        ExecutionTrace {
            snapshots: self.snapshots,
        }
    }
}

impl Recorder for TraceRecorder {
    fn record(&mut self, snapshot: ExecutionSnapshot) {
        trace!(target: "trace", "Snapshot #{} at line {}", self.snapshots.len(), snapshot.source_line);
        self.snapshots.push(snapshot);
    }
}

/// The ordered snapshots of one finished (or aborted) run.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ExecutionTrace {
    snapshots: Vec<ExecutionSnapshot>,
}

impl ExecutionTrace {
    pub fn from_snapshots(snapshots: Vec<ExecutionSnapshot>) -> Self {
        Self { snapshots }
    }

    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&ExecutionSnapshot> {
        self.snapshots.get(index)
    }

    pub fn snapshots(&self) -> &[ExecutionSnapshot] {
        &self.snapshots
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ExecutionSnapshot> {
        self.snapshots.iter()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionMode {
    /// Produced by the evaluator.
    Interpreted,
    /// Produced by the line heuristics after a parse error.
    Fallback,
}

/// What the display layer consumes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionResult {
    pub states: Vec<ExecutionSnapshot>,
    pub total_steps: usize,
    pub mode: ExecutionMode,
    /// Why the run stopped early, if it did. For fallback results this is
    /// the parse error that triggered the fallback.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub failure: Option<String>,
}

impl ExecutionResult {
    pub fn new(trace: &ExecutionTrace, mode: ExecutionMode, failure: Option<String>) -> Self {
        Self {
            states: trace.snapshots().to_vec(),
            total_steps: trace.len(),
            mode,
            failure,
        }
    }

    pub fn final_state(&self) -> Option<&ExecutionSnapshot> {
        self.states.last()
    }
}

/// How a run of [`run_source`] ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOutcome {
    pub mode: ExecutionMode,
    /// Fatal error of an interpreted run.
    pub failure: Option<TraceError>,
    /// Syntax error that switched the run to line heuristics.
    pub parse_error: Option<ParseError>,
}

/// Parse and evaluate `source`, feeding every snapshot to `recorder`.
///
/// Source that does not parse is approximated by [`fallback::analyze`].
/// At least one snapshot is always recorded.
pub fn run_source(source: &str, config: &TracerConfig, recorder: &mut dyn Recorder) -> RunOutcome {
    match parse(source) {
        Ok(program) => {
            let mut runtime = Runtime::new(config, recorder);
            let failure = runtime.execute(&program).err();
            let steps = runtime.steps();
            if steps == 0 {
                recorder.record(ExecutionSnapshot::default());
            }
            RunOutcome {
                mode: ExecutionMode::Interpreted,
                failure,
                parse_error: None,
            }
        }
        Err(e) => {
            warn!(target: "trace", "{}; approximating the trace line by line", e);
            for snapshot in fallback::analyze(source).snapshots() {
                recorder.record(snapshot.clone());
            }
            RunOutcome {
                mode: ExecutionMode::Fallback,
                failure: None,
                parse_error: Some(e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_source_falls_back_on_syntax_error() {
        let mut recorder = TraceRecorder::new();
        let outcome = run_source("let x = ;;(", &TracerConfig::default(), &mut recorder);
        assert_eq!(outcome.mode, ExecutionMode::Fallback);
        assert!(outcome.parse_error.is_some());
        assert_eq!(recorder.len(), 1);
    }

    #[test]
    fn test_run_source_never_records_nothing() {
        let mut recorder = TraceRecorder::new();
        let outcome = run_source("if (false) { let x = 1; }", &TracerConfig::default(), &mut recorder);
        assert_eq!(outcome.mode, ExecutionMode::Interpreted);
        assert_eq!(recorder.finish().snapshots(), &[ExecutionSnapshot::default()]);
    }

    #[test]
    fn test_console_record_equality_ignores_timestamp() {
        let first = ConsoleRecord::new(Severity::Log, "hello");
        let mut second = first.clone();
        second.timestamp = first.timestamp + chrono::Duration::seconds(30);
        assert_eq!(first, second);
        assert_ne!(first, ConsoleRecord::new(Severity::Error, "hello"));
    }

    #[test]
    fn test_console_methods() {
        assert_eq!(Severity::from_console_method("warn"), Some(Severity::Warning));
        assert_eq!(Severity::from_console_method("debug"), Some(Severity::Log));
        assert_eq!(Severity::from_console_method("table"), None);
    }

    #[test]
    fn test_recorder_keeps_order() {
        let mut recorder = TraceRecorder::new();
        for line in [0, 3, 1] {
            recorder.record(ExecutionSnapshot {
                source_line: line,
                ..Default::default()
            });
        }
        let trace = recorder.finish();
        let lines: Vec<usize> = trace.iter().map(|s| s.source_line).collect();
        assert_eq!(lines, vec![0, 3, 1]);
    }

    #[test]
    fn test_result_serializes_camel_case() {
        let trace = ExecutionTrace::from_snapshots(vec![ExecutionSnapshot {
            source_line: 2,
            variables: vec![VariableRecord {
                name: "x".into(),
                value: "1".into(),
                type_tag: "number".into(),
                scope: "global".into(),
            }],
            call_stack: vec!["main()".into()],
            console_output: vec![ConsoleRecord::new(Severity::Warning, "careful")],
        }]);
        let result = ExecutionResult::new(&trace, ExecutionMode::Interpreted, None);
        let json = serde_json::to_value(&result).expect("serialize");

        assert_eq!(json["totalSteps"], 1);
        assert_eq!(json["mode"], "interpreted");
        assert_eq!(json["states"][0]["sourceLine"], 2);
        assert_eq!(json["states"][0]["variables"][0]["type"], "number");
        assert_eq!(json["states"][0]["callStack"][0], "main()");
        assert_eq!(json["states"][0]["consoleOutput"][0]["type"], "warning");
        assert!(json.get("failure").is_none());
    }
}
