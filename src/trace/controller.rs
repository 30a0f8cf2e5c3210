//! Execute / step / step-back / run-to-line over one source submission.
//!
//! The controller runs the evaluator once, on the first `step()` or
//! `execute()`, and then moves a cursor over the recorded trace. Stepping
//! backwards replays cached snapshots and never re-executes the program.

use super::{
    ConsoleRecord, ExecutionMode, ExecutionResult, ExecutionSnapshot, ExecutionTrace,
    TraceRecorder, VariableRecord, run_source,
};
use crate::TracerConfig;
use crate::error::{ParseError, TraceError};
use log::{debug, info};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ControllerState {
    Idle,
    Running,
    Paused,
    Completed,
    Failed,
}

pub struct StepController {
    source: String,
    config: TracerConfig,
    state: ControllerState,
    trace: Option<ExecutionTrace>,
    mode: ExecutionMode,
    failure: Option<TraceError>,
    parse_error: Option<ParseError>,
    /// Number of snapshots consumed; the current snapshot is `cursor - 1`.
    cursor: usize,
}

impl StepController {
    pub fn new(source: impl Into<String>, config: TracerConfig) -> Self {
        Self {
            source: source.into(),
            config,
            state: ControllerState::Idle,
            trace: None,
            mode: ExecutionMode::Interpreted,
            failure: None,
            parse_error: None,
            cursor: 0,
        }
    }

    /// Run to the end and return every snapshot.
    pub fn execute(&mut self) -> ExecutionResult {
        let total = self.recorded().len();
        self.cursor = total;
        self.state = self.finished_state();
        info!(target: "trace", "Execution finished in {} steps ({:?})", total, self.state);
        self.result()
    }

    /// Advance one suspension point. Returns `None` once the run has
    /// completed or failed.
    pub fn step(&mut self) -> Option<&ExecutionSnapshot> {
        if self.is_finished() {
            return None;
        }
        if !self.advance() {
            self.state = self.finished_state();
            return None;
        }
        self.state = if self.cursor == self.total_steps() {
            self.finished_state()
        } else {
            ControllerState::Paused
        };
        debug!(target: "trace", "Step {}/{}", self.cursor, self.total_steps());
        self.current_snapshot()
    }

    /// Move back one snapshot. Returns `None` at the first snapshot.
    pub fn step_back(&mut self) -> Option<&ExecutionSnapshot> {
        if self.cursor <= 1 {
            return None;
        }
        self.cursor -= 1;
        self.state = ControllerState::Paused;
        debug!(target: "trace", "Step back to {}/{}", self.cursor, self.total_steps());
        self.current_snapshot()
    }

    /// Step forward until the current snapshot is at the 0-based `line`.
    /// Returns `None` when the trace ends first.
    pub fn run_to_line(&mut self, line: usize) -> Option<&ExecutionSnapshot> {
        loop {
            if self.is_finished() || !self.advance() {
                self.state = self.finished_state();
                return None;
            }
            self.state = if self.cursor == self.total_steps() {
                self.finished_state()
            } else {
                ControllerState::Paused
            };
            if self.current_line() == Some(line) {
                return self.current_snapshot();
            }
        }
    }

    /// Forget the run but keep the source.
    pub fn reset(&mut self) {
        debug!(target: "trace", "Resetting controller");
        self.state = ControllerState::Idle;
        self.trace = None;
        self.mode = ExecutionMode::Interpreted;
        self.failure = None;
        self.parse_error = None;
        self.cursor = 0;
    }

    /// Start over with a new submission.
    pub fn load_source(&mut self, source: impl Into<String>) {
        self.reset();
        self.source = source.into();
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn config(&self) -> &TracerConfig {
        &self.config
    }

    pub fn state(&self) -> ControllerState {
        self.state
    }

    pub fn current_step(&self) -> usize {
        self.cursor
    }

    pub fn total_steps(&self) -> usize {
        self.trace.as_ref().map_or(0, ExecutionTrace::len)
    }

    pub fn current_snapshot(&self) -> Option<&ExecutionSnapshot> {
        let index = self.cursor.checked_sub(1)?;
        self.trace.as_ref()?.get(index)
    }

    pub fn current_line(&self) -> Option<usize> {
        self.current_snapshot().map(|s| s.source_line)
    }

    pub fn variables(&self) -> &[VariableRecord] {
        self.current_snapshot()
            .map(|s| s.variables.as_slice())
            .unwrap_or_default()
    }

    pub fn call_stack(&self) -> &[String] {
        self.current_snapshot()
            .map(|s| s.call_stack.as_slice())
            .unwrap_or_default()
    }

    pub fn console_output(&self) -> &[ConsoleRecord] {
        self.current_snapshot()
            .map(|s| s.console_output.as_slice())
            .unwrap_or_default()
    }

    /// The error that aborted the run, if any.
    pub fn failure(&self) -> Option<&TraceError> {
        self.failure.as_ref()
    }

    /// The syntax error that switched the run to line heuristics, if any.
    pub fn parse_error(&self) -> Option<&ParseError> {
        self.parse_error.as_ref()
    }

    pub fn mode(&self) -> ExecutionMode {
        self.mode
    }

    /// Everything recorded so far, independent of the cursor.
    pub fn result(&self) -> ExecutionResult {
        let failure = self
            .failure
            .as_ref()
            .map(ToString::to_string)
            .or_else(|| self.parse_error.as_ref().map(ToString::to_string));
        match &self.trace {
            Some(trace) => ExecutionResult::new(trace, self.mode, failure),
            None => ExecutionResult::new(&ExecutionTrace::default(), self.mode, failure),
        }
    }

    fn is_finished(&self) -> bool {
        matches!(self.state, ControllerState::Completed | ControllerState::Failed)
    }

    fn finished_state(&self) -> ControllerState {
        if self.failure.is_some() {
            ControllerState::Failed
        } else {
            ControllerState::Completed
        }
    }

    fn advance(&mut self) -> bool {
        let total = self.recorded().len();
        if self.cursor < total {
            self.cursor += 1;
            true
        } else {
            false
        }
    }

    /// The trace of the current source, recording it on first use.
    fn recorded(&mut self) -> &ExecutionTrace {
        if self.trace.is_none() {
            let trace = self.record_trace();
            self.trace = Some(trace);
        }
        self.trace.get_or_insert_with(ExecutionTrace::default)
    }

    fn record_trace(&mut self) -> ExecutionTrace {
        self.state = ControllerState::Running;
        let mut recorder = TraceRecorder::new();
        let outcome = run_source(&self.source, &self.config, &mut recorder);
        self.mode = outcome.mode;
        self.failure = outcome.failure;
        self.parse_error = outcome.parse_error;
        recorder.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const PROGRAM: &str = "let a = 1;
let b = 2;
function sum(x, y) {
  return x + y;
}
let c = sum(a, b);
console.log(c);";

    fn controller(source: &str) -> StepController {
        StepController::new(source, TracerConfig::default())
    }

    #[test]
    fn test_initial_state() {
        let ctl = controller(PROGRAM);
        assert_eq!(ctl.state(), ControllerState::Idle);
        assert_eq!(ctl.current_step(), 0);
        assert_eq!(ctl.total_steps(), 0);
        assert!(ctl.current_snapshot().is_none());
        assert!(ctl.variables().is_empty());
    }

    #[test]
    fn test_step_walks_the_trace() {
        let mut ctl = controller(PROGRAM);
        let first = ctl.step().cloned().expect("first step");
        assert_eq!(first.source_line, 0);
        assert_eq!(ctl.state(), ControllerState::Paused);
        assert_eq!(ctl.current_step(), 1);
        // a, b, sum, entry, return, exit, c, console
        assert_eq!(ctl.total_steps(), 8);

        let second = ctl.step().cloned().expect("second step");
        assert_eq!(second.source_line, 1);
        assert_eq!(second.variables.len(), 2);
    }

    #[test]
    fn test_step_reaches_completion() {
        let mut ctl = controller(PROGRAM);
        let mut seen = 0;
        while ctl.step().is_some() {
            seen += 1;
        }
        assert_eq!(seen, 8);
        assert_eq!(ctl.state(), ControllerState::Completed);
        assert!(ctl.step().is_none());
        assert_eq!(ctl.console_output()[0].content, "3");
    }

    #[test]
    fn test_step_back_replays_previous_snapshot() {
        let mut ctl = controller(PROGRAM);
        assert!(ctl.step_back().is_none());
        ctl.step();
        let second = ctl.step().cloned().expect("second");
        ctl.step();
        let back = ctl.step_back().cloned().expect("back");
        assert_eq!(back, second);
        assert_eq!(ctl.current_step(), 2);
    }

    #[test]
    fn test_execute_moves_cursor_to_end() {
        let mut ctl = controller(PROGRAM);
        ctl.step();
        let result = ctl.execute();
        assert_eq!(ctl.state(), ControllerState::Completed);
        assert_eq!(result.total_steps, result.states.len());
        assert_eq!(ctl.current_step(), result.total_steps);
        assert_eq!(result.mode, ExecutionMode::Interpreted);
        assert!(result.failure.is_none());

        let back = ctl.step_back().map(|s| s.source_line);
        assert_eq!(back, Some(5));
        assert_eq!(ctl.state(), ControllerState::Paused);
    }

    #[test]
    fn test_run_to_line() {
        let mut ctl = controller(PROGRAM);
        let snapshot = ctl.run_to_line(3).cloned().expect("return line");
        assert_eq!(snapshot.call_stack, vec!["sum(1, 2)".to_string()]);
        assert!(ctl.run_to_line(0).is_none());
        assert_eq!(ctl.state(), ControllerState::Completed);
    }

    #[test]
    fn test_reset_keeps_source() {
        let mut ctl = controller(PROGRAM);
        for _ in 0..6 {
            ctl.step();
        }
        assert!(!ctl.variables().is_empty());

        ctl.reset();
        assert_eq!(ctl.state(), ControllerState::Idle);
        assert_eq!(ctl.current_step(), 0);
        assert!(ctl.call_stack().is_empty());
        assert!(ctl.console_output().is_empty());
        assert_eq!(ctl.source(), PROGRAM);

        assert_eq!(ctl.execute().total_steps, 8);
    }

    #[test]
    fn test_parse_error_falls_back() {
        let mut ctl = controller("let a = 1;\nlet b = (2;");
        let result = ctl.execute();
        assert_eq!(result.mode, ExecutionMode::Fallback);
        assert_eq!(ctl.state(), ControllerState::Completed);
        assert!(ctl.parse_error().is_some());
        assert!(ctl.failure().is_none());
        assert_eq!(result.total_steps, 2);
        assert!(result.failure.is_some());
    }

    #[test]
    fn test_failed_run_keeps_partial_trace() {
        let config = TracerConfig {
            max_steps: 3,
            ..TracerConfig::default()
        };
        let mut ctl = StepController::new(PROGRAM, config);
        let result = ctl.execute();
        assert_eq!(ctl.state(), ControllerState::Failed);
        assert_eq!(result.total_steps, 3);
        assert_eq!(ctl.failure(), Some(&TraceError::StepLimitExceeded { limit: 3 }));
        assert_eq!(result.failure.as_deref(), Some("Execution stopped after 3 steps"));
    }

    #[test]
    fn test_empty_program_still_has_one_snapshot() {
        let mut ctl = controller("");
        let result = ctl.execute();
        assert_eq!(result.states, vec![ExecutionSnapshot::default()]);
    }

    #[test]
    fn test_load_source_discards_previous_run() {
        let mut ctl = controller(PROGRAM);
        ctl.execute();
        ctl.load_source("let only = 1;");
        assert_eq!(ctl.state(), ControllerState::Idle);
        assert_eq!(ctl.total_steps(), 0);
        assert_eq!(ctl.execute().total_steps, 1);
    }
}
