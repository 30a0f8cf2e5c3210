//! Incremental delivery of snapshots to an async consumer.

use super::{ExecutionResult, ExecutionSnapshot, Recorder, TraceRecorder, run_source};
use crate::TracerConfig;
use log::trace;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender, unbounded_channel};
use tokio::task::JoinHandle;

/// Forwards every snapshot over a channel while keeping its own copy.
pub struct ChannelRecorder {
    sender: UnboundedSender<ExecutionSnapshot>,
    inner: TraceRecorder,
}

impl ChannelRecorder {
    pub fn new(sender: UnboundedSender<ExecutionSnapshot>) -> Self {
        Self {
            sender,
            inner: TraceRecorder::new(),
        }
    }

    pub fn into_inner(self) -> TraceRecorder {
        self.inner
    }
}

impl Recorder for ChannelRecorder {
    fn record(&mut self, snapshot: ExecutionSnapshot) {
        if self.sender.send(snapshot.clone()).is_err() {
            trace!(target: "trace", "Snapshot receiver dropped; recording locally only");
        }
        self.inner.record(snapshot);
    }
}

pub struct TraceStream {
    /// Snapshots in program order, as they are recorded.
    pub snapshots: UnboundedReceiver<ExecutionSnapshot>,
    /// Resolves to the complete result once the run ends.
    pub handle: JoinHandle<ExecutionResult>,
}

/// Trace `source` on tokio's blocking pool, streaming snapshots as they
/// are produced.
pub fn spawn_trace(source: String, config: TracerConfig) -> TraceStream {
    let (sender, receiver) = unbounded_channel();
    let handle = tokio::task::spawn_blocking(move || {
        let mut recorder = ChannelRecorder::new(sender);
        let outcome = run_source(&source, &config, &mut recorder);
        let failure = outcome
            .failure
            .map(|e| e.to_string())
            .or_else(|| outcome.parse_error.map(|e| e.to_string()));
        ExecutionResult::new(&recorder.into_inner().finish(), outcome.mode, failure)
    });
    TraceStream {
        snapshots: receiver,
        handle,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trace::ExecutionMode;

    #[tokio::test]
    async fn test_stream_delivers_snapshots_in_order() {
        let mut stream = spawn_trace(
            "let a = 1;\nlet b = a + 1;\nconsole.log(b);".to_string(),
            TracerConfig::default(),
        );

        let mut lines = Vec::new();
        while let Some(snapshot) = stream.snapshots.recv().await {
            lines.push(snapshot.source_line);
        }
        let result = stream.handle.await.expect("join");

        assert_eq!(lines, vec![0, 1, 2]);
        assert_eq!(result.total_steps, 3);
        assert_eq!(result.mode, ExecutionMode::Interpreted);
    }

    #[tokio::test]
    async fn test_stream_falls_back_on_syntax_error() {
        let stream = spawn_trace("let a = (1;".to_string(), TracerConfig::default());
        let result = stream.handle.await.expect("join");
        assert_eq!(result.mode, ExecutionMode::Fallback);
        assert_eq!(result.states.len(), 1);
    }
}
