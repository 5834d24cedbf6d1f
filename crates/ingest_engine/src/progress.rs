use pipeline_logging::pipeline_debug;

use crate::RunEvent;

pub trait ProgressSink: Send + Sync {
    fn emit(&self, event: RunEvent);
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NullProgressSink;

impl ProgressSink for NullProgressSink {
    fn emit(&self, _event: RunEvent) {}
}

/// Mirrors run events into the debug log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogProgressSink;

impl ProgressSink for LogProgressSink {
    fn emit(&self, event: RunEvent) {
        match event {
            RunEvent::ItemStarted {
                index,
                total,
                reference,
            } => pipeline_debug!("item {}/{} started: {}", index + 1, total, reference),
            RunEvent::ItemFinished {
                index,
                reference,
                outcome,
            } => pipeline_debug!("item {} finished ({}): {}", index + 1, outcome, reference),
        }
    }
}
