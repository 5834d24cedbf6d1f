use std::fmt;

use crate::RunMetrics;

/// Terminal classification of one reference within a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemOutcome {
    /// Identity already persisted; nothing loaded or saved.
    Skipped,
    Saved,
    /// Extracted, but the store rejected the record.
    SaveFailed,
    ExtractionFailed,
    /// Extraction ran but produced no record.
    NoData,
    /// Dedup lookup failed and the item was not processed.
    DedupFailed,
}

impl fmt::Display for ItemOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ItemOutcome::Skipped => write!(f, "skipped (already persisted)"),
            ItemOutcome::Saved => write!(f, "saved"),
            ItemOutcome::SaveFailed => write!(f, "save failed"),
            ItemOutcome::ExtractionFailed => write!(f, "extraction failed"),
            ItemOutcome::NoData => write!(f, "no data"),
            ItemOutcome::DedupFailed => write!(f, "dedup lookup failed"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    Completed,
    CompletedWithFailures,
    FatalAborted,
}

impl RunOutcome {
    /// Classify a run that reached its terminal path.
    pub fn classify(metrics: &RunMetrics, aborted: bool) -> Self {
        if aborted {
            RunOutcome::FatalAborted
        } else if metrics.has_failures() {
            RunOutcome::CompletedWithFailures
        } else {
            RunOutcome::Completed
        }
    }
}

impl fmt::Display for RunOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunOutcome::Completed => write!(f, "completed"),
            RunOutcome::CompletedWithFailures => write!(f, "completed with failures"),
            RunOutcome::FatalAborted => write!(f, "fatal aborted"),
        }
    }
}
