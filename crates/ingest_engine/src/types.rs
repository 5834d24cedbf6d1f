use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use ingest_core::{CandidateReference, ItemOutcome, MetricsSnapshot, RunOutcome};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunEvent {
    ItemStarted {
        index: usize,
        total: usize,
        reference: CandidateReference,
    },
    ItemFinished {
        index: usize,
        reference: CandidateReference,
        outcome: ItemOutcome,
    },
}

/// Error returned by every external capability: a kind the orchestrator
/// matches on, plus a message for the log.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct CapabilityError {
    pub kind: FailureKind,
    pub message: String,
}

impl CapabilityError {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureKind {
    InvalidReference,
    HttpStatus(u16),
    Timeout,
    RedirectLimitExceeded,
    TooLarge { max_bytes: u64, actual: Option<u64> },
    UnsupportedContentType { content_type: String },
    MissingStructure,
    Unauthorized,
    SessionLost,
    Serialization,
    Network,
}

impl FailureKind {
    /// Worth another attempt after a pause.
    pub fn is_transient(&self) -> bool {
        match self {
            FailureKind::Timeout | FailureKind::Network => true,
            FailureKind::HttpStatus(code) => *code == 429 || (500..600).contains(code),
            _ => false,
        }
    }

    /// Invalidates the browsing session when raised while loading or
    /// extracting an item.
    pub fn is_session_fatal(&self) -> bool {
        matches!(self, FailureKind::SessionLost | FailureKind::Unauthorized)
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureKind::InvalidReference => write!(f, "invalid reference"),
            FailureKind::HttpStatus(code) => write!(f, "http status {code}"),
            FailureKind::Timeout => write!(f, "timeout"),
            FailureKind::RedirectLimitExceeded => write!(f, "redirect limit exceeded"),
            FailureKind::TooLarge { max_bytes, actual } => {
                write!(f, "response too large (max {max_bytes}, actual {actual:?})")
            }
            FailureKind::UnsupportedContentType { content_type } => {
                write!(f, "unsupported content type {content_type}")
            }
            FailureKind::MissingStructure => write!(f, "missing structure"),
            FailureKind::Unauthorized => write!(f, "unauthorized"),
            FailureKind::SessionLost => write!(f, "session lost"),
            FailureKind::Serialization => write!(f, "serialization error"),
            FailureKind::Network => write!(f, "network error"),
        }
    }
}

/// Errors that end a run. Item-scoped failures never surface here.
#[derive(Debug, thiserror::Error)]
pub enum RunError {
    #[error("sign-in failed: {0}")]
    Auth(#[source] CapabilityError),
    #[error("run aborted after {} references: {source}", .metrics.total_requests)]
    SessionFatal {
        source: CapabilityError,
        metrics: MetricsSnapshot,
        metrics_flushed: bool,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FlushError {
    #[error("run metrics were already flushed")]
    AlreadyFlushed,
    #[error("metrics store rejected snapshot: {0}")]
    Store(CapabilityError),
}

#[derive(Debug, Clone, PartialEq)]
pub struct RunReport {
    pub outcome: RunOutcome,
    pub metrics: MetricsSnapshot,
    pub metrics_flushed: bool,
    pub cancelled: bool,
}

/// Source of "now" for run timing.
pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

pub fn system_clock() -> Clock {
    Arc::new(Utc::now)
}
