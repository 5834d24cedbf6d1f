//! Ingest core: pure run model shared by the engine and the binary.
mod metrics;
mod outcome;
mod record;
mod reference;

pub use metrics::{success_rate, MetricsSnapshot, RunMetrics};
pub use outcome::{ItemOutcome, RunOutcome};
pub use record::{FieldMap, FieldValue, ItemRecord, DEFAULT_IDENTITY_FIELD};
pub use reference::{canonicalize_reference, CandidateReference, ReferenceError};
