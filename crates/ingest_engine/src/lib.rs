//! Ingest engine: discovery, per-item ingestion and run accounting.
mod aggregator;
mod capability;
mod dedup;
mod orchestrator;
mod pagination;
mod pipeline;
mod progress;
mod retry;
mod schema;
mod sink;
mod types;
pub mod web;

pub use aggregator::MetricsAggregator;
pub use capability::{
    Authenticator, Credentials, DiscoveryTrigger, Extractor, ItemContext, ItemLoader, StoreClient,
};
pub use dedup::{DedupAdapter, DedupFailurePolicy};
pub use orchestrator::Orchestrator;
pub use pagination::{PaginationDriver, PaginationSettings};
pub use pipeline::{Capabilities, Pipeline, PipelineSettings};
pub use progress::{LogProgressSink, NullProgressSink, ProgressSink};
pub use retry::RetryPolicy;
pub use schema::{FieldKind, FieldSpec, QuerySchema};
pub use sink::RecordSink;
pub use types::{
    system_clock, CapabilityError, Clock, FailureKind, FlushError, RunError, RunEvent, RunReport,
};
