use std::sync::Arc;

use chrono::{DateTime, Utc};
use ingest_core::{MetricsSnapshot, RunMetrics};
use pipeline_logging::pipeline_info;

use crate::{CapabilityError, Clock, FailureKind, FlushError, StoreClient};

/// Persists the end-of-run metrics row.
pub struct MetricsAggregator {
    store: Arc<dyn StoreClient>,
    table: String,
    clock: Clock,
}

impl MetricsAggregator {
    pub fn new(store: Arc<dyn StoreClient>, table: impl Into<String>, clock: Clock) -> Self {
        Self {
            store,
            table: table.into(),
            clock,
        }
    }

    pub fn now(&self) -> DateTime<Utc> {
        (self.clock)()
    }

    /// Write the snapshot of `metrics`. A run's metrics can be flushed once;
    /// the claim is taken before the insert, so a failed write is not retried.
    pub async fn flush(&self, metrics: &mut RunMetrics) -> Result<MetricsSnapshot, FlushError> {
        if !metrics.mark_flushed() {
            return Err(FlushError::AlreadyFlushed);
        }
        let snapshot = metrics.snapshot(self.now());
        let fields = snapshot.to_store_fields().map_err(|err| {
            FlushError::Store(CapabilityError::new(FailureKind::Serialization, err.to_string()))
        })?;
        self.store
            .insert(&self.table, fields)
            .await
            .map_err(FlushError::Store)?;
        pipeline_info!(
            "Metrics saved: processed={} failed={} requests={} saves={} failed_saves={} success_rate={} duration={}s",
            snapshot.jobs_processed,
            snapshot.jobs_failed,
            snapshot.total_requests,
            snapshot.successful_saves,
            snapshot.failed_saves,
            snapshot.success_rate_percent(),
            snapshot.duration_seconds
        );
        Ok(snapshot)
    }
}
