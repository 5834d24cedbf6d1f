use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};
use serde_json::{Map, Value};

use crate::ItemOutcome;

/// Counters for one run. Counters only move forward; derived values are
/// computed on read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunMetrics {
    started_at: DateTime<Utc>,
    jobs_processed: u64,
    jobs_failed: u64,
    total_requests: u64,
    successful_saves: u64,
    failed_saves: u64,
    items_skipped: u64,
    flushed: bool,
}

impl RunMetrics {
    pub fn start(started_at: DateTime<Utc>) -> Self {
        Self {
            started_at,
            jobs_processed: 0,
            jobs_failed: 0,
            total_requests: 0,
            successful_saves: 0,
            failed_saves: 0,
            items_skipped: 0,
            flushed: false,
        }
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn jobs_processed(&self) -> u64 {
        self.jobs_processed
    }

    pub fn jobs_failed(&self) -> u64 {
        self.jobs_failed
    }

    pub fn total_requests(&self) -> u64 {
        self.total_requests
    }

    pub fn successful_saves(&self) -> u64 {
        self.successful_saves
    }

    pub fn failed_saves(&self) -> u64 {
        self.failed_saves
    }

    /// References short-circuited by dedup. Kept in memory only.
    pub fn items_skipped(&self) -> u64 {
        self.items_skipped
    }

    /// Apply the terminal classification of one reference.
    ///
    /// The request counter and the outcome counter move together, so the
    /// counters are conserved at every item boundary.
    pub fn record_item(&mut self, outcome: ItemOutcome) {
        self.total_requests += 1;
        match outcome {
            ItemOutcome::Skipped => self.items_skipped += 1,
            ItemOutcome::Saved => {
                self.successful_saves += 1;
                self.jobs_processed += 1;
            }
            ItemOutcome::SaveFailed => {
                self.failed_saves += 1;
                self.jobs_processed += 1;
            }
            ItemOutcome::ExtractionFailed | ItemOutcome::NoData | ItemOutcome::DedupFailed => {
                self.jobs_failed += 1;
            }
        }
    }

    pub fn success_rate(&self) -> f64 {
        success_rate(self.jobs_processed, self.jobs_failed)
    }

    pub fn duration_seconds(&self, now: DateTime<Utc>) -> i64 {
        (now - self.started_at).num_seconds().max(0)
    }

    pub fn has_failures(&self) -> bool {
        self.jobs_failed > 0 || self.failed_saves > 0
    }

    pub fn is_flushed(&self) -> bool {
        self.flushed
    }

    /// Claim the single flush of this run. Returns `false` if already claimed.
    pub fn mark_flushed(&mut self) -> bool {
        !std::mem::replace(&mut self.flushed, true)
    }

    pub fn is_conserved(&self) -> bool {
        self.total_requests == self.items_skipped + self.jobs_processed + self.jobs_failed
    }

    pub fn snapshot(&self, now: DateTime<Utc>) -> MetricsSnapshot {
        MetricsSnapshot {
            duration_seconds: self.duration_seconds(now),
            jobs_processed: self.jobs_processed,
            jobs_failed: self.jobs_failed,
            total_requests: self.total_requests,
            success_rate: self.success_rate(),
            successful_saves: self.successful_saves,
            failed_saves: self.failed_saves,
            items_skipped: self.items_skipped,
        }
    }
}

/// `processed / (processed + failed)`, or 0 when nothing was attempted.
pub fn success_rate(processed: u64, failed: u64) -> f64 {
    let attempted = processed + failed;
    if attempted == 0 {
        0.0
    } else {
        processed as f64 / attempted as f64
    }
}

/// Point-in-time view of [`RunMetrics`], shaped like the metrics table row.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricsSnapshot {
    pub duration_seconds: i64,
    pub jobs_processed: u64,
    pub jobs_failed: u64,
    pub total_requests: u64,
    #[serde(serialize_with = "serialize_percent")]
    pub success_rate: f64,
    pub successful_saves: u64,
    pub failed_saves: u64,
    #[serde(skip)]
    pub items_skipped: u64,
}

impl MetricsSnapshot {
    pub fn success_rate_percent(&self) -> String {
        format_percent(self.success_rate)
    }

    pub fn to_store_fields(&self) -> Result<Map<String, Value>, serde_json::Error> {
        match serde_json::to_value(self)? {
            Value::Object(map) => Ok(map),
            other => Err(serde::ser::Error::custom(format!(
                "metrics snapshot serialized to non-object {other}"
            ))),
        }
    }
}

fn format_percent(rate: f64) -> String {
    format!("{:.2}%", rate * 100.0)
}

fn serialize_percent<S: Serializer>(rate: &f64, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&format_percent(*rate))
}
