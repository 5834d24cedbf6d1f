use std::sync::Arc;

use ingest_core::{CandidateReference, FieldMap, ItemOutcome, ItemRecord, RunMetrics, RunOutcome};
use pipeline_logging::{pipeline_error, pipeline_info, pipeline_warn};
use tokio_util::sync::CancellationToken;

use crate::{
    CapabilityError, DedupAdapter, DedupFailurePolicy, Extractor, ItemLoader, MetricsAggregator,
    ProgressSink, QuerySchema, RecordSink, RetryPolicy, RunError, RunEvent, RunReport,
};

/// Why the item loop stopped before the end of the list.
enum Interruption {
    Cancelled,
    Fatal(CapabilityError),
}

/// Processes discovered references one at a time: dedup, load, extract,
/// save, count. The loader's session is used by nothing else during a run.
pub struct Orchestrator {
    loader: Arc<dyn ItemLoader>,
    extractor: Arc<dyn Extractor>,
    schema: QuerySchema,
    dedup: DedupAdapter,
    sink: RecordSink,
    aggregator: MetricsAggregator,
    retry: RetryPolicy,
}

impl Orchestrator {
    pub fn new(
        loader: Arc<dyn ItemLoader>,
        extractor: Arc<dyn Extractor>,
        schema: QuerySchema,
        dedup: DedupAdapter,
        sink: RecordSink,
        aggregator: MetricsAggregator,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            loader,
            extractor,
            schema,
            dedup,
            sink,
            aggregator,
            retry,
        }
    }

    pub fn aggregator(&self) -> &MetricsAggregator {
        &self.aggregator
    }

    /// Process `references` in order, then flush `metrics` exactly once.
    ///
    /// Cancellation is honoured between items and after the last one, and
    /// yields a `FatalAborted` report. A session-fatal error stops the loop
    /// and is returned after the flush; `metrics` keeps the counts of the
    /// items finished before it.
    pub async fn run(
        &self,
        references: Vec<CandidateReference>,
        metrics: &mut RunMetrics,
        cancel: &CancellationToken,
        progress: &dyn ProgressSink,
    ) -> Result<RunReport, RunError> {
        let total = references.len();
        let mut interruption = None;

        for (index, reference) in references.into_iter().enumerate() {
            if cancel.is_cancelled() {
                pipeline_warn!("Run cancelled with {} of {} references left", total - index, total);
                interruption = Some(Interruption::Cancelled);
                break;
            }
            pipeline_info!("Processing item {}/{}: {}", index + 1, total, reference);
            progress.emit(RunEvent::ItemStarted {
                index,
                total,
                reference: reference.clone(),
            });

            match self.process_item(&reference).await {
                Ok(outcome) => {
                    metrics.record_item(outcome);
                    progress.emit(RunEvent::ItemFinished {
                        index,
                        reference,
                        outcome,
                    });
                }
                Err(err) => {
                    pipeline_error!("Fatal error while processing {}: {}", reference, err);
                    interruption = Some(Interruption::Fatal(err));
                    break;
                }
            }
        }
        // A signal raised during discovery or the last item still ends the run.
        if interruption.is_none() && cancel.is_cancelled() {
            pipeline_warn!("Run cancelled after all {} references", total);
            interruption = Some(Interruption::Cancelled);
        }

        let flushed = match self.aggregator.flush(metrics).await {
            Ok(_) => true,
            Err(err) => {
                pipeline_error!("Failed to save run metrics: {}", err);
                false
            }
        };
        let snapshot = metrics.snapshot(self.aggregator.now());

        match interruption {
            None => {
                let outcome = RunOutcome::classify(metrics, false);
                pipeline_info!("Run {}", outcome);
                Ok(RunReport {
                    outcome,
                    metrics: snapshot,
                    metrics_flushed: flushed,
                    cancelled: false,
                })
            }
            Some(Interruption::Cancelled) => Ok(RunReport {
                outcome: RunOutcome::FatalAborted,
                metrics: snapshot,
                metrics_flushed: flushed,
                cancelled: true,
            }),
            Some(Interruption::Fatal(source)) => Err(RunError::SessionFatal {
                source,
                metrics: snapshot,
                metrics_flushed: flushed,
            }),
        }
    }

    /// Terminal classification of one reference, or the session-fatal error
    /// that makes the rest of the run pointless.
    async fn process_item(&self, reference: &CandidateReference) -> Result<ItemOutcome, CapabilityError> {
        match self.dedup.exists(reference).await {
            Ok(true) => {
                pipeline_info!("Already persisted, skipping: {}", reference);
                return Ok(ItemOutcome::Skipped);
            }
            Ok(false) => {}
            Err(err) => match self.dedup.policy() {
                DedupFailurePolicy::FailClosed => {
                    pipeline_error!("Dedup lookup failed for {}: {}", reference, err);
                    return Ok(ItemOutcome::DedupFailed);
                }
                DedupFailurePolicy::FailOpen => {
                    pipeline_warn!(
                        "Dedup lookup failed for {}, processing anyway: {}",
                        reference,
                        err
                    );
                }
            },
        }

        let fields = match self.load_and_extract(reference).await {
            Ok(Some(fields)) if !fields.is_empty() => fields,
            Ok(_) => {
                pipeline_warn!("No data extracted for {}", reference);
                return Ok(ItemOutcome::NoData);
            }
            Err(err) if err.kind.is_session_fatal() => return Err(err),
            Err(err) => {
                pipeline_error!("Extraction failed for {}: {}", reference, err);
                return Ok(ItemOutcome::ExtractionFailed);
            }
        };
        pipeline_info!("Extracted {} fields for {}", fields.len(), reference);

        let record = ItemRecord::new(reference.clone(), fields);
        match self.sink.save(&record).await {
            Ok(()) => {
                self.dedup.remember(reference);
                Ok(ItemOutcome::Saved)
            }
            Err(err) => {
                pipeline_error!("Failed to persist record for {}: {}", reference, err);
                Ok(ItemOutcome::SaveFailed)
            }
        }
    }

    async fn load_and_extract(
        &self,
        reference: &CandidateReference,
    ) -> Result<Option<FieldMap>, CapabilityError> {
        let mut attempt = 1;
        loop {
            let result = self.load_and_extract_once(reference).await;
            match result {
                Err(err) if err.kind.is_transient() && self.retry.allows_retry_after(attempt) => {
                    let delay = self.retry.backoff_after(attempt);
                    pipeline_warn!(
                        "Attempt {} for {} failed ({}), retrying in {:?}",
                        attempt,
                        reference,
                        err,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                other => return other,
            }
        }
    }

    async fn load_and_extract_once(
        &self,
        reference: &CandidateReference,
    ) -> Result<Option<FieldMap>, CapabilityError> {
        let context = self.loader.load(reference).await?;
        self.extractor.extract(&context, &self.schema).await
    }
}
