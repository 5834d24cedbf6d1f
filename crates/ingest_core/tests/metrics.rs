use chrono::{Duration, TimeZone, Utc};
use ingest_core::{success_rate, ItemOutcome, RunMetrics, RunOutcome};
use pretty_assertions::assert_eq;

fn start() -> RunMetrics {
    RunMetrics::start(Utc.with_ymd_and_hms(2024, 3, 1, 8, 0, 0).unwrap())
}

#[test]
fn success_rate_literal_cases() {
    assert_eq!(success_rate(0, 0), 0.0);
    assert_eq!(success_rate(3, 1), 0.75);
    assert_eq!(success_rate(0, 5), 0.0);
}

#[test]
fn save_failure_still_counts_as_processed() {
    let mut metrics = start();
    metrics.record_item(ItemOutcome::Saved);
    metrics.record_item(ItemOutcome::SaveFailed);

    assert_eq!(metrics.jobs_processed(), 2);
    assert_eq!(metrics.successful_saves(), 1);
    assert_eq!(metrics.failed_saves(), 1);
    assert_eq!(metrics.jobs_failed(), 0);
    assert_eq!(metrics.success_rate(), 1.0);
}

#[test]
fn every_failure_kind_lands_in_jobs_failed() {
    let mut metrics = start();
    metrics.record_item(ItemOutcome::ExtractionFailed);
    metrics.record_item(ItemOutcome::NoData);
    metrics.record_item(ItemOutcome::DedupFailed);

    assert_eq!(metrics.jobs_failed(), 3);
    assert_eq!(metrics.jobs_processed(), 0);
    assert_eq!(metrics.total_requests(), 3);
}

#[test]
fn skipped_items_only_move_the_request_counter() {
    let mut metrics = start();
    metrics.record_item(ItemOutcome::Skipped);

    assert_eq!(metrics.total_requests(), 1);
    assert_eq!(metrics.jobs_processed(), 0);
    assert_eq!(metrics.jobs_failed(), 0);
    assert_eq!(metrics.items_skipped(), 1);
    assert!(metrics.is_conserved());
}

#[test]
fn counters_never_decrease_across_a_run() {
    let outcomes = [
        ItemOutcome::Saved,
        ItemOutcome::Skipped,
        ItemOutcome::NoData,
        ItemOutcome::SaveFailed,
        ItemOutcome::ExtractionFailed,
        ItemOutcome::Saved,
    ];
    let mut metrics = start();
    let mut previous = metrics.clone();
    for outcome in outcomes {
        metrics.record_item(outcome);
        assert!(metrics.total_requests() >= previous.total_requests());
        assert!(metrics.jobs_processed() >= previous.jobs_processed());
        assert!(metrics.jobs_failed() >= previous.jobs_failed());
        assert!(metrics.successful_saves() >= previous.successful_saves());
        assert!(metrics.failed_saves() >= previous.failed_saves());
        assert!(metrics.is_conserved());
        previous = metrics.clone();
    }
    assert_eq!(metrics.total_requests(), 6);
}

#[test]
fn snapshot_renders_store_row() {
    let mut metrics = start();
    for outcome in [
        ItemOutcome::Saved,
        ItemOutcome::Saved,
        ItemOutcome::SaveFailed,
        ItemOutcome::NoData,
    ] {
        metrics.record_item(outcome);
    }
    let now = metrics.started_at() + Duration::seconds(95);
    let snapshot = metrics.snapshot(now);

    assert_eq!(snapshot.duration_seconds, 95);
    assert_eq!(snapshot.success_rate_percent(), "75.00%");

    let fields = snapshot.to_store_fields().unwrap();
    assert_eq!(fields["duration_seconds"], 95);
    assert_eq!(fields["jobs_processed"], 3);
    assert_eq!(fields["jobs_failed"], 1);
    assert_eq!(fields["total_requests"], 4);
    assert_eq!(fields["successful_saves"], 2);
    assert_eq!(fields["failed_saves"], 1);
    assert_eq!(fields["success_rate"], "75.00%");
    assert!(!fields.contains_key("items_skipped"));
}

#[test]
fn duration_never_goes_negative() {
    let metrics = start();
    let before = metrics.started_at() - Duration::seconds(10);
    assert_eq!(metrics.duration_seconds(before), 0);
}

#[test]
fn outcome_classification() {
    let mut metrics = start();
    assert_eq!(RunOutcome::classify(&metrics, false), RunOutcome::Completed);

    metrics.record_item(ItemOutcome::SaveFailed);
    assert_eq!(
        RunOutcome::classify(&metrics, false),
        RunOutcome::CompletedWithFailures
    );
    assert_eq!(RunOutcome::classify(&metrics, true), RunOutcome::FatalAborted);
}

#[test]
fn flush_can_only_be_claimed_once() {
    let mut metrics = start();
    assert!(!metrics.is_flushed());
    assert!(metrics.mark_flushed());
    assert!(!metrics.mark_flushed());
    assert!(metrics.is_flushed());
}
