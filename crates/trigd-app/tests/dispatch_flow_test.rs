//! End-to-end dispatch flow tests.
//!
//! Each test runs the full application with an in-memory signal stream,
//! pipeline source and execution ledger.

mod integration;

use std::time::Duration;

use integration::common::harness::{pipeline, signal, test_config, wait_for, Harness};
use trigd_app::{AppError, Application, Components};
use trigd_cache::StaticPipelineSource;
use trigd_dispatch::MemoryExecutionLedger;
use trigd_ingest::MemorySignalStream;

#[tokio::test]
async fn test_dispatches_only_tracked_ticker() {
    let tracked = pipeline(&["AAPL"]);
    let pipeline_id = tracked.pipeline_id;
    let harness = Harness::start(test_config(20, 20), vec![tracked]);

    harness.stream.push_json(&signal(
        "sig-1",
        "golden_cross",
        &[("AAPL", 90.0), ("MSFT", 90.0)],
    ));

    let stream = harness.stream.clone();
    wait_for("batch commit", move || stream.committed_offset() == Some(0)).await;

    let enqueued = harness.ledger.enqueued();
    assert_eq!(enqueued.len(), 1);
    assert_eq!(enqueued[0].pipeline_id, pipeline_id);
    assert_eq!(enqueued[0].matched_ticker, "AAPL");
    assert_eq!(enqueued[0].signal_id, "sig-1");

    let summary = harness.stop().await;
    assert_eq!(summary.dispatched, 1);
    assert_eq!(summary.failed, 0);
}

#[tokio::test]
async fn test_running_pipeline_is_not_dispatched_twice() {
    let tracked = pipeline(&["AAPL"]);
    let pipeline_id = tracked.pipeline_id;
    let harness = Harness::start(test_config(1, 20), vec![tracked]);

    harness
        .stream
        .push_json(&signal("sig-1", "breakout", &[("AAPL", 80.0)]));
    let ledger = harness.ledger.clone();
    wait_for("first dispatch", move || ledger.enqueued().len() == 1).await;

    harness
        .stream
        .push_json(&signal("sig-2", "breakout", &[("AAPL", 95.0)]));
    harness
        .stream
        .push_json(&signal("sig-3", "breakout", &[("AAPL", 70.0)]));
    let stream = harness.stream.clone();
    wait_for("skipped batches commit", move || {
        stream.committed_offset() == Some(2)
    })
    .await;
    assert_eq!(harness.ledger.enqueued().len(), 1);

    // Execution finished; the next signal may trigger a new run.
    harness.ledger.complete(pipeline_id);
    harness
        .stream
        .push_json(&signal("sig-4", "breakout", &[("AAPL", 60.0)]));
    let ledger = harness.ledger.clone();
    wait_for("second dispatch", move || ledger.enqueued().len() == 2).await;
    assert_eq!(harness.ledger.enqueued()[1].signal_id, "sig-4");

    harness.stop().await;
}

#[tokio::test]
async fn test_enqueue_failure_redelivers_batch() {
    let harness = Harness::start(test_config(20, 20), vec![pipeline(&["AAPL"])]);
    harness.ledger.fail_enqueue_after(0);

    harness
        .stream
        .push_json(&signal("sig-1", "breakout", &[("AAPL", 80.0)]));
    let stream = harness.stream.clone();
    wait_for("rewind after failed enqueue", move || {
        !stream.rewinds().is_empty()
    })
    .await;
    assert_eq!(harness.stream.committed_offset(), None);
    assert!(harness.ledger.enqueued().is_empty());

    harness.ledger.clear_enqueue_failures();
    let stream = harness.stream.clone();
    wait_for("redelivered batch commit", move || {
        stream.committed_offset() == Some(0)
    })
    .await;

    let enqueued = harness.ledger.enqueued();
    assert_eq!(enqueued.len(), 1);
    assert_eq!(enqueued[0].signal_id, "sig-1");

    let summary = harness.stop().await;
    assert!(summary.failed >= 1);
    assert_eq!(summary.dispatched, 1);
}

#[tokio::test]
async fn test_busy_check_outage_never_dispatches() {
    let harness = Harness::start(test_config(20, 20), vec![pipeline(&["AAPL"])]);
    harness.ledger.set_fail_busy_checks(true);

    harness
        .stream
        .push_json(&signal("sig-1", "breakout", &[("AAPL", 80.0)]));
    let stream = harness.stream.clone();
    wait_for("repeated redelivery", move || stream.rewinds().len() >= 2).await;
    assert!(harness.ledger.enqueued().is_empty());
    assert_eq!(harness.ledger.enqueue_attempts(), 0);
    assert_eq!(harness.stream.committed_offset(), None);

    harness.ledger.set_fail_busy_checks(false);
    let ledger = harness.ledger.clone();
    wait_for("dispatch after recovery", move || ledger.enqueued().len() == 1).await;

    harness.stop().await;
}

#[tokio::test]
async fn test_malformed_signal_is_committed_with_next_batch() {
    let harness = Harness::start(test_config(20, 20), vec![pipeline(&["AAPL"])]);

    harness.stream.push(b"not json".to_vec());
    harness
        .stream
        .push_json(&signal("sig-1", "breakout", &[("AAPL", 80.0)]));

    let stream = harness.stream.clone();
    wait_for("commit past malformed record", move || {
        stream.committed_offset() == Some(1)
    })
    .await;
    assert_eq!(harness.ledger.enqueued().len(), 1);

    harness.stop().await;
}

#[tokio::test]
async fn test_unmatched_signal_is_committed_without_dispatch() {
    let harness = Harness::start(test_config(20, 20), vec![pipeline(&["AAPL"])]);

    harness
        .stream
        .push_json(&signal("sig-1", "breakout", &[("TSLA", 99.0)]));

    let stream = harness.stream.clone();
    wait_for("commit", move || stream.committed_offset() == Some(0)).await;
    assert!(harness.ledger.enqueued().is_empty());
    assert_eq!(harness.ledger.busy_query_count(), 0);

    harness.stop().await;
}

#[tokio::test]
async fn test_shutdown_flushes_buffered_signals() {
    // Neither size nor timeout will flush during the test.
    let harness = Harness::start(test_config(20, 60_000), vec![pipeline(&["AAPL"])]);

    harness
        .stream
        .push_json(&signal("sig-1", "breakout", &[("AAPL", 80.0)]));
    harness
        .stream
        .push_json(&signal("sig-2", "breakout", &[("MSFT", 80.0)]));
    let stream = harness.stream.clone();
    wait_for("records consumed", move || stream.pending() == 0).await;
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(harness.stream.committed_offset(), None);

    let stream = harness.stream.clone();
    let ledger = harness.ledger.clone();
    let summary = harness.stop().await;

    assert_eq!(summary.committed, 1);
    assert_eq!(stream.committed_offset(), Some(1));
    assert_eq!(ledger.enqueued().len(), 1);
}

#[tokio::test]
async fn test_end_of_stream_stops_application() {
    let harness = Harness::start(test_config(20, 20), vec![pipeline(&["AAPL"])]);

    harness
        .stream
        .push_json(&signal("sig-1", "breakout", &[("AAPL", 80.0)]));
    harness.stream.close();

    let ledger = harness.ledger.clone();
    let summary = harness.join().await;
    assert_eq!(summary.committed, 1);
    assert_eq!(ledger.enqueued().len(), 1);
}

#[tokio::test]
async fn test_cache_refresh_picks_up_new_pipeline() {
    let harness = Harness::start(test_config(20, 20), vec![pipeline(&["AAPL"])]);

    let added = pipeline(&["MSFT"]);
    let added_id = added.pipeline_id;
    harness.source.set_records(vec![added]);

    let source = harness.source.clone();
    wait_for("cache refresh", move || source.load_count() >= 2).await;

    harness
        .stream
        .push_json(&signal("sig-1", "breakout", &[("AAPL", 80.0), ("MSFT", 80.0)]));
    let ledger = harness.ledger.clone();
    wait_for("dispatch to new pipeline", move || ledger.enqueued().len() == 1).await;

    let enqueued = harness.ledger.enqueued();
    assert_eq!(enqueued[0].pipeline_id, added_id);
    assert_eq!(enqueued[0].matched_ticker, "MSFT");

    harness.stop().await;
}

#[tokio::test]
async fn test_initial_load_failure_refuses_to_start() {
    let stream = MemorySignalStream::shared();
    let ledger = MemoryExecutionLedger::shared();
    let source = StaticPipelineSource::shared(vec![pipeline(&["AAPL"])]);
    source.set_failing(true);
    stream.push_json(&signal("sig-1", "breakout", &[("AAPL", 80.0)]));

    let components = Components {
        pipeline_source: source,
        signal_stream: stream.clone(),
        execution_state: ledger.clone(),
        task_queue: ledger.clone(),
    };
    let result = tokio::time::timeout(
        Duration::from_secs(5),
        Application::new(test_config(20, 20)).run_with(components),
    )
    .await
    .expect("startup did not finish");

    assert!(matches!(result, Err(AppError::Cache(_))));
    assert_eq!(stream.pending(), 1);
    assert!(ledger.enqueued().is_empty());
}
