//! End-to-end tests: samples in over a simulated link, reports out.

use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Duration;
use tristream::pipeline::{Pipeline, SendState};
use tristream::protocol::{
    floats_from_le_bytes, MedianReport, Sample, WindowReport, ERROR_TOKEN, MEDIAN_REPORT_BYTES,
    WINDOW_REPORT_BYTES, WINDOW_REPORT_FLOATS,
};
use tristream::transport::{ReadOutcome, SimulatedLink};
use tristream::{GlobalStats, HostHarness, StreamConfig};

fn config(window: usize) -> StreamConfig {
    let mut config = StreamConfig::default();
    config.stats.window_size = window;
    config
}

fn ramp(n: usize) -> Vec<Sample> {
    (1..=n)
        .map(|i| {
            let v = i as f32;
            Sample::new(v, v, v)
        })
        .collect()
}

/// Reports the pipeline should send for `samples`, computed directly on `GlobalStats`.
fn expected_output(window: usize, samples: &[Sample]) -> Vec<u8> {
    let mut stats = GlobalStats::new(NonZeroUsize::new(window).unwrap());
    let mut out = Vec::new();
    for sample in samples {
        if sample.is_terminator() {
            out.extend_from_slice(&stats.median_report().to_le_bytes());
            stats.reset();
        } else if stats.push_sample(sample) {
            out.extend_from_slice(&stats.window_report().to_le_bytes());
        }
    }
    out
}

#[test]
fn test_four_sample_session() {
    let mut harness = HostHarness::new(&config(4)).unwrap();
    let mut samples = ramp(4);
    samples.push(Sample::TERMINATOR);
    harness.feed(samples).unwrap();

    let floats = floats_from_le_bytes(&harness.take_output());
    assert_eq!(floats.len(), WINDOW_REPORT_FLOATS + 3);

    // X summary
    assert_eq!(floats[0], 1.0);
    assert_eq!(floats[1], 4.0);
    assert!((floats[2] - 2.5).abs() < 1e-6);
    assert!((floats[3] - 1.25).abs() < 1e-6);
    assert!(floats[4].abs() < 1e-6);
    assert!((floats[5] - 1.64).abs() < 1e-5);

    // correlations
    for rho in &floats[18..21] {
        assert!((rho - 1.0).abs() < 1e-6, "correlation {rho}");
    }

    // medians
    assert_eq!(&floats[21..], &[2.5, 2.5, 2.5]);

    let metrics = harness.metrics();
    assert_eq!(metrics.samples_received, 5);
    assert_eq!(metrics.samples_processed, 5);
    assert_eq!(metrics.windows_reported, 1);
    assert_eq!(metrics.sessions_completed, 1);
    assert_eq!(
        metrics.bytes_transmitted,
        (WINDOW_REPORT_BYTES + MEDIAN_REPORT_BYTES) as u64
    );
}

#[test]
fn test_receive_failure_sends_error_token() {
    let mut harness = HostHarness::new(&config(2)).unwrap();
    harness.fail_read().unwrap();
    harness.service();
    assert_eq!(harness.take_output(), ERROR_TOKEN);
    assert_eq!(harness.link().armed_read(), Some(12));

    // later reports are unaffected
    let samples = vec![
        Sample::new(1.0, 2.0, 3.0),
        Sample::new(2.0, 1.0, 5.0),
        Sample::TERMINATOR,
    ];
    harness.feed(samples.clone()).unwrap();
    assert_eq!(harness.take_output(), expected_output(2, &samples));

    let metrics = harness.metrics();
    assert_eq!(metrics.rx_faults, 1);
    assert_eq!(metrics.error_tokens_sent, 1);
}

#[test]
fn test_error_token_follows_pending_samples() {
    let mut harness = HostHarness::new(&config(1)).unwrap();
    harness.deliver_sample(Sample::new(1.0, 2.0, 3.0)).unwrap();
    harness.fail_read().unwrap();
    harness.fail_read().unwrap();
    harness.service();

    let out = harness.take_output();
    assert_eq!(out.len(), WINDOW_REPORT_BYTES + 2 * ERROR_TOKEN.len());
    assert_eq!(&out[WINDOW_REPORT_BYTES..WINDOW_REPORT_BYTES + 5], ERROR_TOKEN);
    assert_eq!(&out[WINDOW_REPORT_BYTES + 5..], ERROR_TOKEN);
}

#[test]
fn test_error_token_precedes_later_sample() {
    let mut harness = HostHarness::new(&config(1)).unwrap();
    harness.fail_read().unwrap();
    let sample = Sample::new(1.0, 2.0, 3.0);
    harness.deliver_sample(sample).unwrap();
    harness.service();

    let out = harness.take_output();
    assert_eq!(&out[..ERROR_TOKEN.len()], ERROR_TOKEN);
    assert_eq!(&out[ERROR_TOKEN.len()..], expected_output(1, &[sample]));
}

#[test]
fn test_error_tokens_interleave_in_arrival_order() {
    let mut harness = HostHarness::new(&config(1)).unwrap();
    let first = Sample::new(1.0, 2.0, 3.0);
    let second = Sample::new(4.0, 5.0, 6.0);
    harness.deliver_sample(first).unwrap();
    harness.fail_read().unwrap();
    harness.deliver_sample(second).unwrap();
    harness.fail_read().unwrap();
    harness.service();

    let reports = expected_output(1, &[first, second]);
    let mut expected = reports[..WINDOW_REPORT_BYTES].to_vec();
    expected.extend_from_slice(ERROR_TOKEN);
    expected.extend_from_slice(&reports[WINDOW_REPORT_BYTES..]);
    expected.extend_from_slice(ERROR_TOKEN);
    assert_eq!(harness.take_output(), expected);
    assert_eq!(harness.metrics().unordered_faults, 0);
}

#[test]
fn test_deep_backlog_is_not_dropped() {
    // more reports than the default send ring can hold at once
    let mut harness = HostHarness::new(&config(1)).unwrap();
    let mut samples: Vec<Sample> = (1..=20)
        .map(|i| Sample::new(i as f32, 2.0 * i as f32, -(i as f32)))
        .collect();
    samples.push(Sample::TERMINATOR);
    for sample in &samples {
        harness.deliver_sample(*sample).unwrap();
    }

    assert_eq!(harness.service(), samples.len());
    assert_eq!(harness.take_output(), expected_output(1, &samples));

    let metrics = harness.metrics();
    assert_eq!(metrics.reports_dropped, 0);
    assert_eq!(metrics.windows_reported, 20);
    assert_eq!(metrics.sessions_completed, 1);
    assert_eq!(harness.link().stats().overlapping_writes, 0);
}

#[test]
fn test_backlog_drains_without_overlapping_writes() {
    let mut harness = HostHarness::new(&config(1)).unwrap();
    let mut samples = vec![
        Sample::new(1.0, -1.0, 0.5),
        Sample::new(2.0, 4.0, -3.0),
        Sample::new(-7.5, 0.25, 9.0),
    ];
    samples.push(Sample::TERMINATOR);
    for sample in &samples {
        harness.deliver_sample(*sample).unwrap();
    }

    // every report is queued before the first write completes
    assert_eq!(harness.poll(), 4);
    assert_eq!(harness.consumer().send_state(), SendState::Sending);
    assert_eq!(harness.link().stats().writes_started, 1);

    // complete one write at a time
    while harness.complete_write().is_some() {
        assert_eq!(harness.link().stats().overlapping_writes, 0);
    }

    assert_eq!(harness.consumer().send_state(), SendState::Idle);
    assert_eq!(harness.take_output(), expected_output(1, &samples));
}

#[test]
fn test_partial_window_reports_medians_only() {
    let mut harness = HostHarness::new(&config(4)).unwrap();
    let mut samples = ramp(6);
    samples.push(Sample::TERMINATOR);
    harness.feed(samples).unwrap();

    let out = harness.take_output();
    assert_eq!(out.len(), WINDOW_REPORT_BYTES + MEDIAN_REPORT_BYTES);

    let window = WindowReport::decode(&out[..WINDOW_REPORT_BYTES]).unwrap();
    assert!((window.x.mean - 2.5).abs() < 1e-6);

    // medians cover all six samples, not just the partial window
    let medians = MedianReport::decode(&out[WINDOW_REPORT_BYTES..]).unwrap();
    assert_eq!((medians.x, medians.y, medians.z), (3.5, 3.5, 3.5));
}

#[test]
fn test_sessions_are_independent() {
    let mut harness = HostHarness::new(&config(3)).unwrap();
    let first = vec![
        Sample::new(100.0, 100.0, 100.0),
        Sample::new(200.0, 300.0, 400.0),
        Sample::TERMINATOR,
    ];
    let second = vec![
        Sample::new(1.0, 2.0, 3.0),
        Sample::new(2.0, 1.0, 1.0),
        Sample::new(3.0, 3.0, 2.0),
        Sample::TERMINATOR,
    ];

    harness.feed(first.clone()).unwrap();
    assert_eq!(harness.take_output(), expected_output(3, &first));

    harness.feed(second.clone()).unwrap();
    let out = harness.take_output();
    assert_eq!(out, expected_output(3, &second));

    let medians = MedianReport::decode(&out[WINDOW_REPORT_BYTES..]).unwrap();
    assert_eq!((medians.x, medians.y, medians.z), (2.0, 2.0, 2.0));
    assert_eq!(harness.consumer().session(), 2);
}

#[test]
fn test_wrapping_send_window() {
    // a send ring that wraps several times over the session
    let mut config = config(2);
    config.buffers.tx_capacity_bytes = tristream::config::MIN_TX_CAPACITY_BYTES;
    let mut harness = HostHarness::new(&config).unwrap();

    let mut samples: Vec<Sample> = (1..=40)
        .map(|i| Sample::new(i as f32, (i * i) as f32, -(i as f32)))
        .collect();
    samples.push(Sample::TERMINATOR);
    harness.feed(samples.clone()).unwrap();

    assert_eq!(harness.take_output(), expected_output(2, &samples));
    assert_eq!(harness.metrics().reports_dropped, 0);
}

#[test]
fn test_short_read_is_a_receive_failure() {
    let mut harness = HostHarness::new(&config(4)).unwrap();
    harness.deliver(&[1, 2, 3, 4]).unwrap();
    harness.service();
    assert_eq!(harness.take_output(), ERROR_TOKEN);
    assert_eq!(harness.metrics().samples_received, 0);
}

#[tokio::test]
async fn test_async_consumer_wakes_on_delivery() {
    let link = Arc::new(SimulatedLink::new());
    let Pipeline {
        mut receiver,
        mut completion,
        consumer,
        counters,
        ..
    } = Pipeline::new(&config(2), Arc::clone(&link)).unwrap();
    receiver.arm();

    let task = tokio::spawn(consumer.run());

    for sample in [Sample::new(1.0, 2.0, 3.0), Sample::new(2.0, 4.0, 5.0)] {
        link.take_read().unwrap();
        receiver.on_read_complete(ReadOutcome::Complete(&sample.to_le_bytes()));
    }

    tokio::time::timeout(Duration::from_secs(5), async {
        while !link.write_in_flight() {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    })
    .await
    .unwrap();

    link.complete_write().unwrap();
    completion.on_write_complete();

    assert_eq!(link.transmitted().len(), WINDOW_REPORT_BYTES);
    assert_eq!(counters.snapshot().windows_reported, 1);
    assert!(!task.is_finished());
    task.abort();
}

#[tokio::test]
async fn test_async_consumer_resumes_after_write_completion() {
    // W=1 backlog larger than the send ring; the consumer only gets further
    // once completions free space and wake it
    let link = Arc::new(SimulatedLink::new());
    let Pipeline {
        mut receiver,
        mut completion,
        consumer,
        counters,
        ..
    } = Pipeline::new(&config(1), Arc::clone(&link)).unwrap();
    receiver.arm();

    let samples: Vec<Sample> = (1..=20).map(|i| Sample::new(i as f32, 1.0, 2.0)).collect();
    for sample in &samples {
        link.take_read().unwrap();
        receiver.on_read_complete(ReadOutcome::Complete(&sample.to_le_bytes()));
    }

    let task = tokio::spawn(consumer.run());

    let total = samples.len() * WINDOW_REPORT_BYTES;
    tokio::time::timeout(Duration::from_secs(5), async {
        while link.transmitted().len() < total {
            if link.complete_write().is_some() {
                completion.on_write_complete();
            }
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    })
    .await
    .unwrap();

    assert_eq!(link.transmitted(), expected_output(1, &samples));
    assert_eq!(counters.snapshot().reports_dropped, 0);
    task.abort();
}
