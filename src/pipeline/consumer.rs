//! Main-context consumer: drains samples, runs the statistics, emits reports.

use crate::data::ring_buffer::Consumer;
use crate::pipeline::send::{ReportWriter, SendState};
use crate::pipeline::{PipelineCounters, Wakeup};
use crate::protocol::{Sample, ERROR_TOKEN, REPORT_HEADROOM_BYTES, SAMPLE_BYTES};
use crate::stats::GlobalStats;
use crate::transport::Transport;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Owns the `start` index of the receive ring and of the fault-mark queue, plus the
/// session statistics.
///
/// Work is only taken while the send ring has [`REPORT_HEADROOM_BYTES`] free, so a
/// sample or fault never produces output that cannot be queued. Anything left over
/// stays in the receive ring until a write completion frees space and signals.
pub struct StatsConsumer<T> {
    samples: Consumer<u8>,
    faults: Consumer<u64>,
    stats: GlobalStats,
    reports: ReportWriter<T>,
    wakeup: Arc<Wakeup>,
    counters: Arc<PipelineCounters>,
    consumed: u64,
    unordered_reported: u64,
    session: u64,
}

impl<T: Transport> StatsConsumer<T> {
    pub(crate) fn new(
        samples: Consumer<u8>,
        faults: Consumer<u64>,
        stats: GlobalStats,
        reports: ReportWriter<T>,
        wakeup: Arc<Wakeup>,
        counters: Arc<PipelineCounters>,
    ) -> Self {
        Self {
            samples,
            faults,
            stats,
            reports,
            wakeup,
            counters,
            consumed: 0,
            unordered_reported: 0,
            session: 0,
        }
    }

    /// Process pending samples and receive failures in arrival order, for as long as
    /// the send ring has room for what they may produce. Returns the number of
    /// samples processed.
    pub fn poll(&mut self) -> usize {
        let mut processed = 0;
        let mut frame = [0u8; SAMPLE_BYTES];
        while self.has_headroom() {
            if self.next_fault_due() {
                if self.faults.advance_start(1).is_err() {
                    break;
                }
                self.send_error_token();
            } else if self.samples.len() >= SAMPLE_BYTES {
                if self.samples.pop_slice(&mut frame).is_err() {
                    break;
                }
                self.consumed += 1;
                self.process(Sample::from_le_bytes(&frame));
                processed += 1;
            } else {
                break;
            }
        }

        // faults that lost their position go out once everything before them has
        while self.has_headroom() && self.unordered_reported < self.counters.unordered_faults() {
            self.unordered_reported += 1;
            self.send_error_token();
        }
        processed
    }

    /// Main loop: poll, then idle until an interrupt handler signals. Never returns.
    pub async fn run(mut self) {
        info!(window = self.stats.window(), "stats consumer running");
        loop {
            self.poll();
            self.wakeup.wait().await;
        }
    }

    fn has_headroom(&self) -> bool {
        self.reports.free() >= REPORT_HEADROOM_BYTES
    }

    /// A fault mark records how many samples were stored before the failure.
    fn next_fault_due(&self) -> bool {
        match self.faults.readable().first() {
            Some(&position) => position <= self.consumed,
            None => false,
        }
    }

    fn send_error_token(&mut self) {
        if self.reports.append(ERROR_TOKEN).is_ok() {
            self.counters.bump_error_tokens_sent();
        }
    }

    fn process(&mut self, sample: Sample) {
        self.counters.bump_samples_processed();
        if sample.is_terminator() {
            self.finish_session();
            return;
        }

        if self.stats.push_sample(&sample) {
            let report = self.stats.window_report();
            if self.reports.append(&report.to_le_bytes()).is_ok() {
                self.counters.bump_windows_reported();
            }
            debug!(
                session = self.session,
                mean_x = report.x.mean,
                mean_y = report.y.mean,
                mean_z = report.z.mean,
                "window complete"
            );
        }
    }

    fn finish_session(&mut self) {
        let medians = self.stats.median_report();
        if let Err(err) = self.reports.append(&medians.to_le_bytes()) {
            warn!(%err, session = self.session, "median report not queued");
        }
        info!(
            session = self.session,
            samples = self.stats.x().median_count(),
            median_x = medians.x,
            median_y = medians.y,
            median_z = medians.z,
            "session complete"
        );

        self.stats.reset();
        self.counters.bump_sessions_completed();
        self.session += 1;
    }

    /// Statistics of the current session.
    pub fn stats(&self) -> &GlobalStats {
        &self.stats
    }

    /// Sessions finished so far.
    pub fn session(&self) -> u64 {
        self.session
    }

    /// State of the outbound link.
    pub fn send_state(&self) -> SendState {
        self.reports.state()
    }

    /// Report bytes queued and not yet acknowledged.
    pub fn pending_output(&self) -> usize {
        self.reports.pending()
    }
}
