//! The receive → statistics → send pipeline.
//!
//! [`Pipeline::new`] builds both rings and splits them across the two execution
//! contexts:
//!
//! - **Interrupt / completion context**: [`SampleReceiver`] (receive `end`) and
//!   [`SendCompletion`] (send `start`, while it owns the lane).
//! - **Main context**: [`StatsConsumer`] (receive `start`, statistics, and the
//!   [`ReportWriter`] holding send `end`).
//!
//! The contexts share only the rings, the send lane, a [`Wakeup`] and the
//! [`PipelineCounters`].

pub mod consumer;
pub mod host;
pub mod receive;
pub mod send;

pub use consumer::StatsConsumer;
pub use host::HostHarness;
pub use receive::SampleReceiver;
pub use send::{ReportWriter, SendCompletion, SendState};

use crate::config::StreamConfig;
use crate::data::ring_buffer::RingBuffer;
use crate::error::{StreamError, StreamResult};
use crate::stats::GlobalStats;
use crate::transport::Transport;
use send::SendLane;
use serde::Serialize;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;
use tracing::info;

/// Main-context idle/wake primitive.
///
/// `signal` never blocks and may be called from interrupt context. A signal sent
/// while the main context is busy is remembered, so the next `wait` returns at once.
#[derive(Debug, Default)]
pub struct Wakeup {
    notify: Notify,
}

impl Wakeup {
    /// Wakeup with no pending signal.
    pub fn new() -> Self {
        Self::default()
    }

    /// Wake the main context, or arm the next `wait` if it is busy.
    pub fn signal(&self) {
        self.notify.notify_one();
    }

    /// Idle until the next signal.
    pub async fn wait(&self) {
        self.notify.notified().await;
    }
}

/// Event counters shared by both contexts.
#[derive(Debug, Default)]
pub struct PipelineCounters {
    samples_received: AtomicU64,
    rx_faults: AtomicU64,
    rx_overruns: AtomicU64,
    unordered_faults: AtomicU64,
    samples_processed: AtomicU64,
    windows_reported: AtomicU64,
    sessions_completed: AtomicU64,
    reports_dropped: AtomicU64,
    error_tokens_sent: AtomicU64,
    bytes_transmitted: AtomicU64,
}

/// Point-in-time copy of [`PipelineCounters`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PipelineMetrics {
    /// Samples stored in the receive ring.
    pub samples_received: u64,
    /// Failed or short reads.
    pub rx_faults: u64,
    /// Samples dropped because the receive ring was full.
    pub rx_overruns: u64,
    /// Faults whose stream position was lost; their tokens go out late.
    pub unordered_faults: u64,
    /// Samples taken by the consumer, terminators included.
    pub samples_processed: u64,
    pub windows_reported: u64,
    pub sessions_completed: u64,
    /// Frames that did not fit in the send ring.
    pub reports_dropped: u64,
    pub error_tokens_sent: u64,
    /// Bytes acknowledged by write completions.
    pub bytes_transmitted: u64,
}

impl PipelineCounters {
    /// Copy every counter.
    pub fn snapshot(&self) -> PipelineMetrics {
        PipelineMetrics {
            samples_received: self.samples_received.load(Ordering::Relaxed),
            rx_faults: self.rx_faults(),
            rx_overruns: self.rx_overruns.load(Ordering::Relaxed),
            unordered_faults: self.unordered_faults(),
            samples_processed: self.samples_processed.load(Ordering::Relaxed),
            windows_reported: self.windows_reported.load(Ordering::Relaxed),
            sessions_completed: self.sessions_completed.load(Ordering::Relaxed),
            reports_dropped: self.reports_dropped.load(Ordering::Relaxed),
            error_tokens_sent: self.error_tokens_sent.load(Ordering::Relaxed),
            bytes_transmitted: self.bytes_transmitted.load(Ordering::Relaxed),
        }
    }

    /// Receive failures so far.
    pub fn rx_faults(&self) -> u64 {
        self.rx_faults.load(Ordering::Relaxed)
    }

    /// Faults that could not be queued with their position. The consumer compares
    /// this against the late tokens it sent.
    pub fn unordered_faults(&self) -> u64 {
        self.unordered_faults.load(Ordering::Acquire)
    }

    pub(crate) fn bump_rx_faults(&self) {
        self.rx_faults.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn bump_unordered_faults(&self) {
        self.unordered_faults.fetch_add(1, Ordering::Release);
    }

    pub(crate) fn bump_samples_received(&self) {
        self.samples_received.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn bump_rx_overruns(&self) {
        self.rx_overruns.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn bump_samples_processed(&self) {
        self.samples_processed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn bump_windows_reported(&self) {
        self.windows_reported.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn bump_sessions_completed(&self) {
        self.sessions_completed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn bump_reports_dropped(&self) {
        self.reports_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn bump_error_tokens_sent(&self) {
        self.error_tokens_sent.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn add_bytes_transmitted(&self, n: usize) {
        self.bytes_transmitted.fetch_add(n as u64, Ordering::Relaxed);
    }
}

/// Every handler of one pipeline, ready to be handed to its context.
pub struct Pipeline<T> {
    /// Read-complete handler, for the interrupt context.
    pub receiver: SampleReceiver<T>,
    /// Write-complete handler, for the interrupt context.
    pub completion: SendCompletion<T>,
    /// Statistics loop, for the main context.
    pub consumer: StatsConsumer<T>,
    /// Signalled by both completion handlers.
    pub wakeup: Arc<Wakeup>,
    /// Shared event counters.
    pub counters: Arc<PipelineCounters>,
}

impl<T: Transport> Pipeline<T> {
    /// Build rings, statistics and handlers from a validated configuration.
    ///
    /// The read is not armed yet; call [`SampleReceiver::arm`] once the completion
    /// handlers are installed.
    pub fn new(config: &StreamConfig, transport: Arc<T>) -> StreamResult<Self> {
        config.validate().map_err(StreamError::Configuration)?;
        let window = NonZeroUsize::new(config.stats.window_size)
            .ok_or_else(|| StreamError::Configuration("window_size must be > 0".into()))?;

        let (rx_fill, rx_drain) =
            RingBuffer::<u8>::new(config.buffers.rx_capacity_bytes())?.split();
        let (tx_fill, tx_drain) = RingBuffer::<u8>::new(config.buffers.tx_capacity_bytes)?.split();
        let (fault_marks, fault_queue) =
            RingBuffer::<u64>::new(config.buffers.rx_capacity_samples)?.split();

        let wakeup = Arc::new(Wakeup::new());
        let counters = Arc::new(PipelineCounters::default());
        let lane = Arc::new(SendLane::new(tx_drain));

        let receiver = SampleReceiver::new(
            rx_fill,
            fault_marks,
            Arc::clone(&transport),
            Arc::clone(&wakeup),
            Arc::clone(&counters),
        );
        let completion = SendCompletion::new(
            Arc::clone(&lane),
            Arc::clone(&transport),
            Arc::clone(&wakeup),
            Arc::clone(&counters),
        );
        let writer = ReportWriter::new(tx_fill, lane, transport, Arc::clone(&counters));
        let consumer = StatsConsumer::new(
            rx_drain,
            fault_queue,
            GlobalStats::new(window),
            writer,
            Arc::clone(&wakeup),
            Arc::clone(&counters),
        );

        info!(
            window = window.get(),
            rx_capacity_bytes = config.buffers.rx_capacity_bytes(),
            tx_capacity_bytes = config.buffers.tx_capacity_bytes,
            "pipeline built"
        );

        Ok(Self {
            receiver,
            completion,
            consumer,
            wakeup,
            counters,
        })
    }

    /// Snapshot of the shared counters.
    pub fn metrics(&self) -> PipelineMetrics {
        self.counters.snapshot()
    }
}
