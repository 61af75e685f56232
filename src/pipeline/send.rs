//! Send window: main-context report writer and completion-context drainer.
//!
//! The send ring's producer belongs to [`ReportWriter`]. Its consumer lives in a
//! shared lane guarded by a two-state machine:
//!
//! ```text
//!            kick (CAS)                   completion, more pending
//!   Idle ─────────────────► Sending ◄───────────────────────────┐
//!    ▲                        │                                  │
//!    └────────────────────────┴──────────────────────────────────┘
//!         completion, nothing pending (then re-check and kick)
//! ```
//!
//! Whichever context wins the Idle → Sending transition owns the consumer until the
//! lane returns to Idle. Once a write is started, ownership passes to the completion
//! handler. Each write covers the contiguous run from `start` to `end` or the wrap,
//! whichever is nearer, so a transfer never crosses the wrap boundary.

use crate::data::ring_buffer::{Consumer, Producer, RingObserver};
use crate::error::StreamResult;
use crate::pipeline::{PipelineCounters, Wakeup};
use crate::transport::Transport;
use std::cell::UnsafeCell;
use std::sync::atomic::{fence, AtomicU8, AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{trace, warn};

/// State of the outbound link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SendState {
    /// No write in flight; the lane's consumer is unowned.
    Idle = 0,
    /// A write is in flight or about to be started.
    Sending = 1,
}

impl SendState {
    fn from_raw(raw: u8) -> Self {
        if raw == SendState::Sending as u8 {
            SendState::Sending
        } else {
            SendState::Idle
        }
    }
}

pub(crate) struct SendLane {
    state: AtomicU8,
    /// Length of the write in flight, zero while none has been started.
    in_flight: AtomicUsize,
    drain: UnsafeCell<Consumer<u8>>,
    pending: RingObserver<u8>,
}

// SAFETY: `drain` is only dereferenced by the context that moved `state` from Idle to
// Sending (or, after a write is started, by the completion handler that inherits it).
// The compare-exchange makes that ownership exclusive.
unsafe impl Sync for SendLane {}

impl SendLane {
    pub(crate) fn new(drain: Consumer<u8>) -> Self {
        let pending = drain.observer();
        Self {
            state: AtomicU8::new(SendState::Idle as u8),
            in_flight: AtomicUsize::new(0),
            drain: UnsafeCell::new(drain),
            pending,
        }
    }

    fn state(&self) -> SendState {
        SendState::from_raw(self.state.load(Ordering::SeqCst))
    }

    fn try_acquire(&self) -> bool {
        self.state
            .compare_exchange(
                SendState::Idle as u8,
                SendState::Sending as u8,
                Ordering::SeqCst,
                Ordering::SeqCst,
            )
            .is_ok()
    }

    fn release(&self) {
        self.state.store(SendState::Idle as u8, Ordering::SeqCst);
    }

    /// # Safety
    /// The caller must own the lane (state is Sending and this context holds it).
    #[allow(clippy::mut_from_ref)]
    unsafe fn drain(&self) -> &mut Consumer<u8> {
        &mut *self.drain.get()
    }

    /// Start a write for the next contiguous segment. Returns `false` if nothing is queued.
    ///
    /// # Safety
    /// The caller must own the lane.
    unsafe fn issue_next<T: Transport>(&self, transport: &T) -> bool {
        let drain = self.drain();
        let segment = drain.readable();
        if segment.is_empty() {
            return false;
        }

        self.in_flight.store(segment.len(), Ordering::SeqCst);
        trace!(
            start = drain.start(),
            len = segment.len(),
            "starting write"
        );
        transport.start_write(segment);
        true
    }

    /// Hand queued bytes to the transport unless a write is already under way.
    ///
    /// Safe to call from either context. The fence pairs with the one in the other
    /// context so an append and a completion going idle cannot both miss each other.
    fn kick<T: Transport>(&self, transport: &T) {
        fence(Ordering::SeqCst);
        while !self.pending.is_empty() && self.try_acquire() {
            // SAFETY: try_acquire just moved the lane to Sending for this context.
            if unsafe { self.issue_next(transport) } {
                return;
            }
            self.release();
            fence(Ordering::SeqCst);
        }
    }
}

/// Main-context side of the send window: appends encoded frames and kicks the link.
pub struct ReportWriter<T> {
    fill: Producer<u8>,
    lane: Arc<SendLane>,
    transport: Arc<T>,
    counters: Arc<PipelineCounters>,
}

impl<T: Transport> ReportWriter<T> {
    pub(crate) fn new(
        fill: Producer<u8>,
        lane: Arc<SendLane>,
        transport: Arc<T>,
        counters: Arc<PipelineCounters>,
    ) -> Self {
        Self {
            fill,
            lane,
            transport,
            counters,
        }
    }

    /// Queue `frame` for transmission and start sending if the link is idle.
    ///
    /// A frame that does not fit is dropped whole and counted.
    pub fn append(&mut self, frame: &[u8]) -> StreamResult<()> {
        if let Err(err) = self.fill.push_slice(frame) {
            self.counters.bump_reports_dropped();
            warn!(%err, len = frame.len(), "send window full, frame dropped");
            return Err(err);
        }

        self.lane.kick(&*self.transport);
        Ok(())
    }

    /// Bytes queued but not yet acknowledged by a write completion.
    pub fn pending(&self) -> usize {
        self.fill.len()
    }

    /// Bytes that can still be queued.
    pub fn free(&self) -> usize {
        self.fill.free()
    }

    /// Current state of the outbound link.
    pub fn state(&self) -> SendState {
        self.lane.state()
    }
}

/// Completion-context side of the send window.
pub struct SendCompletion<T> {
    lane: Arc<SendLane>,
    transport: Arc<T>,
    wakeup: Arc<Wakeup>,
    counters: Arc<PipelineCounters>,
}

impl<T: Transport> SendCompletion<T> {
    pub(crate) fn new(
        lane: Arc<SendLane>,
        transport: Arc<T>,
        wakeup: Arc<Wakeup>,
        counters: Arc<PipelineCounters>,
    ) -> Self {
        Self {
            lane,
            transport,
            wakeup,
            counters,
        }
    }

    /// Handle a write-complete notification.
    ///
    /// Releases the transmitted bytes and wakes the main context, which may be holding
    /// samples back until the send ring has room. Then either chains the next segment or
    /// returns the lane to Idle and re-checks for bytes appended in the meantime.
    pub fn on_write_complete(&mut self) {
        let sent = self.lane.in_flight.swap(0, Ordering::SeqCst);
        if self.lane.state() != SendState::Sending || sent == 0 {
            warn!("write completion with no write in flight");
            return;
        }

        // SAFETY: a write was in flight, so ownership of the lane passed to this handler.
        let drain = unsafe { self.lane.drain() };
        if let Err(err) = drain.advance_start(sent) {
            warn!(%err, "write completion larger than queued data");
        }
        self.counters.add_bytes_transmitted(sent);
        self.wakeup.signal();

        // SAFETY: still owned, see above.
        if unsafe { self.lane.issue_next(&*self.transport) } {
            return;
        }

        trace!("send window drained");
        self.lane.release();
        self.lane.kick(&*self.transport);
    }

    /// Cancel the write in flight and discard everything queued.
    ///
    /// Must be called from the completion context. Does nothing while the main context
    /// is between winning the lane and starting its write.
    pub fn abort(&mut self) {
        self.transport.abort_write();
        if self.lane.state() != SendState::Sending
            || self.lane.in_flight.swap(0, Ordering::SeqCst) == 0
        {
            return;
        }

        // SAFETY: a write had been started, so this handler owned the lane.
        let drain = unsafe { self.lane.drain() };
        drain.clear();
        self.lane.release();
        warn!("send window aborted");
    }

    /// Current state of the outbound link.
    pub fn state(&self) -> SendState {
        self.lane.state()
    }
}
