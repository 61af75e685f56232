//! Receive window: interrupt-context producer of inbound sample bytes.

use crate::data::ring_buffer::Producer;
use crate::pipeline::{PipelineCounters, Wakeup};
use crate::protocol::SAMPLE_BYTES;
use crate::transport::{ReadOutcome, Transport};
use std::sync::Arc;
use tracing::{trace, warn};

/// Owns the `end` index of the receive ring and of the fault-mark queue.
///
/// Every read-complete notification is handled the same way: store the frame (or
/// record the failure), re-arm the next read, wake the main context. Nothing here
/// blocks or allocates.
///
/// A failure is recorded as a mark holding the number of samples stored before it,
/// so the consumer can send the error token at the same point in the stream.
pub struct SampleReceiver<T> {
    ring: Producer<u8>,
    faults: Producer<u64>,
    stored: u64,
    transport: Arc<T>,
    wakeup: Arc<Wakeup>,
    counters: Arc<PipelineCounters>,
}

impl<T: Transport> SampleReceiver<T> {
    pub(crate) fn new(
        ring: Producer<u8>,
        faults: Producer<u64>,
        transport: Arc<T>,
        wakeup: Arc<Wakeup>,
        counters: Arc<PipelineCounters>,
    ) -> Self {
        Self {
            ring,
            faults,
            stored: 0,
            transport,
            wakeup,
            counters,
        }
    }

    /// Arm a read of one sample.
    pub fn arm(&self) {
        self.transport.start_read(SAMPLE_BYTES);
    }

    /// Read-complete handler.
    pub fn on_read_complete(&mut self, outcome: ReadOutcome<'_>) {
        match outcome {
            ReadOutcome::Complete(frame) if frame.len() == SAMPLE_BYTES => {
                match self.ring.push_slice(frame) {
                    Ok(()) => {
                        self.stored += 1;
                        self.counters.bump_samples_received();
                        trace!(end = self.ring.end(), "sample received");
                    }
                    Err(err) => {
                        self.counters.bump_rx_overruns();
                        warn!(%err, "receive window overrun, sample dropped");
                    }
                }
            }
            ReadOutcome::Complete(frame) => {
                warn!(
                    expected = SAMPLE_BYTES,
                    actual = frame.len(),
                    "short read treated as receive failure"
                );
                self.record_fault();
            }
            ReadOutcome::Failed => {
                trace!(after = self.stored, "receive failed");
                self.record_fault();
            }
        }

        self.arm();
        self.wakeup.signal();
    }

    fn record_fault(&mut self) {
        self.counters.bump_rx_faults();
        if self.faults.push_slice(&[self.stored]).is_err() {
            // still reported, but after the samples already pending
            self.counters.bump_unordered_faults();
            warn!("fault queue full, error token may be delayed");
        }
    }

    /// Cancel the outstanding read. Used by an external reset; no completion follows.
    pub fn abort(&mut self) {
        self.transport.abort_read();
    }

    /// Whole samples stored and not yet consumed.
    pub fn pending_samples(&self) -> usize {
        self.ring.len() / SAMPLE_BYTES
    }
}
