//! In-memory link for running the pipeline without hardware.
//!
//! `SimulatedLink` records what the pipeline asks of the transport and lets the caller
//! play the role of the hardware: it can see which read is armed, finish the
//! in-flight write, and inspect every byte transmitted so far. It also counts
//! contract violations, such as a second write started while one is in flight, so
//! tests can assert the pipeline never commits them.

use super::Transport;
use parking_lot::Mutex;
use serde::Serialize;
use tracing::trace;

/// Counters describing how the pipeline drove the link.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LinkStats {
    pub reads_armed: u64,
    pub writes_started: u64,
    pub writes_completed: u64,
    pub aborted_reads: u64,
    pub aborted_writes: u64,
    /// `start_write` while a write was already in flight.
    pub overlapping_writes: u64,
    /// `start_read` while a read was already armed.
    pub overlapping_reads: u64,
}

#[derive(Debug, Default)]
struct LinkState {
    armed_read: Option<usize>,
    in_flight: Option<Vec<u8>>,
    transmitted: Vec<u8>,
    stats: LinkStats,
}

/// Transport double that buffers writes and exposes the armed read.
#[derive(Debug, Default)]
pub struct SimulatedLink {
    state: Mutex<LinkState>,
}

impl SimulatedLink {
    /// Idle link with nothing armed or transmitted.
    pub fn new() -> Self {
        Self::default()
    }

    /// Length of the currently armed read, if any.
    pub fn armed_read(&self) -> Option<usize> {
        self.state.lock().armed_read
    }

    /// Consume the armed read, as the hardware does when it fires the completion.
    pub fn take_read(&self) -> Option<usize> {
        self.state.lock().armed_read.take()
    }

    /// Whether a write is waiting for its completion.
    pub fn write_in_flight(&self) -> bool {
        self.state.lock().in_flight.is_some()
    }

    /// Finish the in-flight write, moving its bytes onto the wire.
    ///
    /// Returns the number of bytes transmitted, or `None` when the link was idle.
    /// The caller is responsible for delivering the completion afterwards.
    pub fn complete_write(&self) -> Option<usize> {
        let mut state = self.state.lock();
        let data = state.in_flight.take()?;
        let len = data.len();
        state.transmitted.extend_from_slice(&data);
        state.stats.writes_completed += 1;
        Some(len)
    }

    /// Every byte transmitted so far.
    pub fn transmitted(&self) -> Vec<u8> {
        self.state.lock().transmitted.clone()
    }

    /// Every byte transmitted since the last call.
    pub fn take_transmitted(&self) -> Vec<u8> {
        std::mem::take(&mut self.state.lock().transmitted)
    }

    /// Snapshot of the link counters.
    pub fn stats(&self) -> LinkStats {
        self.state.lock().stats
    }
}

impl Transport for SimulatedLink {
    fn start_read(&self, len: usize) {
        let mut state = self.state.lock();
        if state.armed_read.is_some() {
            state.stats.overlapping_reads += 1;
        }
        state.armed_read = Some(len);
        state.stats.reads_armed += 1;
    }

    fn start_write(&self, data: &[u8]) {
        let mut state = self.state.lock();
        if state.in_flight.is_some() {
            state.stats.overlapping_writes += 1;
        }
        trace!(len = data.len(), "simulated write started");
        state.in_flight = Some(data.to_vec());
        state.stats.writes_started += 1;
    }

    fn abort_read(&self) {
        let mut state = self.state.lock();
        if state.armed_read.take().is_some() {
            state.stats.aborted_reads += 1;
        }
    }

    fn abort_write(&self) {
        let mut state = self.state.lock();
        if state.in_flight.take().is_some() {
            state.stats.aborted_writes += 1;
        }
    }
}
