//! Transport abstraction for the half-duplex byte link.
//!
//! The physical driver is an external collaborator. It only has to start operations;
//! it never blocks and never calls back into the pipeline itself. Completions are
//! delivered by the board's interrupt glue, which calls
//! [`SampleReceiver::on_read_complete`](crate::pipeline::SampleReceiver::on_read_complete)
//! and [`SendCompletion::on_write_complete`](crate::pipeline::SendCompletion::on_write_complete)
//! exactly once per started operation.
//!
//! # Contract
//!
//! - All methods return immediately and may be called from interrupt context.
//! - `start_write` must not deliver its own completion before returning.
//! - At most one read and one write are outstanding at a time; the pipeline upholds
//!   this on its side.
//!
//! # Available Implementations
//!
//! - [`simulated::SimulatedLink`] - in-memory link for hosts and tests

pub mod simulated;

pub use simulated::{LinkStats, SimulatedLink};

/// Outcome of an asynchronous read, as reported by the interrupt glue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadOutcome<'a> {
    /// The requested bytes arrived.
    Complete(&'a [u8]),
    /// The driver signalled an error instead of completion.
    Failed,
}

/// Asynchronous, fire-and-forget byte transport.
pub trait Transport: Send + Sync {
    /// Arm a read of exactly `len` bytes.
    fn start_read(&self, len: usize);

    /// Start transmitting `data`. The driver keeps its own copy for the transfer.
    fn start_write(&self, data: &[u8]);

    /// Cancel the outstanding read, if any. No completion follows.
    fn abort_read(&self);

    /// Cancel the outstanding write, if any. No completion follows.
    fn abort_write(&self);
}
