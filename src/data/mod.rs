//! Shared buffering between the interrupt and main contexts.
pub mod ring_buffer;

pub use ring_buffer::{Consumer, Producer, RingBuffer, RingObserver};
