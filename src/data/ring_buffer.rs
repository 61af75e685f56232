//! Lock-free single-producer/single-consumer ring buffer.
//!
//! This module implements the index-pair ring buffer shared between an interrupt
//! context and the cooperative main context. Ownership of the two indices is carried
//! by the handle types rather than by convention:
//!
//! - [`Producer`] is the only writer of `end`. It writes slots in the vacant region and
//!   publishes them by storing the new `end`.
//! - [`Consumer`] is the only writer of `start`. It reads slots in the occupied region
//!   and releases them by storing the new `start`.
//! - [`RingObserver`] can read both indices but write neither.
//!
//! # Memory Layout
//! ```text
//! slots: [T; capacity]
//!
//!   start ──► occupied ... occupied ──► end ──► vacant ... vacant (1 slot reserved)
//!
//! Empty:  start == end
//! Full:   (end + 1) % capacity == start
//! ```
//!
//! One slot always stays vacant so that equal indices can only mean "empty".
//!
//! # Ordering
//! Data is written before `end` is published (Release) and the consumer loads `end`
//! (Acquire) before touching the slots. Symmetrically the consumer finishes reading
//! before publishing `start` (Release) and the producer loads `start` (Acquire) before
//! reusing a slot.

use crate::error::{StreamError, StreamResult};
use std::cell::UnsafeCell;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Backing storage and the two indices, shared by both handles.
struct Shared<T> {
    slots: Box<[UnsafeCell<T>]>,

    /// Oldest occupied slot. Written only through `Consumer`.
    start: AtomicUsize,

    /// First vacant slot. Written only through `Producer`.
    end: AtomicUsize,
}

// SAFETY: The producer only touches slots in [end, start - 1) and the consumer only
// touches slots in [start, end). The regions are disjoint and an index is published
// only after the accesses it guards are complete, so concurrent use from two contexts
// never aliases a slot.
unsafe impl<T: Send> Sync for Shared<T> {}

impl<T> Shared<T> {
    fn capacity(&self) -> usize {
        self.slots.len()
    }

    fn occupied(&self, start: usize, end: usize) -> usize {
        (end + self.capacity() - start) % self.capacity()
    }

    /// Raw pointer to the first slot.
    ///
    /// `UnsafeCell<T>` is `repr(transparent)`, so the slot array can be addressed as `[T]`.
    fn base(&self) -> *mut T {
        self.slots.as_ptr() as *mut T
    }
}

/// Fixed-capacity ring buffer, split into its two handles before use.
///
/// # Example
/// ```
/// use tristream::data::ring_buffer::RingBuffer;
///
/// let (mut producer, mut consumer) = RingBuffer::<u8>::new(8).unwrap().split();
/// producer.push_slice(b"abc").unwrap();
///
/// let mut out = [0u8; 3];
/// consumer.pop_slice(&mut out).unwrap();
/// assert_eq!(&out, b"abc");
/// assert!(consumer.is_empty());
/// ```
pub struct RingBuffer<T> {
    shared: Arc<Shared<T>>,
}

impl<T: Copy + Default> RingBuffer<T> {
    /// Allocate a ring with `capacity` slots, `capacity - 1` of which are usable.
    pub fn new(capacity: usize) -> StreamResult<Self> {
        if capacity < 2 {
            return Err(StreamError::InvalidCapacity(capacity));
        }

        let slots = (0..capacity)
            .map(|_| UnsafeCell::new(T::default()))
            .collect::<Vec<_>>()
            .into_boxed_slice();

        Ok(Self {
            shared: Arc::new(Shared {
                slots,
                start: AtomicUsize::new(0),
                end: AtomicUsize::new(0),
            }),
        })
    }

    /// Split into the producer and consumer handles.
    ///
    /// Consuming `self` guarantees exactly one handle of each kind exists.
    pub fn split(self) -> (Producer<T>, Consumer<T>) {
        (
            Producer {
                shared: Arc::clone(&self.shared),
            },
            Consumer {
                shared: self.shared,
            },
        )
    }
}

/// Writing half of a ring buffer. Owns `end`.
pub struct Producer<T> {
    shared: Arc<Shared<T>>,
}

impl<T: Copy> Producer<T> {
    /// Total number of slots, including the reserved one.
    pub fn capacity(&self) -> usize {
        self.shared.capacity()
    }

    /// Current `end` index.
    pub fn end(&self) -> usize {
        self.shared.end.load(Ordering::Relaxed)
    }

    /// Number of occupied slots as seen from the producer side.
    pub fn len(&self) -> usize {
        let start = self.shared.start.load(Ordering::Acquire);
        self.shared.occupied(start, self.end())
    }

    /// Whether the consumer has caught up with everything published so far.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of slots that can still be written.
    pub fn free(&self) -> usize {
        self.capacity() - 1 - self.len()
    }

    /// A read-only view of the indices.
    pub fn observer(&self) -> RingObserver<T> {
        RingObserver {
            shared: Arc::clone(&self.shared),
        }
    }

    /// Length of the vacant run starting at `end` that does not cross the wrap.
    fn contiguous_free(&self) -> usize {
        let start = self.shared.start.load(Ordering::Acquire);
        let end = self.end();
        let limit = if start > end {
            start - 1
        } else if start == 0 {
            self.capacity() - 1
        } else {
            self.capacity()
        };
        limit - end
    }

    /// The vacant slots starting at `end`, up to the wrap or the reserved slot.
    ///
    /// Writes become visible to the consumer only after [`Producer::advance_end`].
    pub fn writable(&mut self) -> &mut [T] {
        let len = self.contiguous_free();
        let end = self.end();
        // SAFETY: [end, end + len) lies inside the vacant region, which the consumer
        // never reads, and `&mut self` prevents a second live slice on this side.
        unsafe { std::slice::from_raw_parts_mut(self.shared.base().add(end), len) }
    }

    /// Publish `n` slots previously filled through [`Producer::writable`].
    pub fn advance_end(&mut self, n: usize) -> StreamResult<()> {
        let contiguous = self.contiguous_free();
        if n > contiguous {
            return Err(StreamError::Overrun {
                requested: n,
                free: contiguous,
            });
        }

        let next = (self.end() + n) % self.capacity();
        self.shared.end.store(next, Ordering::Release);
        Ok(())
    }

    /// Copy `items` in at `end`, wrapping as needed, and publish them in one store.
    ///
    /// Nothing is written when the items do not fit.
    pub fn push_slice(&mut self, items: &[T]) -> StreamResult<()> {
        let free = self.free();
        if items.len() > free {
            return Err(StreamError::Overrun {
                requested: items.len(),
                free,
            });
        }

        let capacity = self.capacity();
        let end = self.end();
        let first = items.len().min(capacity - end);
        // SAFETY: items.len() <= free, so both runs fall inside the vacant region.
        unsafe {
            let base = self.shared.base();
            std::ptr::copy_nonoverlapping(items.as_ptr(), base.add(end), first);
            std::ptr::copy_nonoverlapping(
                items.as_ptr().add(first),
                base,
                items.len() - first,
            );
        }

        self.shared
            .end
            .store((end + items.len()) % capacity, Ordering::Release);
        Ok(())
    }
}

/// Reading half of a ring buffer. Owns `start`.
pub struct Consumer<T> {
    shared: Arc<Shared<T>>,
}

impl<T: Copy> Consumer<T> {
    /// Total number of slots, including the reserved one.
    pub fn capacity(&self) -> usize {
        self.shared.capacity()
    }

    /// Current `start` index.
    pub fn start(&self) -> usize {
        self.shared.start.load(Ordering::Relaxed)
    }

    /// Number of published, unconsumed slots.
    pub fn len(&self) -> usize {
        let end = self.shared.end.load(Ordering::Acquire);
        self.shared.occupied(self.start(), end)
    }

    /// Whether `start == end`.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// A read-only view of the indices.
    pub fn observer(&self) -> RingObserver<T> {
        RingObserver {
            shared: Arc::clone(&self.shared),
        }
    }

    /// The occupied slots starting at `start`, up to `end` or the wrap, whichever is nearer.
    pub fn readable(&self) -> &[T] {
        let end = self.shared.end.load(Ordering::Acquire);
        let start = self.start();
        let stop = if end >= start { end } else { self.capacity() };
        // SAFETY: [start, stop) is published and the producer will not reuse it until
        // `start` moves, which needs `&mut self` and so outlives this borrow.
        unsafe { std::slice::from_raw_parts(self.shared.base().add(start), stop - start) }
    }

    /// Release `n` slots back to the producer.
    pub fn advance_start(&mut self, n: usize) -> StreamResult<()> {
        let available = self.len();
        if n > available {
            return Err(StreamError::Underrun {
                requested: n,
                available,
            });
        }

        let next = (self.start() + n) % self.capacity();
        self.shared.start.store(next, Ordering::Release);
        Ok(())
    }

    /// Copy `out.len()` slots out from `start`, wrapping as needed, then release them.
    pub fn pop_slice(&mut self, out: &mut [T]) -> StreamResult<()> {
        let available = self.len();
        if out.len() > available {
            return Err(StreamError::Underrun {
                requested: out.len(),
                available,
            });
        }

        let capacity = self.capacity();
        let start = self.start();
        let first = out.len().min(capacity - start);
        // SAFETY: out.len() <= available, so both runs fall inside the occupied region.
        unsafe {
            let base = self.shared.base();
            std::ptr::copy_nonoverlapping(base.add(start), out.as_mut_ptr(), first);
            std::ptr::copy_nonoverlapping(base, out.as_mut_ptr().add(first), out.len() - first);
        }

        self.shared
            .start
            .store((start + out.len()) % capacity, Ordering::Release);
        Ok(())
    }

    /// Drop everything currently published.
    pub fn clear(&mut self) {
        let end = self.shared.end.load(Ordering::Acquire);
        self.shared.start.store(end, Ordering::Release);
    }
}

/// Read-only view of a ring's indices, usable from either context.
pub struct RingObserver<T> {
    shared: Arc<Shared<T>>,
}

impl<T> Clone for RingObserver<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T> RingObserver<T> {
    /// Number of published, unconsumed slots.
    pub fn len(&self) -> usize {
        let start = self.shared.start.load(Ordering::Acquire);
        let end = self.shared.end.load(Ordering::Acquire);
        self.shared.occupied(start, end)
    }

    /// Whether `start == end`.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Total number of slots, including the reserved one.
    pub fn capacity(&self) -> usize {
        self.shared.capacity()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::thread;

    #[test]
    fn test_create_ring_buffer() {
        let (producer, consumer) = RingBuffer::<u8>::new(16).unwrap().split();
        assert_eq!(producer.capacity(), 16);
        assert_eq!(producer.free(), 15);
        assert_eq!(producer.end(), 0);
        assert_eq!(consumer.start(), 0);
        assert!(consumer.is_empty());
    }

    #[test]
    fn test_capacity_too_small() {
        assert!(matches!(
            RingBuffer::<u8>::new(1),
            Err(StreamError::InvalidCapacity(1))
        ));
    }

    #[test]
    fn test_write_and_read() {
        let (mut producer, mut consumer) = RingBuffer::<u8>::new(32).unwrap().split();
        producer.push_slice(b"Hello, ring!").unwrap();
        assert_eq!(consumer.len(), 12);

        let mut out = [0u8; 12];
        consumer.pop_slice(&mut out).unwrap();
        assert_eq!(&out, b"Hello, ring!");
        assert!(producer.is_empty());
    }

    #[test]
    fn test_circular_wrap() {
        let (mut producer, mut consumer) = RingBuffer::<u8>::new(10).unwrap().split();
        let mut out = [0u8; 6];

        producer.push_slice(&[1, 2, 3, 4, 5, 6]).unwrap();
        consumer.pop_slice(&mut out).unwrap();

        // end sits at 6, so this write wraps after four bytes
        producer.push_slice(&[7, 8, 9, 10, 11, 12]).unwrap();
        assert_eq!(producer.end(), 2);
        assert_eq!(consumer.readable(), &[7, 8, 9, 10]);

        consumer.pop_slice(&mut out).unwrap();
        assert_eq!(out, [7, 8, 9, 10, 11, 12]);
        assert!(consumer.is_empty());
    }

    #[test]
    fn test_full_is_not_empty() {
        let (mut producer, consumer) = RingBuffer::<u8>::new(4).unwrap().split();
        producer.push_slice(&[1, 2, 3]).unwrap();
        assert_eq!(producer.free(), 0);
        assert_eq!(consumer.len(), 3);
        assert_ne!(producer.end(), consumer.start());
    }

    #[test]
    fn test_data_too_large() {
        let (mut producer, consumer) = RingBuffer::<u8>::new(8).unwrap().split();
        let result = producer.push_slice(&[0u8; 8]);
        assert!(matches!(
            result,
            Err(StreamError::Overrun {
                requested: 8,
                free: 7
            })
        ));
        // a rejected write leaves nothing behind
        assert!(consumer.is_empty());
    }

    #[test]
    fn test_underrun() {
        let (mut producer, mut consumer) = RingBuffer::<u8>::new(8).unwrap().split();
        producer.push_slice(&[1, 2]).unwrap();
        let mut out = [0u8; 3];
        assert!(matches!(
            consumer.pop_slice(&mut out),
            Err(StreamError::Underrun {
                requested: 3,
                available: 2
            })
        ));
        assert!(consumer.advance_start(3).is_err());
        assert_eq!(consumer.len(), 2);
    }

    #[test]
    fn test_writable_stops_at_wrap_and_reserved_slot() {
        let (mut producer, mut consumer) = RingBuffer::<u8>::new(8).unwrap().split();
        assert_eq!(producer.writable().len(), 7);

        producer.push_slice(&[0; 5]).unwrap();
        consumer.advance_start(3).unwrap();
        // end = 5, start = 3: vacant run reaches the physical end of storage
        assert_eq!(producer.writable().len(), 3);

        producer.writable().copy_from_slice(&[7, 7, 7]);
        producer.advance_end(3).unwrap();
        assert_eq!(producer.end(), 0);
        // start = 3: only slots 0 and 1 remain before the reserved slot
        assert_eq!(producer.writable().len(), 2);
        assert!(producer.advance_end(3).is_err());
    }

    #[test]
    fn test_readable_stops_at_wrap() {
        let (mut producer, mut consumer) = RingBuffer::<u32>::new(6).unwrap().split();
        producer.push_slice(&[1, 2, 3, 4]).unwrap();
        consumer.advance_start(4).unwrap();
        producer.push_slice(&[5, 6, 7]).unwrap();

        assert_eq!(consumer.readable(), &[5, 6]);
        consumer.advance_start(2).unwrap();
        assert_eq!(consumer.readable(), &[7]);
    }

    #[test]
    fn test_clear_releases_everything() {
        let (mut producer, mut consumer) = RingBuffer::<u8>::new(8).unwrap().split();
        producer.push_slice(&[1, 2, 3]).unwrap();
        consumer.clear();
        assert!(consumer.is_empty());
        assert_eq!(producer.free(), 7);
    }

    #[test]
    fn test_observer_tracks_both_sides() {
        let (mut producer, mut consumer) = RingBuffer::<u8>::new(8).unwrap().split();
        let observer = producer.observer();
        producer.push_slice(&[1, 2, 3]).unwrap();
        assert_eq!(observer.len(), 3);
        consumer.advance_start(1).unwrap();
        assert_eq!(observer.clone().len(), 2);
        assert_eq!(observer.capacity(), 8);
    }

    #[test]
    fn test_concurrent_write_read() {
        let (mut producer, mut consumer) = RingBuffer::<u32>::new(64).unwrap().split();
        const COUNT: u32 = 100_000;

        let writer = thread::spawn(move || {
            let mut next = 0;
            while next < COUNT {
                if producer.push_slice(&[next]).is_ok() {
                    next += 1;
                } else {
                    thread::yield_now();
                }
            }
        });

        let reader = thread::spawn(move || {
            let mut expected = 0;
            let mut value = [0u32; 1];
            while expected < COUNT {
                if consumer.pop_slice(&mut value).is_ok() {
                    assert_eq!(value[0], expected);
                    expected += 1;
                } else {
                    thread::yield_now();
                }
            }
        });

        writer.join().unwrap();
        reader.join().unwrap();
    }

    proptest! {
        #[test]
        fn prop_fifo_round_trip(
            chunks in proptest::collection::vec(proptest::collection::vec(any::<u8>(), 0..12), 0..40),
            capacity in 24usize..64,
        ) {
            let (mut producer, mut consumer) = RingBuffer::<u8>::new(capacity).unwrap().split();
            let mut expected = Vec::new();
            let mut received = Vec::new();

            for chunk in &chunks {
                producer.push_slice(chunk).unwrap();
                expected.extend_from_slice(chunk);

                // drain roughly half of what is pending to keep indices moving
                let mut out = vec![0u8; consumer.len().div_ceil(2)];
                consumer.pop_slice(&mut out).unwrap();
                received.extend_from_slice(&out);
            }

            let mut rest = vec![0u8; consumer.len()];
            consumer.pop_slice(&mut rest).unwrap();
            received.extend_from_slice(&rest);

            prop_assert_eq!(received, expected);
            prop_assert!(consumer.is_empty());
        }
    }
}
