//! Exact running median over two balanced heaps.
//!
//! `lower` is a max-heap holding the smaller half of the values seen so far and
//! `upper` is a min-heap holding the larger half. After every push the top of `lower`
//! is no greater than the top of `upper` and the heap sizes differ by at most one, so
//! the median is always one of the two tops (or their average).

use ordered_float::OrderedFloat;
use std::cmp::Reverse;
use std::collections::BinaryHeap;

/// Two-heap median tracker. O(log n) push, O(1) query.
#[derive(Debug, Clone, Default)]
pub struct MedianTracker {
    lower: BinaryHeap<OrderedFloat<f64>>,
    upper: BinaryHeap<Reverse<OrderedFloat<f64>>>,
}

impl MedianTracker {
    /// Create an empty tracker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of values pushed since the last clear.
    pub fn len(&self) -> usize {
        self.lower.len() + self.upper.len()
    }

    /// Whether no value has been pushed since the last clear.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Discard every value.
    pub fn clear(&mut self) {
        self.lower.clear();
        self.upper.clear();
    }

    /// Route `x` to the correct half, then migrate one top if the halves drift apart.
    pub fn push(&mut self, x: f64) {
        let x = OrderedFloat(x);
        match self.lower.peek() {
            Some(&top) if x > top => self.upper.push(Reverse(x)),
            _ => self.lower.push(x),
        }

        if self.lower.len() > self.upper.len() + 1 {
            if let Some(top) = self.lower.pop() {
                self.upper.push(Reverse(top));
            }
        } else if self.upper.len() > self.lower.len() + 1 {
            if let Some(Reverse(top)) = self.upper.pop() {
                self.lower.push(top);
            }
        }
    }

    /// Median of everything pushed so far, `None` when empty.
    pub fn median(&self) -> Option<f64> {
        let lower = self.lower.peek().map(|v| v.0);
        let upper = self.upper.peek().map(|v| v.0 .0);

        match self.lower.len().cmp(&self.upper.len()) {
            std::cmp::Ordering::Greater => lower,
            std::cmp::Ordering::Less => upper,
            std::cmp::Ordering::Equal => Some((lower? + upper?) / 2.0),
        }
    }
}
