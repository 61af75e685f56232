//! Single-channel streaming statistics.
//!
//! `RunningStats` accumulates the first four central moments in one pass using the
//! Welford-style update, plus min, max and an exact running median. No sample history
//! is kept apart from the median heaps.
//!
//! Statistics evaluated below their minimum count are not guarded: `mean()` needs
//! `n >= 1`, the dispersion and shape statistics need `n >= 2`, and outside that domain
//! the IEEE-754 result (NaN or Inf) is returned as is.

use crate::protocol::ChannelSummary;
use crate::stats::median::MedianTracker;

/// Online moment accumulator and median tracker for one channel.
#[derive(Debug, Clone)]
pub struct RunningStats {
    n: u64,
    m1: f64,
    m2: f64,
    m3: f64,
    m4: f64,
    min: f64,
    max: f64,
    median: MedianTracker,
}

impl Default for RunningStats {
    fn default() -> Self {
        Self::new()
    }
}

impl RunningStats {
    /// Create an empty accumulator.
    pub fn new() -> Self {
        Self {
            n: 0,
            m1: 0.0,
            m2: 0.0,
            m3: 0.0,
            m4: 0.0,
            min: f64::INFINITY,
            max: f64::NEG_INFINITY,
            median: MedianTracker::new(),
        }
    }

    /// Reset the count, moments, min and max. The median heaps are kept.
    pub fn clear(&mut self) {
        self.n = 0;
        self.m1 = 0.0;
        self.m2 = 0.0;
        self.m3 = 0.0;
        self.m4 = 0.0;
        self.min = f64::INFINITY;
        self.max = f64::NEG_INFINITY;
    }

    /// Full reinitialisation, median heaps included.
    pub fn reset(&mut self) {
        self.clear();
        self.median.clear();
    }

    /// Incorporate one value.
    ///
    /// M4 and M3 read the pre-update M2 and M3, so the update runs M4, M3, M2, M1.
    pub fn push(&mut self, x: f64) {
        let n1 = self.n as f64;
        self.n += 1;
        let n = self.n as f64;

        let delta = x - self.m1;
        let delta_n = delta / n;
        let delta_n2 = delta_n * delta_n;
        let term1 = delta * delta_n * n1;

        self.m4 += term1 * delta_n2 * (n * n - 3.0 * n + 3.0) + 6.0 * delta_n2 * self.m2
            - 4.0 * delta_n * self.m3;
        self.m3 += term1 * delta_n * (n - 2.0) - 3.0 * delta_n * self.m2;
        self.m2 += term1;
        self.m1 += delta_n;

        if x < self.min {
            self.min = x;
        }
        if x > self.max {
            self.max = x;
        }

        self.median.push(x);
    }

    /// Number of values in the current window.
    pub fn count(&self) -> u64 {
        self.n
    }

    /// Smallest value in the current window, `+inf` when empty.
    pub fn min(&self) -> f64 {
        self.min
    }

    /// Largest value in the current window, `-inf` when empty.
    pub fn max(&self) -> f64 {
        self.max
    }

    /// Mean of the current window.
    pub fn mean(&self) -> f64 {
        self.m1
    }

    /// Population variance, `M2 / n`.
    pub fn variance(&self) -> f64 {
        self.m2 / self.n as f64
    }

    /// Sample variance, `M2 / (n - 1)`.
    pub fn variance_sample(&self) -> f64 {
        self.m2 / (self.n as f64 - 1.0)
    }

    /// Population standard deviation.
    pub fn standard_deviation(&self) -> f64 {
        self.variance().sqrt()
    }

    /// Population skewness, `sqrt(n) * M3 / M2^1.5`.
    pub fn skewness(&self) -> f64 {
        (self.n as f64).sqrt() * self.m3 / self.m2.powf(1.5)
    }

    /// Pearson's kurtosis, `n * M4 / M2^2`. A normal distribution gives 3.
    pub fn kurtosis(&self) -> f64 {
        self.n as f64 * self.m4 / (self.m2 * self.m2)
    }

    /// Median of every value pushed since the last `reset`, NaN when there are none.
    pub fn median(&self) -> f64 {
        self.median.median().unwrap_or(f64::NAN)
    }

    /// Number of values behind the median, which survives `clear`.
    pub fn median_count(&self) -> usize {
        self.median.len()
    }

    /// The six per-channel fields of a window report.
    pub fn summary(&self) -> ChannelSummary {
        ChannelSummary {
            min: self.min(),
            max: self.max(),
            mean: self.mean(),
            variance: self.variance(),
            skewness: self.skewness(),
            kurtosis: self.kurtosis(),
        }
    }
}
