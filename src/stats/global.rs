//! Three-channel statistics with online cross-moments and window batching.
//!
//! `GlobalStats` owns one [`RunningStats`] per channel and the three pairwise
//! co-moments needed for correlation. Samples are grouped into back-to-back windows
//! of `W` samples: the `W`-th push of a window returns `true`, and the next push
//! clears the moment accumulators before it is counted. Medians are not cleared with
//! the window; they cover the whole session until [`GlobalStats::reset`].

use crate::protocol::{MedianReport, Sample, WindowReport};
use crate::stats::running::RunningStats;
use std::num::NonZeroUsize;

/// Windowed statistics for the X, Y and Z channels.
#[derive(Debug, Clone)]
pub struct GlobalStats {
    window: NonZeroUsize,
    x: RunningStats,
    y: RunningStats,
    z: RunningStats,
    m_xy: f64,
    m_xz: f64,
    m_yz: f64,
}

impl GlobalStats {
    /// Empty statistics reporting every `window` samples.
    pub fn new(window: NonZeroUsize) -> Self {
        Self {
            window,
            x: RunningStats::new(),
            y: RunningStats::new(),
            z: RunningStats::new(),
            m_xy: 0.0,
            m_xz: 0.0,
            m_yz: 0.0,
        }
    }

    /// Configured window size.
    pub fn window(&self) -> usize {
        self.window.get()
    }

    /// Samples in the current window.
    pub fn fill(&self) -> usize {
        self.x.count() as usize
    }

    /// Channel X.
    pub fn x(&self) -> &RunningStats {
        &self.x
    }

    /// Channel Y.
    pub fn y(&self) -> &RunningStats {
        &self.y
    }

    /// Channel Z.
    pub fn z(&self) -> &RunningStats {
        &self.z
    }

    /// Add one sample. Returns `true` when it completes a window.
    ///
    /// The co-moments use the means from before this sample, so they are updated
    /// before the channels are pushed.
    pub fn push(&mut self, x: f64, y: f64, z: f64) -> bool {
        if self.fill() == self.window() {
            self.clear();
        }

        let n = (self.x.count() + 1) as f64;
        let delta_x = (x - self.x.mean()) / n;
        let delta_y = (y - self.y.mean()) / n;
        let delta_z = (z - self.z.mean()) / n;
        self.m_xy += (n - 1.0) * delta_x * delta_y - self.m_xy / n;
        self.m_xz += (n - 1.0) * delta_x * delta_z - self.m_xz / n;
        self.m_yz += (n - 1.0) * delta_y * delta_z - self.m_yz / n;

        self.x.push(x);
        self.y.push(y);
        self.z.push(z);

        self.fill() == self.window()
    }

    /// [`GlobalStats::push`] for a decoded wire sample.
    pub fn push_sample(&mut self, sample: &Sample) -> bool {
        self.push(
            f64::from(sample.x),
            f64::from(sample.y),
            f64::from(sample.z),
        )
    }

    /// Start a new window: channel moments and co-moments go back to zero, medians stay.
    pub fn clear(&mut self) {
        self.x.clear();
        self.y.clear();
        self.z.clear();
        self.m_xy = 0.0;
        self.m_xz = 0.0;
        self.m_yz = 0.0;
    }

    /// Start a new session: everything goes back to zero, medians included.
    pub fn reset(&mut self) {
        self.x.reset();
        self.y.reset();
        self.z.reset();
        self.m_xy = 0.0;
        self.m_xz = 0.0;
        self.m_yz = 0.0;
    }

    fn covariance(&self, m_pair: f64) -> f64 {
        let n = self.x.count() as f64;
        n / (n - 1.0) * m_pair
    }

    /// Sample covariance of X and Y over the current window.
    pub fn covariance_xy(&self) -> f64 {
        self.covariance(self.m_xy)
    }

    /// Sample covariance of X and Z.
    pub fn covariance_xz(&self) -> f64 {
        self.covariance(self.m_xz)
    }

    /// Sample covariance of Y and Z.
    pub fn covariance_yz(&self) -> f64 {
        self.covariance(self.m_yz)
    }

    /// `m_pair` is the population co-moment, so dividing by the population deviations
    /// gives the same ratio as sample covariance over sample deviations.
    fn correlation(m_pair: f64, a: &RunningStats, b: &RunningStats) -> f64 {
        m_pair / (a.standard_deviation() * b.standard_deviation())
    }

    /// Pearson correlation of X and Y over the current window.
    pub fn correlation_xy(&self) -> f64 {
        Self::correlation(self.m_xy, &self.x, &self.y)
    }

    /// Pearson correlation of X and Z.
    pub fn correlation_xz(&self) -> f64 {
        Self::correlation(self.m_xz, &self.x, &self.z)
    }

    /// Pearson correlation of Y and Z.
    pub fn correlation_yz(&self) -> f64 {
        Self::correlation(self.m_yz, &self.y, &self.z)
    }

    /// Snapshot of the current window in wire order.
    pub fn window_report(&self) -> WindowReport {
        WindowReport {
            x: self.x.summary(),
            y: self.y.summary(),
            z: self.z.summary(),
            correlation_xy: self.correlation_xy(),
            correlation_xz: self.correlation_xz(),
            correlation_yz: self.correlation_yz(),
        }
    }

    /// Session medians. NaN for a session with no samples.
    pub fn median_report(&self) -> MedianReport {
        MedianReport {
            x: self.x.median(),
            y: self.y.median(),
            z: self.z.median(),
        }
    }
}
