//! Streaming statistics engine.
//!
//! - [`median::MedianTracker`]: two-heap exact running median.
//! - [`running::RunningStats`]: single-pass moments, min/max and median for one channel.
//! - [`global::GlobalStats`]: three channels, pairwise co-moments and window batching.
pub mod global;
pub mod median;
pub mod running;

pub use global::GlobalStats;
pub use median::MedianTracker;
pub use running::RunningStats;
