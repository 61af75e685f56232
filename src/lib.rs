//! # tristream
//!
//! Streaming statistics for a three-channel sample stream arriving over a half-duplex
//! byte link. Samples are consumed once and never stored: each channel keeps
//! single-pass moments and an exact running median, and pairs of channels keep online
//! co-moments for correlation. Every `W` samples a window report is sent back over the
//! same link; an all-zero sample ends the session and triggers the median report.
//!
//! ## Crate Structure
//!
//! - **`stats`**: The statistics engine: `MedianTracker`, `RunningStats` and the
//!   three-channel `GlobalStats` with its window policy.
//! - **`data`**: The lock-free single-producer single-consumer `RingBuffer`, split into
//!   `Producer` and `Consumer` handles so each index has exactly one writer.
//! - **`protocol`**: Little-endian `f32` wire frames for samples and reports, and the
//!   error token.
//! - **`transport`**: The `Transport` trait the pipeline drives, plus the in-memory
//!   `SimulatedLink`.
//! - **`pipeline`**: The receive window, the send window with its Idle/Sending state
//!   machine, the main-context `StatsConsumer`, shared counters and the `HostHarness`.
//! - **`config`**: Figment-based `StreamConfig` loading and validation.
//! - **`logging`**: `tracing-subscriber` initialisation.
//! - **`error`**: The crate-wide `StreamError`.

pub mod config;
pub mod data;
pub mod error;
pub mod logging;
pub mod pipeline;
pub mod protocol;
pub mod stats;
pub mod transport;

pub use config::StreamConfig;
pub use error::{StreamError, StreamResult};
pub use pipeline::{HostHarness, Pipeline, PipelineMetrics};
pub use protocol::{MedianReport, Sample, WindowReport};
pub use stats::GlobalStats;
