//! Wire format for the half-duplex link.
//!
//! Every frame is a fixed-size run of little-endian IEEE-754 `f32` values, except for
//! the 5-byte error token:
//!
//! | Frame          | Floats | Bytes | Layout                                                  |
//! |----------------|--------|-------|---------------------------------------------------------|
//! | Sample         | 3      | 12    | x, y, z (all zero = end of session)                     |
//! | Window report  | 21     | 84    | X{min,max,mean,var,skew,kurt}, Y{..}, Z{..}, ρxy, ρxz, ρyz |
//! | Median report  | 3      | 12    | median x, median y, median z                            |
//! | Error token    | -      | 5     | `E R R ! \0`                                            |
//!
//! Statistics are computed in `f64` and narrowed to `f32` on encode.

use crate::error::{StreamError, StreamResult};
use bytes::{Buf, BufMut};

/// Size of one wire float.
pub const FLOAT_BYTES: usize = 4;

/// Floats per inbound sample.
pub const SAMPLE_FLOATS: usize = 3;

/// Bytes per inbound sample.
pub const SAMPLE_BYTES: usize = SAMPLE_FLOATS * FLOAT_BYTES;

/// Floats per channel in a window report.
pub const CHANNEL_SUMMARY_FLOATS: usize = 6;

/// Floats per window report: three channel summaries and three correlations.
pub const WINDOW_REPORT_FLOATS: usize = 3 * CHANNEL_SUMMARY_FLOATS + 3;

/// Bytes per window report.
pub const WINDOW_REPORT_BYTES: usize = WINDOW_REPORT_FLOATS * FLOAT_BYTES;

/// Floats per median report.
pub const MEDIAN_REPORT_FLOATS: usize = 3;

/// Bytes per median report.
pub const MEDIAN_REPORT_BYTES: usize = MEDIAN_REPORT_FLOATS * FLOAT_BYTES;

/// Sent in place of a report when a receive fails.
pub const ERROR_TOKEN: &[u8; 5] = b"ERR!\0";

/// Largest run of bytes a single sample can cause to be queued for sending: the last
/// window report of a session followed directly by the median report.
pub const MAX_REPORT_BURST_BYTES: usize = WINDOW_REPORT_BYTES + MEDIAN_REPORT_BYTES;

/// Free send space the consumer keeps before taking the next sample or error token.
pub const REPORT_HEADROOM_BYTES: usize = MAX_REPORT_BURST_BYTES + ERROR_TOKEN.len();

/// One inbound three-channel sample.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Sample {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Sample {
    /// End-of-session sentinel.
    pub const TERMINATOR: Sample = Sample {
        x: 0.0,
        y: 0.0,
        z: 0.0,
    };

    /// Sample from its three channel values.
    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    /// All three channels equal zero (either sign).
    pub fn is_terminator(&self) -> bool {
        self.x == 0.0 && self.y == 0.0 && self.z == 0.0
    }

    /// Decode three little-endian `f32`s.
    pub fn from_le_bytes(bytes: &[u8; SAMPLE_BYTES]) -> Self {
        let mut buf = &bytes[..];
        Self {
            x: buf.get_f32_le(),
            y: buf.get_f32_le(),
            z: buf.get_f32_le(),
        }
    }

    /// Decode from a frame that must be exactly one sample long.
    pub fn decode(frame: &[u8]) -> StreamResult<Self> {
        let bytes: &[u8; SAMPLE_BYTES] =
            frame.try_into().map_err(|_| StreamError::FrameLength {
                expected: SAMPLE_BYTES,
                actual: frame.len(),
            })?;
        Ok(Self::from_le_bytes(bytes))
    }

    /// Wire form: `x`, `y`, `z` as little-endian `f32`.
    pub fn to_le_bytes(&self) -> [u8; SAMPLE_BYTES] {
        let mut out = [0u8; SAMPLE_BYTES];
        let mut buf = &mut out[..];
        buf.put_f32_le(self.x);
        buf.put_f32_le(self.y);
        buf.put_f32_le(self.z);
        out
    }
}

/// Per-channel block of a window report.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChannelSummary {
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub variance: f64,
    pub skewness: f64,
    pub kurtosis: f64,
}

impl ChannelSummary {
    fn encode<B: BufMut>(&self, buf: &mut B) {
        for value in [
            self.min,
            self.max,
            self.mean,
            self.variance,
            self.skewness,
            self.kurtosis,
        ] {
            buf.put_f32_le(value as f32);
        }
    }

    fn decode<B: Buf>(buf: &mut B) -> Self {
        Self {
            min: f64::from(buf.get_f32_le()),
            max: f64::from(buf.get_f32_le()),
            mean: f64::from(buf.get_f32_le()),
            variance: f64::from(buf.get_f32_le()),
            skewness: f64::from(buf.get_f32_le()),
            kurtosis: f64::from(buf.get_f32_le()),
        }
    }
}

/// Summary emitted every time a window fills.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WindowReport {
    pub x: ChannelSummary,
    pub y: ChannelSummary,
    pub z: ChannelSummary,
    pub correlation_xy: f64,
    pub correlation_xz: f64,
    pub correlation_yz: f64,
}

impl WindowReport {
    /// Write the 21 floats in wire order.
    pub fn encode<B: BufMut>(&self, buf: &mut B) {
        self.x.encode(buf);
        self.y.encode(buf);
        self.z.encode(buf);
        buf.put_f32_le(self.correlation_xy as f32);
        buf.put_f32_le(self.correlation_xz as f32);
        buf.put_f32_le(self.correlation_yz as f32);
    }

    /// Encode into a fixed-size frame.
    pub fn to_le_bytes(&self) -> [u8; WINDOW_REPORT_BYTES] {
        let mut out = [0u8; WINDOW_REPORT_BYTES];
        self.encode(&mut &mut out[..]);
        out
    }

    /// Decode one report from the front of `frame`. Values come back at `f32` precision.
    pub fn decode(frame: &[u8]) -> StreamResult<Self> {
        if frame.len() < WINDOW_REPORT_BYTES {
            return Err(StreamError::FrameLength {
                expected: WINDOW_REPORT_BYTES,
                actual: frame.len(),
            });
        }

        let mut buf = &frame[..WINDOW_REPORT_BYTES];
        Ok(Self {
            x: ChannelSummary::decode(&mut buf),
            y: ChannelSummary::decode(&mut buf),
            z: ChannelSummary::decode(&mut buf),
            correlation_xy: f64::from(buf.get_f32_le()),
            correlation_xz: f64::from(buf.get_f32_le()),
            correlation_yz: f64::from(buf.get_f32_le()),
        })
    }
}

/// Whole-session medians, emitted once per terminator.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MedianReport {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl MedianReport {
    /// Write the three medians in channel order.
    pub fn encode<B: BufMut>(&self, buf: &mut B) {
        buf.put_f32_le(self.x as f32);
        buf.put_f32_le(self.y as f32);
        buf.put_f32_le(self.z as f32);
    }

    /// Encode into a fixed-size frame.
    pub fn to_le_bytes(&self) -> [u8; MEDIAN_REPORT_BYTES] {
        let mut out = [0u8; MEDIAN_REPORT_BYTES];
        self.encode(&mut &mut out[..]);
        out
    }

    /// Decode one report from the front of `frame`.
    pub fn decode(frame: &[u8]) -> StreamResult<Self> {
        if frame.len() < MEDIAN_REPORT_BYTES {
            return Err(StreamError::FrameLength {
                expected: MEDIAN_REPORT_BYTES,
                actual: frame.len(),
            });
        }

        let mut buf = &frame[..MEDIAN_REPORT_BYTES];
        Ok(Self {
            x: f64::from(buf.get_f32_le()),
            y: f64::from(buf.get_f32_le()),
            z: f64::from(buf.get_f32_le()),
        })
    }
}

/// Split a transmitted byte stream into `f32` values. Trailing bytes are ignored.
pub fn floats_from_le_bytes(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(FLOAT_BYTES)
        .map(|mut chunk| chunk.get_f32_le())
        .collect()
}
