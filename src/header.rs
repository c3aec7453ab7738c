//! The 8-byte logging header prepended to every packet, on the wire to
//! readers and on disk (spec §3, §6).
//!
//! Layout, little-endian:
//! - bits 0..16: payload size in bytes
//! - bits 16..64: unix time divided by 16 microseconds
//!
//! An all-zero 64-bit value is reserved as disk padding and is never a
//! valid header (a zero-size, zero-timestamp packet would be indistinguishable
//! from padding, but the ring buffer and chunk writer never emit one — the
//! ingest loop skips zero-length decoded frames before building a header).

use std::time::{SystemTime, UNIX_EPOCH};

/// Width, in microseconds, of one timestamp tick.
pub const TICK_MICROS: u64 = 16;

/// A decoded logging header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoggingHeader {
    pub size: u16,
    /// Unix time in 16-microsecond ticks since the epoch.
    pub ticks: u64,
}

impl LoggingHeader {
    /// Build a header from a payload size and a wall-clock timestamp given
    /// in microseconds since the Unix epoch. The timestamp is truncated to
    /// the nearest tick, per spec §8's round-trip law.
    pub fn new(size: u16, timestamp_micros: u64) -> Self {
        Self {
            size,
            ticks: timestamp_micros / TICK_MICROS,
        }
    }

    /// Encode into the 8-byte little-endian wire representation.
    pub fn encode(self) -> [u8; 8] {
        let word: u64 = (self.size as u64) | (self.ticks << 16);
        word.to_le_bytes()
    }

    /// Decode from an 8-byte little-endian slice. Returns `None` if the
    /// bytes are all zero (disk padding, per spec §3/§6).
    pub fn decode(bytes: [u8; 8]) -> Option<Self> {
        let word = u64::from_le_bytes(bytes);
        if word == 0 {
            return None;
        }
        Some(Self {
            size: (word & 0xFFFF) as u16,
            ticks: word >> 16,
        })
    }

    /// The timestamp this header carries, in microseconds since the epoch
    /// (rounded down to the nearest tick boundary, per the round-trip law
    /// `header_decode(header_encode(size, t)) == (size, t - (t mod 16))`).
    pub fn timestamp_micros(self) -> u64 {
        self.ticks * TICK_MICROS
    }
}

/// Current wall-clock time in microseconds since the Unix epoch.
///
/// Panics only if the system clock is set before the epoch, which would
/// indicate a badly misconfigured machine rather than a recoverable error.
pub fn now_micros() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock is before the Unix epoch")
        .as_micros() as u64
}

/// Round `n` up to the next multiple of 8 (on-disk padding, per spec §6).
pub const fn round_up_8(n: usize) -> usize {
    (n + 7) & !7
}
