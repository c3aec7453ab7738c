//! Centralized error type for the ingest core.
//!
//! Mirrors the shape of a typical `thiserror`-based application error: one
//! enum, `#[from]` conversions for the common underlying error sources, and
//! a `Result` alias so call sites read `AppResult<T>` instead of spelling
//! out the enum every time.

use thiserror::Error;

/// Convenience alias for results using [`IngestError`].
pub type AppResult<T> = std::result::Result<T, IngestError>;

#[derive(Error, Debug)]
pub enum IngestError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid segment name '{0}': must begin with '/'")]
    InvalidSegmentName(String),

    #[error("capacity must be a nonzero power of two, got {0}")]
    InvalidCapacity(u64),

    #[error("max_slot_size must be a nonzero multiple of 16, got {0}")]
    InvalidMaxSlotSize(u64),

    #[error("payload of {size} bytes exceeds max_packet_size of {max}")]
    PayloadTooLarge { size: usize, max: usize },

    #[error("failed to create ring buffer segment '{name}': {source}")]
    SegmentCreate {
        name: String,
        #[source]
        source: std::io::Error,
    },

    #[error("segment '{0}' has an invalid or stale header")]
    CorruptSegment(String),

    #[error("chunk writer I/O failure: {0}")]
    ChunkWrite(#[source] std::io::Error),

    #[error("failed to query process liveness: {0}")]
    LivenessProbe(#[from] nix::errno::Errno),

    #[cfg(feature = "serial")]
    #[error("failed to open serial device '{device}' at {baud} baud: {source}")]
    SerialOpen {
        device: String,
        baud: u32,
        #[source]
        source: serialport::Error,
    },

    #[error("serial support not enabled; rebuild with --features serial")]
    SerialFeatureDisabled,

    #[error("invalid baud rate '{0}'")]
    InvalidBaudRate(String),
}

/// Outcome of [`crate::ring_buffer::reader::SegmentReader::open`].
///
/// Not every "we couldn't give you a reader" outcome is an error: per the
/// spec, a writer that hasn't published yet is an expected, non-error
/// condition the caller is meant to retry or give up on, so it is kept out
/// of [`IngestError`] entirely (the same way the DAQ workspace treats a
/// "feature not enabled" result separately from a hard I/O failure).
#[derive(Debug)]
pub enum OpenOutcome<T> {
    Found(T),
    NotFound,
}
