//! Lock-free, zero-copy SPMC shared-memory ring buffer (spec §4.A).
//!
//! A single writer process publishes variable-size packets into a named
//! memory-mapped segment; any number of reader processes map the same
//! segment read-only and poll it independently. There is no locking and no
//! backpressure: a reader that falls behind simply observes a lapped slot
//! and must resynchronize, per spec §1's explicit non-goal of reliable
//! delivery to slow readers.

pub mod layout;
pub mod reader;
pub mod writer;

use crate::error::{AppResult, IngestError};
use std::path::PathBuf;

/// Map a segment name (which must begin with `/`, per spec §6) onto its
/// backing file. Segments live under `/dev/shm`, the conventional Linux
/// home for POSIX shared-memory objects and the same tmpfs-backed location
/// the teacher workspace's own ring buffer implicitly assumes by just
/// memory-mapping a plain file (see DESIGN.md's Open Question notes).
pub fn segment_path(name: &str) -> AppResult<PathBuf> {
    match name.strip_prefix('/') {
        Some(rest) if !rest.is_empty() => Ok(PathBuf::from("/dev/shm").join(rest)),
        _ => Err(IngestError::InvalidSegmentName(name.to_string())),
    }
}
