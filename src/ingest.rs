//! Read → decode → timestamp → publish → log orchestration loop (spec §4.C).
//!
//! Single-threaded and cooperative: the only blocking points are the byte
//! read inside the COBS decoder and the chunk file write (spec §5). The
//! shutdown flag is a plain `Arc<AtomicBool>` rather than anything
//! signal-hook-specific, so this module stays testable against an in-memory
//! byte source; wiring an actual signal into the flag is `main.rs`'s job,
//! grounded on `crates/bin/src/main.rs`'s shutdown-flag-driven main loop.

use crate::chunk_writer::ChunkWriter;
use crate::cobs::{decode_frame, DecodeOutcome};
use crate::error::AppResult;
use crate::header::{now_micros, round_up_8, LoggingHeader};
use crate::ring_buffer::writer::SegmentWriter;
use std::io::Read;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Number of leading payload bytes inspected by the printable-prefix
/// diagnostic (spec §4.C step 10, §9 — heuristic only, never gates
/// behavior; see DESIGN.md's Open Question notes).
const PRINTABLE_PREFIX_LEN: usize = 16;

/// Iterations slower than this log a warning (spec §5).
const SLOW_ITERATION_WARN_MICROS: u128 = 100_000;

/// Runs the ingest loop until end-of-stream or `shutdown` is set.
///
/// `chunk_writer` is `None` when the binary was invoked without a staging
/// directory (fanout-only mode, spec §6).
pub struct IngestLoop<R> {
    reader: R,
    writer: SegmentWriter,
    chunk_writer: Option<ChunkWriter>,
    last_timestamp_micros: Option<u64>,
    scratch: Vec<u8>,
}

impl<R: Read> IngestLoop<R> {
    pub fn new(reader: R, writer: SegmentWriter, chunk_writer: Option<ChunkWriter>) -> Self {
        Self {
            reader,
            writer,
            chunk_writer,
            last_timestamp_micros: None,
            scratch: Vec::new(),
        }
    }

    /// Run until the byte source is exhausted or `shutdown` becomes true.
    /// Returns the path of any chunk file still open at exit, if logging
    /// was enabled (spec §4.D: "at shutdown... any open file is closed and
    /// its path emitted").
    pub fn run(&mut self, shutdown: &Arc<AtomicBool>) -> AppResult<Option<std::path::PathBuf>> {
        let max_payload = self.writer.max_packet_size().saturating_sub(8);

        while !shutdown.load(Ordering::Relaxed) {
            let iteration_start = Instant::now();

            match decode_frame(&mut self.reader, &mut self.scratch, max_payload) {
                DecodeOutcome::EndOfStream => break,
                DecodeOutcome::Frame(0) => continue,
                DecodeOutcome::Frame(len) => self.publish_one(len)?,
            }

            let elapsed = iteration_start.elapsed();
            if elapsed.as_micros() > SLOW_ITERATION_WARN_MICROS {
                tracing::warn!(elapsed_ms = elapsed.as_millis(), "ingest iteration exceeded 100ms");
            }
        }

        match &mut self.chunk_writer {
            Some(chunk_writer) => chunk_writer.close(),
            None => Ok(None),
        }
    }

    fn publish_one(&mut self, len: usize) -> AppResult<()> {
        let timestamp = now_micros();
        if let Some(prev) = self.last_timestamp_micros {
            if timestamp < prev {
                tracing::warn!(prev, timestamp, "wall clock ran backward; using new value anyway");
            }
        }
        self.last_timestamp_micros = Some(timestamp);

        if let Some(chunk_writer) = self.chunk_writer.as_mut() {
            if let Some(closed) = chunk_writer.roll_if_needed(timestamp)? {
                println!("{}", closed.display());
            }
            chunk_writer.ensure_open(timestamp)?;
        }

        let header = LoggingHeader::new(len as u16, timestamp).encode();
        let total = 8 + len;

        let slot = self.writer.acquire();
        slot[..8].copy_from_slice(&header);
        slot[8..total].copy_from_slice(&self.scratch[..len]);
        let padded = round_up_8(total);
        if padded > total {
            slot[total..padded].fill(0);
        }
        self.writer.send(total)?;

        if let Some(chunk_writer) = self.chunk_writer.as_mut() {
            chunk_writer.append(header, &self.scratch[..len])?;
        }

        log_printable_prefix(&self.scratch[..len]);
        Ok(())
    }
}

/// Best-effort diagnostic: if the leading bytes of the payload look like
/// printable ASCII text, log them at debug level. Heuristic only — never
/// gates publication or logging (spec §9).
fn log_printable_prefix(payload: &[u8]) {
    let prefix = &payload[..payload.len().min(PRINTABLE_PREFIX_LEN)];
    if !prefix.is_empty() && prefix.iter().all(|&b| (0x20..=0x7E).contains(&b)) {
        let text = String::from_utf8_lossy(prefix);
        tracing::debug!(prefix = %text, "payload starts with printable text");
    }
}
