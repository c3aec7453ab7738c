//! Ten-second, packet-aligned rollover chunk file writer (spec §4.D).
//!
//! Keeps at most one open file. A file's bucket is fixed by the first
//! packet written into it; any later packet whose bucket differs closes
//! the file and emits its path before a new one is (lazily) opened. The
//! file is named from that first packet's own timestamp rounded to whole
//! seconds, not from the bucket start — a packet at `9.9s` opens
//! `...09.bin`, even though its bucket (for rollover purposes only) is the
//! `[0, 10)` one. Empty buckets produce no file, matching `storage.rs`'s
//! `CsvWriter`-style explicit `init`/`write`/`shutdown` lifecycle, adapted
//! from a single CSV session to a rolling sequence of binary chunks.

use crate::error::{AppResult, IngestError};
use crate::header::round_up_8;
use chrono::{SecondsFormat, TimeZone, Utc};
use std::fs::{create_dir_all, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

/// Width, in seconds, of one chunk's rollover bucket.
const BUCKET_SECONDS: u64 = 10;

/// Round `timestamp_micros` down to the start of its 10-second bucket, in
/// whole seconds since the Unix epoch.
pub fn bucket_seconds(timestamp_micros: u64) -> u64 {
    let secs = timestamp_micros / 1_000_000;
    secs - (secs % BUCKET_SECONDS)
}

struct OpenChunk {
    file: BufWriter<File>,
    path: PathBuf,
    bucket: u64,
}

/// Appends `(header, payload, padding)` records to rollover-aligned files
/// under a staging directory, handing back completed paths as files close.
pub struct ChunkWriter {
    dir: PathBuf,
    current: Option<OpenChunk>,
}

impl ChunkWriter {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            current: None,
        }
    }

    /// Close the current file, if its bucket differs from `timestamp_micros`'s.
    /// Returns the completed path when a rollover happened (spec §4.C step 5).
    pub fn roll_if_needed(&mut self, timestamp_micros: u64) -> AppResult<Option<PathBuf>> {
        let bucket = bucket_seconds(timestamp_micros);
        let needs_roll = matches!(&self.current, Some(chunk) if chunk.bucket != bucket);
        if needs_roll {
            self.close()
        } else {
            Ok(None)
        }
    }

    /// Open a new file for `timestamp_micros`'s bucket if none is currently
    /// open. No-op if a file is already open (spec §4.C step 6). The
    /// filename is the packet timestamp rounded down to whole seconds
    /// (spec §4.C step 6: `<iso8601_utc_to_seconds>.bin`) — distinct from
    /// the 10-second rollover bucket, which only decides when a file
    /// closes, not what the opening file is named.
    pub fn ensure_open(&mut self, timestamp_micros: u64) -> AppResult<()> {
        if self.current.is_some() {
            return Ok(());
        }

        let bucket = bucket_seconds(timestamp_micros);
        let packet_seconds = timestamp_micros / 1_000_000;
        create_dir_all(&self.dir).map_err(IngestError::ChunkWrite)?;

        let name = Utc
            .timestamp_opt(packet_seconds as i64, 0)
            .single()
            .expect("packet timestamp is a valid whole-second unix timestamp")
            .to_rfc3339_opts(SecondsFormat::Secs, true);
        let path = self.dir.join(format!("{name}.bin"));

        let file = File::create(&path).map_err(IngestError::ChunkWrite)?;
        tracing::info!(path = %path.display(), "opened chunk file");
        self.current = Some(OpenChunk {
            file: BufWriter::new(file),
            path,
            bucket,
        });
        Ok(())
    }

    /// Append one record: the 8-byte header, the payload, and zero padding
    /// up to the next 8-byte boundary (spec §4.C step 9, §6). No-op if no
    /// file is currently open (logging disabled).
    pub fn append(&mut self, header: [u8; 8], payload: &[u8]) -> AppResult<()> {
        let Some(chunk) = self.current.as_mut() else {
            return Ok(());
        };

        chunk.file.write_all(&header).map_err(IngestError::ChunkWrite)?;
        chunk.file.write_all(payload).map_err(IngestError::ChunkWrite)?;

        let padding = round_up_8(payload.len()) - payload.len();
        if padding > 0 {
            chunk
                .file
                .write_all(&[0u8; 8][..padding])
                .map_err(IngestError::ChunkWrite)?;
        }
        Ok(())
    }

    /// Close the current file, flushing and returning its path. A no-op
    /// (returns `Ok(None)`) if no file is open. Called both on rollover and
    /// on shutdown (spec §4.D).
    pub fn close(&mut self) -> AppResult<Option<PathBuf>> {
        let Some(mut chunk) = self.current.take() else {
            return Ok(None);
        };
        chunk.file.flush().map_err(IngestError::ChunkWrite)?;
        tracing::info!(path = %chunk.path.display(), "closed chunk file");
        Ok(Some(chunk.path))
    }

    /// Path of the currently open file, if any. Exposed for diagnostics.
    pub fn current_path(&self) -> Option<&Path> {
        self.current.as_ref().map(|c| c.path.as_path())
    }
}
