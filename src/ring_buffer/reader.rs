//! Reader side of the ring buffer (spec §4.A).

use super::layout::{
    assert_atomics_are_lock_free, SegmentHeader, HEADER_SIZE, MAGIC, SLOT_SIZE_FIELD_BYTES,
};
use super::segment_path;
use crate::error::{AppResult, IngestError, OpenOutcome};
use crate::liveness::is_alive;
use memmap2::{Mmap, MmapOptions};
use std::fs::File;
use std::sync::atomic::Ordering;

/// Outcome of [`SegmentReader::recv`].
#[derive(Debug)]
pub enum RecvOutcome {
    /// A packet was available; its payload bytes, copied out of the mapping.
    Frame(Vec<u8>),
    /// No new data since the last `recv`.
    Empty,
    /// The writer lapped this reader mid-read; the slot's contents are
    /// untrusted and were discarded. Resync with `reader_cursor =
    /// writer_cursor` (see [`SegmentReader::resync`]).
    Lapped,
}

/// Per-process reader handle. Not shared across processes or threads; the
/// `reader_cursor` is plain (non-atomic) state private to this handle.
pub struct SegmentReader {
    #[allow(dead_code, reason = "must stay alive to keep the mapping valid")]
    mmap: Mmap,
    header: *const SegmentHeader,
    data_ptr: *const u8,
    capacity: u64,
    max_slot_size: u64,
    reader_cursor: u64,
    writer_pid: i32,
}

// SAFETY: all access to the header goes through atomic loads; data_ptr is
// only ever read, never written, by this handle.
unsafe impl Send for SegmentReader {}

impl SegmentReader {
    /// Open a named segment read-only. Per spec §4.A / §7: an absent or
    /// not-yet-published segment is `NotFound`, not an error; a segment
    /// whose writer is already dead is also `NotFound`.
    pub fn open(name: &str) -> AppResult<OpenOutcome<Self>> {
        assert_atomics_are_lock_free();
        let path = segment_path(name)?;

        let file = match File::open(&path) {
            Ok(f) => f,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(OpenOutcome::NotFound)
            }
            Err(e) => return Err(e.into()),
        };

        // SAFETY: the file was created by `SegmentWriter::init`, or is
        // about to be rejected below if it doesn't look like one.
        let mmap = unsafe { MmapOptions::new().map(&file)? };
        if mmap.len() < HEADER_SIZE {
            return Err(IngestError::CorruptSegment(name.to_string()));
        }

        let header_ptr = mmap.as_ptr() as *mut u8;
        // SAFETY: length checked above; the cast is read-only use of a
        // shared mapping, matching `SegmentHeader::from_ptr`'s contract.
        let header = unsafe { SegmentHeader::from_ptr(header_ptr) };

        // Acquire: must precede any read of the other header fields.
        let pid = header.writer_pid.load(Ordering::Acquire);
        if pid == 0 {
            return Ok(OpenOutcome::NotFound);
        }
        if !is_alive(pid as i32)? {
            return Ok(OpenOutcome::NotFound);
        }

        if header.magic.load(Ordering::Relaxed) != MAGIC {
            return Err(IngestError::CorruptSegment(name.to_string()));
        }

        let capacity = header.capacity.load(Ordering::Relaxed);
        let max_slot_size = header.max_slot_size.load(Ordering::Relaxed);
        let reader_cursor = header.writer_cursor.load(Ordering::Acquire);

        // SAFETY: offset HEADER_SIZE is within the mapping (mmap.len() checked above).
        let data_ptr = unsafe { mmap.as_ptr().add(HEADER_SIZE) };

        Ok(OpenOutcome::Found(Self {
            mmap,
            header,
            data_ptr,
            capacity,
            max_slot_size,
            reader_cursor,
            writer_pid: pid as i32,
        }))
    }

    fn header(&self) -> &SegmentHeader {
        // SAFETY: valid for the lifetime of self.
        unsafe { &*self.header }
    }

    fn writer_cursor(&self) -> u64 {
        self.header().writer_cursor.load(Ordering::Acquire)
    }

    /// Receive the next packet, if any. See [`RecvOutcome`].
    pub fn recv(&mut self) -> RecvOutcome {
        let before = self.writer_cursor();
        if before == self.reader_cursor {
            return RecvOutcome::Empty;
        }

        let offset = (self.reader_cursor % self.capacity) as usize;
        // SAFETY: offset is within [0, capacity), and the data region has
        // max_slot_size bytes of tail beyond capacity, so the size-field
        // read never runs off the mapping even right at the wrap point.
        let raw_size = unsafe {
            let size_ptr = self.data_ptr.add(offset) as *const u64;
            u64::from_le(size_ptr.read_unaligned())
        };

        // Re-load: the size we just read may be garbage if the writer
        // lapped us between reading it and getting here (spec §4.A's "why
        // the re-read" note). Revalidate against a fresh cursor before
        // trusting it.
        let after = self.writer_cursor();
        let size_field = SLOT_SIZE_FIELD_BYTES;
        let advanced = after.wrapping_sub(self.reader_cursor).wrapping_sub(size_field);
        if advanced.wrapping_add(self.max_slot_size) > self.capacity {
            return RecvOutcome::Lapped;
        }

        let payload_size = raw_size as usize;
        let payload_offset = offset + size_field as usize;
        // SAFETY: the lap check above bounds payload_size to within one
        // max_slot_size of untouched ring data ahead of reader_cursor, and
        // max_slot_size was validated (at init) to be large enough that
        // size_field + any valid payload fits; the oversized tail covers
        // the rest.
        let payload = unsafe {
            std::slice::from_raw_parts(self.data_ptr.add(payload_offset), payload_size)
        }
        .to_vec();

        let advance = crate::ring_buffer::layout::round_up_16(size_field + raw_size);
        self.reader_cursor = self.reader_cursor.wrapping_add(advance);

        RecvOutcome::Frame(payload)
    }

    /// `true` iff no lap has occurred since the last `recv`. Must be called
    /// after consuming a payload and before forwarding any derived result
    /// downstream (spec §4.A); a `false` result means the payload just
    /// read may have been overwritten mid-read and must be discarded.
    pub fn has_kept_up(&self) -> bool {
        let w = self.writer_cursor();
        w.wrapping_sub(self.reader_cursor).wrapping_add(self.max_slot_size) <= self.capacity
    }

    /// `true` if the writer is known to be gone (pid zero, or the recorded
    /// pid no longer refers to a live process).
    pub fn eof(&self) -> AppResult<bool> {
        if self.header().writer_pid.load(Ordering::Acquire) == 0 {
            return Ok(true);
        }
        Ok(!is_alive(self.writer_pid)?)
    }

    /// Resynchronize after a `Lapped` result or a `false` `has_kept_up`:
    /// jump the reader cursor to the writer's current position so only
    /// subsequent packets are observed.
    pub fn resync(&mut self) {
        self.reader_cursor = self.writer_cursor();
    }

    /// Close the reader, releasing the mapping.
    pub fn close(self) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ring_buffer::writer::SegmentWriter;

    fn unique_name(case: &str) -> String {
        format!("/ring_ingest_reader_test_{}_{}", case, std::process::id())
    }

    #[test]
    fn new_reader_sees_only_future_packets() {
        let name = unique_name("late");
        let mut writer = SegmentWriter::init(&name, 4096, 256).unwrap();

        for i in 0..10u8 {
            writer.acquire()[0] = i;
            writer.send(1).unwrap();
        }

        let mut reader = match SegmentReader::open(&name).unwrap() {
            OpenOutcome::Found(r) => r,
            OpenOutcome::NotFound => panic!("writer is alive, segment should be found"),
        };
        assert!(matches!(reader.recv(), RecvOutcome::Empty));

        writer.acquire()[0] = 99;
        writer.send(1).unwrap();

        match reader.recv() {
            RecvOutcome::Frame(payload) => assert_eq!(payload, vec![99]),
            other => panic!("expected a frame, got {other:?}"),
        }

        writer.close();
    }

    #[test]
    fn happy_path_three_packets_in_order() {
        let name = unique_name("happy");
        let mut writer = SegmentWriter::init(&name, 4_194_304, 65536).unwrap();
        let mut reader = match SegmentReader::open(&name).unwrap() {
            OpenOutcome::Found(r) => r,
            OpenOutcome::NotFound => panic!("expected writer to be visible"),
        };
        assert_eq!(writer.max_packet_size(), 65528);

        let packets: Vec<Vec<u8>> = vec![vec![0x01, 0x02], vec![0xAA; 100], vec![0xFF; 65528]];
        for p in &packets {
            writer.acquire()[..p.len()].copy_from_slice(p);
            writer.send(p.len()).unwrap();
        }

        for expected in &packets {
            match reader.recv() {
                RecvOutcome::Frame(payload) => assert_eq!(&payload, expected),
                other => panic!("expected a frame, got {other:?}"),
            }
            assert!(reader.has_kept_up());
        }

        writer.close();
    }

    #[test]
    fn slow_reader_laps_and_resyncs() {
        let name = unique_name("lap");
        let mut writer = SegmentWriter::init(&name, 4096, 256).unwrap();
        let mut reader = match SegmentReader::open(&name).unwrap() {
            OpenOutcome::Found(r) => r,
            OpenOutcome::NotFound => panic!("expected writer to be visible"),
        };

        let payload = vec![0x11u8; 240];
        for _ in 0..40 {
            writer.acquire()[..payload.len()].copy_from_slice(&payload);
            writer.send(payload.len()).unwrap();
        }

        let lapped_or_stale = match reader.recv() {
            RecvOutcome::Lapped => true,
            RecvOutcome::Frame(_) => !reader.has_kept_up(),
            RecvOutcome::Empty => false,
        };
        assert!(lapped_or_stale, "expected the slow reader to detect a lap");

        reader.resync();
        assert!(matches!(reader.recv(), RecvOutcome::Empty));

        writer.acquire()[0] = 0xEE;
        writer.send(1).unwrap();
        match reader.recv() {
            RecvOutcome::Frame(payload) => assert_eq!(payload, vec![0xEE]),
            other => panic!("expected a frame after resync, got {other:?}"),
        }

        writer.close();
    }

    #[test]
    fn dead_writer_is_reported_as_eof() {
        let name = unique_name("dead");
        let mut writer = SegmentWriter::init(&name, 4096, 256).unwrap();
        for _ in 0..5u8 {
            writer.acquire()[0] = 1;
            writer.send(1).unwrap();
        }

        let reader = match SegmentReader::open(&name).unwrap() {
            OpenOutcome::Found(r) => r,
            OpenOutcome::NotFound => panic!("expected writer to be visible"),
        };

        // Simulate a crash: clear the pid field directly without going
        // through `close`, as a real crash would leave it nonzero but the
        // process gone. Here we exercise the pid==0 branch, which `close`
        // also exercises; the ESRCH branch is covered by `liveness` tests.
        writer.header().writer_pid.store(0, Ordering::Release);

        assert!(reader.eof().unwrap());
    }

    #[test]
    fn open_on_absent_segment_is_not_found() {
        let name = unique_name("absent");
        match SegmentReader::open(&name).unwrap() {
            OpenOutcome::NotFound => {}
            OpenOutcome::Found(_) => panic!("segment was never created"),
        }
    }
}
