//! Writer side of the ring buffer (spec §4.A).

use super::layout::{
    assert_atomics_are_lock_free, is_valid_capacity, is_valid_max_slot_size, mapped_len,
    round_up_16, SegmentHeader, HEADER_SIZE, MAGIC, SLOT_SIZE_FIELD_BYTES,
};
use super::segment_path;
use crate::error::{AppResult, IngestError};
use crate::liveness::current_pid;
use memmap2::{MmapMut, MmapOptions};
use std::fs::OpenOptions;
use std::sync::atomic::Ordering;

/// The writer half of a ring buffer segment. Only one `SegmentWriter` per
/// name should exist at a time (multi-writer support is an explicit
/// non-goal, spec §1); nothing here prevents a second writer from
/// clobbering the first, by design (see DESIGN.md).
pub struct SegmentWriter {
    #[allow(dead_code, reason = "must stay alive to keep the mapping valid")]
    mmap: MmapMut,
    header: *const SegmentHeader,
    data_ptr: *mut u8,
    capacity: u64,
    max_slot_size: u64,
}

// SAFETY: all mutation goes through atomics on the header or through the
// data region at an offset only this writer ever touches; there is no
// shared mutable state accessed without atomic ops.
unsafe impl Send for SegmentWriter {}

impl SegmentWriter {
    /// Create (or recreate) a named segment. Steps are load-bearing and
    /// ordered per spec §4.A: unlink any stale segment, create/truncate,
    /// map, zero the header, write capacity/max_slot_size, and only then
    /// publish `writer_pid` last with release ordering.
    pub fn init(name: &str, capacity: u64, max_slot_size: u64) -> AppResult<Self> {
        assert_atomics_are_lock_free();
        if !is_valid_capacity(capacity) {
            return Err(IngestError::InvalidCapacity(capacity));
        }
        if !is_valid_max_slot_size(max_slot_size) {
            return Err(IngestError::InvalidMaxSlotSize(max_slot_size));
        }

        let path = segment_path(name)?;
        let _ = std::fs::remove_file(&path);

        let total_len = mapped_len(capacity, max_slot_size);
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(&path)
            .map_err(|source| IngestError::SegmentCreate {
                name: name.to_string(),
                source,
            })?;
        file.set_len(total_len)
            .map_err(|source| IngestError::SegmentCreate {
                name: name.to_string(),
                source,
            })?;

        // SAFETY: we just created and sized the file ourselves.
        let mut mmap = unsafe { MmapOptions::new().map_mut(&file)? };
        let header_ptr = mmap.as_mut_ptr() as *mut u8;
        // SAFETY: the mapping is at least HEADER_SIZE bytes (checked by set_len above).
        unsafe { std::slice::from_raw_parts_mut(header_ptr, HEADER_SIZE).fill(0) };
        let header = unsafe { SegmentHeader::from_ptr(header_ptr) };

        header.magic.store(MAGIC, Ordering::Relaxed);
        header.capacity.store(capacity, Ordering::Relaxed);
        header.max_slot_size.store(max_slot_size, Ordering::Relaxed);
        header.writer_cursor.store(0, Ordering::Relaxed);

        // Last field written, and with release ordering: readers that
        // observe a nonzero pid are guaranteed to see everything above it.
        header
            .writer_pid
            .store(current_pid() as u64, Ordering::Release);

        // SAFETY: offset HEADER_SIZE is within the mapping (total_len includes it).
        let data_ptr = unsafe { mmap.as_mut_ptr().add(HEADER_SIZE) };

        Ok(Self {
            mmap,
            header,
            data_ptr,
            capacity,
            max_slot_size,
        })
    }

    /// Maximum payload a single `send` may carry (`max_slot_size` minus the
    /// 8-byte size-field prefix).
    pub fn max_packet_size(&self) -> usize {
        (self.max_slot_size - SLOT_SIZE_FIELD_BYTES) as usize
    }

    pub(crate) fn header(&self) -> &SegmentHeader {
        // SAFETY: valid for the lifetime of self; mmap is kept alive in self.mmap.
        unsafe { &*self.header }
    }

    fn cursor(&self) -> u64 {
        self.header().writer_cursor.load(Ordering::Relaxed)
    }

    /// Return a writable view of length [`Self::max_packet_size`] at the
    /// current slot, skipping past the size-field prefix. Repeated calls
    /// without an intervening `send` return the same region (last call
    /// wins); no atomic state is touched.
    pub fn acquire(&mut self) -> &mut [u8] {
        let offset = (self.cursor() % self.capacity) as usize + SLOT_SIZE_FIELD_BYTES as usize;
        let len = self.max_packet_size();
        // SAFETY: the data region is capacity + max_slot_size bytes, so any
        // slot start (< capacity) plus a full max_slot_size worth of slot
        // (size field + max payload) stays within the mapping, which is
        // exactly why the tail is oversized (spec §9).
        unsafe { std::slice::from_raw_parts_mut(self.data_ptr.add(offset), len) }
    }

    /// Publish `payload_size` bytes (already written into the slice
    /// returned by [`Self::acquire`]) and advance the cursor.
    pub fn send(&mut self, payload_size: usize) -> AppResult<()> {
        let size_field = SLOT_SIZE_FIELD_BYTES as usize;
        if payload_size + size_field > self.max_slot_size as usize {
            return Err(IngestError::PayloadTooLarge {
                size: payload_size,
                max: self.max_packet_size(),
            });
        }

        let cursor = self.cursor();
        let offset = (cursor % self.capacity) as usize;

        // SAFETY: offset + size_field is within the oversized data region.
        unsafe {
            let size_ptr = self.data_ptr.add(offset) as *mut u64;
            size_ptr.write_unaligned((payload_size as u64).to_le());
        }

        let advance = round_up_16(size_field as u64 + payload_size as u64);
        let new_cursor = cursor.wrapping_add(advance);
        self.header()
            .writer_cursor
            .store(new_cursor, Ordering::Release);
        Ok(())
    }

    /// Clear `writer_pid` to zero and unmap. No guarantee in-flight readers
    /// will observe this before or after the final packets they're
    /// reading, per spec §4.A.
    pub fn close(self) {
        self.header().writer_pid.store(0, Ordering::Release);
        // `self.mmap` drops here, unmapping the segment.
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::Ordering::Acquire;

    fn unique_name(case: &str) -> String {
        format!("/ring_ingest_test_{}_{}", case, std::process::id())
    }

    #[test]
    fn init_rejects_non_power_of_two_capacity() {
        let name = unique_name("bad_cap");
        let err = SegmentWriter::init(&name, 100, 16).unwrap_err();
        assert!(matches!(err, IngestError::InvalidCapacity(100)));
    }

    #[test]
    fn init_rejects_non_multiple_of_16_slot_size() {
        let name = unique_name("bad_slot");
        let err = SegmentWriter::init(&name, 4096, 17).unwrap_err();
        assert!(matches!(err, IngestError::InvalidMaxSlotSize(17)));
    }

    #[test]
    fn init_publishes_pid_last_and_nonzero() {
        let name = unique_name("pid");
        let writer = SegmentWriter::init(&name, 4096, 256).unwrap();
        assert_eq!(
            writer.header().writer_pid.load(Acquire),
            current_pid() as u64
        );
        writer.close();
    }

    #[test]
    fn send_advances_cursor_by_rounded_up_size() {
        let name = unique_name("advance");
        let mut writer = SegmentWriter::init(&name, 4096, 256).unwrap();

        let slot = writer.acquire();
        slot[..3].copy_from_slice(&[1, 2, 3]);
        writer.send(3).unwrap();

        assert_eq!(writer.cursor(), round_up_16(8 + 3));
        writer.close();
    }

    #[test]
    fn send_rejects_oversized_payload() {
        let name = unique_name("oversize");
        let mut writer = SegmentWriter::init(&name, 4096, 32).unwrap();
        let err = writer.send(100).unwrap_err();
        assert!(matches!(err, IngestError::PayloadTooLarge { .. }));
    }

    #[test]
    fn reinit_under_same_name_recreates_segment() {
        let name = unique_name("reinit");
        let mut first = SegmentWriter::init(&name, 4096, 256).unwrap();
        first.acquire()[..1].copy_from_slice(&[0xAA]);
        first.send(1).unwrap();
        assert_ne!(first.cursor(), 0);
        first.close();

        let second = SegmentWriter::init(&name, 4096, 256).unwrap();
        assert_eq!(second.cursor(), 0);
        second.close();
    }
}
