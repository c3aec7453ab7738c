//! Shared memory layout for the ring buffer segment (spec §3).
//!
//! The segment is a single memory-mapped file: a fixed-size header
//! immediately followed by `capacity + max_slot_size` bytes of ring data
//! (oversized by one maximum slot so every slot is contiguous — spec §9's
//! "oversize tail" note). The header itself lives inline in the mapping,
//! cast from raw bytes the way the DAQ workspace's `RingBufferHeader` does
//! (`src/data/ring_buffer.rs`), including the `#[repr(C)]` layout and a
//! compile-time size assertion.

use std::sync::atomic::AtomicU64;

/// Magic number identifying a segment created by this crate.
pub const MAGIC: u64 = 0xC0_B5_00_00_00_00_00_01;

/// Size of the header in bytes (one cache line on most systems).
pub const HEADER_SIZE: usize = 64;

/// The segment header, mapped directly onto the start of the backing file.
///
/// Field order matters: `writer_pid` must be written last during init and
/// read first on open (spec §3 Invariant 3, §4.A).
#[repr(C)]
pub struct SegmentHeader {
    pub magic: AtomicU64,
    pub capacity: AtomicU64,
    pub max_slot_size: AtomicU64,
    pub writer_cursor: AtomicU64,
    _padding: [u8; 24],
    pub writer_pid: AtomicU64,
}

const _: () = assert!(
    std::mem::size_of::<SegmentHeader>() == HEADER_SIZE,
    "SegmentHeader size must equal HEADER_SIZE"
);

impl SegmentHeader {
    /// # Safety
    /// `ptr` must point to at least `HEADER_SIZE` valid, writable bytes for
    /// the lifetime `'a`, and must be suitably aligned for `SegmentHeader`
    /// (mmap'd pages are page-aligned, which satisfies this).
    pub unsafe fn from_ptr<'a>(ptr: *mut u8) -> &'a SegmentHeader {
        &*(ptr as *const SegmentHeader)
    }
}

/// Round `n` up to the next multiple of 16 (slot alignment, spec Invariant 5).
pub const fn round_up_16(n: u64) -> u64 {
    (n + 15) & !15
}

/// Total mapped length of a segment: header plus the oversized ring region.
pub const fn mapped_len(capacity: u64, max_slot_size: u64) -> u64 {
    HEADER_SIZE as u64 + capacity + max_slot_size
}

/// Size, in bytes, of the size-field prefix of a slot.
pub const SLOT_SIZE_FIELD_BYTES: u64 = 8;

/// Assert that the cursor and pid atomics are lock-free on this machine
/// (spec §5 Lock-freeness, §8: "Atomic types used for cursor and pid assert
/// lock-free at startup"). A spinlock-emulated atomic would deadlock across
/// process boundaries if a reader crashed mid-operation, so this is checked
/// at every segment construction rather than trusted at compile time.
pub fn assert_atomics_are_lock_free() {
    assert!(
        AtomicU64::new(0).is_lock_free(),
        "AtomicU64 is not lock-free on this platform; the ring buffer's \
         cross-process cursor/pid fields require lock-free atomics"
    );
}

/// `true` if `capacity` is a nonzero power of two.
pub const fn is_valid_capacity(capacity: u64) -> bool {
    capacity != 0 && capacity.is_power_of_two()
}

/// `true` if `max_slot_size` is a nonzero multiple of 16.
pub const fn is_valid_max_slot_size(max_slot_size: u64) -> bool {
    max_slot_size != 0 && max_slot_size % 16 == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capacity_validation() {
        assert!(is_valid_capacity(4096));
        assert!(!is_valid_capacity(0));
        assert!(!is_valid_capacity(4095));
    }

    #[test]
    fn max_slot_size_validation() {
        assert!(is_valid_max_slot_size(16));
        assert!(is_valid_max_slot_size(65536));
        assert!(!is_valid_max_slot_size(0));
        assert!(!is_valid_max_slot_size(17));
    }

    #[test]
    fn cursor_and_pid_atomics_are_lock_free_on_this_platform() {
        assert_atomics_are_lock_free();
    }

    #[test]
    fn round_up_16_matches_header_module() {
        assert_eq!(round_up_16(0), 0);
        assert_eq!(round_up_16(9), 16);
        assert_eq!(round_up_16(16), 16);
    }

    #[test]
    fn header_size_is_a_single_cache_line() {
        assert_eq!(std::mem::size_of::<SegmentHeader>(), 64);
    }
}
