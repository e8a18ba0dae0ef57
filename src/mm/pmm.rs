//! Bitmap physical frame allocator
//!
//! One bit per frame in a word-addressed bitmap, restricted to an
//! allocatable `[range_begin, range_end)` window set once at boot from the
//! bootloader's memory map. Allocation is a deterministic first-fit scan
//! forward from `range_begin`; there is no wraparound and no attempt to
//! detect double-frees or out-of-range frees, both of which are accepted
//! silently rather than treated as errors.

use crate::config::{BYTES_PER_FRAME, FRAME_COUNT, HEAP_FRAMES};
use crate::mm::frame::FrameId;
use crate::sync::IrqSpinLock;

const BITS_PER_WORD: usize = 64;
const WORD_COUNT: usize = (FRAME_COUNT + BITS_PER_WORD - 1) / BITS_PER_WORD;

pub struct BitmapMemoryManager {
    alloc_map: [u64; WORD_COUNT],
    range_begin: FrameId,
    range_end: FrameId,
}

impl BitmapMemoryManager {
    const fn new() -> Self {
        Self {
            alloc_map: [0; WORD_COUNT],
            range_begin: FrameId(0),
            range_end: FrameId(FRAME_COUNT),
        }
    }

    fn get_bit(&self, frame: FrameId) -> bool {
        let i = frame.id();
        (self.alloc_map[i / BITS_PER_WORD] >> (i % BITS_PER_WORD)) & 1 != 0
    }

    fn set_bit(&mut self, frame: FrameId, allocated: bool) {
        let i = frame.id();
        let mask = 1u64 << (i % BITS_PER_WORD);
        if allocated {
            self.alloc_map[i / BITS_PER_WORD] |= mask;
        } else {
            self.alloc_map[i / BITS_PER_WORD] &= !mask;
        }
    }

    /// Restrict allocation to `[begin, end)`. Frames outside this window
    /// are never handed out even if their bit is clear.
    pub fn set_memory_range(&mut self, begin: FrameId, end: FrameId) {
        self.range_begin = begin;
        self.range_end = end;
    }

    pub fn mark_allocated(&mut self, start: FrameId, num_frames: usize) {
        for i in 0..num_frames {
            self.set_bit(FrameId(start.id() + i), true);
        }
    }

    /// First-fit scan forward from `range_begin`. `Allocate(0)` is a no-op
    /// that succeeds with `range_begin` and marks nothing.
    pub fn allocate(&mut self, num_frames: usize) -> Option<FrameId> {
        if num_frames == 0 {
            return Some(self.range_begin);
        }

        let mut start = self.range_begin.id();
        let end = self.range_end.id();

        while start + num_frames <= end {
            let mut free_run = 0;
            while free_run < num_frames && !self.get_bit(FrameId(start + free_run)) {
                free_run += 1;
            }
            if free_run == num_frames {
                let result = FrameId(start);
                self.mark_allocated(result, num_frames);
                return Some(result);
            }
            start += free_run + 1;
        }
        None
    }

    /// Mark `num_frames` starting at `start` free. Frames already free
    /// (double-free) or outside the allocatable range are silently
    /// ignored rather than treated as an error.
    pub fn free(&mut self, start: FrameId, num_frames: usize) {
        for i in 0..num_frames {
            let frame = FrameId(start.id() + i);
            if frame.id() < self.range_begin.id() || frame.id() >= self.range_end.id() {
                continue;
            }
            self.set_bit(frame, false);
        }
    }

    /// Carve `HEAP_FRAMES` out of the usable region starting at
    /// `heap_phys_start` and mark them allocated, so the global allocator
    /// can claim them as its arena. Called once, early in boot, after
    /// `heap_phys_start` has been chosen from the bootloader's memory map.
    pub fn initialize_heap(&mut self, heap_phys_start: usize) -> (usize, usize) {
        let start_frame = FrameId::from_phys_addr(heap_phys_start);
        self.mark_allocated(start_frame, HEAP_FRAMES);
        let heap_end = heap_phys_start + HEAP_FRAMES * BYTES_PER_FRAME;
        (heap_phys_start, heap_end)
    }
}

static MEMORY_MANAGER: IrqSpinLock<BitmapMemoryManager> =
    IrqSpinLock::new(BitmapMemoryManager::new());

pub fn set_memory_range(begin: FrameId, end: FrameId) {
    MEMORY_MANAGER.lock().set_memory_range(begin, end);
}

pub fn mark_allocated(start: FrameId, num_frames: usize) {
    MEMORY_MANAGER.lock().mark_allocated(start, num_frames);
}

pub fn allocate(num_frames: usize) -> Option<FrameId> {
    MEMORY_MANAGER.lock().allocate(num_frames)
}

pub fn free(start: FrameId, num_frames: usize) {
    MEMORY_MANAGER.lock().free(start, num_frames);
}

pub fn initialize_heap(heap_phys_start: usize) -> (usize, usize) {
    MEMORY_MANAGER.lock().initialize_heap(heap_phys_start)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocate_zero_frames_is_noop_success() {
        let mut mgr = BitmapMemoryManager::new();
        mgr.set_memory_range(FrameId(0), FrameId(100));
        assert_eq!(mgr.allocate(0), Some(FrameId(0)));
        assert!(!mgr.get_bit(FrameId(0)));
    }

    #[test]
    fn first_fit_scans_forward() {
        let mut mgr = BitmapMemoryManager::new();
        mgr.set_memory_range(FrameId(0), FrameId(100));
        mgr.mark_allocated(FrameId(0), 5);
        let a = mgr.allocate(3).unwrap();
        assert_eq!(a, FrameId(5));
    }

    #[test]
    fn allocate_fails_when_range_exhausted() {
        let mut mgr = BitmapMemoryManager::new();
        mgr.set_memory_range(FrameId(0), FrameId(4));
        mgr.mark_allocated(FrameId(0), 4);
        assert_eq!(mgr.allocate(1), None);
    }

    #[test]
    fn double_free_is_silently_accepted() {
        let mut mgr = BitmapMemoryManager::new();
        mgr.set_memory_range(FrameId(0), FrameId(100));
        mgr.free(FrameId(10), 1);
        mgr.free(FrameId(10), 1);
        assert!(!mgr.get_bit(FrameId(10)));
    }

    #[test]
    fn out_of_range_free_is_silently_accepted() {
        let mut mgr = BitmapMemoryManager::new();
        mgr.set_memory_range(FrameId(10), FrameId(20));
        mgr.free(FrameId(5), 1);
    }

    #[test]
    fn freed_frame_is_reused() {
        let mut mgr = BitmapMemoryManager::new();
        mgr.set_memory_range(FrameId(0), FrameId(10));
        let a = mgr.allocate(2).unwrap();
        mgr.free(a, 2);
        let b = mgr.allocate(2).unwrap();
        assert_eq!(a, b);
    }
}
