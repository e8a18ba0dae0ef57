// Memory Management Module
// Coordinates the bitmap frame allocator and the kernel heap allocator

pub mod allocator;
pub mod frame;
pub mod pmm;

use core::sync::atomic::{AtomicU64, Ordering};

/// Limine's higher-half direct map offset; physical memory is mapped
/// starting here for the kernel's entire run.
static HHDM_OFFSET: AtomicU64 = AtomicU64::new(0);

pub fn set_hhdm_offset(offset: u64) {
    HHDM_OFFSET.store(offset, Ordering::Relaxed);
}

pub fn phys_to_virt(phys: usize) -> usize {
    phys + HHDM_OFFSET.load(Ordering::Relaxed) as usize
}
