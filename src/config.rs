/// Configuration constants for the kernel core runtime

/// Software clock frequency driven by the LAPIC periodic timer.
pub const TIMER_FREQ: u64 = 100;

/// Ticks between scheduler-tick timer re-insertions.
/// Unusually long (1 second) relative to `TIMER_FREQ`; carried over as-is
/// from the upstream design and flagged for tuning in DESIGN.md.
pub const TASK_TIMER_PERIOD: u64 = TIMER_FREQ;

/// Sentinel value identifying the scheduler-tick timer entry among
/// ordinary software timers.
pub const TASK_TIMER_VALUE: i32 = i32::MIN;

/// Interrupt vector the LAPIC timer is programmed to deliver on each
/// periodic tick.
pub const VECTOR_LAPIC_TIMER: u8 = 0x30;

/// Size in bytes of a physical memory frame.
pub const BYTES_PER_FRAME: usize = 4096;

/// Upper bound on physical memory the bitmap frame allocator can track.
/// Implementation-chosen to keep the static bitmap a few hundred KiB.
pub const MAX_PHYSICAL_MEMORY_BYTES: usize = 4 * 1024 * 1024 * 1024;

/// Number of frames in `[0, MAX_PHYSICAL_MEMORY_BYTES)`.
pub const FRAME_COUNT: usize = MAX_PHYSICAL_MEMORY_BYTES / BYTES_PER_FRAME;

/// Frames reserved for the kernel heap at boot: 64 * 512 = 32768 (128 MiB).
pub const HEAP_FRAMES: usize = 64 * 512;

/// Default kernel task stack size in bytes.
pub const DEFAULT_STACK_BYTES: usize = 8192;
