//! Global descriptor table selectors
//!
//! Limine hands off with its own GDT already installed (kernel code at
//! 0x28, kernel data at 0x30); the core runtime runs entirely in ring 0
//! with no user segments, so it reuses those selectors rather than
//! building its own GDT.

pub const KERNEL_CS: u16 = 0x28;
pub const KERNEL_SS: u16 = 0x30;
