//! Interrupt descriptor table
//!
//! Wires exactly one vector: the LAPIC periodic timer. Its handler drains
//! the software timer manager, sends EOI to the LAPIC, and falls through to
//! the task manager's context switch.

use crate::arch::x86_64::gdt::KERNEL_CS;
use crate::config::VECTOR_LAPIC_TIMER;
use core::arch::naked_asm;
use core::mem::size_of;

const IDT_ENTRIES: usize = 256;

#[repr(C, packed)]
#[derive(Clone, Copy)]
struct IdtEntry {
    offset_low: u16,
    selector: u16,
    ist: u8,
    type_attr: u8,
    offset_mid: u16,
    offset_high: u32,
    zero: u32,
}

impl IdtEntry {
    const fn missing() -> Self {
        Self {
            offset_low: 0,
            selector: 0,
            ist: 0,
            type_attr: 0,
            offset_mid: 0,
            offset_high: 0,
            zero: 0,
        }
    }

    fn set_handler(&mut self, handler: unsafe extern "C" fn()) {
        let addr = handler as usize as u64;
        self.offset_low = addr as u16;
        self.offset_mid = (addr >> 16) as u16;
        self.offset_high = (addr >> 32) as u32;
        self.selector = KERNEL_CS;
        self.ist = 0;
        // present, ring 0, 64-bit interrupt gate
        self.type_attr = 0x8E;
        self.zero = 0;
    }
}

#[repr(C, packed)]
struct IdtPointer {
    limit: u16,
    base: u64,
}

static mut IDT: [IdtEntry; IDT_ENTRIES] = [IdtEntry::missing(); IDT_ENTRIES];

/// Entry point for the LAPIC timer vector. Saves the full general-purpose
/// register set before calling into Rust so the handler is free to clobber
/// anything; `iretq` restores the interrupted context unless the scheduler
/// swaps it out from under us first.
#[unsafe(naked)]
unsafe extern "C" fn lapic_timer_entry() {
    naked_asm!(
        "push rax",
        "push rcx",
        "push rdx",
        "push rsi",
        "push rdi",
        "push r8",
        "push r9",
        "push r10",
        "push r11",
        "call {handler}",
        "pop r11",
        "pop r10",
        "pop r9",
        "pop r8",
        "pop rdi",
        "pop rsi",
        "pop rdx",
        "pop rcx",
        "pop rax",
        "iretq",
        handler = sym lapic_timer_handler,
    );
}

extern "C" fn lapic_timer_handler() {
    let wake_scheduler = crate::sched::timer::on_tick();
    crate::arch::x86_64::apic::notify_end_of_interrupt();
    if wake_scheduler {
        crate::sched::switch_task(false);
    }
}

/// Populate the IDT with the timer vector and load it.
///
/// # Safety
/// Must run once, after the GDT is in its final layout, before interrupts
/// are enabled.
pub unsafe fn init() {
    let entry = IdtEntry::missing();
    let mut table = [entry; IDT_ENTRIES];
    table[VECTOR_LAPIC_TIMER as usize].set_handler(lapic_timer_entry);
    core::ptr::addr_of_mut!(IDT).write(table);

    let ptr = IdtPointer {
        limit: (size_of::<[IdtEntry; IDT_ENTRIES]>() - 1) as u16,
        base: core::ptr::addr_of!(IDT) as u64,
    };
    core::arch::asm!("lidt [{}]", in(reg) &ptr, options(nostack));
}
