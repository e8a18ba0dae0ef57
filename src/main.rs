#![no_std]
#![no_main]

extern crate alloc;

mod config;
mod error;
mod log;
mod message;
mod panic;
mod serial;
mod sync;
mod io;
mod mm;
mod arch;
mod sched;

use limine::memory_map::EntryType;
use limine::request::{HhdmRequest, MemoryMapRequest, RsdpRequest};

#[used]
#[link_section = ".requests"]
static RSDP_REQUEST: RsdpRequest = RsdpRequest::new();

#[used]
#[link_section = ".requests"]
static HHDM_REQUEST: HhdmRequest = HhdmRequest::new();

#[used]
#[link_section = ".requests"]
static MEMORY_MAP_REQUEST: MemoryMapRequest = MemoryMapRequest::new();

/// Find the first usable region in the bootloader's memory map large
/// enough to hold the kernel heap.
fn find_heap_region(entries: &[&limine::memory_map::Entry]) -> usize {
    let needed = (config::HEAP_FRAMES * config::BYTES_PER_FRAME) as u64;
    entries
        .iter()
        .find(|e| e.entry_type == EntryType::USABLE && e.length >= needed)
        .map(|e| e.base as usize)
        .unwrap_or_else(|| {
            crate::log_error!("boot", "no usable memory region large enough for the kernel heap");
            panic!("no usable memory region large enough for the kernel heap");
        })
}

extern "C" fn idle_task(_id: u64, _data: u64) {
    loop {
        unsafe {
            core::arch::asm!("sti; hlt");
        }
    }
}

/// Kernel entry point called by the Limine bootloader.
///
/// Boot sequence: read the firmware tables (C1), block briefly on the
/// ACPI PM timer to prove it works (C2), calibrate and arm the LAPIC
/// periodic timer against it (C3), bring up the software timer manager
/// (C4), then the task manager (C5) with a single idle task, and finally
/// enable interrupts to let the system run.
#[unsafe(no_mangle)]
pub extern "C" fn _start() -> ! {
    serial::SERIAL.lock().init();
    crate::serial_println!("booting core runtime");

    let hhdm = HHDM_REQUEST.get_response().unwrap_or_else(|| {
        crate::log_error!("boot", "no HHDM response from bootloader");
        panic!("no HHDM response from bootloader");
    });
    mm::set_hhdm_offset(hhdm.offset());

    let memory_map = MEMORY_MAP_REQUEST.get_response().unwrap_or_else(|| {
        crate::log_error!("boot", "no memory map response from bootloader");
        panic!("no memory map response from bootloader");
    });
    mm::pmm::set_memory_range(
        mm::frame::FrameId(0),
        mm::frame::FrameId(config::FRAME_COUNT),
    );
    let heap_phys_start = find_heap_region(memory_map.entries());
    let (heap_phys_start, heap_phys_end) = mm::pmm::initialize_heap(heap_phys_start);
    let heap_start = mm::phys_to_virt(heap_phys_start);
    let heap_end = mm::phys_to_virt(heap_phys_end);
    mm::allocator::init_allocator(heap_start, heap_end - heap_start);
    crate::serial_println!("heap initialized: {:#x}-{:#x}", heap_start, heap_end);

    let rsdp = RSDP_REQUEST.get_response().unwrap_or_else(|| {
        crate::log_error!("boot", "no RSDP response from bootloader");
        panic!("no RSDP response from bootloader");
    });
    let rsdp_addr = rsdp.address() as u64;

    let acpi = match unsafe { arch::x86_64::acpi::init(rsdp_addr) } {
        Ok(tables) => tables,
        Err(e) => {
            crate::log_error!("boot", "failed to parse ACPI firmware tables: {:?}", e);
            panic!("failed to parse ACPI firmware tables: {:?}", e);
        }
    };
    crate::serial_println!("ACPI PM timer found");

    acpi.pm_timer.wait_milliseconds(10);
    crate::serial_println!("PM timer wait confirmed working");

    arch::x86_64::apic::init_periodic_timer(&acpi.pm_timer, config::TIMER_FREQ);
    crate::serial_println!("LAPIC periodic timer armed at {} Hz", config::TIMER_FREQ);

    sched::timer::init();
    unsafe { arch::x86_64::idt::init() };

    sched::init(idle_task);

    unsafe {
        core::arch::asm!("sti");
    }

    loop {
        unsafe {
            core::arch::asm!("hlt");
        }
    }
}
