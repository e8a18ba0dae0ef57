//! Kernel panic handler
//!
//! Dumps the panic message and location, a register snapshot (CR2, RIP,
//! RSP) and a best-effort stack trace walked via the RBP chain, all to the
//! serial console. Guards against a panic occurring while already
//! panicking.

use core::panic::PanicInfo;
use core::sync::atomic::{AtomicBool, Ordering};

static PANIC_IN_PROGRESS: AtomicBool = AtomicBool::new(false);

#[panic_handler]
fn panic(info: &PanicInfo) -> ! {
    use crate::serial_println;

    if PANIC_IN_PROGRESS.swap(true, Ordering::SeqCst) {
        serial_println!("RECURSIVE PANIC DETECTED! Halting immediately.");
        loop {
            unsafe {
                core::arch::asm!("cli; hlt");
            }
        }
    }

    unsafe {
        core::arch::asm!("cli");
    }

    serial_println!(
        "================================================================================"
    );
    serial_println!("KERNEL PANIC");
    serial_println!(
        "================================================================================"
    );

    if let Some(location) = info.location() {
        serial_println!(
            "Location: {}:{}:{}",
            location.file(),
            location.line(),
            location.column()
        );
    }
    serial_println!("Message: {}", info.message());

    serial_println!(
        "--------------------------------------------------------------------------------"
    );
    serial_println!("Register State:");

    let cr2: u64;
    unsafe {
        core::arch::asm!("mov {}, cr2", out(reg) cr2);
    }
    serial_println!("  CR2 (fault addr): {:#018x}", cr2);

    let rip: u64;
    let rsp: u64;
    unsafe {
        core::arch::asm!(
            "lea {}, [rip]",
            "mov {}, rsp",
            out(reg) rip,
            out(reg) rsp,
        );
    }
    serial_println!("  RIP: {:#018x}", rip);
    serial_println!("  RSP: {:#018x}", rsp);

    serial_println!(
        "--------------------------------------------------------------------------------"
    );
    serial_println!("Stack Trace:");
    unsafe {
        let mut rbp: *const u64;
        core::arch::asm!("mov {}, rbp", out(reg) rbp);

        for i in 0..10 {
            if rbp.is_null() || (rbp as u64) < 0x1000 {
                break;
            }
            let ret_addr = rbp.offset(1).read();
            serial_println!("  #{}: {:#018x}", i, ret_addr);
            rbp = (*rbp) as *const u64;
        }
    }

    serial_println!(
        "================================================================================"
    );
    serial_println!("System halted. Please reboot.");
    serial_println!(
        "================================================================================"
    );

    loop {
        unsafe {
            core::arch::asm!("hlt");
        }
    }
}
