//! Firmware-table reader
//!
//! Validates the RSDP handed off by the bootloader, walks the XSDT to find
//! the FADT, and exposes the ACPI PM timer described there. MADT/IOAPIC
//! enumeration is out of scope for this runtime: timer interrupts are
//! delivered entirely by the Local APIC.

use crate::io::port::in32;
use core::mem::size_of;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcpiError {
    BadRsdpSignature,
    BadRsdpChecksum,
    UnsupportedRsdpRevision,
    BadSdtChecksum,
    FadtNotFound,
}

#[repr(C, packed)]
struct RsdpExtended {
    signature: [u8; 8],
    checksum: u8,
    oem_id: [u8; 6],
    revision: u8,
    rsdt_address: u32,
    length: u32,
    xsdt_address: u64,
    extended_checksum: u8,
    reserved: [u8; 3],
}

#[repr(C, packed)]
#[derive(Clone, Copy)]
struct SdtHeader {
    signature: [u8; 4],
    length: u32,
    revision: u8,
    checksum: u8,
    oem_id: [u8; 6],
    oem_table_id: [u8; 8],
    oem_revision: u32,
    creator_id: u32,
    creator_revision: u32,
}

/// Fixed ACPI Description Table ("FACP" / FADT), fields relevant to the PM
/// timer only. Layout follows the ACPI spec's FADT up to `pm_tmr_blk` and
/// the `flags` field used to determine counter width.
#[repr(C, packed)]
struct Fadt {
    header: SdtHeader,
    firmware_ctrl: u32,
    dsdt: u32,
    reserved: u8,
    preferred_pm_profile: u8,
    sci_int: u16,
    smi_cmd: u32,
    acpi_enable: u8,
    acpi_disable: u8,
    s4bios_req: u8,
    pstate_cnt: u8,
    pm1a_evt_blk: u32,
    pm1b_evt_blk: u32,
    pm1a_cnt_blk: u32,
    pm1b_cnt_blk: u32,
    pm2_cnt_blk: u32,
    pm_tmr_blk: u32,
    gpe0_blk: u32,
    gpe1_blk: u32,
    pm1_evt_len: u8,
    pm1_cnt_len: u8,
    pm2_cnt_len: u8,
    pm_tmr_len: u8,
    gpe0_blk_len: u8,
    gpe1_blk_len: u8,
    gpe1_base: u8,
    cst_cnt: u8,
    p_lvl2_lat: u16,
    p_lvl3_lat: u16,
    flush_size: u16,
    flush_stride: u16,
    duty_offset: u8,
    duty_width: u8,
    day_alrm: u8,
    mon_alrm: u8,
    century: u8,
    iapc_boot_arch: u16,
    reserved2: u8,
    flags: u32,
}

/// Bit 8 of FADT.flags: set when the PM timer counter is 32-bit, clear
/// when it is the older 24-bit counter.
const FADT_FLAG_TMR_VAL_EXT: u32 = 1 << 8;

fn checksum_ok(bytes: &[u8]) -> bool {
    bytes.iter().fold(0u8, |acc, &b| acc.wrapping_add(b)) == 0
}

/// The ACPI PM timer, ready to be read or blocked on.
#[derive(Debug, Clone, Copy)]
pub struct PmTimer {
    port: u16,
    is_32bit: bool,
}

/// PM timer runs at a fixed 3.579545 MHz regardless of platform.
const PM_TIMER_FREQUENCY_HZ: u64 = 3_579_545;

impl PmTimer {
    fn counter_mask(&self) -> u32 {
        if self.is_32bit {
            u32::MAX
        } else {
            0x00FF_FFFF
        }
    }

    fn read_counter(&self) -> u32 {
        unsafe { in32(self.port) }
    }

    /// Busy-wait until at least `ms` milliseconds have elapsed, handling a
    /// single counter wraparound. Blocking, uninterruptible: fine for rare
    /// boot-time delays, never for the scheduler's tick path.
    pub fn wait_milliseconds(&self, ms: u64) {
        let target_ticks = (PM_TIMER_FREQUENCY_HZ * ms) / 1000;
        let mask = self.counter_mask();
        let start = self.read_counter();
        loop {
            let now = self.read_counter();
            let elapsed = if now >= start {
                (now - start) as u64
            } else {
                (mask as u64 - start as u64) + now as u64 + 1
            };
            if elapsed >= target_ticks {
                return;
            }
            core::hint::spin_loop();
        }
    }
}

/// Parsed ACPI facilities the core runtime needs.
pub struct AcpiTables {
    pub pm_timer: PmTimer,
}

/// Validate the RSDP and walk the XSDT to find the FADT.
///
/// # Safety
/// `rsdp_addr` must be the address of a valid RSDP as handed off by the
/// bootloader, mapped and readable at that address (Limine maps all of
/// physical memory into the higher half, so callers pass the HHDM virtual
/// address).
pub unsafe fn init(rsdp_addr: u64) -> Result<AcpiTables, AcpiError> {
    let rsdp = &*(rsdp_addr as *const RsdpExtended);

    if &rsdp.signature != b"RSD PTR " {
        return Err(AcpiError::BadRsdpSignature);
    }
    if rsdp.revision != 2 {
        return Err(AcpiError::UnsupportedRsdpRevision);
    }

    let base = rsdp_addr as *const u8;
    let first20 = core::slice::from_raw_parts(base, 20);
    if !checksum_ok(first20) {
        return Err(AcpiError::BadRsdpChecksum);
    }
    let first36 = core::slice::from_raw_parts(base, 36);
    if !checksum_ok(first36) {
        return Err(AcpiError::BadRsdpChecksum);
    }

    let xsdt_virt = crate::mm::phys_to_virt(rsdp.xsdt_address as usize);
    let xsdt_header = &*(xsdt_virt as *const SdtHeader);
    let xsdt_bytes =
        core::slice::from_raw_parts(xsdt_virt as *const u8, xsdt_header.length as usize);
    if !checksum_ok(xsdt_bytes) {
        return Err(AcpiError::BadSdtChecksum);
    }

    let entry_count = (xsdt_header.length as usize - size_of::<SdtHeader>()) / size_of::<u64>();
    let entries_ptr = (xsdt_virt as *const u8).add(size_of::<SdtHeader>()) as *const u64;

    for i in 0..entry_count {
        let entry_phys = entries_ptr.add(i).read_unaligned();
        let entry_addr = crate::mm::phys_to_virt(entry_phys as usize) as u64;
        let header = &*(entry_addr as *const SdtHeader);
        if &header.signature == b"FACP" {
            let fadt_bytes =
                core::slice::from_raw_parts(entry_addr as *const u8, header.length as usize);
            if !checksum_ok(fadt_bytes) {
                return Err(AcpiError::BadSdtChecksum);
            }
            let fadt = &*(entry_addr as *const Fadt);
            let pm_timer = PmTimer {
                port: fadt.pm_tmr_blk as u16,
                is_32bit: fadt.flags & FADT_FLAG_TMR_VAL_EXT != 0,
            };
            return Ok(AcpiTables { pm_timer });
        }
    }

    Err(AcpiError::FadtNotFound)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn checksum_of_zeroed_block_is_ok() {
        assert!(checksum_ok(&[0u8; 20]));
    }

    #[test]
    fn checksum_detects_corruption() {
        let mut bytes = [0u8; 20];
        bytes[0] = 1;
        assert!(!checksum_ok(&bytes));
    }

    #[test]
    fn pm_timer_24bit_wraparound_mask() {
        let timer = PmTimer { port: 0, is_32bit: false };
        assert_eq!(timer.counter_mask(), 0x00FF_FFFF);
    }

    #[test]
    fn pm_timer_32bit_mask() {
        let timer = PmTimer { port: 0, is_32bit: true };
        assert_eq!(timer.counter_mask(), u32::MAX);
    }
}
