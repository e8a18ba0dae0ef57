//! Task context and context switching
//!
//! [`TaskContext`] holds everything [`switch_context`] needs to suspend one
//! task and resume another: control registers, the full general-purpose
//! register file, and an FXSAVE area for FPU/SSE state. The switch itself
//! restores the new task's register file and then executes a single
//! `iretq` built from a frame staged on the outgoing stack, so the final
//! stack swap and the `rip`/`cs`/`rflags` restore happen as one atomic
//! step instead of needing a spare register to hold them across the swap.

use core::arch::naked_asm;
use core::mem::offset_of;

/// Saved CPU state for a single task, including FPU/SSE state.
///
/// `#[repr(C, align(16))]`: `fxsave_area` must sit at a 16-byte aligned
/// offset for `FXSAVE`/`FXRSTOR`, which fault on misaligned operands.
#[repr(C, align(16))]
#[derive(Clone, Copy)]
pub struct TaskContext {
    pub cr3: u64,
    pub rflags: u64,
    pub cs: u64,
    pub ss: u64,
    pub rsp: u64,
    pub rip: u64,
    pub rax: u64,
    pub rbx: u64,
    pub rcx: u64,
    pub rdx: u64,
    pub rdi: u64,
    pub rsi: u64,
    pub rbp: u64,
    pub r8: u64,
    pub r9: u64,
    pub r10: u64,
    pub r11: u64,
    pub r12: u64,
    pub r13: u64,
    pub r14: u64,
    pub r15: u64,
    _pad: u64,
    pub fxsave_area: [u8; 512],
}

/// Default MXCSR value with every SSE exception masked, written into a
/// fresh context's `fxsave_area` at the byte offset FXSAVE documents for
/// the MXCSR field (24).
const MXCSR_ALL_MASKED: u32 = 0x1F80;
const FXSAVE_MXCSR_OFFSET: usize = 24;

impl TaskContext {
    pub const fn zeroed() -> Self {
        Self {
            cr3: 0,
            rflags: 0,
            cs: 0,
            ss: 0,
            rsp: 0,
            rip: 0,
            rax: 0,
            rbx: 0,
            rcx: 0,
            rdx: 0,
            rdi: 0,
            rsi: 0,
            rbp: 0,
            r8: 0,
            r9: 0,
            r10: 0,
            r11: 0,
            r12: 0,
            r13: 0,
            r14: 0,
            r15: 0,
            _pad: 0,
            fxsave_area: [0; 512],
        }
    }

    /// Initialize a context for a brand-new task about to start executing
    /// at `entry` on `stack_top`, running in ring 0 with interrupts enabled
    /// and the current address space. `id` and `data` are passed through as
    /// the first two System V argument registers so `entry` can read its
    /// own task ID and an optional opaque argument without any other
    /// handshake with the task manager.
    pub fn init(
        &mut self,
        entry: u64,
        stack_top: u64,
        kernel_cs: u16,
        kernel_ss: u16,
        id: u64,
        data: u64,
    ) {
        *self = Self::zeroed();
        self.rip = entry;
        // 16-byte align, then back off 8 bytes to simulate the
        // return-address slot a `call` would have pushed — the SysV
        // misalignment a function body expects at entry.
        self.rsp = (stack_top & !0xF) - 8;
        self.cs = kernel_cs as u64;
        self.ss = kernel_ss as u64;
        self.rflags = 0x202; // IF set, reserved bit 1 set
        self.cr3 = unsafe { read_cr3() };
        self.rdi = id;
        self.rsi = data;
        self.fxsave_area[FXSAVE_MXCSR_OFFSET..FXSAVE_MXCSR_OFFSET + 4]
            .copy_from_slice(&MXCSR_ALL_MASKED.to_le_bytes());
    }
}

unsafe fn read_cr3() -> u64 {
    let value: u64;
    core::arch::asm!("mov {}, cr3", out(reg) value, options(nomem, nostack, preserves_flags));
    value
}

/// Save the caller's state into `*current`, then load and jump into
/// `*next`. When some other task later switches back into `current`, this
/// function returns to its caller as if it were a normal call.
///
/// # Safety
/// Both pointers must reference live, properly initialized `TaskContext`
/// values; `next` must not alias `current`.
#[unsafe(naked)]
pub unsafe extern "C" fn switch_context(next: *const TaskContext, current: *mut TaskContext) {
    naked_asm!(
        // rdi = next, rsi = current (System V ABI)
        "mov [rsi + {off_rax}], rax",
        "mov [rsi + {off_rbx}], rbx",
        "mov [rsi + {off_rcx}], rcx",
        "mov [rsi + {off_rdx}], rdx",
        "mov [rsi + {off_rdi}], rdi",
        "mov [rsi + {off_rbp}], rbp",
        "mov [rsi + {off_r8}],  r8",
        "mov [rsi + {off_r9}],  r9",
        "mov [rsi + {off_r10}], r10",
        "mov [rsi + {off_r11}], r11",
        "mov [rsi + {off_r12}], r12",
        "mov [rsi + {off_r13}], r13",
        "mov [rsi + {off_r14}], r14",
        "mov [rsi + {off_r15}], r15",
        "fxsave [rsi + {off_fxsave}]",

        "mov rax, cr3",
        "mov [rsi + {off_cr3}], rax",
        "mov [rsi + {off_rsi}], rsi",

        "mov rax, cs",
        "mov [rsi + {off_cs}], rax",
        "mov rax, ss",
        "mov [rsi + {off_ss}], rax",
        "mov [rsi + {off_rsp}], rsp",

        "pushfq",
        "pop rax",
        "mov [rsi + {off_rflags}], rax",

        "lea rax, [rip + 2f]",
        "mov [rsi + {off_rip}], rax",

        // Stage the iretq frame for `next` on the (about to be abandoned)
        // current stack: ss, rsp, rflags, cs, rip, pushed so rip ends up
        // on top.
        "mov rax, [rdi + {off_ss}]",
        "push rax",
        "mov rax, [rdi + {off_rsp}]",
        "push rax",
        "mov rax, [rdi + {off_rflags}]",
        "push rax",
        "mov rax, [rdi + {off_cs}]",
        "push rax",
        "mov rax, [rdi + {off_rip}]",
        "push rax",

        "mov rax, [rdi + {off_cr3}]",
        "mov cr3, rax",
        "fxrstor [rdi + {off_fxsave}]",

        "mov rax, [rdi + {off_rax}]",
        "mov rbx, [rdi + {off_rbx}]",
        "mov rcx, [rdi + {off_rcx}]",
        "mov rdx, [rdi + {off_rdx}]",
        "mov rbp, [rdi + {off_rbp}]",
        "mov rsi, [rdi + {off_rsi}]",
        "mov r8,  [rdi + {off_r8}]",
        "mov r9,  [rdi + {off_r9}]",
        "mov r10, [rdi + {off_r10}]",
        "mov r11, [rdi + {off_r11}]",
        "mov r12, [rdi + {off_r12}]",
        "mov r13, [rdi + {off_r13}]",
        "mov r14, [rdi + {off_r14}]",
        "mov r15, [rdi + {off_r15}]",
        "mov rdi, [rdi + {off_rdi}]",

        "iretq",

        "2:",
        "ret",

        off_rax = const offset_of!(TaskContext, rax),
        off_rbx = const offset_of!(TaskContext, rbx),
        off_rcx = const offset_of!(TaskContext, rcx),
        off_rdx = const offset_of!(TaskContext, rdx),
        off_rdi = const offset_of!(TaskContext, rdi),
        off_rsi = const offset_of!(TaskContext, rsi),
        off_rbp = const offset_of!(TaskContext, rbp),
        off_r8  = const offset_of!(TaskContext, r8),
        off_r9  = const offset_of!(TaskContext, r9),
        off_r10 = const offset_of!(TaskContext, r10),
        off_r11 = const offset_of!(TaskContext, r11),
        off_r12 = const offset_of!(TaskContext, r12),
        off_r13 = const offset_of!(TaskContext, r13),
        off_r14 = const offset_of!(TaskContext, r14),
        off_r15 = const offset_of!(TaskContext, r15),
        off_cr3 = const offset_of!(TaskContext, cr3),
        off_rflags = const offset_of!(TaskContext, rflags),
        off_cs = const offset_of!(TaskContext, cs),
        off_ss = const offset_of!(TaskContext, ss),
        off_rsp = const offset_of!(TaskContext, rsp),
        off_rip = const offset_of!(TaskContext, rip),
        off_fxsave = const offset_of!(TaskContext, fxsave_area),
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn context_is_16_byte_aligned_and_fxsave_area_too() {
        assert_eq!(core::mem::align_of::<TaskContext>(), 16);
        assert_eq!(offset_of!(TaskContext, fxsave_area) % 16, 0);
    }

    #[test]
    fn init_sets_mxcsr_all_masked() {
        let mut ctx = TaskContext::zeroed();
        ctx.init(0x1000, 0x2000, 0x28, 0x30, 7, 0);
        let bytes = &ctx.fxsave_area[FXSAVE_MXCSR_OFFSET..FXSAVE_MXCSR_OFFSET + 4];
        assert_eq!(u32::from_le_bytes(bytes.try_into().unwrap()), MXCSR_ALL_MASKED);
    }

    #[test]
    fn init_sets_entry_and_stack() {
        let mut ctx = TaskContext::zeroed();
        ctx.init(0x1000, 0x2000, 0x28, 0x30, 7, 0);
        assert_eq!(ctx.rip, 0x1000);
        // 0x2000 is already 16-byte aligned; init backs off 8 bytes to
        // simulate the return-address slot a `call` would have pushed.
        assert_eq!(ctx.rsp, 0x1FF8);
        assert_eq!(ctx.cs, 0x28);
        assert_eq!(ctx.ss, 0x30);
        assert_eq!(ctx.rflags & 0x200, 0x200);
    }

    #[test]
    fn init_masks_unaligned_stack_top() {
        let mut ctx = TaskContext::zeroed();
        ctx.init(0x1000, 0x2007, 0x28, 0x30, 0, 0);
        assert_eq!(ctx.rsp, 0x2000 - 8);
        assert_eq!(ctx.rsp % 16, 8);
    }

    #[test]
    fn init_passes_id_and_data_as_first_two_args() {
        let mut ctx = TaskContext::zeroed();
        ctx.init(0x1000, 0x2000, 0x28, 0x30, 42, 0xdead);
        assert_eq!(ctx.rdi, 42);
        assert_eq!(ctx.rsi, 0xdead);
    }
}
