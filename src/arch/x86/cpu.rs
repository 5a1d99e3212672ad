/*
 * CPU primitives
 *
 * Interrupt-flag save/restore, halt, the timestamp counter and control
 * register access. The save/restore pair is the atomicity primitive the
 * whole kernel leans on: disable returns a token carrying the prior IF
 * bit, restore re-enables iff the token says so.
 */

use core::arch::asm;

use crate::arch::IntrState;

/// IF bit in EFLAGS.
const EFLAGS_IF: u32 = 1 << 9;

/// Masks maskable interrupts, returning the previous state.
#[inline]
pub fn interrupts_disable() -> IntrState {
    let eflags: u32;
    unsafe {
        asm!(
            "pushfd",
            "cli",
            "pop {}",
            out(reg) eflags,
            options(nomem, preserves_flags),
        );
    }
    IntrState::new(eflags & EFLAGS_IF != 0)
}

/// Unmasks maskable interrupts.
#[inline]
pub fn interrupts_enable() {
    unsafe {
        asm!("sti", "nop", options(nomem, nostack, preserves_flags));
    }
}

/// Re-enables interrupts iff `state` says they were enabled.
#[inline]
pub fn interrupts_restore(state: IntrState) {
    if state.was_enabled() {
        interrupts_enable();
    }
}

/// Whether maskable interrupts are currently enabled.
#[inline]
pub fn interrupts_enabled() -> bool {
    let eflags: u32;
    unsafe {
        asm!("pushfd", "pop {}", out(reg) eflags, options(nomem, preserves_flags));
    }
    eflags & EFLAGS_IF != 0
}

/// Stops the CPU until the next interrupt.
#[inline]
pub fn halt() {
    unsafe {
        asm!("hlt", options(nomem, nostack, preserves_flags));
    }
}

/// Reads the timestamp counter.
#[inline]
pub fn timestamp() -> u64 {
    let lo: u32;
    let hi: u32;
    unsafe {
        asm!("rdtsc", out("eax") lo, out("edx") hi, options(nomem, nostack));
    }
    ((hi as u64) << 32) | lo as u64
}

macro_rules! cr_read {
    ($name:ident, $reg:literal) => {
        #[inline]
        pub fn $name() -> u32 {
            let value: u32;
            unsafe {
                asm!(concat!("mov {}, ", $reg), out(reg) value, options(nomem, nostack));
            }
            value
        }
    };
}

macro_rules! cr_write {
    ($name:ident, $reg:literal) => {
        /// # Safety
        /// Rewriting a control register can change paging, caching or
        /// protection for every byte of the running kernel.
        #[inline]
        pub unsafe fn $name(value: u32) {
            unsafe {
                asm!(concat!("mov ", $reg, ", {}"), in(reg) value, options(nomem, nostack));
            }
        }
    };
}

cr_read!(read_cr0, "cr0");
cr_read!(read_cr2, "cr2");
cr_read!(read_cr3, "cr3");
cr_read!(read_cr4, "cr4");
cr_write!(write_cr0, "cr0");
cr_write!(write_cr3, "cr3");
cr_write!(write_cr4, "cr4");
