/*
 * Hosted stack switch (x86_64)
 *
 * Same contract as the kernel primitive: save callee-saved registers,
 * publish the old stack pointer, adopt the new one, pop, ret. The sysv64
 * ABI passes arguments in registers, so a primed stack routes the first
 * `ret` through a small shim that pops the entry function and argument
 * into argument registers before tail-jumping to the trampoline.
 */

#[cfg(target_arch = "x86_64")]
use core::arch::naked_asm;

use crate::scheduler::thread::ThreadFn;

/// Suspends the current context and resumes the one saved at `new_sp`.
///
/// # Safety
/// `new_sp` must be a stack pointer previously produced by this function
/// or by [`prime_stack`]; `old_sp` must be valid to store through.
#[cfg(target_arch = "x86_64")]
#[unsafe(naked)]
pub unsafe extern "C" fn switch_stacks(new_sp: *mut usize, old_sp: *mut *mut usize) {
    naked_asm!(
        "push rbp",
        "push rbx",
        "push r12",
        "push r13",
        "push r14",
        "push r15",
        "mov [rsi], rsp",
        "mov rsp, rdi",
        "pop r15",
        "pop r14",
        "pop r13",
        "pop r12",
        "pop rbx",
        "pop rbp",
        "ret",
    )
}

/// First `ret` target of a primed stack: moves the entry function and its
/// argument from the stack into argument registers.
#[cfg(target_arch = "x86_64")]
#[unsafe(naked)]
unsafe extern "C" fn thread_start() {
    naked_asm!(
        "pop rdi", // entry function
        "pop rsi", // argument
        "jmp {trampoline}",
        trampoline = sym crate::scheduler::thread::thread_trampoline,
    )
}

/// Lays out a brand-new thread's stack; returns the initial saved stack
/// pointer.
///
/// # Safety
/// `top` must be the exclusive, 16-byte aligned top of a live stack
/// allocation with room for the primed frame.
#[cfg(target_arch = "x86_64")]
pub unsafe fn prime_stack(top: *mut usize, func: ThreadFn, arg: *mut ()) -> *mut usize {
    let start: unsafe extern "C" fn() = thread_start;
    // Start one slot below the aligned top so the trampoline sees the
    // stack alignment the ABI promises after a call.
    let mut sp = unsafe { top.sub(1) };
    let mut push = |value: usize| unsafe {
        sp = sp.sub(1);
        sp.write(value);
    };
    push(arg as usize);
    push(func as usize);
    push(start as usize); // ret target of the first switch
    for _ in 0..6 {
        push(0); // rbp, rbx, r12-r15
    }
    sp
}

#[cfg(not(target_arch = "x86_64"))]
pub unsafe fn switch_stacks(_new_sp: *mut usize, _old_sp: *mut *mut usize) {
    unimplemented!("stack switching is only simulated on x86_64 hosts");
}

#[cfg(not(target_arch = "x86_64"))]
pub unsafe fn prime_stack(_top: *mut usize, _func: ThreadFn, _arg: *mut ()) -> *mut usize {
    unimplemented!("stack switching is only simulated on x86_64 hosts");
}
