/*
 * firn — cooperative kernel core for 32-bit x86
 *
 * This crate is the scheduling and interrupt heart of a small uniprocessor
 * operating system. It multiplexes the CPU across cooperatively scheduled
 * kernel threads, programs the cascaded 8259 PICs and the interrupt
 * descriptor table, and layers mutexes, condition variables and a
 * POSIX-shaped signal surface on top.
 *
 * Key properties:
 * - Single CPU, no preemption. Control changes hands only at yield, exit,
 *   block, contended lock or condition wait.
 * - Disabling interrupts is the one and only mutual-exclusion primitive
 *   for kernel state; there are no spinlocks around scheduler lists.
 * - Threads live in intrusive doubly-linked lists; scheduling never
 *   allocates.
 *
 * The architecture layer is swappable: bare-metal x86 uses real cli/sti,
 * port I/O and a hand-rolled stack switch, while every other target gets a
 * simulated interrupt flag and an x86_64 stack switch so the whole core
 * runs under `cargo test` on the host.
 */

#![no_std]
#![cfg_attr(
    all(target_arch = "x86", target_os = "none"),
    feature(abi_x86_interrupt, alloc_error_handler)
)]

extern crate alloc;

#[cfg(all(target_arch = "x86", target_os = "none"))]
extern crate rlibc;

#[cfg(test)]
extern crate std;

pub mod arch;
pub mod interrupts;
pub mod io;
pub mod logger;
pub mod memory;
pub mod scheduler;
pub mod sync;

#[cfg(all(target_arch = "x86", target_os = "none"))]
pub mod boot;

#[cfg(test)]
mod tests;
