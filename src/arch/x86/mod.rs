//! Bare-metal 32-bit x86: real interrupt-flag control, port I/O backed
//! interrupt controller, hand-rolled IDT and stack switching.

mod cpu;
pub mod idt;
mod switch;

pub use cpu::{
    halt, interrupts_disable, interrupts_enable, interrupts_enabled, interrupts_restore,
    read_cr0, read_cr2, read_cr3, read_cr4, timestamp, write_cr0, write_cr3, write_cr4,
};
pub use switch::{prime_stack, switch_stacks};
