/*
 * Interrupt Descriptor Table
 *
 * 256 hand-rolled 8-byte gates. CPU exceptions (vectors 0-16) get trap
 * gates so the interrupt flag survives into the handler; hardware IRQs
 * and everything else get interrupt gates, which mask further interrupts
 * on entry.
 *
 * Exceptions are fatal here: there is no user space to punish, so the
 * handlers print what they know, walk the frame-pointer chain and park
 * the CPU. IRQ vectors route into the disposition table owned by the
 * interrupts module.
 */

use core::arch::asm;
use core::mem::size_of;

use lazy_static::lazy_static;

use crate::interrupts::MASTER_VECTOR_BASE;

/// Code segment selector the boot stub installs.
const KERNEL_CODE_SELECTOR: u16 = 0x08;

/// Gate flavor: interrupt gates clear IF on entry, trap gates keep it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateKind {
    Interrupt,
    Trap,
}

impl GateKind {
    const fn flags(self) -> u16 {
        // present, DPL 0, 32-bit gate
        match self {
            GateKind::Interrupt => 0x8E00,
            GateKind::Trap => 0x8F00,
        }
    }
}

#[repr(C)]
#[derive(Clone, Copy)]
struct GateDescriptor {
    offset_lo: u16,
    selector: u16,
    flags: u16,
    offset_hi: u16,
}

impl GateDescriptor {
    const fn missing() -> Self {
        GateDescriptor {
            offset_lo: 0,
            selector: 0,
            flags: 0,
            offset_hi: 0,
        }
    }

    fn new(handler: *const (), kind: GateKind) -> Self {
        let addr = handler as usize as u32;
        GateDescriptor {
            offset_lo: addr as u16,
            selector: KERNEL_CODE_SELECTOR,
            flags: kind.flags(),
            offset_hi: (addr >> 16) as u16,
        }
    }
}

/// The whole descriptor table.
#[repr(C, align(8))]
pub struct IdtTable {
    gates: [GateDescriptor; 256],
}

impl IdtTable {
    fn new() -> Self {
        IdtTable {
            gates: [GateDescriptor::missing(); 256],
        }
    }

    fn set_vector(&mut self, vector: usize, handler: *const (), kind: GateKind) {
        self.gates[vector] = GateDescriptor::new(handler, kind);
    }
}

#[repr(C, packed)]
struct IdtPointer {
    limit: u16,
    base: u32,
}

/// What the CPU pushed on the way into a handler.
#[repr(C)]
pub struct ExceptionFrame {
    pub eip: u32,
    pub cs: u32,
    pub eflags: u32,
}

macro_rules! fatal_exception {
    ($name:ident, $message:expr) => {
        extern "x86-interrupt" fn $name(_frame: ExceptionFrame) {
            log::error!($message);
            stack_trace();
            halt_forever();
        }
    };
}

fatal_exception!(divide_error, "Divide by zero");
fatal_exception!(debug_exception, "Debug exception");
fatal_exception!(nmi, "Reserved exception");
fatal_exception!(breakpoint, "Unexpected breakpoint");
fatal_exception!(overflow, "Overflow error");
fatal_exception!(bounds_check, "Bounds check error");
fatal_exception!(invalid_opcode, "Invalid opcode");
fatal_exception!(no_coprocessor, "Coprocessor not available");
fatal_exception!(double_fault, "Double fault");
fatal_exception!(coprocessor_overrun, "Coprocessor segment overflow");
fatal_exception!(invalid_tss, "Invalid TSS");
fatal_exception!(segment_not_present, "Segment not present");
fatal_exception!(stack_exception, "Stack exception");
fatal_exception!(unknown_exception, "Unknown exception");
fatal_exception!(coprocessor_error, "Coprocessor error");

extern "x86-interrupt" fn general_protection_fault(frame: ExceptionFrame, error_code: u32) {
    log::error!("General protection fault (error code {:#06x})", error_code);
    log::error!("EFLAGS: {:08X}", frame.eflags);
    log::error!("CS: {:02X}", frame.cs);
    log::error!("EIP: {:08X}", frame.eip);
    stack_trace();
    halt_forever();
}

extern "x86-interrupt" fn page_fault(frame: ExceptionFrame, error_code: u32) {
    log::error!("Page fault (error code {:#06x})", error_code);
    log::error!("EFLAGS: {:08X}", frame.eflags);
    log::error!("CS: {:02X}", frame.cs);
    log::error!("EIP: {:08X}", frame.eip);
    log::error!("CR2: {:08X}", super::read_cr2());
    stack_trace();
    halt_forever();
}

/// Gate for every vector nothing claims: acknowledge the master PIC in
/// case a remapped line ended up here, then carry on.
extern "x86-interrupt" fn unhandled_interrupt(_frame: ExceptionFrame) {
    crate::interrupts::with_pics(|pics| pics.eoi(0));
}

macro_rules! irq_stub {
    ($name:ident, $irq:expr) => {
        extern "x86-interrupt" fn $name(_frame: ExceptionFrame) {
            crate::interrupts::dispatch_irq($irq);
        }
    };
}

irq_stub!(irq0, 0);
irq_stub!(irq1, 1);
irq_stub!(irq2, 2);
irq_stub!(irq3, 3);
irq_stub!(irq4, 4);
irq_stub!(irq5, 5);
irq_stub!(irq6, 6);
irq_stub!(irq7, 7);
irq_stub!(irq8, 8);
irq_stub!(irq9, 9);
irq_stub!(irq10, 10);
irq_stub!(irq11, 11);
irq_stub!(irq12, 12);
irq_stub!(irq13, 13);
irq_stub!(irq14, 14);
irq_stub!(irq15, 15);

type IrqStubFn = extern "x86-interrupt" fn(ExceptionFrame);

const IRQ_STUBS: [IrqStubFn; 16] = [
    irq0, irq1, irq2, irq3, irq4, irq5, irq6, irq7, irq8, irq9, irq10, irq11, irq12, irq13,
    irq14, irq15,
];

lazy_static! {
    static ref IDT: IdtTable = {
        let mut idt = IdtTable::new();

        // CPU exceptions, trap gates so IF is preserved.
        idt.set_vector(0, divide_error as *const (), GateKind::Trap);
        idt.set_vector(1, debug_exception as *const (), GateKind::Trap);
        idt.set_vector(2, nmi as *const (), GateKind::Trap);
        idt.set_vector(3, breakpoint as *const (), GateKind::Trap);
        idt.set_vector(4, overflow as *const (), GateKind::Trap);
        idt.set_vector(5, bounds_check as *const (), GateKind::Trap);
        idt.set_vector(6, invalid_opcode as *const (), GateKind::Trap);
        idt.set_vector(7, no_coprocessor as *const (), GateKind::Trap);
        idt.set_vector(8, double_fault as *const (), GateKind::Trap);
        idt.set_vector(9, coprocessor_overrun as *const (), GateKind::Trap);
        idt.set_vector(10, invalid_tss as *const (), GateKind::Trap);
        idt.set_vector(11, segment_not_present as *const (), GateKind::Trap);
        idt.set_vector(12, stack_exception as *const (), GateKind::Trap);
        idt.set_vector(13, general_protection_fault as *const (), GateKind::Trap);
        idt.set_vector(14, page_fault as *const (), GateKind::Trap);
        idt.set_vector(15, unknown_exception as *const (), GateKind::Trap);
        idt.set_vector(16, coprocessor_error as *const (), GateKind::Trap);

        // Every vector nothing claims gets the acknowledging default gate.
        for vector in 17..256 {
            idt.set_vector(vector, unhandled_interrupt as *const (), GateKind::Interrupt);
        }

        // Hardware IRQs; both bases resolve to 32 + irq after remapping.
        for (irq, stub) in IRQ_STUBS.iter().enumerate() {
            idt.set_vector(
                MASTER_VECTOR_BASE as usize + irq,
                *stub as *const (),
                GateKind::Interrupt,
            );
        }

        idt
    };
}

/// Loads the table into the CPU.
pub fn init() {
    let pointer = IdtPointer {
        limit: (size_of::<IdtTable>() - 1) as u16,
        base: &*IDT as *const IdtTable as u32,
    };
    unsafe {
        asm!("lidt [{}]", in(reg) &raw const pointer, options(readonly, nostack, preserves_flags));
    }
    log::debug!("IDT loaded");
}

#[repr(C)]
struct StackFrame {
    next: *const StackFrame,
    return_addr: u32,
}

/// Prints the saved frame-pointer chain, at most 50 frames deep, giving
/// up as soon as the chain leaves plausible kernel addresses.
fn stack_trace() {
    let mut frame: *const StackFrame;
    unsafe {
        asm!("mov {}, ebp", out(reg) frame, options(nomem, nostack, preserves_flags));
    }

    let mut depth = 0;
    while !frame.is_null() && depth < 50 {
        unsafe {
            log::error!("{:08x} [{:08x}]", (*frame).return_addr, frame as usize);
            frame = (*frame).next;
        }
        depth += 1;
        let addr = frame as usize;
        if addr < 0x1000 || addr >= 0xFFFF_F000 {
            break;
        }
    }
}

/// Parks the CPU for good.
fn halt_forever() -> ! {
    loop {
        unsafe {
            asm!("cli", "hlt", options(nomem, nostack, preserves_flags));
        }
    }
}
