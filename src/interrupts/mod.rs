/*
 * Interrupt management
 *
 * The glue between the 8259 pair, the interrupt descriptor table and the
 * signal-style handler surface. One 16-entry disposition table decides
 * what an IRQ does; the shadow mask in the PIC driver decides whether it
 * is seen at all.
 *
 * Dispatch contract: the vector stub (or the hosted delivery path) calls
 * `dispatch_irq` with interrupts off. An ignored line is swallowed
 * without acknowledgement, a default line is acknowledged and dropped,
 * and a user handler runs before the acknowledgement. Handlers must not
 * block or yield; waking a thread is the intended amount of work.
 */

pub mod pic;
pub mod signals;

use core::cell::UnsafeCell;

use crate::arch::IntrGuard;

use pic::CascadedPics;
pub use pic::{MASTER_VECTOR_BASE, SLAVE_VECTOR_BASE};
pub use signals::{SigAction, SigHandler, SigHandlerFn, SigMaskHow, SigSet, sigaction, sigprocmask};

/// Number of IRQ lines behind the cascaded PICs.
pub const NUM_IRQS: usize = 16;

#[cfg(all(target_arch = "x86", target_os = "none"))]
type PortByte = crate::io::Pio<u8>;
#[cfg(not(all(target_arch = "x86", target_os = "none")))]
type PortByte = crate::arch::sim::SimPort;

struct PicCell(UnsafeCell<CascadedPics<PortByte>>);

// SAFETY: only touched inside interrupt-disabled sections on one CPU.
unsafe impl Sync for PicCell {}

#[cfg(all(target_arch = "x86", target_os = "none"))]
static PICS: PicCell = PicCell(UnsafeCell::new(CascadedPics::new(
    crate::io::Pio::new(pic::MASTER_COMMAND),
    crate::io::Pio::new(pic::MASTER_DATA),
    crate::io::Pio::new(pic::SLAVE_COMMAND),
    crate::io::Pio::new(pic::SLAVE_DATA),
    crate::io::Pio::new(0x80),
)));

#[cfg(not(all(target_arch = "x86", target_os = "none")))]
static PICS: PicCell = PicCell(UnsafeCell::new(CascadedPics::new(
    crate::arch::sim::SimPort::new(),
    crate::arch::sim::SimPort::new(),
    crate::arch::sim::SimPort::new(),
    crate::arch::sim::SimPort::new(),
    crate::arch::sim::SimPort::new(),
)));

struct HandlerCell(UnsafeCell<[SigHandler; NUM_IRQS]>);

// SAFETY: only touched inside interrupt-disabled sections on one CPU.
unsafe impl Sync for HandlerCell {}

static HANDLERS: HandlerCell = HandlerCell(UnsafeCell::new([SigHandler::Default; NUM_IRQS]));

/// Runs `f` on the PIC driver inside an interrupt-disabled section.
pub(crate) fn with_pics<R>(f: impl FnOnce(&mut CascadedPics<PortByte>) -> R) -> R {
    let _guard = IntrGuard::new();
    // SAFETY: interrupts are off and the kernel is uniprocessor, so this
    // is the only live reference.
    f(unsafe { &mut *PICS.0.get() })
}

/// Raw access to the disposition table. Callers hold interrupts off.
pub(crate) fn handler_table() -> *mut [SigHandler; NUM_IRQS] {
    HANDLERS.0.get()
}

/// Whether IRQ `irq` is currently open in the shadow mask.
///
/// Plain 16-bit read; safe to ask at any time on one CPU.
pub(crate) fn irq_unmasked(irq: u8) -> bool {
    let mask = unsafe { (*PICS.0.get()).shadow_mask() };
    mask & (1 << irq) == 0
}

/// Initializes the interrupt plumbing: PIC remap, exception and IRQ
/// vectors, and a fully masked controller. Boot opens individual lines
/// afterwards.
pub fn init() {
    with_pics(|pics| pics.init());

    #[cfg(all(target_arch = "x86", target_os = "none"))]
    crate::arch::x86::idt::init();

    // End fully masked no matter what ran above; opening a line is an
    // explicit decision of boot or sigaction.
    with_pics(|pics| pics.set_mask(0xFFFF));
    log::debug!("interrupt controller ready, all lines masked");
}

/// Routes IRQ `irq` to `handler` and opens the line.
pub fn set_irq(irq: u8, handler: SigHandlerFn) {
    assert!((irq as usize) < NUM_IRQS);
    {
        let _guard = IntrGuard::new();
        unsafe { (*handler_table())[irq as usize] = SigHandler::Handler(handler) };
    }
    unmask_irq(irq);
}

/// Opens IRQ line `irq`.
pub fn unmask_irq(irq: u8) {
    with_pics(|pics| pics.unmask_irq(irq));
}

/// Masks IRQ line `irq`.
pub fn mask_irq(irq: u8) {
    with_pics(|pics| pics.mask_irq(irq));
}

/// Reads the current shadow mask.
pub fn current_mask() -> u16 {
    with_pics(|pics| pics.shadow_mask())
}

/// Runs the disposition for IRQ `irq`. Called with interrupts off, from
/// the vector stub on hardware or the delivery path of the simulation.
pub fn dispatch_irq(irq: u8) {
    debug_assert!((irq as usize) < NUM_IRQS);
    let handler = unsafe { (*handler_table())[irq as usize] };
    match handler {
        SigHandler::Ignore => {}
        SigHandler::Default => with_pics(|pics| pics.eoi(irq)),
        SigHandler::Handler(f) => {
            f(irq);
            with_pics(|pics| pics.eoi(irq));
        }
    }
}
