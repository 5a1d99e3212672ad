/*
 * Hosted simulation of the machine
 *
 * Compiled for every target that is not the bare-metal kernel. The
 * interrupt flag becomes a process-global bool and interrupt lines are
 * raised with `trigger_irq`: a raised line is dispatched immediately when
 * the flag is on and the line is unmasked, otherwise it stays pending and
 * is delivered the moment the flag turns on again — the same visible
 * behavior as the 8259 holding a request until the CPU will take it.
 *
 * Context switching is real: the x86_64 flavor of the same
 * push-registers/swap-sp primitive the kernel target uses.
 */

mod switch;

use core::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use heapless::Deque;
use spin::Mutex;

use crate::arch::IntrState;

pub use switch::{prime_stack, switch_stacks};

/// Byte port that remembers the last write: the simulation's stand-in
/// for a PIC command or data register.
pub struct SimPort {
    last: u8,
}

impl SimPort {
    pub const fn new() -> Self {
        SimPort { last: 0 }
    }
}

impl crate::io::Io for SimPort {
    type Value = u8;

    fn read(&self) -> u8 {
        self.last
    }

    fn write(&mut self, value: u8) {
        self.last = value;
    }
}

/// Simulated EFLAGS.IF.
static IF_ENABLED: AtomicBool = AtomicBool::new(true);

/// Fake timestamp counter.
static TSC: AtomicU64 = AtomicU64::new(0);

/// Interrupt lines raised while the flag was off or the line masked.
static PENDING: Mutex<Deque<u8, 16>> = Mutex::new(Deque::new());

/// Masks interrupts, returning the previous state.
pub fn interrupts_disable() -> IntrState {
    IntrState::new(IF_ENABLED.swap(false, Ordering::SeqCst))
}

/// Unmasks interrupts and delivers anything that came due meanwhile.
pub fn interrupts_enable() {
    IF_ENABLED.store(true, Ordering::SeqCst);
    drain_pending();
}

/// Re-enables interrupts iff `state` says they were enabled.
pub fn interrupts_restore(state: IntrState) {
    if state.was_enabled() {
        interrupts_enable();
    }
}

/// Whether simulated interrupts are currently enabled.
pub fn interrupts_enabled() -> bool {
    IF_ENABLED.load(Ordering::SeqCst)
}

/// The simulated halt cannot sleep; it delivers due interrupts instead.
pub fn halt() {
    drain_pending();
    core::hint::spin_loop();
}

/// Monotonic stand-in for rdtsc.
pub fn timestamp() -> u64 {
    TSC.fetch_add(1, Ordering::SeqCst) + 1
}

/// Raises interrupt line `irq`.
///
/// Dispatched on the spot when interrupts are on and the line is
/// unmasked; queued otherwise.
pub fn trigger_irq(irq: u8) {
    if interrupts_enabled() && crate::interrupts::irq_unmasked(irq) {
        deliver(irq);
    } else {
        PENDING
            .lock()
            .push_back(irq)
            .expect("pending interrupt queue overflow");
    }
}

/// Runs the handler path for one line with the flag off, the way an
/// interrupt gate would.
fn deliver(irq: u8) {
    let was = IF_ENABLED.swap(false, Ordering::SeqCst);
    crate::interrupts::dispatch_irq(irq);
    IF_ENABLED.store(was, Ordering::SeqCst);
}

/// Delivers every pending line that is deliverable right now; masked
/// lines stay queued.
fn drain_pending() {
    let mut remaining = PENDING.lock().len();
    while remaining > 0 && interrupts_enabled() {
        remaining -= 1;
        let irq = match PENDING.lock().pop_front() {
            Some(irq) => irq,
            None => break,
        };
        if crate::interrupts::irq_unmasked(irq) {
            deliver(irq);
        } else {
            let _ = PENDING.lock().push_back(irq);
        }
    }
}
