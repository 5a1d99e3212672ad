/*
 * POSIX-shaped signal surface
 *
 * Hardware IRQ lines dressed up as signals: `sigaction` binds a handler
 * to a line, `sigprocmask` edits the PIC shadow mask. Handler bindings
 * use a tagged enum instead of the classic integer-sentinel function
 * pointers, but the semantics of SIG_DFL and SIG_IGN are kept: default
 * acknowledges and does nothing else, ignore does not even acknowledge.
 */

use crate::arch::IntrGuard;

use super::{NUM_IRQS, with_pics};

/// Signal set: bit n represents IRQ n.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SigSet(u32);

impl SigSet {
    /// The empty set.
    pub const fn empty() -> Self {
        SigSet(0)
    }

    pub const fn from_bits(bits: u32) -> Self {
        SigSet(bits)
    }

    pub const fn bits(self) -> u32 {
        self.0
    }

    /// Adds `signum`; a slave-side line drags the cascade in with it.
    pub fn add(&mut self, signum: u8) {
        self.0 |= 1 << signum;
        if signum >= 8 {
            self.0 |= 1 << super::pic::CASCADE_IRQ;
        }
    }

    /// Removes `signum`; a slave-side line drops the cascade with it.
    pub fn del(&mut self, signum: u8) {
        self.0 &= !(1 << signum);
        if signum >= 8 {
            self.0 &= !(1 << super::pic::CASCADE_IRQ);
        }
    }

    pub fn contains(self, signum: u8) -> bool {
        self.0 & (1 << signum) != 0
    }
}

/// How `sigprocmask` combines the given set with the current mask.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SigMaskHow {
    /// Mask the lines in the set, on top of what is already masked.
    Block,
    /// Unmask the lines in the set.
    Unblock,
    /// Replace the mask with the set.
    SetMask,
}

/// A user-supplied interrupt handler; receives the IRQ number.
pub type SigHandlerFn = fn(u8);

/// Disposition of one IRQ line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SigHandler {
    /// Acknowledge the controller, nothing more (SIG_DFL).
    Default,
    /// Swallow the interrupt without acknowledging it (SIG_IGN).
    Ignore,
    /// Run the given function, then acknowledge.
    Handler(SigHandlerFn),
}

/// Handler installation record.
#[derive(Debug, Clone, Copy)]
pub struct SigAction {
    pub handler: SigHandler,
    pub flags: u32,
    pub mask: SigSet,
}

impl SigAction {
    pub const fn new(handler: SigHandler) -> Self {
        SigAction {
            handler,
            flags: 0,
            mask: SigSet::empty(),
        }
    }
}

/// Edits the IRQ mask. `old`, when given, receives the pre-change mask.
///
/// The cascade bit is renormalized after every change, so a round trip
/// through `SetMask` restores any mask up to cascade normalization.
pub fn sigprocmask(how: SigMaskHow, set: Option<SigSet>, old: Option<&mut SigSet>) {
    with_pics(|pics| {
        if let Some(old) = old {
            *old = SigSet::from_bits(pics.shadow_mask() as u32);
        }
        if let Some(set) = set {
            let bits = set.bits() as u16;
            let current = pics.shadow_mask();
            let next = match how {
                SigMaskHow::Block => current | bits,
                SigMaskHow::Unblock => current & !bits,
                SigMaskHow::SetMask => bits,
            };
            pics.set_mask(next);
        }
    });
}

/// Binds `new` (or the default disposition, when `None`) to IRQ `signum`
/// and reports the previous binding through `old`.
///
/// The line is always unblocked afterwards, so installing a handler is
/// enough to start receiving the interrupt.
pub fn sigaction(signum: u8, new: Option<&SigAction>, old: Option<&mut SigAction>) {
    assert!(
        (signum as usize) < NUM_IRQS,
        "sigaction on nonexistent IRQ {}",
        signum
    );

    {
        let _guard = IntrGuard::new();
        let table = super::handler_table();
        if let Some(old) = old {
            old.handler = unsafe { (*table)[signum as usize] };
        }
        let handler = match new {
            Some(action) => action.handler,
            None => SigHandler::Default,
        };
        unsafe { (*table)[signum as usize] = handler };
    }

    let mut line = SigSet::empty();
    line.add(signum);
    sigprocmask(SigMaskHow::Unblock, Some(line), None);
}
