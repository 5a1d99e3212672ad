/*
 * Condition variable
 *
 * A bare wait queue with no state of its own: waiters must re-check their
 * predicate after waking, and a signal with nobody waiting is lost.
 */

use crate::arch::IntrGuard;

use super::{Mutex, WaitQueue};

pub struct Condvar {
    waiters: WaitQueue,
}

impl Condvar {
    pub const fn new() -> Self {
        Condvar {
            waiters: WaitQueue::new(),
        }
    }

    /// Atomically releases `mutex` and parks until signalled, then
    /// reacquires `mutex` before returning.
    ///
    /// Must be called with `mutex` held by the calling thread. The
    /// release-and-park pair cannot be split by another thread because
    /// interrupts are off across it.
    pub fn wait(&self, mutex: &Mutex) {
        let _guard = IntrGuard::new();
        mutex.unlock_unchecked();
        unsafe { self.waiters.wait() };
        mutex.lock();
    }

    /// Wakes the longest-waiting thread, if any.
    pub fn signal(&self) {
        let _guard = IntrGuard::new();
        unsafe { self.waiters.wake_first() };
    }

    /// Wakes every waiting thread.
    pub fn broadcast(&self) {
        let _guard = IntrGuard::new();
        unsafe { self.waiters.wake_all() };
    }
}

impl Default for Condvar {
    fn default() -> Self {
        Condvar::new()
    }
}

impl Drop for Condvar {
    fn drop(&mut self) {
        assert!(
            self.waiters.is_empty(),
            "condition variable destroyed with threads still waiting"
        );
    }
}
