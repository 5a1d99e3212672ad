/*
 * Mutex
 *
 * Non-recursive sleeping mutex. Contended lockers park FIFO on the wait
 * queue; unlock wakes the head waiter. A woken waiter re-checks the owner
 * and so races with any fresh locker that slips in while the owner slot
 * is empty — wake-up is a hint, not a handoff.
 */

use core::cell::UnsafeCell;
use core::ptr;

use crate::arch::IntrGuard;
use crate::scheduler::{self, thread::Thread};

use super::WaitQueue;

pub struct Mutex {
    owner: UnsafeCell<*mut Thread>,
    waiters: WaitQueue,
}

// SAFETY: owner is only touched inside interrupt-disabled sections on a
// single CPU.
unsafe impl Send for Mutex {}
unsafe impl Sync for Mutex {}

impl Mutex {
    pub const fn new() -> Self {
        Mutex {
            owner: UnsafeCell::new(ptr::null_mut()),
            waiters: WaitQueue::new(),
        }
    }

    /// Acquires the mutex, blocking while another thread owns it.
    ///
    /// Panics if the calling thread already owns it: recursive locking is
    /// a bug, not a feature.
    pub fn lock(&self) {
        let _guard = IntrGuard::new();
        let me = scheduler::current_ptr();
        unsafe {
            assert!(
                *self.owner.get() != me,
                "recursive lock of a mutex already held by this thread"
            );
            while !(*self.owner.get()).is_null() {
                self.waiters.wait();
            }
            *self.owner.get() = me;
        }
    }

    /// Releases the mutex and wakes the longest waiter.
    ///
    /// Panics if the calling thread is not the owner.
    pub fn unlock(&self) {
        let _guard = IntrGuard::new();
        unsafe {
            assert!(
                *self.owner.get() == scheduler::current_ptr(),
                "unlock of a mutex not held by this thread"
            );
            self.waiters.wake_first();
            *self.owner.get() = ptr::null_mut();
        }
    }

    /// Acquires the mutex iff it is free right now. Returns whether it
    /// was acquired. Never blocks; this is the kernel's only reportable
    /// soft failure.
    pub fn try_lock(&self) -> bool {
        let _guard = IntrGuard::new();
        unsafe {
            if (*self.owner.get()).is_null() {
                *self.owner.get() = scheduler::current_ptr();
                true
            } else {
                false
            }
        }
    }

    /// `lock` without the recursion assertion.
    ///
    /// For scheduler and condition-variable internals where the full
    /// check would trip over itself.
    pub fn lock_unchecked(&self) {
        let _guard = IntrGuard::new();
        unsafe {
            while !(*self.owner.get()).is_null() {
                self.waiters.wait();
            }
            *self.owner.get() = scheduler::current_ptr();
        }
    }

    /// `unlock` without the ownership assertion.
    pub fn unlock_unchecked(&self) {
        let _guard = IntrGuard::new();
        unsafe {
            self.waiters.wake_first();
            *self.owner.get() = ptr::null_mut();
        }
    }
}

impl Default for Mutex {
    fn default() -> Self {
        Mutex::new()
    }
}

impl Drop for Mutex {
    fn drop(&mut self) {
        assert!(
            self.waiters.is_empty(),
            "mutex destroyed with threads still waiting"
        );
        assert!(
            unsafe { (*self.owner.get()).is_null() },
            "mutex destroyed while held"
        );
    }
}
