/*
 * Wait queues
 *
 * A wait queue is a FIFO of threads parked on one synchronization object.
 * The queue entry lives on the waiter's own stack: the frame stays alive
 * for exactly as long as the thread is blocked, so no allocation is
 * needed to park a thread.
 */

use core::cell::UnsafeCell;
use core::mem::offset_of;

use crate::scheduler::{self, ThreadState};
use crate::scheduler::thread::Thread;
use crate::scheduler::{Link, List};

/// One parked thread; stack-resident for the duration of the block.
struct WaitNode {
    thread: *mut Thread,
    link: Link,
}

impl WaitNode {
    unsafe fn from_link(link: *mut Link) -> *mut WaitNode {
        unsafe { link.cast::<u8>().sub(offset_of!(WaitNode, link)).cast() }
    }
}

/// FIFO of threads blocked on one object.
pub(crate) struct WaitQueue {
    waiters: UnsafeCell<List>,
}

// SAFETY: the queue is only mutated inside interrupt-disabled sections on
// a single CPU.
unsafe impl Send for WaitQueue {}
unsafe impl Sync for WaitQueue {}

impl WaitQueue {
    pub const fn new() -> Self {
        WaitQueue {
            waiters: UnsafeCell::new(List::new()),
        }
    }

    /// Parks the calling thread at the tail and schedules away.
    ///
    /// Returns once somebody has woken the thread. Interrupt state on
    /// return is whatever the scheduler restored for this thread.
    ///
    /// # Safety
    /// Interrupts must be disabled by the caller and stay disabled from
    /// the moment the wake-up condition was checked, or the wake-up can
    /// be lost.
    pub unsafe fn wait(&self) {
        let mut node = WaitNode {
            thread: scheduler::current_ptr(),
            link: Link::new(),
        };
        unsafe {
            (*self.waiters.get()).push_back(&mut node.link);
            (*node.thread).status = ThreadState::Blocked;
        }
        scheduler::schedule();
    }

    /// Wakes the longest-waiting thread, if any. Returns whether one was
    /// woken.
    ///
    /// # Safety
    /// Interrupts must be disabled by the caller.
    pub unsafe fn wake_first(&self) -> bool {
        unsafe {
            match (*self.waiters.get()).pop_front() {
                None => false,
                Some(link) => {
                    let node = WaitNode::from_link(link);
                    let t = (*node).thread;
                    assert!(
                        (*t).status == ThreadState::Blocked,
                        "wait queue held a thread that was not blocked"
                    );
                    scheduler::make_runnable(t);
                    true
                }
            }
        }
    }

    /// Wakes every parked thread, preserving FIFO order on the ready
    /// queue.
    ///
    /// # Safety
    /// Interrupts must be disabled by the caller.
    pub unsafe fn wake_all(&self) {
        unsafe { while self.wake_first() {} }
    }

    pub fn is_empty(&self) -> bool {
        let _guard = crate::arch::IntrGuard::new();
        unsafe { (*self.waiters.get()).is_empty() }
    }
}
