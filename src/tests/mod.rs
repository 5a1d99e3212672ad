/*
 * End-to-end scheduler scenarios
 *
 * These run the real kernel core on the host: real stack switches, real
 * FIFO queues, simulated interrupt flag. The scheduler is a process-wide
 * singleton, so every scenario serializes on one gate and leaves the
 * system quiescent (only kernel, idle and reaper threads alive) before
 * letting the next one in.
 */

use core::ptr;
use core::sync::atomic::{AtomicBool, AtomicPtr, AtomicUsize, Ordering};

use std::sync::{Mutex as StdMutex, Once};

use crate::arch::{self, sim};
use crate::interrupts::{self, SigAction, SigHandler, SigMaskHow, SigSet, sigaction, sigprocmask};
use crate::scheduler::{self, ThreadHandle};
use crate::scheduler::thread::Thread;
use crate::sync::{Condvar, Mutex};

static GATE: StdMutex<()> = StdMutex::new(());
static INIT: Once = Once::new();

/// Threads alive when nothing else is running: kernel, idle, reaper.
const BASELINE_THREADS: usize = 3;

fn with_kernel<F: FnOnce()>(f: F) {
    let _gate = GATE.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    INIT.call_once(scheduler::init);
    f();
    drain();
    assert_eq!(scheduler::thread_count(), BASELINE_THREADS);
    // Leave every line masked for the next scenario.
    sigprocmask(SigMaskHow::SetMask, Some(SigSet::from_bits(0xFFFF)), None);
}

/// Lets queued threads run out and the reaper collect the dead.
fn drain() {
    for _ in 0..8 {
        scheduler::yield_now();
    }
}

// ---------------------------------------------------------------------------
// Thread lifecycle

#[test]
fn spawned_thread_runs_and_is_reaped() {
    static RAN: AtomicBool = AtomicBool::new(false);

    fn body(_arg: *mut ()) -> *mut () {
        RAN.store(true, Ordering::SeqCst);
        ptr::null_mut()
    }

    with_kernel(|| {
        RAN.store(false, Ordering::SeqCst);
        scheduler::spawn(body, ptr::null_mut());
        assert_eq!(scheduler::thread_count(), BASELINE_THREADS + 1);
        drain();
        assert!(RAN.load(Ordering::SeqCst));
        assert_eq!(scheduler::thread_count(), BASELINE_THREADS);
    });
}

#[test]
fn immediate_exit_reaches_the_reaper() {
    fn body(_arg: *mut ()) -> *mut () {
        scheduler::exit(ptr::null_mut());
    }

    with_kernel(|| {
        scheduler::spawn(body, ptr::null_mut());
        drain();
        assert_eq!(scheduler::thread_count(), BASELINE_THREADS);
    });
}

#[test]
fn thread_ids_are_unique_and_increasing() {
    fn body(_arg: *mut ()) -> *mut () {
        ptr::null_mut()
    }

    with_kernel(|| {
        let a = scheduler::spawn(body, ptr::null_mut());
        let b = scheduler::spawn(body, ptr::null_mut());
        assert!(a.id() < b.id());
        assert_ne!(a.id(), b.id());
    });
}

#[test]
fn yield_keeps_fifo_order() {
    static ORDER: [AtomicUsize; 2] = [AtomicUsize::new(0), AtomicUsize::new(0)];
    static SLOT: AtomicUsize = AtomicUsize::new(0);

    fn body(arg: *mut ()) -> *mut () {
        let tag = arg as usize;
        ORDER[SLOT.fetch_add(1, Ordering::SeqCst)].store(tag, Ordering::SeqCst);
        ptr::null_mut()
    }

    with_kernel(|| {
        SLOT.store(0, Ordering::SeqCst);
        scheduler::spawn(body, 1 as *mut ());
        scheduler::spawn(body, 2 as *mut ());
        drain();
        assert_eq!(ORDER[0].load(Ordering::SeqCst), 1);
        assert_eq!(ORDER[1].load(Ordering::SeqCst), 2);
    });
}

#[test]
fn tls_slot_is_per_thread() {
    static OBSERVED: AtomicUsize = AtomicUsize::new(0);

    fn body(_arg: *mut ()) -> *mut () {
        assert!(scheduler::get_specific().is_null());
        scheduler::set_specific(0x51 as *mut ());
        scheduler::yield_now();
        OBSERVED.store(scheduler::get_specific() as usize, Ordering::SeqCst);
        ptr::null_mut()
    }

    with_kernel(|| {
        scheduler::set_specific(0xA5 as *mut ());
        scheduler::spawn(body, ptr::null_mut());
        drain();
        assert_eq!(OBSERVED.load(Ordering::SeqCst), 0x51);
        assert_eq!(scheduler::get_specific() as usize, 0xA5);
        scheduler::set_specific(ptr::null_mut());
    });
}

// ---------------------------------------------------------------------------
// Mutex and condition variable

#[test]
fn producer_consumer_in_order() {
    static M: Mutex = Mutex::new();
    static NONEMPTY: Condvar = Condvar::new();
    static EMPTY: Condvar = Condvar::new();
    static SLOT: AtomicUsize = AtomicUsize::new(0);
    static FULL: AtomicBool = AtomicBool::new(false);
    static RECEIVED: [AtomicUsize; 10] = [const { AtomicUsize::new(0) }; 10];
    static COUNT: AtomicUsize = AtomicUsize::new(0);

    fn producer(_arg: *mut ()) -> *mut () {
        for value in 1..=10usize {
            M.lock();
            while FULL.load(Ordering::SeqCst) {
                EMPTY.wait(&M);
            }
            SLOT.store(value, Ordering::SeqCst);
            FULL.store(true, Ordering::SeqCst);
            NONEMPTY.signal();
            M.unlock();
        }
        ptr::null_mut()
    }

    fn consumer(_arg: *mut ()) -> *mut () {
        for _ in 0..10 {
            M.lock();
            while !FULL.load(Ordering::SeqCst) {
                NONEMPTY.wait(&M);
            }
            let value = SLOT.load(Ordering::SeqCst);
            FULL.store(false, Ordering::SeqCst);
            EMPTY.signal();
            M.unlock();
            RECEIVED[COUNT.fetch_add(1, Ordering::SeqCst)].store(value, Ordering::SeqCst);
        }
        ptr::null_mut()
    }

    with_kernel(|| {
        COUNT.store(0, Ordering::SeqCst);
        scheduler::spawn(producer, ptr::null_mut());
        scheduler::spawn(consumer, ptr::null_mut());

        for _ in 0..1000 {
            if COUNT.load(Ordering::SeqCst) == 10 {
                break;
            }
            scheduler::yield_now();
        }

        assert_eq!(COUNT.load(Ordering::SeqCst), 10);
        for (i, slot) in RECEIVED.iter().enumerate() {
            assert_eq!(slot.load(Ordering::SeqCst), i + 1);
        }
    });
}

#[test]
fn contended_mutex_is_strict_fifo() {
    static M: Mutex = Mutex::new();
    static ORDER: [AtomicUsize; 5] = [const { AtomicUsize::new(0) }; 5];
    static SLOT: AtomicUsize = AtomicUsize::new(0);

    fn worker(arg: *mut ()) -> *mut () {
        let tag = arg as usize;
        M.lock();
        ORDER[SLOT.fetch_add(1, Ordering::SeqCst)].store(tag, Ordering::SeqCst);
        M.unlock();
        ptr::null_mut()
    }

    with_kernel(|| {
        SLOT.store(0, Ordering::SeqCst);
        M.lock();
        for tag in 1..=5usize {
            scheduler::spawn(worker, tag as *mut ());
        }
        // Let every worker reach the lock and park, in spawn order.
        scheduler::yield_now();
        M.unlock();

        for _ in 0..100 {
            if SLOT.load(Ordering::SeqCst) == 5 {
                break;
            }
            scheduler::yield_now();
        }

        let order: std::vec::Vec<usize> =
            ORDER.iter().map(|s| s.load(Ordering::SeqCst)).collect();
        assert_eq!(order, std::vec![1, 2, 3, 4, 5]);
    });
}

#[test]
fn try_lock_reports_contention() {
    static M: Mutex = Mutex::new();

    with_kernel(|| {
        assert!(M.try_lock());
        // Owner is set, so a second attempt fails without blocking.
        assert!(!M.try_lock());
        M.unlock();
        assert!(M.try_lock());
        M.unlock();
    });
}

#[test]
fn lock_unlock_round_trip_leaves_mutex_fresh() {
    with_kernel(|| {
        let m = Mutex::new();
        m.lock();
        m.unlock();
        assert!(m.try_lock());
        m.unlock();
        // Dropping here asserts the queue is empty and nobody owns it.
    });
}

#[test]
fn broadcast_on_empty_condvar_is_noop() {
    with_kernel(|| {
        let cv = Condvar::new();
        cv.broadcast();
        cv.signal();
    });
}

#[test]
#[should_panic(expected = "destroyed while held")]
fn destroying_a_held_mutex_asserts() {
    with_kernel(|| {
        let m = Mutex::new();
        m.lock();
        drop(m);
    });
}

#[test]
#[should_panic(expected = "recursive lock")]
fn recursive_lock_asserts() {
    // Static so the unwind does not re-assert in the destructor.
    static M: Mutex = Mutex::new();

    with_kernel(|| {
        M.lock();
        M.lock();
    });
}

// ---------------------------------------------------------------------------
// Interrupt flag and signal surface

#[test]
fn interrupt_state_round_trips() {
    with_kernel(|| {
        assert!(arch::interrupts_enabled());
        arch::interrupts_restore(arch::interrupts_disable());
        assert!(arch::interrupts_enabled());

        // A nested disable still restores to disabled.
        let outer = arch::interrupts_disable();
        arch::interrupts_restore(arch::interrupts_disable());
        assert!(!arch::interrupts_enabled());
        arch::interrupts_restore(outer);
        assert!(arch::interrupts_enabled());
    });
}

#[test]
fn sigprocmask_round_trips_modulo_cascade() {
    with_kernel(|| {
        let mut old = SigSet::empty();
        sigprocmask(SigMaskHow::SetMask, Some(SigSet::from_bits(0xFFFF)), Some(&mut old));

        sigprocmask(SigMaskHow::SetMask, Some(SigSet::from_bits(0xDEAD)), None);
        sigprocmask(SigMaskHow::SetMask, Some(old), None);

        // 0xFFFF is already cascade-normalized, so it comes back exactly.
        assert_eq!(interrupts::current_mask(), 0xFFFF);
    });
}

#[test]
fn cascade_mirrors_slave_lines() {
    with_kernel(|| {
        interrupts::unmask_irq(12);
        let mask = interrupts::current_mask();
        assert_eq!(mask & (1 << 12), 0, "line 12 should be open");
        assert_eq!(mask & (1 << 2), 0, "cascade should follow line 12");

        interrupts::unmask_irq(10);
        interrupts::mask_irq(12);
        let mask = interrupts::current_mask();
        assert_ne!(mask & (1 << 12), 0, "line 12 closed again");
        assert_eq!(mask & (1 << 2), 0, "cascade stays open for line 10");

        interrupts::mask_irq(10);
        let mask = interrupts::current_mask();
        assert_ne!(mask & (1 << 2), 0, "cascade closes with the last line");
    });
}

#[test]
fn sigaction_reports_prior_disposition() {
    fn handler(_irq: u8) {}

    with_kernel(|| {
        let mut old = SigAction::new(SigHandler::Ignore);
        sigaction(5, Some(&SigAction::new(SigHandler::Handler(handler))), Some(&mut old));
        assert_eq!(old.handler, SigHandler::Default);

        sigaction(5, None, Some(&mut old));
        assert_eq!(old.handler, SigHandler::Handler(handler));

        sigaction(5, None, Some(&mut old));
        assert_eq!(old.handler, SigHandler::Default);

        // Installing always unblocks the line.
        assert_eq!(interrupts::current_mask() & (1 << 5), 0);
    });
}

#[test]
fn irq_handler_wakes_blocked_thread() {
    static COUNTER: AtomicUsize = AtomicUsize::new(0);
    static TARGET: AtomicPtr<Thread> = AtomicPtr::new(ptr::null_mut());
    static DONE: AtomicBool = AtomicBool::new(false);

    fn on_irq1(irq: u8) {
        assert_eq!(irq, 1);
        COUNTER.fetch_add(1, Ordering::SeqCst);
        let target = TARGET.load(Ordering::SeqCst);
        scheduler::wake(unsafe { ThreadHandle::from_ptr(target) });
    }

    fn blocker(_arg: *mut ()) -> *mut () {
        TARGET.store(scheduler::current().as_ptr(), Ordering::SeqCst);
        scheduler::block_current();
        DONE.store(true, Ordering::SeqCst);
        ptr::null_mut()
    }

    with_kernel(|| {
        COUNTER.store(0, Ordering::SeqCst);
        DONE.store(false, Ordering::SeqCst);

        scheduler::spawn(blocker, ptr::null_mut());
        scheduler::yield_now();
        assert!(!TARGET.load(Ordering::SeqCst).is_null());

        sigaction(1, Some(&SigAction::new(SigHandler::Handler(on_irq1))), None);
        sim::trigger_irq(1);

        assert_eq!(COUNTER.load(Ordering::SeqCst), 1);
        assert!(!DONE.load(Ordering::SeqCst));

        scheduler::yield_now();
        assert!(DONE.load(Ordering::SeqCst));
    });
}

#[test]
fn idle_thread_bridges_to_the_next_interrupt() {
    static TICKS: AtomicUsize = AtomicUsize::new(0);
    static TARGET: AtomicPtr<Thread> = AtomicPtr::new(ptr::null_mut());

    fn on_timer(_irq: u8) {
        TICKS.fetch_add(1, Ordering::SeqCst);
        let target = TARGET.load(Ordering::SeqCst);
        scheduler::wake(unsafe { ThreadHandle::from_ptr(target) });
    }

    with_kernel(|| {
        TICKS.store(0, Ordering::SeqCst);
        TARGET.store(scheduler::current().as_ptr(), Ordering::SeqCst);

        sigaction(0, Some(&SigAction::new(SigHandler::Handler(on_timer))), None);

        // Queue the tick while interrupts are off, then go to sleep with
        // nothing else runnable: only the idle thread can take over, and
        // only the pending interrupt can bring us back.
        let state = arch::interrupts_disable();
        sim::trigger_irq(0);
        assert_eq!(TICKS.load(Ordering::SeqCst), 0);
        scheduler::block_current();
        arch::interrupts_restore(state);

        assert_eq!(TICKS.load(Ordering::SeqCst), 1);
    });
}

#[test]
fn ignored_irq_is_swallowed() {
    static COUNTER: AtomicUsize = AtomicUsize::new(0);

    fn on_irq3(_irq: u8) {
        COUNTER.fetch_add(1, Ordering::SeqCst);
    }

    with_kernel(|| {
        COUNTER.store(0, Ordering::SeqCst);
        sigaction(3, Some(&SigAction::new(SigHandler::Ignore)), None);
        sim::trigger_irq(3);
        assert_eq!(COUNTER.load(Ordering::SeqCst), 0);

        sigaction(3, Some(&SigAction::new(SigHandler::Handler(on_irq3))), None);
        sim::trigger_irq(3);
        assert_eq!(COUNTER.load(Ordering::SeqCst), 1);

        sigaction(3, None, None);
    });
}
