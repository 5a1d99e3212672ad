/*
 * Cooperative Scheduler
 *
 * One CPU, no preemption. The running thread keeps the processor until it
 * yields, exits, or blocks; hardware interrupt handlers are the only
 * asynchronous activity and they may do no more than wake a thread.
 *
 * SCHEDULING MODEL:
 * - The ready queue is strict FIFO. The idle thread is never on it; it is
 *   chosen only when the queue is empty.
 * - The thread that booted the system is published as the kernel thread
 *   (id 0) at init; it owns no stack record because it runs on the boot
 *   stack.
 * - Dead threads park on the zombie list until the reaper thread frees
 *   their record and stack. The reaper blocks itself when the list is
 *   empty and is woken by the scheduler on the next death.
 *
 * MUTUAL EXCLUSION:
 * All scheduler state is guarded by disabling interrupts, nothing else.
 * Every entry point disables, mutates, restores. `schedule` is entered
 * with its own disable and ends with a restore of the *resumed* thread's
 * saved token, so the interrupt flag always reflects the policy of the
 * thread that is actually running.
 */

use alloc::boxed::Box;
use alloc::vec;
use core::ptr;

use crate::arch::{self, IntrGuard};

mod list;
pub mod thread;

pub(crate) use list::{Link, List};
pub use thread::{ThreadFn, ThreadHandle, ThreadId, ThreadState};
use thread::Thread;

/// Per-thread stack size (64 KiB).
pub const THREAD_STACK_SIZE: usize = 64 * 1024;

struct Scheduler {
    next_id: u64,
    all_threads: List,
    run_queue: List,
    zombie_list: List,
    current: *mut Thread,
    idle: *mut Thread,
    reaper: *mut Thread,
}

impl Scheduler {
    const fn new() -> Self {
        Scheduler {
            next_id: 0,
            all_threads: List::new(),
            run_queue: List::new(),
            zombie_list: List::new(),
            current: ptr::null_mut(),
            idle: ptr::null_mut(),
            reaper: ptr::null_mut(),
        }
    }
}

struct SchedCell(core::cell::UnsafeCell<Scheduler>);

// SAFETY: the scheduler is only touched inside interrupt-disabled sections
// on a uniprocessor, which serializes all access.
unsafe impl Sync for SchedCell {}

static SCHED: SchedCell = SchedCell(core::cell::UnsafeCell::new(Scheduler::new()));

fn sched() -> *mut Scheduler {
    SCHED.0.get()
}

/// Publishes the running control flow as the kernel thread and starts the
/// idle and reaper service threads.
///
/// Must be called exactly once, before any other scheduler operation.
pub fn init() {
    {
        let _guard = IntrGuard::new();
        let s = sched();
        unsafe {
            assert!(
                (*s).current.is_null(),
                "scheduler initialized twice"
            );
            // The kernel thread is special: it already has a stack and is
            // already running.
            let id = ThreadId((*s).next_id);
            (*s).next_id += 1;
            let kernel = Box::into_raw(Box::new(Thread::new(id, None)));
            (*s).all_threads.push_back(&mut (*kernel).global_link);
            (*s).current = kernel;
        }
    }

    let idle = spawn_inner(idle_main, ptr::null_mut(), false);
    let reaper = spawn_inner(reaper_main, ptr::null_mut(), true);

    let _guard = IntrGuard::new();
    let s = sched();
    unsafe {
        (*s).idle = idle;
        (*s).reaper = reaper;
    }
    log::debug!("scheduler up: idle and reaper threads spawned");
}

fn spawn_inner(func: ThreadFn, arg: *mut (), on_run_queue: bool) -> *mut Thread {
    let mut stack = vec![0u8; THREAD_STACK_SIZE].into_boxed_slice();
    let top = unsafe { stack.as_mut_ptr().add(THREAD_STACK_SIZE) };
    // Keep the primed frame 16-byte aligned.
    let top = ((top as usize) & !0xF) as *mut usize;
    let saved_sp = unsafe { arch::prime_stack(top, func, arg) };

    let _guard = IntrGuard::new();
    let s = sched();
    unsafe {
        let id = ThreadId((*s).next_id);
        (*s).next_id += 1;
        let t = Box::into_raw(Box::new(Thread::new(id, Some(stack))));
        (*t).saved_sp = saved_sp;
        (*s).all_threads.push_back(&mut (*t).global_link);
        if on_run_queue {
            (*s).run_queue.push_back(&mut (*t).run_link);
        }
        log::trace!("spawned {}", (*t).id);
        t
    }
}

/// Creates a thread running `func(arg)` and queues it for execution.
pub fn spawn(func: ThreadFn, arg: *mut ()) -> ThreadHandle {
    unsafe { ThreadHandle::from_ptr(spawn_inner(func, arg, true)) }
}

/// Surrenders the CPU; the caller stays runnable and takes its FIFO turn.
pub fn yield_now() {
    schedule();
}

/// Terminates the calling thread.
///
/// The record and stack are freed later by the reaper; the exit value is
/// discarded (nothing joins on threads here).
pub fn exit(_retval: *mut ()) -> ! {
    {
        let _guard = IntrGuard::new();
        unsafe {
            let me = (*sched()).current;
            log::trace!("{} exiting", (*me).id);
            (*me).status = ThreadState::Exited;
        }
    }
    schedule();
    unreachable!("exited thread was rescheduled");
}

/// Handle of the calling thread.
pub fn current() -> ThreadHandle {
    let _guard = IntrGuard::new();
    unsafe { ThreadHandle::from_ptr((*sched()).current) }
}

/// Stores the calling thread's thread-local slot.
pub fn set_specific(value: *mut ()) {
    let _guard = IntrGuard::new();
    unsafe { (*(*sched()).current).slot = value };
}

/// Reads the calling thread's thread-local slot.
pub fn get_specific() -> *mut () {
    let _guard = IntrGuard::new();
    unsafe { (*(*sched()).current).slot }
}

/// Blocks the calling thread until somebody wakes it.
///
/// Unless the caller parked itself on a wait queue first (the sync
/// primitives do), the only way back is a direct `wake` of the handle,
/// e.g. from an interrupt handler.
pub fn block_current() {
    let state = arch::interrupts_disable();
    unsafe {
        let me = (*sched()).current;
        log::trace!("{} blocking", (*me).id);
        (*me).status = ThreadState::Blocked;
    }
    schedule();
    arch::interrupts_restore(state);
}

/// Makes a blocked thread runnable again and queues it.
///
/// Safe to call from interrupt handlers; that is how device interrupts
/// turn into runnable threads.
pub fn wake(handle: ThreadHandle) {
    let _guard = IntrGuard::new();
    let t = handle.as_ptr();
    unsafe {
        assert!(
            (*t).status == ThreadState::Blocked,
            "waking a thread that is not blocked"
        );
        (*t).status = ThreadState::Runnable;
        (*sched()).run_queue.push_back(&mut (*t).run_link);
    }
}

/// Number of live (not yet reaped) threads. Debug/enumeration only.
pub fn thread_count() -> usize {
    let _guard = IntrGuard::new();
    unsafe { (*sched()).all_threads.len() }
}

/// Marks `t` runnable and queues it. Interrupts must be disabled.
pub(crate) unsafe fn make_runnable(t: *mut Thread) {
    unsafe {
        (*t).status = ThreadState::Runnable;
        (*sched()).run_queue.push_back(&mut (*t).run_link);
    }
}

/// Pointer to the running thread's record. Interrupts must be disabled
/// for the pointer to stay meaningful.
pub(crate) fn current_ptr() -> *mut Thread {
    unsafe { (*sched()).current }
}

/// Picks and switches to the next thread.
///
/// Entered from every suspension point. Runs with interrupts disabled;
/// the final restore uses the token saved by the thread being *resumed*,
/// which it left on its own stack when it last suspended here.
pub(crate) fn schedule() {
    let state = arch::interrupts_disable();
    let prev;
    let next;
    unsafe {
        let s = sched();
        prev = (*s).current;

        // Dispose of the outgoing thread. The idle thread is special: it
        // never sits on any queue.
        if prev != (*s).idle {
            match (*prev).status {
                ThreadState::Runnable => {
                    (*s).run_queue.push_back(&mut (*prev).run_link);
                }
                ThreadState::Blocked => {
                    // Whoever blocked it already parked it on a wait queue
                    // (or will wake it directly).
                }
                ThreadState::Exited | ThreadState::Killed => {
                    // Cannot free it here: we are still on its stack.
                    (*s).zombie_list.push_back(&mut (*prev).run_link);
                    let reaper = (*s).reaper;
                    if (*reaper).status == ThreadState::Blocked {
                        (*reaper).status = ThreadState::Runnable;
                        (*s).run_queue.push_back(&mut (*reaper).run_link);
                    }
                }
            }
        }

        next = match (*s).run_queue.pop_front() {
            Some(link) => Thread::from_run_link(link),
            None => (*s).idle,
        };
        (*s).current = next;
    }

    if next == prev {
        arch::interrupts_restore(state);
        return;
    }

    unsafe {
        arch::switch_stacks((*next).saved_sp, &mut (*prev).saved_sp);
    }
    // Running on `next`'s stack now; `state` is the token this thread
    // saved when it last entered schedule.
    arch::interrupts_restore(state);
}

/// Runs when the ready queue is empty: waits for the next interrupt.
fn idle_main(_arg: *mut ()) -> *mut () {
    loop {
        yield_now();
        arch::halt();
    }
}

/// Slayer of dead threads: frees zombie records and stacks, then sleeps
/// until the scheduler hands it more corpses.
fn reaper_main(_arg: *mut ()) -> *mut () {
    // Runs with interrupts off for good: every list it touches is also
    // touched from the scheduler.
    let _ = arch::interrupts_disable();
    loop {
        unsafe {
            let s = sched();
            while let Some(link) = (*s).zombie_list.pop_front() {
                let t = Thread::from_run_link(link);
                (*s).all_threads.remove(&mut (*t).global_link);
                log::trace!("reaped {}", (*t).id);
                drop(Box::from_raw(t));
            }
            (*(*s).current).status = ThreadState::Blocked;
        }
        schedule();
    }
}
