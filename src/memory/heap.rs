/*
 * Kernel Heap
 *
 * The heap is the program break grown upward from the end of the loaded
 * image: the linker script exports `__kernel_end`, and everything from
 * there up to the heap cap belongs to the allocator. Thread records and
 * stacks are the main customers; scheduling itself never allocates.
 *
 * Allocation failure is fatal. The kernel thread has no one to return an
 * error to, so an exhausted heap panics and halts.
 */

use linked_list_allocator::LockedHeap;

/// Upper bound on heap growth past the image (64 MiB).
pub const HEAP_SIZE: usize = 64 * 1024 * 1024;

unsafe extern "C" {
    /// End of the statically loaded image, provided by the linker script.
    static __kernel_end: u8;
}

#[global_allocator]
static ALLOCATOR: LockedHeap = LockedHeap::empty();

/// Hands the break region to the allocator.
///
/// Must run once, before the first allocation (the scheduler allocates
/// its first thread records during `scheduler::init`).
pub fn init() {
    // SAFETY: only the address of the link-time symbol is taken.
    let image_end = unsafe { &raw const __kernel_end as usize };
    // First page boundary past the image.
    let heap_start = (image_end + 0xFFF) & !0xFFF;

    log::info!(
        "heap: {:#010x} - {:#010x} ({} KiB)",
        heap_start,
        heap_start + HEAP_SIZE - 1,
        HEAP_SIZE / 1024
    );

    // SAFETY: the region starts past everything the image loaded and is
    // used by nothing else.
    unsafe {
        ALLOCATOR.lock().init(heap_start as *mut u8, HEAP_SIZE);
    }
}

#[alloc_error_handler]
fn alloc_error(layout: core::alloc::Layout) -> ! {
    panic!("kernel heap allocation failed: {:?}", layout);
}
