/*
 * Boot glue
 *
 * The multiboot assembly stub lands here with a 32-bit protected-mode
 * CPU, flat segments and interrupts off. Order matters: the serial sink
 * and logger first so everything after can talk, then the interrupt
 * plumbing, the heap, the scheduler, and finally the timer line before
 * handing control to the runtime proper.
 *
 * There is no shutdown path. If the runtime entry ever returns, the
 * kernel parks the CPU.
 */

use core::panic::PanicInfo;

use crate::{interrupts, io, logger, memory, scheduler};

unsafe extern "C" {
    /// Entry point of the hosted runtime linked into the image.
    fn kernel_main();
}

/// Called by the boot stub once the CPU is in protected mode.
#[unsafe(no_mangle)]
pub extern "C" fn __startup(_multiboot_info: u32, _magic: u32) -> ! {
    io::serial::init();
    logger::init();
    log::info!("firn kernel core starting");

    interrupts::init();
    memory::heap::init();
    scheduler::init();

    // The timer is the heartbeat that gets the idle thread off `hlt`.
    interrupts::unmask_irq(0);

    // SAFETY: single call, after every kernel service is up.
    unsafe { kernel_main() };

    log::error!("runtime entry returned; nothing left to run");
    halt_loop();
}

fn halt_loop() -> ! {
    loop {
        crate::arch::halt();
    }
}

#[panic_handler]
fn panic(info: &PanicInfo) -> ! {
    let _ = crate::arch::interrupts_disable();

    if let Some(location) = info.location() {
        log::error!(
            "KERNEL PANIC at {}:{}: {}",
            location.file(),
            location.line(),
            info.message()
        );
    } else {
        log::error!("KERNEL PANIC: {}", info.message());
    }

    halt_loop();
}
