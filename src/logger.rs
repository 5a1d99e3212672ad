/*
 * Kernel logger
 *
 * Routes the `log` facade to the serial debug sink. Every component logs
 * through `log::info!` and friends; this module decides where the bytes
 * go and which levels survive.
 */

#![cfg(any(target_arch = "x86", target_arch = "x86_64"))]

use log::{Level, LevelFilter, Metadata, Record};

struct SerialLogger;

impl log::Log for SerialLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= Level::Info
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            crate::serial_println!("[{}] {}", record.level(), record.args());
        }
    }

    fn flush(&self) {}
}

static LOGGER: SerialLogger = SerialLogger;

/// Installs the serial logger. Call once, right after the UART is up.
pub fn init() {
    match log::set_logger(&LOGGER).map(|()| log::set_max_level(LevelFilter::Info)) {
        Ok(_) => crate::serial_println!("logger initialized"),
        Err(err) => panic!("error initializing logger: {}", err),
    }
}
