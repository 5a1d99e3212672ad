/*
 * Serial Debug Sink
 *
 * The kernel's only diagnostic channel is COM1 at 0x3F8: bytes are pushed
 * out one at a time with no framing and no buffering, so output survives
 * right up to a wedged CPU. The logger and the panic path both end here.
 */

use core::convert::TryInto;
use core::fmt;

use bitflags::bitflags;
use spin::Mutex;

use super::pio::{Io, ReadOnly};

#[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
use super::pio::Pio;

/// I/O port base of COM1.
pub const COM1_BASE: u16 = 0x3F8;

bitflags! {
    /// Line status flags
    struct LineStsFlags: u8 {
        const INPUT_FULL = 1;
        // 1 to 4 unknown
        const OUTPUT_EMPTY = 1 << 5;
        // 6 and 7 unknown
    }
}

/// Serial port representation.
pub struct SerialPort<T: Io> {
    data: T,       // Data register, read to receive, write to send
    int_en: T,     // Interrupt enable
    fifo_ctrl: T,  // FIFO control
    line_ctrl: T,  // Line control
    modem_ctrl: T, // Modem control
    line_sts: ReadOnly<T>, // Line status
}

#[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
impl SerialPort<Pio<u8>> {
    /// Creates a new serial port instance over the given base port.
    pub const fn new(base: u16) -> SerialPort<Pio<u8>> {
        SerialPort {
            data: Pio::new(base),
            int_en: Pio::new(base + 1),
            fifo_ctrl: Pio::new(base + 2),
            line_ctrl: Pio::new(base + 3),
            modem_ctrl: Pio::new(base + 4),
            line_sts: ReadOnly::new(Pio::new(base + 5)),
        }
    }
}

impl<T: Io> SerialPort<T>
where
    T::Value: From<u8> + TryInto<u8>,
{
    /// Initializes the serial port: 38400 baud, 8N1, FIFOs on.
    pub fn init(&mut self) {
        self.int_en.write(0x00.into());
        self.line_ctrl.write(0x80.into());
        self.data.write(0x03.into());
        self.int_en.write(0x00.into());
        self.line_ctrl.write(0x03.into());
        self.fifo_ctrl.write(0xC7.into());
        self.modem_ctrl.write(0x0B.into());
    }

    /// Retrieves the line status flags.
    fn line_sts(&self) -> LineStsFlags {
        LineStsFlags::from_bits_truncate(self.line_sts.read().try_into().unwrap_or(0))
    }

    /// Sends a byte of data through the serial port.
    pub fn send(&mut self, data: u8) {
        while !self.line_sts().contains(LineStsFlags::OUTPUT_EMPTY) {}
        self.data.write(data.into())
    }

    /// Writes a byte, expanding newlines to CRLF for terminal consumers.
    pub fn write(&mut self, b: u8) {
        match b {
            b'\n' => {
                self.send(b'\r');
                self.send(b'\n');
            }
            _ => {
                self.send(b);
            }
        }
    }
}

impl<T: Io> fmt::Write for SerialPort<T>
where
    T::Value: From<u8> + TryInto<u8>,
{
    fn write_str(&mut self, s: &str) -> fmt::Result {
        for b in s.bytes() {
            self.write(b);
        }
        Ok(())
    }
}

/// The COM1 instance everything logs through.
#[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
static COM1: Mutex<SerialPort<Pio<u8>>> = Mutex::new(SerialPort::new(COM1_BASE));

/// One-time hardware init of the debug UART.
#[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
pub fn init() {
    COM1.lock().init();
}

/// Writes formatted output to COM1.
///
/// Interrupts are held off for the duration of the lock so an interrupt
/// handler logging mid-line cannot deadlock against the writer.
#[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
#[doc(hidden)]
pub fn _print(args: fmt::Arguments) {
    use core::fmt::Write;

    let _guard = crate::arch::IntrGuard::new();
    let _ = COM1.lock().write_fmt(args);
}

#[macro_export]
macro_rules! serial_print {
    ($($arg:tt)*) => {
        $crate::io::serial::_print(format_args!($($arg)*))
    };
}

#[macro_export]
macro_rules! serial_println {
    () => ($crate::serial_print!("\n"));
    ($($arg:tt)*) => ($crate::serial_print!("{}\n", format_args!($($arg)*)));
}
