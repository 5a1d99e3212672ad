pub mod pio;
pub mod serial;

pub use pio::{Io, Pio, ReadOnly};
