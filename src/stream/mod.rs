//! Byte stream framing used by hijacked connections

pub mod stdcopy;

pub use stdcopy::{demultiplex, StdStream, StdWriter};
