#![no_std]

#[cfg(test)]
extern crate std;

mod codec;
mod frame;
mod gate;
mod ring;
mod serial;
mod sniffer;

#[cfg(test)]
mod test_utils;

// Longest line: Extended, 1FFFFFFF, DLC = 8, 0xFF * 8, CR
// T 1FFFFFFF 8 FFFFFFFFFFFFFFFF \r

const MAX_ID_SIZE: usize = 8;

pub const MAX_DATA_LENGTH: usize = 8;
const MAX_ENCODED_DATA_LENGTH: usize = MAX_DATA_LENGTH * 2;

/// Every line ends with a bare carriage return, no line feed
pub const LINE_TERMINATOR: u8 = b'\r';

pub const MAX_LINE_SIZE: usize = 1 + MAX_ID_SIZE + 1 + MAX_ENCODED_DATA_LENGTH + 1;

/// Frames the capture queue holds, one slot of which is never used
pub const FRAME_QUEUE_SIZE: usize = 128;

/// Logical unit of a transfer on the IN (device to host) endpoint
pub const IN_PACKET_SIZE: usize = 256;

/// Largest packet the host may send on the OUT endpoint
pub const OUT_PACKET_SIZE: usize = 64;

/// Host-bound byte buffer, sized to smooth over a handful of packet intervals
pub const HOST_BUFFER_SIZE: usize = 4 * IN_PACKET_SIZE;

pub use frame::*;
pub use gate::*;
pub use serial::*;
pub use sniffer::*;

pub use embedded_can::{ExtendedId, Id, StandardId};
