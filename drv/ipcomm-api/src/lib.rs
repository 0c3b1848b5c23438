// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Wire-protocol types for the Phytron IPCOMM serial bus.
//!
//! IPCOMM is a strict master/slave protocol: a host addresses up to sixteen
//! stepper-motor controllers (axes) on one asynchronous serial link. Every
//! exchange is one framed request followed by one framed reply; frames are
//! delimited by STX/ETX, internally `:`-separated, and protected by an XOR-8
//! checksum. This crate holds the pieces of that protocol which do no I/O:
//! the checksum, the frame codec, the slave address type, and the decoding
//! of the 8-bit simple status and 24-bit extended status bit fields.
//!
//! The session layer (request/response state machine, retries, bus locking)
//! lives in `drv-phytron-ipcomm`, which drives a serial port using the types
//! defined here.

#![cfg_attr(not(test), no_std)]

extern crate alloc;

mod frame;
mod status;

pub use frame::{
    FrameError, Reply, encode_broadcast, encode_command, encode_frame,
    parse_reply,
};
pub use status::{DeviceFault, ExtendedStatus, SimpleStatus};

/// Start-of-frame delimiter. Bytes received before it are line noise.
pub const STX: u8 = 0x02;

/// End-of-frame delimiter.
pub const ETX: u8 = 0x03;

/// Field separator inside a frame interior.
pub const SEPARATOR: u8 = b':';

/// Takes the place of the address digit in a broadcast frame. Slaves do not
/// reply to broadcasts.
pub const BROADCAST: u8 = b'@';

/// Reserved opcode asking a slave to retransmit its last reply.
pub const RETRANSMIT: &str = "R";

/// Reserved opcode reading the 24-bit extended status.
pub const EXTENDED_STATUS_QUERY: &str = "IS?";

/// XOR-8 reduction of `data`, starting at 0.
pub fn checksum(data: &[u8]) -> u8 {
    data.iter().fold(0, |chksm, b| chksm ^ b)
}

/// Bus address of a single slave, 0..=15.
///
/// Encoded on the wire as one ASCII uppercase hex digit, which is also how
/// it prints.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Addr(u8);

impl Addr {
    /// Every address on the bus, in probing order.
    pub const ALL: [Addr; 16] = [
        Addr(0),
        Addr(1),
        Addr(2),
        Addr(3),
        Addr(4),
        Addr(5),
        Addr(6),
        Addr(7),
        Addr(8),
        Addr(9),
        Addr(10),
        Addr(11),
        Addr(12),
        Addr(13),
        Addr(14),
        Addr(15),
    ];

    pub const fn new(id: u8) -> Option<Addr> {
        if id <= 0xf { Some(Addr(id)) } else { None }
    }

    pub const fn get(self) -> u8 {
        self.0
    }

    /// Decodes the wire address digit, case-insensitively.
    pub fn from_hex_digit(digit: u8) -> Option<Addr> {
        (digit as char).to_digit(16).map(|id| Addr(id as u8))
    }
}

impl TryFrom<u8> for Addr {
    type Error = ();

    fn try_from(id: u8) -> Result<Self, Self::Error> {
        Addr::new(id).ok_or(())
    }
}

impl core::fmt::Display for Addr {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{:X}", self.0)
    }
}
