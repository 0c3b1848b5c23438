// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Byte-level transport: the contract the session needs from a byte pipe,
//! frame receive on top of it, and the production serial implementation.

use std::io::{Read, Write};
use std::time::Duration;

use drv_ipcomm_api::{ETX, STX};
use serialport::{ClearBuffer, DataBits, FlowControl, Parity, StopBits};

use crate::{DEFAULT_TIMEOUT, Error};

/// What the session needs from the wire. [`SerialTransport`] is the
/// production implementation; tests substitute a scripted fake.
pub trait Transport: Send {
    fn write_all(&mut self, bytes: &[u8]) -> Result<(), Error>;

    fn flush(&mut self) -> Result<(), Error>;

    /// Reads one byte, blocking for at most the configured timeout. Returns
    /// [`Error::ReceiveTimeout`] when nothing arrived in time.
    fn read_byte(&mut self) -> Result<u8, Error>;

    /// Discards everything currently in the input buffer.
    fn flush_input(&mut self) -> Result<(), Error>;

    fn set_timeout(&mut self, timeout: Duration) -> Result<(), Error>;

    fn timeout(&self) -> Duration;
}

/// Reads one frame and returns its interior (the bytes between STX and
/// ETX, exclusive).
///
/// Bytes before STX are silently discarded; devices emit noise on cold
/// boot. A timeout mid-frame aborts the frame, and the next exchange's
/// leading input flush reclaims whatever straggles in afterwards.
pub(crate) fn recv_frame(
    transport: &mut dyn Transport,
) -> Result<Vec<u8>, Error> {
    while transport.read_byte()? != STX {}

    let mut interior = Vec::new();
    loop {
        match transport.read_byte()? {
            ETX => return Ok(interior),
            byte => interior.push(byte),
        }
    }
}

/// A serial port configured for the IPCOMM bus: 8-N-1, no RTS/CTS, no
/// DSR/DTR, no XON/XOFF.
pub struct SerialTransport {
    port: Box<dyn serialport::SerialPort>,
}

impl SerialTransport {
    /// Opens `url` (`/dev/ttyUSB0`, `COM3`, ...) at `baud_rate`.
    pub fn open(url: &str, baud_rate: u32) -> Result<SerialTransport, Error> {
        let port = serialport::new(url, baud_rate)
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .flow_control(FlowControl::None)
            .timeout(DEFAULT_TIMEOUT)
            .open()?;
        Ok(SerialTransport { port })
    }
}

impl Transport for SerialTransport {
    fn write_all(&mut self, bytes: &[u8]) -> Result<(), Error> {
        self.port.write_all(bytes)?;
        Ok(())
    }

    fn flush(&mut self) -> Result<(), Error> {
        self.port.flush()?;
        Ok(())
    }

    fn read_byte(&mut self) -> Result<u8, Error> {
        let mut byte = [0u8; 1];
        match self.port.read(&mut byte) {
            Ok(0) => Err(Error::ReceiveTimeout),
            Ok(_) => Ok(byte[0]),
            Err(e) if e.kind() == std::io::ErrorKind::TimedOut => {
                Err(Error::ReceiveTimeout)
            }
            Err(e) => Err(e.into()),
        }
    }

    fn flush_input(&mut self) -> Result<(), Error> {
        self.port.clear(ClearBuffer::Input)?;
        Ok(())
    }

    fn set_timeout(&mut self, timeout: Duration) -> Result<(), Error> {
        self.port.set_timeout(timeout)?;
        Ok(())
    }

    fn timeout(&self) -> Duration {
        self.port.timeout()
    }
}
