// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Scripted transport for session and facade tests.
//!
//! The fake plays the slave side of the bus: each transmitted request pops
//! the next [`Action`] off the script and either queues a canned reply or
//! stays silent. In `echo` mode it instead answers every request with an
//! empty OK reply for the addressed slave, which is what the concurrency
//! test needs. Everything that happens on the wire lands in `log` for
//! post-mortem assertions.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use drv_ipcomm_api::{Addr, checksum, encode_frame};
use parking_lot::Mutex;

use crate::{DEFAULT_TIMEOUT, Error, Transport};

/// Builds a complete, well-formed slave reply frame.
pub fn reply_frame(id: u8, status: u8, data: &str) -> Vec<u8> {
    encode_frame(format!("{id:X}{status:02X}:{data}").as_bytes())
}

/// Builds a reply frame whose checksum field is wrong (but still hex).
pub fn corrupt_reply_frame(id: u8, status: u8, data: &str) -> Vec<u8> {
    let mut frame = reply_frame(id, status, data);
    let last_digit = frame.len() - 2;
    frame[last_digit] =
        if frame[last_digit] == b'F' { b'0' } else { b'F' };
    frame
}

/// What the fake slave does with the next request it sees.
pub enum Action {
    /// Queue these bytes as the reply.
    Reply(Vec<u8>),
    /// Stay silent; the session runs into its read timeout.
    Silence,
}

/// Everything observed on the wire, in order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Event {
    Tx(Vec<u8>),
    Rx(u8),
    TimedOut(Duration),
    InputFlushed,
}

pub struct State {
    pub script: VecDeque<Action>,
    pub rx: VecDeque<u8>,
    pub log: Vec<Event>,
    /// Every value handed to `set_timeout`, in order.
    pub timeouts_set: Vec<Duration>,
    pub timeout: Duration,
    /// Answer every request with an empty OK reply instead of following
    /// the script.
    pub echo: bool,
}

pub type SharedState = Arc<Mutex<State>>;

pub struct FakeTransport {
    state: SharedState,
}

impl FakeTransport {
    pub fn new() -> (FakeTransport, SharedState) {
        let state = Arc::new(Mutex::new(State {
            script: VecDeque::new(),
            rx: VecDeque::new(),
            log: Vec::new(),
            timeouts_set: Vec::new(),
            timeout: DEFAULT_TIMEOUT,
            echo: false,
        }));
        (FakeTransport { state: Arc::clone(&state) }, state)
    }
}

impl Transport for FakeTransport {
    fn write_all(&mut self, bytes: &[u8]) -> Result<(), Error> {
        let mut state = self.state.lock();
        state.log.push(Event::Tx(bytes.to_vec()));
        if state.echo {
            // bytes[1] is the address digit; broadcasts get no reply.
            if let Some(addr) = Addr::from_hex_digit(bytes[1]) {
                let reply = reply_frame(addr.get(), 0x00, "");
                state.rx.extend(reply);
            }
        } else if let Some(action) = state.script.pop_front() {
            match action {
                Action::Reply(reply) => state.rx.extend(reply),
                Action::Silence => {}
            }
        }
        Ok(())
    }

    fn flush(&mut self) -> Result<(), Error> {
        Ok(())
    }

    fn read_byte(&mut self) -> Result<u8, Error> {
        let mut state = self.state.lock();
        match state.rx.pop_front() {
            Some(byte) => {
                state.log.push(Event::Rx(byte));
                Ok(byte)
            }
            None => {
                let timeout = state.timeout;
                state.log.push(Event::TimedOut(timeout));
                Err(Error::ReceiveTimeout)
            }
        }
    }

    fn flush_input(&mut self) -> Result<(), Error> {
        let mut state = self.state.lock();
        state.rx.clear();
        state.log.push(Event::InputFlushed);
        Ok(())
    }

    fn set_timeout(&mut self, timeout: Duration) -> Result<(), Error> {
        let mut state = self.state.lock();
        state.timeouts_set.push(timeout);
        state.timeout = timeout;
        Ok(())
    }

    fn timeout(&self) -> Duration {
        self.state.lock().timeout
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use drv_ipcomm_api::parse_reply;

    #[test]
    fn reply_frames_are_well_formed() {
        let frame = reply_frame(3, 0x21, "1500");
        let reply = parse_reply(&frame[1..frame.len() - 1]).unwrap();
        assert_eq!(reply.addr.get(), 3);
        assert_eq!(reply.status.raw(), 0x21);
        assert_eq!(reply.data, "1500");
        // Sanity: the checksum field really is the XOR-8 of the interior.
        let interior = &frame[1..frame.len() - 3];
        assert_eq!(
            &frame[frame.len() - 3..frame.len() - 1],
            format!("{:02X}", checksum(interior)).as_bytes(),
        );
    }

    #[test]
    fn corrupt_reply_frames_fail_the_checksum() {
        let frame = corrupt_reply_frame(3, 0x00, "");
        assert!(parse_reply(&frame[1..frame.len() - 1]).is_err());
    }
}
