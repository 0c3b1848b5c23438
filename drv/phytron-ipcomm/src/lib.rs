// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Host driver for the Phytron IPCOMM serial bus.
//!
//! One [`Ipcomm`] session owns the serial link and multiplexes any number
//! of caller threads onto it: exactly one request/reply exchange is in
//! flight at a time, guarded by the bus mutex. The session implements the
//! protocol's error recovery: a corrupted *reply* is fetched again with
//! the reserved `R` opcode, a corrupted *query* (signalled by the rx_error
//! status bit) is diagnosed through an inline extended-status read and
//! either retransmitted or surfaced as a typed device fault.
//!
//! Axes found by [`Ipcomm::enumerate`] are exposed as [`Axis`] handles
//! with typed motion, current, frequency, and I/O accessors:
//!
//! ```no_run
//! use drv_phytron_ipcomm::{Addr, AxisNames, DEFAULT_BAUD_RATE, Ipcomm};
//!
//! # fn main() -> Result<(), drv_phytron_ipcomm::Error> {
//! let names = AxisNames::ByPosition(vec!["azimuth".into()]);
//! let bus = Ipcomm::open(
//!     "/dev/ttyUSB0",
//!     DEFAULT_BAUD_RATE,
//!     &Addr::ALL,
//!     Some(&names),
//! )?;
//! let azimuth = bus.axis("azimuth")?;
//! azimuth.goto_abs(12_000)?;
//! while azimuth.extended_status()?.busy() {}
//! # Ok(())
//! # }
//! ```

mod axis;
mod error;
mod registry;
#[cfg(test)]
mod testutil;
mod transport;

pub use axis::Axis;
pub use error::Error;
pub use registry::AxisNames;
pub use transport::{SerialTransport, Transport};

pub use drv_ipcomm_api::{Addr, ExtendedStatus, SimpleStatus};

use std::time::Duration;

use drv_ipcomm_api::{
    EXTENDED_STATUS_QUERY, FrameError, RETRANSMIT, Reply, encode_broadcast,
    encode_command, parse_reply,
};
use parking_lot::{Mutex, RwLock};

use registry::Registry;

/// How many reply retransmits (`R`) one command may request before the
/// session gives up with [`Error::ExceededRetries`].
pub const MAX_RETRY_COUNT: u8 = 5;

/// Read timeout during normal operation.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(500);

/// Read timeout while probing for devices. Present devices answer `IS?`
/// well within this; absent ones cost one such timeout each.
pub const ENUMERATION_TIMEOUT: Duration = Duration::from_millis(50);

/// Serial speed the controllers ship with.
pub const DEFAULT_BAUD_RATE: u32 = 38_400;

/// One decoded reply, as handed to callers.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Response {
    pub addr: Addr,
    pub status: SimpleStatus,
    pub data: ResponseData,
}

/// Reply payload: the decoded extended status for an `IS?` request, the
/// raw ASCII text for everything else.
///
/// Keeping these apart in the type means an extended status can never be
/// mistaken for ordinary reply text downstream.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ResponseData {
    Text(String),
    Extended(ExtendedStatus),
}

impl ResponseData {
    pub fn text(&self) -> Option<&str> {
        match self {
            ResponseData::Text(text) => Some(text),
            ResponseData::Extended(_) => None,
        }
    }

    pub fn extended(&self) -> Option<ExtendedStatus> {
        match self {
            ResponseData::Text(_) => None,
            ResponseData::Extended(extended) => Some(*extended),
        }
    }
}

impl Response {
    fn from_text(reply: Reply) -> Response {
        Response {
            addr: reply.addr,
            status: reply.status,
            data: ResponseData::Text(reply.data),
        }
    }
}

/// Everything that must only ever be touched by one caller at a time.
struct Bus {
    transport: Box<dyn Transport>,
    max_retry_count: u8,
}

impl Bus {
    fn send(&mut self, frame: &[u8]) -> Result<(), Error> {
        log::trace!("tx {}", frame.escape_ascii());
        self.transport.write_all(frame)?;
        self.transport.flush()
    }

    fn recv_reply(&mut self) -> Result<Reply, Error> {
        let interior = transport::recv_frame(&mut *self.transport)?;
        log::trace!("rx {}", interior.escape_ascii());
        Ok(parse_reply(&interior)?)
    }
}

/// One IPCOMM bus: the serial link plus the registry of axes found on it.
///
/// Cheap to share behind an `Arc`; all methods take `&self` and serialize
/// on the internal bus mutex.
pub struct Ipcomm {
    bus: Mutex<Bus>,
    registry: RwLock<Registry>,
}

impl Ipcomm {
    /// Opens the serial port at `url` and enumerates `addresses`.
    pub fn open(
        url: &str,
        baud_rate: u32,
        addresses: &[Addr],
        names: Option<&AxisNames>,
    ) -> Result<Ipcomm, Error> {
        let transport = SerialTransport::open(url, baud_rate)?;
        let ipcomm = Ipcomm::with_transport(Box::new(transport));
        ipcomm.enumerate(addresses, names)?;
        Ok(ipcomm)
    }

    /// Wraps an already-configured transport. No enumeration happens; call
    /// [`Ipcomm::enumerate`] when ready.
    pub fn with_transport(transport: Box<dyn Transport>) -> Ipcomm {
        Ipcomm {
            bus: Mutex::new(Bus {
                transport,
                max_retry_count: MAX_RETRY_COUNT,
            }),
            registry: RwLock::new(Registry::default()),
        }
    }

    /// Adjusts the reply-retransmit budget (default [`MAX_RETRY_COUNT`]).
    ///
    /// The budget lives with the rest of the bus state, so the new value
    /// takes effect for the next exchange, never one in flight.
    pub fn set_max_retry_count(&self, count: u8) {
        self.bus.lock().max_retry_count = count;
    }

    /// Runs one command on the slave at `addr` and returns its decoded
    /// reply, recovering from transmission errors as the protocol
    /// prescribes.
    ///
    /// Transient failures handled internally: a reply that fails our
    /// checksum is re-fetched with `R` (bounded by the retry budget); a
    /// command that failed the *device's* checksum is retransmitted.
    /// Everything else (timeouts, device faults, malformed frames)
    /// surfaces as an [`Error`].
    pub fn execute(&self, addr: Addr, cmd: &str) -> Result<Response, Error> {
        if cmd == EXTENDED_STATUS_QUERY {
            // IS? must take the single-shot path: the recovery loop below
            // interrogates extended status itself and would recurse.
            return self.query_extended_status(addr);
        }
        let mut bus = self.bus.lock();
        self.execute_locked(&mut bus, addr, cmd)
    }

    /// Reads the extended status of the slave at `addr`.
    ///
    /// Single-shot by design: one query, one reply. A corrupted reply is
    /// returned as its `ChecksumMismatch` rather than re-fetched;
    /// retransmit recovery belongs to [`Ipcomm::execute`], which calls in
    /// here while holding the bus and must not be called back.
    pub fn query_extended_status(
        &self,
        addr: Addr,
    ) -> Result<Response, Error> {
        let mut bus = self.bus.lock();
        let (reply, extended) =
            self.query_extended_status_locked(&mut bus, addr)?;
        Ok(Response {
            addr: reply.addr,
            status: reply.status,
            data: ResponseData::Extended(extended),
        })
    }

    /// Sends `cmd` to every slave at once (`@` address). Slaves do not
    /// reply to broadcasts, so there is nothing to wait for.
    pub fn broadcast(&self, cmd: &str) -> Result<(), Error> {
        let mut bus = self.bus.lock();
        bus.transport.flush_input()?;
        bus.send(&encode_broadcast(cmd))
    }

    /// Arms all axes for a synchronous start.
    pub fn sync_start_commence(&self) -> Result<(), Error> {
        self.broadcast("GW")
    }

    /// Fires a previously armed synchronous start on all axes.
    pub fn sync_start_execute(&self) -> Result<(), Error> {
        self.broadcast("GX")
    }

    /// Disarms a pending synchronous start on all axes.
    pub fn sync_start_abort(&self) -> Result<(), Error> {
        self.broadcast("GB")
    }

    fn execute_locked(
        &self,
        bus: &mut Bus,
        addr: Addr,
        cmd: &str,
    ) -> Result<Response, Error> {
        bus.transport.flush_input()?;
        bus.send(&encode_command(addr, cmd))?;

        let mut retry_count = 0;
        loop {
            if retry_count >= bus.max_retry_count {
                return Err(Error::ExceededRetries(retry_count));
            }

            let reply = match bus.recv_reply() {
                Ok(reply) => reply,
                Err(Error::Frame(FrameError::ChecksumMismatch {
                    expected,
                    received,
                })) => {
                    // The slave keeps its last reply around; fetch it
                    // again. Only these failures consume the retry budget.
                    log::debug!(
                        "{addr}: corrupt reply ({expected:02X} vs \
                         {received:02X}), requesting retransmit",
                    );
                    bus.send(&encode_command(addr, RETRANSMIT))?;
                    retry_count += 1;
                    continue;
                }
                // Timeouts and malformed frames are not retryable here.
                Err(e) => return Err(e),
            };

            if !reply.status.rx_error() {
                return Ok(Response::from_text(reply));
            }

            // The slave flagged our command as damaged; the extended
            // status says how.
            match self.query_extended_status_locked(bus, addr) {
                Ok((_, extended)) => {
                    if extended.checksum_error() {
                        log::debug!(
                            "{addr}: slave saw a corrupt command, \
                             retransmitting",
                        );
                        bus.transport.flush_input()?;
                        bus.send(&encode_command(addr, cmd))?;
                        continue;
                    }
                    if let Some(fault) = extended.fault() {
                        log::warn!("{addr}: {fault}");
                        return Err(Error::Device(fault));
                    }
                    // rx_error with no cause on record: nothing left to
                    // recover from, hand the reply to the caller as-is.
                    return Ok(Response::from_text(reply));
                }
                Err(Error::Frame(FrameError::ChecksumMismatch { .. })) => {
                    // The IS? reply itself was damaged, and this path may
                    // not request retransmits. Inconclusive; surface the
                    // original reply.
                    return Ok(Response::from_text(reply));
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn query_extended_status_locked(
        &self,
        bus: &mut Bus,
        addr: Addr,
    ) -> Result<(Reply, ExtendedStatus), Error> {
        bus.transport.flush_input()?;
        bus.send(&encode_command(addr, EXTENDED_STATUS_QUERY))?;
        let reply = bus.recv_reply()?;
        let raw = u32::from_str_radix(reply.data.trim(), 16)
            .map_err(|_| Error::BadReply(reply.data.clone()))?;
        Ok((reply, ExtendedStatus::from_raw(raw)))
    }

    /// Probes `addresses` for live slaves and rebuilds the registry.
    ///
    /// Returns how many axes were found. Addresses that stay silent for
    /// the shortened probe timeout are skipped; any other failure aborts
    /// the sweep. The previous read timeout is restored on every exit
    /// path.
    pub fn enumerate(
        &self,
        addresses: &[Addr],
        names: Option<&AxisNames>,
    ) -> Result<usize, Error> {
        let mut bus = self.bus.lock();
        self.registry.write().clear();

        let old_timeout = bus.transport.timeout();
        bus.transport.set_timeout(ENUMERATION_TIMEOUT)?;
        let result = self.sweep(&mut bus, addresses, names);
        let restored = bus.transport.set_timeout(old_timeout);
        let found = result?;
        restored?;
        log::info!("enumeration found {found} axes");
        Ok(found)
    }

    fn sweep(
        &self,
        bus: &mut Bus,
        addresses: &[Addr],
        names: Option<&AxisNames>,
    ) -> Result<usize, Error> {
        let mut found = 0;
        for (position, &addr) in addresses.iter().enumerate() {
            match self.query_extended_status_locked(bus, addr) {
                Ok((reply, extended)) if reply.addr == addr => {
                    let name = names
                        .and_then(|names| names.name_for(position, addr))
                        .map(String::from);
                    log::debug!(
                        "axis at {addr}{}",
                        match &name {
                            Some(name) => format!(" ({name})"),
                            None => String::new(),
                        },
                    );
                    self.registry.write().insert(
                        addr,
                        name,
                        reply.status,
                        extended,
                    );
                    found += 1;
                }
                // A reply from the wrong address is not ours to claim.
                Ok(_) => {}
                // Silence just means nobody lives there.
                Err(Error::ReceiveTimeout) => {}
                Err(e) => return Err(e),
            }
        }
        Ok(found)
    }

    /// Looks up an axis: alphabetic keys by name, anything else as a
    /// numeric ID.
    pub fn axis(&self, key: &str) -> Result<Axis<'_>, Error> {
        let addr = self
            .registry
            .read()
            .resolve(key)
            .ok_or_else(|| Error::NotFound(key.into()))?;
        Ok(Axis::new(self, addr))
    }

    pub fn axis_by_id(&self, addr: Addr) -> Result<Axis<'_>, Error> {
        if self.registry.read().contains_id(addr) {
            Ok(Axis::new(self, addr))
        } else {
            Err(Error::NotFound(addr.to_string()))
        }
    }

    /// All registered axes, in address order.
    pub fn axes(&self) -> Vec<Axis<'_>> {
        self.registry
            .read()
            .ids()
            .map(|addr| Axis::new(self, addr))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.registry.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, key: &str) -> bool {
        self.registry.read().resolve(key).is_some()
    }

    pub(crate) fn axis_name(&self, addr: Addr) -> Option<String> {
        self.registry
            .read()
            .record(addr)
            .and_then(|record| record.name.clone())
    }

    pub(crate) fn cached_status(&self, addr: Addr) -> Option<SimpleStatus> {
        self.registry
            .read()
            .record(addr)
            .and_then(|record| record.last_status)
    }

    pub(crate) fn cached_extended(
        &self,
        addr: Addr,
    ) -> Option<ExtendedStatus> {
        self.registry
            .read()
            .record(addr)
            .and_then(|record| record.last_extended)
    }

    pub(crate) fn record_reply(
        &self,
        addr: Addr,
        status: SimpleStatus,
        extended: Option<ExtendedStatus>,
    ) {
        let mut registry = self.registry.write();
        if let Some(record) = registry.record_mut(addr) {
            record.last_status = Some(status);
            if let Some(extended) = extended {
                record.last_extended = Some(extended);
            }
        }
    }
}
