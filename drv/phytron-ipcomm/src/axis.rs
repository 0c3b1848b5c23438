// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! One axis of the bus: typed accessors over the device's command
//! language.
//!
//! Every accessor is a thin template around [`Axis::execute`]: the
//! device's documented opcode with the argument formatted in, and the
//! reply payload converted at the edge. Conventions worth knowing:
//! currents take one fractional digit, the boost duration is seconds here
//! but milliseconds on the device, hex-encoded I/O states are little-endian
//! (bit i is channel i), and a run limit of 0 means "no limit" and goes
//! out as the all-ones sentinel.

use drv_ipcomm_api::{
    Addr, EXTENDED_STATUS_QUERY, ExtendedStatus, SimpleStatus,
};

use crate::{Error, Ipcomm, Response, ResponseData};

/// Handle on one registered axis.
///
/// Borrowed from the session: the session owns the registry record, the
/// handle is just the (session, address) pair, so copies are free and
/// the cached state is always the session's.
#[derive(Copy, Clone)]
pub struct Axis<'a> {
    ipcomm: &'a Ipcomm,
    addr: Addr,
}

impl std::fmt::Debug for Axis<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Axis").field("addr", &self.addr).finish()
    }
}

impl<'a> Axis<'a> {
    pub(crate) fn new(ipcomm: &'a Ipcomm, addr: Addr) -> Axis<'a> {
        Axis { ipcomm, addr }
    }

    pub fn addr(&self) -> Addr {
        self.addr
    }

    pub fn name(&self) -> Option<String> {
        self.ipcomm.axis_name(self.addr)
    }

    /// Simple status cached from the most recent exchange with this axis.
    pub fn last_status(&self) -> Option<SimpleStatus> {
        self.ipcomm.cached_status(self.addr)
    }

    /// Extended status cached from the most recent `IS?` on this axis.
    pub fn last_extended_status(&self) -> Option<ExtendedStatus> {
        self.ipcomm.cached_extended(self.addr)
    }

    /// Runs a raw command on this axis.
    ///
    /// All typed accessors funnel through here; so can callers holding an
    /// opcode the facade does not cover. Verifies the reply really came
    /// from this axis and refreshes the cached status.
    pub fn execute(&self, cmd: &str) -> Result<Response, Error> {
        let response = self.ipcomm.execute(self.addr, cmd)?;
        if response.addr != self.addr {
            return Err(Error::IdMismatch {
                expected: self.addr,
                got: response.addr,
            });
        }
        self.ipcomm.record_reply(
            self.addr,
            response.status,
            response.data.extended(),
        );
        Ok(response)
    }

    // Motion

    pub fn goto_abs(&self, position: i32) -> Result<SimpleStatus, Error> {
        self.command(&format!("GA{position}"))
    }

    pub fn goto_relative(&self, offset: i32) -> Result<SimpleStatus, Error> {
        self.command(&format!("GR{offset}"))
    }

    pub fn run_forward(&self) -> Result<SimpleStatus, Error> {
        self.command("GF+")
    }

    pub fn run_backward(&self) -> Result<SimpleStatus, Error> {
        self.command("GF-")
    }

    pub fn step_forward(&self) -> Result<SimpleStatus, Error> {
        self.command("GS+")
    }

    pub fn step_backward(&self) -> Result<SimpleStatus, Error> {
        self.command("GS-")
    }

    /// Drives into the + initiator to establish the reference position.
    pub fn initialize_plus(&self) -> Result<SimpleStatus, Error> {
        self.command("GI+")
    }

    pub fn initialize_minus(&self) -> Result<SimpleStatus, Error> {
        self.command("GI-")
    }

    /// Arms this axis for a bus-wide synchronous start
    /// ([`Ipcomm::sync_start_execute`]).
    pub fn sync_start_commence(&self) -> Result<SimpleStatus, Error> {
        self.command("GW")
    }

    pub fn sync_start_abort(&self) -> Result<SimpleStatus, Error> {
        self.command("GB")
    }

    /// Halt with the deceleration ramp.
    pub fn halt(&self) -> Result<SimpleStatus, Error> {
        self.command("H")
    }

    /// Immediate stop.
    pub fn stop(&self) -> Result<SimpleStatus, Error> {
        self.command("B")
    }

    // Currents

    pub fn set_run_current(&self, amps: f64) -> Result<SimpleStatus, Error> {
        self.command(&format!("PR{amps:.1}"))
    }

    pub fn run_current(&self) -> Result<f64, Error> {
        self.query_f64("PR??")
    }

    pub fn set_boost_current(
        &self,
        amps: f64,
    ) -> Result<SimpleStatus, Error> {
        self.command(&format!("PA{amps:.1}"))
    }

    pub fn boost_current(&self) -> Result<f64, Error> {
        self.query_f64("PA??")
    }

    pub fn set_halt_current(
        &self,
        amps: f64,
    ) -> Result<SimpleStatus, Error> {
        self.command(&format!("PS{amps:.1}"))
    }

    pub fn halt_current(&self) -> Result<f64, Error> {
        self.query_f64("PS??")
    }

    /// Boost duration in seconds; the device keeps milliseconds.
    pub fn set_boost_duration(
        &self,
        seconds: f64,
    ) -> Result<SimpleStatus, Error> {
        self.command(&format!("PT{}", (seconds * 1e3) as u32))
    }

    pub fn boost_duration(&self) -> Result<f64, Error> {
        Ok(self.query_f64("PT?")? * 1e-3)
    }

    // Position and frequency

    pub fn set_position(&self, position: i32) -> Result<SimpleStatus, Error> {
        self.command(&format!("PC{position}"))
    }

    pub fn position(&self) -> Result<i32, Error> {
        self.query_i32("PC?")
    }

    pub fn set_run_frequency(&self, hz: u32) -> Result<SimpleStatus, Error> {
        self.command(&format!("PF{hz}"))
    }

    pub fn run_frequency(&self) -> Result<u32, Error> {
        self.query_u32("PF?")
    }

    /// Highest run frequency the hardware will accept.
    pub fn max_frequency(&self) -> Result<u32, Error> {
        self.query_u32("IF?")
    }

    pub fn set_offset_frequency(
        &self,
        hz: u32,
    ) -> Result<SimpleStatus, Error> {
        self.command(&format!("PO{hz}"))
    }

    pub fn offset_frequency(&self) -> Result<u32, Error> {
        self.query_u32("PO?")
    }

    /// A limit of 0 means "no limit" and is transmitted as the all-ones
    /// sentinel.
    pub fn set_run_limit(&self, limit: u32) -> Result<SimpleStatus, Error> {
        let limit = if limit == 0 { u32::MAX } else { limit };
        self.command(&format!("PG{limit}"))
    }

    pub fn run_limit(&self) -> Result<u32, Error> {
        self.query_u32("PG?")
    }

    pub fn set_offset_minus(
        &self,
        offset: i32,
    ) -> Result<SimpleStatus, Error> {
        self.command(&format!("PM{offset}"))
    }

    pub fn offset_minus(&self) -> Result<i32, Error> {
        self.query_i32("PM?")
    }

    pub fn set_offset_plus(
        &self,
        offset: i32,
    ) -> Result<SimpleStatus, Error> {
        self.command(&format!("PP{offset}"))
    }

    pub fn offset_plus(&self) -> Result<i32, Error> {
        self.query_i32("PP?")
    }

    pub fn set_axis_limited(
        &self,
        limited: bool,
    ) -> Result<SimpleStatus, Error> {
        self.command(if limited { "PL1" } else { "PL0" })
    }

    pub fn axis_limited(&self) -> Result<bool, Error> {
        Ok(self.query_i32("PL?")? != 0)
    }

    pub fn set_delta_zero(
        &self,
        delta_zero: i32,
    ) -> Result<SimpleStatus, Error> {
        self.command(&format!("IZ{delta_zero}"))
    }

    pub fn delta_zero(&self) -> Result<i32, Error> {
        self.query_i32("IZ?")
    }

    // Digital I/O

    /// Sets the four outputs; index i drives output i.
    pub fn set_outputs(
        &self,
        outputs: [bool; 4],
    ) -> Result<SimpleStatus, Error> {
        let mut nibble = 0u8;
        for (i, &on) in outputs.iter().enumerate() {
            if on {
                nibble |= 1 << i;
            }
        }
        self.set_outputs_raw(nibble)
    }

    /// Raw nibble form of the output write; bit i drives output i.
    pub fn set_outputs_raw(
        &self,
        nibble: u8,
    ) -> Result<SimpleStatus, Error> {
        self.command(&format!("IO{:X}", nibble & 0xf))
    }

    pub fn outputs(&self) -> Result<[bool; 4], Error> {
        let raw = self.query_hex("IO?")?;
        Ok(std::array::from_fn(|i| raw & (1 << i) != 0))
    }

    pub fn inputs(&self) -> Result<[bool; 8], Error> {
        let raw = self.query_hex("II?")?;
        Ok(std::array::from_fn(|i| raw & (1 << i) != 0))
    }

    // Fault handling and diagnostics

    pub fn clear_driver_error(&self) -> Result<SimpleStatus, Error> {
        self.command("CA")
    }

    pub fn clear_initiator_error(&self) -> Result<SimpleStatus, Error> {
        self.command("CI")
    }

    pub fn clear_output_error(&self) -> Result<SimpleStatus, Error> {
        self.command("CO")
    }

    pub fn reset_hw(&self) -> Result<SimpleStatus, Error> {
        self.command("CR")
    }

    pub fn reset_sfi(&self) -> Result<SimpleStatus, Error> {
        self.command("CS")
    }

    /// Output stage temperature, in °C.
    pub fn driver_temperature(&self) -> Result<i32, Error> {
        self.query_i32("SA?")
    }

    pub fn driver_current(&self) -> Result<i32, Error> {
        self.query_i32("SC?")
    }

    pub fn driver_voltage(&self) -> Result<i32, Error> {
        self.query_i32("SU?")
    }

    /// Reads the 24-bit extended status.
    pub fn extended_status(&self) -> Result<ExtendedStatus, Error> {
        let response = self.execute(EXTENDED_STATUS_QUERY)?;
        match response.data {
            ResponseData::Extended(extended) => Ok(extended),
            ResponseData::Text(text) => Err(Error::BadReply(text)),
        }
    }

    // Plumbing

    fn command(&self, cmd: &str) -> Result<SimpleStatus, Error> {
        Ok(self.execute(cmd)?.status)
    }

    fn query_text(&self, cmd: &str) -> Result<String, Error> {
        match self.execute(cmd)?.data {
            ResponseData::Text(text) => Ok(text),
            ResponseData::Extended(extended) => {
                Err(Error::BadReply(extended.to_string()))
            }
        }
    }

    fn query_i32(&self, cmd: &str) -> Result<i32, Error> {
        let text = self.query_text(cmd)?;
        text.trim().parse().map_err(|_| Error::BadReply(text))
    }

    fn query_u32(&self, cmd: &str) -> Result<u32, Error> {
        let text = self.query_text(cmd)?;
        text.trim().parse().map_err(|_| Error::BadReply(text))
    }

    fn query_f64(&self, cmd: &str) -> Result<f64, Error> {
        let text = self.query_text(cmd)?;
        text.trim().parse().map_err(|_| Error::BadReply(text))
    }

    fn query_hex(&self, cmd: &str) -> Result<u32, Error> {
        let text = self.query_text(cmd)?;
        u32::from_str_radix(text.trim(), 16)
            .map_err(|_| Error::BadReply(text))
    }
}
