// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Simple and extended status decoding.
//!
//! Every reply carries an 8-bit simple status. When the host needs to know
//! *why* a command was rejected it reads the 24-bit extended status (`IS?`),
//! whose upper bits encode the rejection cause. Both are kept as raw bit
//! sets so they round-trip; `Display` renders the active flags between
//! braces, `{Cold Boot|Running}` style.

use bitflags::bitflags;
use core::fmt;

bitflags! {
    /// The 8-bit status byte carried in every slave reply.
    #[derive(Copy, Clone, Debug, PartialEq, Eq)]
    pub struct SimpleStatus: u8 {
        const COLDBOOT = 1 << 7;
        const ANY_ERROR = 1 << 6;
        const RX_ERROR = 1 << 5;
        const SFI_ERROR = 1 << 4;
        const OUTPUTSTAGE_ERROR = 1 << 3;
        const INITIATOR_MINUS = 1 << 2;
        const INITIATOR_PLUS = 1 << 1;
        const RUNNING = 1 << 0;
    }
}

impl SimpleStatus {
    pub const fn from_raw(raw: u8) -> Self {
        Self::from_bits_retain(raw)
    }

    pub const fn raw(self) -> u8 {
        self.bits()
    }

    pub fn coldboot(self) -> bool {
        self.contains(Self::COLDBOOT)
    }

    /// Some error bit is set somewhere; interrogate further.
    pub fn any_error(self) -> bool {
        self.contains(Self::ANY_ERROR)
    }

    /// The device saw a problem with the last command it received. The host
    /// must read the extended status to find the cause.
    pub fn rx_error(self) -> bool {
        self.contains(Self::RX_ERROR)
    }

    pub fn sfi_error(self) -> bool {
        self.contains(Self::SFI_ERROR)
    }

    pub fn outputstage_error(self) -> bool {
        self.contains(Self::OUTPUTSTAGE_ERROR)
    }

    pub fn initiator_minus(self) -> bool {
        self.contains(Self::INITIATOR_MINUS)
    }

    pub fn initiator_plus(self) -> bool {
        self.contains(Self::INITIATOR_PLUS)
    }

    pub fn running(self) -> bool {
        self.contains(Self::RUNNING)
    }
}

impl fmt::Display for SimpleStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        const LABELS: [(SimpleStatus, &str); 8] = [
            (SimpleStatus::COLDBOOT, "Cold Boot"),
            (SimpleStatus::ANY_ERROR, "Any Error"),
            (SimpleStatus::RX_ERROR, "RX Error"),
            (SimpleStatus::SFI_ERROR, "SFI Error"),
            (SimpleStatus::OUTPUTSTAGE_ERROR, "Output Stage Error"),
            (SimpleStatus::INITIATOR_MINUS, "Initiator -"),
            (SimpleStatus::INITIATOR_PLUS, "Initiator +"),
            (SimpleStatus::RUNNING, "Running"),
        ];
        write_flags(f, *self, &LABELS)
    }
}

bitflags! {
    /// The 24-bit extended status returned as the payload of an `IS?`
    /// reply.
    ///
    /// Bits 6, 16 and 22 are reserved; `from_raw` keeps them so the value
    /// round-trips.
    #[derive(Copy, Clone, Debug, PartialEq, Eq)]
    pub struct ExtendedStatus: u32 {
        const INITIALIZING = 1 << 0;
        const HW_DISABLE = 1 << 1;
        const INITIALIZED = 1 << 2;
        const FREE_RUNNING = 1 << 3;
        const LINEAR_AXIS = 1 << 4;
        const WAIT_FOR_SYNC = 1 << 5;
        const DRIVER_ERROR = 1 << 7;
        const INTERNAL_ERROR = 1 << 8;
        const INITIATOR_ERROR = 1 << 9;
        const HIGH_TEMPERATURE = 1 << 10;
        const PROGRAMMING_ERROR = 1 << 11;
        const BUSY = 1 << 12;
        const PARAMETER_CHANGED = 1 << 13;
        const NO_RAMPS = 1 << 14;
        const NO_SYSTEM = 1 << 15;
        const PARAMETER_LIMITS = 1 << 17;
        const BAD_VALUE = 1 << 18;
        const UNKNOWN_COMMAND = 1 << 19;
        const NOT_NOW = 1 << 20;
        const RXBUFFER_OVERRUN = 1 << 21;
        const CHECKSUM_ERROR = 1 << 23;
    }
}

impl ExtendedStatus {
    pub const fn from_raw(raw: u32) -> Self {
        Self::from_bits_retain(raw & 0x00ff_ffff)
    }

    pub const fn raw(self) -> u32 {
        self.bits()
    }

    pub fn initializing(self) -> bool {
        self.contains(Self::INITIALIZING)
    }

    pub fn hw_disable(self) -> bool {
        self.contains(Self::HW_DISABLE)
    }

    pub fn initialized(self) -> bool {
        self.contains(Self::INITIALIZED)
    }

    pub fn free_running(self) -> bool {
        self.contains(Self::FREE_RUNNING)
    }

    pub fn linear_axis(self) -> bool {
        self.contains(Self::LINEAR_AXIS)
    }

    pub fn wait_for_sync(self) -> bool {
        self.contains(Self::WAIT_FOR_SYNC)
    }

    pub fn driver_error(self) -> bool {
        self.contains(Self::DRIVER_ERROR)
    }

    pub fn internal_error(self) -> bool {
        self.contains(Self::INTERNAL_ERROR)
    }

    pub fn initiator_error(self) -> bool {
        self.contains(Self::INITIATOR_ERROR)
    }

    pub fn high_temperature(self) -> bool {
        self.contains(Self::HIGH_TEMPERATURE)
    }

    pub fn programming_error(self) -> bool {
        self.contains(Self::PROGRAMMING_ERROR)
    }

    pub fn busy(self) -> bool {
        self.contains(Self::BUSY)
    }

    pub fn parameter_changed(self) -> bool {
        self.contains(Self::PARAMETER_CHANGED)
    }

    pub fn no_ramps(self) -> bool {
        self.contains(Self::NO_RAMPS)
    }

    pub fn no_system(self) -> bool {
        self.contains(Self::NO_SYSTEM)
    }

    pub fn parameter_limits(self) -> bool {
        self.contains(Self::PARAMETER_LIMITS)
    }

    pub fn bad_value(self) -> bool {
        self.contains(Self::BAD_VALUE)
    }

    pub fn unknown_command(self) -> bool {
        self.contains(Self::UNKNOWN_COMMAND)
    }

    pub fn not_now(self) -> bool {
        self.contains(Self::NOT_NOW)
    }

    pub fn rxbuffer_overrun(self) -> bool {
        self.contains(Self::RXBUFFER_OVERRUN)
    }

    /// The slave rejected the host's last command as corrupted in transit.
    /// Recovered by retransmitting the command, not reported as a fault.
    pub fn checksum_error(self) -> bool {
        self.contains(Self::CHECKSUM_ERROR)
    }

    /// The device-signalled rejection encoded in this status, if any.
    ///
    /// When several rejection bits are set at once the most severe wins;
    /// the order here is the order the session is required to check them
    /// in. `checksum_error` is deliberately absent - it is recoverable and
    /// handled by the session's retransmit path.
    pub fn fault(self) -> Option<DeviceFault> {
        if self.rxbuffer_overrun() {
            Some(DeviceFault::RxBufferOverrun)
        } else if self.not_now() {
            Some(DeviceFault::NotNow)
        } else if self.unknown_command() {
            Some(DeviceFault::UnknownCommand)
        } else if self.bad_value() {
            Some(DeviceFault::BadValue)
        } else if self.parameter_limits() {
            Some(DeviceFault::ParameterLimits)
        } else {
            None
        }
    }
}

impl fmt::Display for ExtendedStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        const LABELS: [(ExtendedStatus, &str); 21] = [
            (ExtendedStatus::CHECKSUM_ERROR, "Checksum Error"),
            (ExtendedStatus::RXBUFFER_OVERRUN, "RX Buffer Overrun"),
            (ExtendedStatus::NOT_NOW, "Not Now"),
            (ExtendedStatus::UNKNOWN_COMMAND, "Unknown Command"),
            (ExtendedStatus::BAD_VALUE, "Bad Value"),
            (ExtendedStatus::PARAMETER_LIMITS, "Parameter Limits"),
            (ExtendedStatus::NO_SYSTEM, "No System"),
            (ExtendedStatus::NO_RAMPS, "No Ramps"),
            (ExtendedStatus::PARAMETER_CHANGED, "Parameter Changed"),
            (ExtendedStatus::BUSY, "Busy"),
            (ExtendedStatus::PROGRAMMING_ERROR, "Programming Error"),
            (ExtendedStatus::HIGH_TEMPERATURE, "High Temperature"),
            (ExtendedStatus::INITIATOR_ERROR, "Initiator Error"),
            (ExtendedStatus::INTERNAL_ERROR, "Internal Error"),
            (ExtendedStatus::DRIVER_ERROR, "Driver Error"),
            (ExtendedStatus::WAIT_FOR_SYNC, "Wait For Sync"),
            (ExtendedStatus::LINEAR_AXIS, "Linear Axis"),
            (ExtendedStatus::FREE_RUNNING, "Free Running"),
            (ExtendedStatus::INITIALIZED, "Initialized"),
            (ExtendedStatus::HW_DISABLE, "HW Disable"),
            (ExtendedStatus::INITIALIZING, "Initializing"),
        ];
        write_flags(f, *self, &LABELS)
    }
}

fn write_flags<T: bitflags::Flags + Copy>(
    f: &mut fmt::Formatter<'_>,
    status: T,
    labels: &[(T, &str)],
) -> fmt::Result {
    f.write_str("{")?;
    let mut first = true;
    for &(flag, label) in labels {
        if status.contains(flag) {
            if !first {
                f.write_str("|")?;
            }
            f.write_str(label)?;
            first = false;
        }
    }
    f.write_str("}")
}

/// A rejection the device signalled through its extended status. These are
/// terminal for the command that provoked them; none is retried.
#[derive(Copy, Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum DeviceFault {
    /// The device's receive buffer overflowed; the command was lost.
    #[error("device receive buffer overrun")]
    RxBufferOverrun,
    /// The command is not acceptable in the current device state. Advisory;
    /// the caller may retry later.
    #[error("command rejected in the current device state")]
    NotNow,
    /// The device did not recognise the opcode.
    #[error("unknown command")]
    UnknownCommand,
    /// A numeric argument was malformed or not representable.
    #[error("malformed or unrepresentable argument")]
    BadValue,
    /// An argument lay outside the parameter's admissible range.
    #[error("argument outside parameter limits")]
    ParameterLimits,
}
