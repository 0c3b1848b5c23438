// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Driver error taxonomy.

use drv_ipcomm_api::{Addr, DeviceFault, FrameError};

/// Everything that can go wrong between a caller and an axis.
///
/// `Frame(ChecksumMismatch)` is ordinarily consumed by the session's
/// retransmit loop and escapes only through [`Error::ExceededRetries`] or a
/// direct extended-status query; every other variant surfaces where it
/// arises.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// No byte arrived within the read deadline. Terminal for the current
    /// call; never consumes retry budget.
    #[error("receive timeout on the bus")]
    ReceiveTimeout,

    #[error("reply framing: {0}")]
    Frame(#[from] FrameError),

    /// The device rejected the command via its extended status.
    #[error("device fault: {0}")]
    Device(#[from] DeviceFault),

    /// The reply-retransmit budget ran out without an intact reply.
    #[error("no intact reply after {0} retransmit requests")]
    ExceededRetries(u8),

    /// A well-formed reply arrived from a slave we did not address.
    #[error("reply from address {got}, expected {expected}")]
    IdMismatch { expected: Addr, got: Addr },

    /// Registry lookup miss.
    #[error("no axis registered under `{0}`")]
    NotFound(String),

    /// A reply payload failed its typed conversion.
    #[error("unparsable reply payload `{0}`")]
    BadReply(String),

    #[error("serial port: {0}")]
    Serial(#[from] serialport::Error),

    #[error("I/O: {0}")]
    Io(#[from] std::io::Error),
}
