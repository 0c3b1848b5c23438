// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Frame encoding and reply parsing.
//!
//! A host-to-slave frame is `STX <payload> ':' XX ETX` where `XX` is the
//! two-digit uppercase hex encoding of the XOR-8 over `<payload>:` (the
//! trailing separator is covered by the checksum). A slave-to-host frame
//! has the interior `<id-hex><status-hex2> ':' <data> ':' XX`, checksummed
//! over everything up to and including the second separator.

use alloc::format;
use alloc::string::String;
use alloc::vec::Vec;

use crate::{Addr, BROADCAST, ETX, SEPARATOR, STX, SimpleStatus, checksum};

/// One decoded slave-to-host frame.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Reply {
    pub addr: Addr,
    pub status: SimpleStatus,
    /// Raw ASCII payload; empty for most motion commands.
    pub data: String,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum FrameError {
    /// The interior did not split into ID+status, data, and checksum.
    #[error("reply does not have three `:`-separated fields")]
    FieldCount,
    /// The ID+status field was not exactly three ASCII hex characters.
    #[error("malformed ID/status field")]
    BadStatusField,
    /// The checksum field did not parse as hex.
    #[error("malformed checksum field")]
    BadChecksumField,
    /// The data field was not text.
    #[error("reply payload is not text")]
    BadDataField,
    /// The computed checksum disagreed with the transmitted one.
    #[error("checksum mismatch: expected {expected:02X}, received {received:02X}")]
    ChecksumMismatch { expected: u8, received: u8 },
}

/// Frames `payload` for transmission: STX, payload, `:`, checksum, ETX.
pub fn encode_frame(payload: &[u8]) -> Vec<u8> {
    let mut frame = Vec::with_capacity(payload.len() + 5);
    frame.push(STX);
    frame.extend_from_slice(payload);
    frame.push(SEPARATOR);
    let chksm = checksum(&frame[1..]);
    frame.extend_from_slice(format!("{chksm:02X}").as_bytes());
    frame.push(ETX);
    frame
}

/// Frames a command addressed to one slave.
pub fn encode_command(addr: Addr, cmd: &str) -> Vec<u8> {
    let payload = format!("{addr}{cmd}");
    encode_frame(payload.as_bytes())
}

/// Frames a broadcast command. No slave replies to these.
pub fn encode_broadcast(cmd: &str) -> Vec<u8> {
    let mut payload = Vec::with_capacity(cmd.len() + 1);
    payload.push(BROADCAST);
    payload.extend_from_slice(cmd.as_bytes());
    encode_frame(&payload)
}

/// Parses the interior of a slave-to-host frame (the bytes between STX
/// and ETX).
///
/// The checksum is verified before the field contents are interpreted, so a
/// corrupted frame reports [`FrameError::ChecksumMismatch`] rather than
/// whatever field damage the corruption caused.
pub fn parse_reply(interior: &[u8]) -> Result<Reply, FrameError> {
    let fields: Vec<&[u8]> = interior.split(|&b| b == SEPARATOR).collect();
    let &[id_status, data, chksm_field] = fields.as_slice() else {
        return Err(FrameError::FieldCount);
    };

    let received = core::str::from_utf8(chksm_field)
        .ok()
        .and_then(|s| u8::from_str_radix(s, 16).ok())
        .ok_or(FrameError::BadChecksumField)?;

    let expected = checksum(&interior[..interior.len() - chksm_field.len()]);
    if expected != received {
        return Err(FrameError::ChecksumMismatch { expected, received });
    }

    if id_status.len() != 3 {
        return Err(FrameError::BadStatusField);
    }
    let addr = Addr::from_hex_digit(id_status[0])
        .ok_or(FrameError::BadStatusField)?;
    let status = core::str::from_utf8(&id_status[1..])
        .ok()
        .and_then(|s| u8::from_str_radix(s, 16).ok())
        .map(SimpleStatus::from_raw)
        .ok_or(FrameError::BadStatusField)?;

    let data = String::from_utf8(data.to_vec())
        .map_err(|_| FrameError::BadDataField)?;

    Ok(Reply { addr, status, data })
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn addr(id: u8) -> Addr {
        Addr::new(id).unwrap()
    }

    /// Builds the interior of a well-formed reply frame.
    fn reply_interior(id: u8, status: u8, data: &str) -> Vec<u8> {
        let mut interior = format!("{:X}{:02X}:{}:", id, status, data)
            .into_bytes();
        let chksm = checksum(&interior);
        interior.extend_from_slice(format!("{chksm:02X}").as_bytes());
        interior
    }

    #[track_caller]
    fn check_parse(interior: &[u8], expected: &Reply) {
        assert_eq!(
            parse_reply(interior).as_ref(),
            Ok(expected),
            "parsing interior: {}",
            String::from_utf8_lossy(interior),
        );
    }

    #[test]
    fn encode_ga100() {
        // Checksum of "3GA100:" is 0x3E.
        assert_eq!(encode_command(addr(3), "GA100"), b"\x023GA100:3E\x03");
    }

    #[test]
    fn encode_broadcast_syncstart() {
        let frame = encode_broadcast("GX");
        assert_eq!(frame[0], STX);
        assert_eq!(*frame.last().unwrap(), ETX);
        assert_eq!(&frame[1..4], b"@GX");
        let chksm = checksum(b"@GX:");
        assert_eq!(&frame[4..7], format!(":{chksm:02X}").as_bytes());
    }

    #[test]
    fn parse_empty_data() {
        check_parse(
            &reply_interior(3, 0x00, ""),
            &Reply {
                addr: addr(3),
                status: SimpleStatus::from_raw(0),
                data: String::new(),
            },
        );
    }

    #[test]
    fn parse_with_data_and_status() {
        check_parse(
            &reply_interior(0xa, 0x21, "1500"),
            &Reply {
                addr: addr(0xa),
                status: SimpleStatus::RX_ERROR | SimpleStatus::RUNNING,
                data: String::from("1500"),
            },
        );
    }

    #[test]
    fn checksum_field_is_case_insensitive() {
        // Checksum of "300:M:" is 0x7E; lowercase only the checksum digits
        // so the covered bytes stay intact.
        let mut interior = reply_interior(3, 0x00, "M");
        let len = interior.len();
        interior[len - 2..].make_ascii_lowercase();
        assert!(interior.ends_with(b"7e"));
        assert!(parse_reply(&interior).is_ok());
    }

    #[test]
    fn corrupted_checksum_is_reported_with_both_values() {
        let mut interior = reply_interior(3, 0x00, "");
        let expected = checksum(&interior[..interior.len() - 2]);
        interior.truncate(interior.len() - 2);
        interior.extend_from_slice(b"FF");
        assert_eq!(
            parse_reply(&interior),
            Err(FrameError::ChecksumMismatch { expected, received: 0xff }),
        );
    }

    #[test]
    fn corrupted_payload_is_a_checksum_mismatch() {
        // Flip a payload byte; the frame must be rejected on the checksum,
        // not misparsed.
        let mut interior = reply_interior(3, 0x00, "123");
        interior[5] = b'7';
        assert!(matches!(
            parse_reply(&interior),
            Err(FrameError::ChecksumMismatch { .. }),
        ));
    }

    #[test]
    fn field_count_is_enforced() {
        assert_eq!(parse_reply(b"30033"), Err(FrameError::FieldCount));
        // An extra separator lands in the checksum field.
        let interior = reply_interior(3, 0x00, "a:b");
        assert!(matches!(
            parse_reply(&interior),
            Err(FrameError::FieldCount) | Err(FrameError::BadChecksumField),
        ));
    }

    #[test]
    fn short_id_status_field_is_rejected() {
        // "30::" with a correct checksum: two-character first field.
        let mut interior = b"30:".to_vec();
        interior.push(SEPARATOR);
        let chksm = checksum(&interior);
        interior.extend_from_slice(format!("{chksm:02X}").as_bytes());
        // Interior is now "30::XX" - wrong shape but right checksum.
        assert_eq!(parse_reply(&interior), Err(FrameError::BadStatusField));
    }

    #[test]
    fn non_hex_status_is_rejected() {
        let mut interior = b"3G0:".to_vec();
        interior.push(SEPARATOR);
        let chksm = checksum(&interior);
        interior.extend_from_slice(format!("{chksm:02X}").as_bytes());
        assert_eq!(parse_reply(&interior), Err(FrameError::BadStatusField));
    }

    proptest! {
        /// Encoding then stripping the delimiters yields a reply that parses
        /// back to the same fields, and the emitted checksum is the XOR-8 of
        /// payload-plus-separator.
        #[test]
        fn reply_roundtrip(
            id in 0u8..16,
            status in proptest::num::u8::ANY,
            data in "[ -9;-~]{0,24}",
        ) {
            let payload = format!("{:X}{:02X}:{}", id, status, data);
            let frame = encode_frame(payload.as_bytes());

            prop_assert_eq!(frame[0], STX);
            prop_assert_eq!(frame[frame.len() - 1], ETX);

            let with_sep = format!("{payload}:");
            let emitted = core::str::from_utf8(&frame[frame.len() - 3..frame.len() - 1])
                .unwrap();
            prop_assert_eq!(
                u8::from_str_radix(emitted, 16).unwrap(),
                checksum(with_sep.as_bytes()),
            );

            let reply = parse_reply(&frame[1..frame.len() - 1]).unwrap();
            prop_assert_eq!(reply.addr.get(), id);
            prop_assert_eq!(reply.status.raw(), status);
            prop_assert_eq!(reply.data, data);
        }
    }
}
