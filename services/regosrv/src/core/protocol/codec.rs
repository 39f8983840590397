//! Frame codec
//!
//! [`FrameCodec`] turns requests into bytes and validates/decodes the
//! controller's answers. [`RegoCodec`] is the Rego 600/635 layout:
//!
//! ```text
//! request   81 CC R2 R1 R0 V2 V1 V0 XX     XX = xor(bytes 2..=7)
//! register  01 B2 B1 B0 XX                 XX = B2 ^ B1 ^ B0
//! display   01 <40 nibble bytes> XX        XX = xor(bytes 1..=40)
//! ack       01
//! ```
//!
//! 16-bit quantities travel as three 7-bit groups (2 + 7 + 7 bits).

use errors::{protocol_error, RegoError, RegoResult};
use std::fmt;

use crate::core::registers::Bank;

/// One request on the serial line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Request {
    ReadRegister { bank: Bank, register: u16 },
    ReadDisplay { row: u8 },
    Write { bank: Bank, register: u16, value: i16 },
}

impl fmt::Display for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Request::ReadRegister { bank, register } => {
                write!(f, "read {:?} {:#06X}", bank, register)
            },
            Request::ReadDisplay { row } => write!(f, "read display row {}", row),
            Request::Write {
                bank,
                register,
                value,
            } => write!(f, "write {:?} {:#06X} = {}", bank, register, value),
        }
    }
}

/// Decoded answer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    Value(i32),
    Text(String),
    Ack,
}

/// Byte layout of the serial protocol
pub trait FrameCodec: Send + Sync + fmt::Debug {
    fn encode(&self, request: &Request) -> RegoResult<Vec<u8>>;

    /// Number of bytes a complete answer to `request` has
    fn response_len(&self, request: &Request) -> usize;

    /// Validate and decode a complete answer
    fn decode(&self, request: &Request, frame: &[u8]) -> RegoResult<Response>;
}

pub const PUMP_ADDRESS: u8 = 0x81;
pub const PC_ADDRESS: u8 = 0x01;

pub const CMD_READ_FRONT_PANEL: u8 = 0x00;
pub const CMD_WRITE_FRONT_PANEL: u8 = 0x01;
pub const CMD_READ_SYSTEM: u8 = 0x02;
pub const CMD_WRITE_SYSTEM: u8 = 0x03;
pub const CMD_READ_DISPLAY: u8 = 0x20;

const REGISTER_RESPONSE_LEN: usize = 5;
const DISPLAY_RESPONSE_LEN: usize = 42;
const ACK_RESPONSE_LEN: usize = 1;
const REQUEST_LEN: usize = 9;

/// Rego 600/635 wire format
#[derive(Debug, Default, Clone, Copy)]
pub struct RegoCodec;

impl RegoCodec {
    /// Split a 16-bit quantity into the 2/7/7-bit groups of the wire format
    pub fn split7(x: u16) -> [u8; 3] {
        [
            ((x >> 14) & 0x03) as u8,
            ((x >> 7) & 0x7F) as u8,
            (x & 0x7F) as u8,
        ]
    }

    pub fn xor(bytes: &[u8]) -> u8 {
        bytes.iter().fold(0, |acc, b| acc ^ b)
    }

    fn command(request: &Request) -> RegoResult<u8> {
        match request {
            Request::ReadRegister {
                bank: Bank::System,
                ..
            } => Ok(CMD_READ_SYSTEM),
            Request::ReadRegister {
                bank: Bank::FrontPanel,
                ..
            } => Ok(CMD_READ_FRONT_PANEL),
            Request::ReadDisplay { .. } => Ok(CMD_READ_DISPLAY),
            Request::Write {
                bank: Bank::System,
                ..
            } => Ok(CMD_WRITE_SYSTEM),
            Request::Write {
                bank: Bank::FrontPanel,
                ..
            } => Ok(CMD_WRITE_FRONT_PANEL),
            other => Err(protocol_error!("no wire command for {}", other)),
        }
    }

    fn check_header(frame: &[u8], expected_len: usize) -> RegoResult<()> {
        if frame.len() != expected_len {
            return Err(protocol_error!(
                "truncated frame: {} of {} bytes",
                frame.len(),
                expected_len
            ));
        }
        if frame[0] != PC_ADDRESS {
            return Err(protocol_error!(
                "unexpected address {:#04X}",
                frame[0]
            ));
        }
        Ok(())
    }

    fn check_sum(expected: u8, actual: u8) -> RegoResult<()> {
        if expected != actual {
            return Err(RegoError::Checksum { expected, actual });
        }
        Ok(())
    }

    fn decode_value(frame: &[u8]) -> RegoResult<i32> {
        Self::check_header(frame, REGISTER_RESPONSE_LEN)?;
        Self::check_sum(Self::xor(&frame[1..4]), frame[4])?;

        let mut raw = (i32::from(frame[1] & 0x7F) << 14)
            | (i32::from(frame[2] & 0x7F) << 7)
            | i32::from(frame[3] & 0x7F);
        if raw & 0x10000 != 0 {
            raw -= 0x20000;
        }
        Ok(raw)
    }

    fn decode_text(frame: &[u8]) -> RegoResult<String> {
        Self::check_header(frame, DISPLAY_RESPONSE_LEN)?;
        Self::check_sum(Self::xor(&frame[1..41]), frame[41])?;

        let text: String = frame[1..41]
            .chunks_exact(2)
            .filter_map(|pair| {
                let code = ((pair[0] & 0x0F) << 4) | (pair[1] & 0x0F);
                match code {
                    0xFF => None,
                    0xDF => Some('°'),
                    // Display charset is Latin-1
                    other => Some(char::from(other)),
                }
            })
            .collect();
        Ok(text.trim().to_string())
    }
}

impl FrameCodec for RegoCodec {
    fn encode(&self, request: &Request) -> RegoResult<Vec<u8>> {
        let command = Self::command(request)?;
        let (address, value) = match *request {
            Request::ReadRegister { register, .. } => (register, 0u16),
            Request::ReadDisplay { row } => (u16::from(row), 0u16),
            // Two's complement: wheel left (-1) becomes 03 7F 7F
            Request::Write {
                register, value, ..
            } => (register, value as u16),
        };

        let mut frame = Vec::with_capacity(REQUEST_LEN);
        frame.push(PUMP_ADDRESS);
        frame.push(command);
        frame.extend_from_slice(&Self::split7(address));
        frame.extend_from_slice(&Self::split7(value));
        frame.push(Self::xor(&frame[2..8]));
        Ok(frame)
    }

    fn response_len(&self, request: &Request) -> usize {
        match request {
            Request::ReadRegister { .. } => REGISTER_RESPONSE_LEN,
            Request::ReadDisplay { .. } => DISPLAY_RESPONSE_LEN,
            Request::Write { .. } => ACK_RESPONSE_LEN,
        }
    }

    fn decode(&self, request: &Request, frame: &[u8]) -> RegoResult<Response> {
        match request {
            Request::ReadRegister { .. } => Self::decode_value(frame).map(Response::Value),
            Request::ReadDisplay { .. } => Self::decode_text(frame).map(Response::Text),
            Request::Write { .. } => {
                Self::check_header(frame, ACK_RESPONSE_LEN)?;
                Ok(Response::Ack)
            },
        }
    }
}

/// Build a register answer frame for `raw` (used by tests and simulators)
pub fn encode_register_response(raw: i32) -> Vec<u8> {
    let wire = (raw & 0x1FFFF) as u32;
    let b2 = ((wire >> 14) & 0x7F) as u8;
    let b1 = ((wire >> 7) & 0x7F) as u8;
    let b0 = (wire & 0x7F) as u8;
    vec![PC_ADDRESS, b2, b1, b0, b2 ^ b1 ^ b0]
}

/// Build a display answer frame for `text` (padded with spaces to 20 chars)
pub fn encode_display_response(text: &str) -> Vec<u8> {
    let mut frame = Vec::with_capacity(DISPLAY_RESPONSE_LEN);
    frame.push(PC_ADDRESS);
    let codes = text
        .chars()
        .map(|c| if c == '°' { 0xDF } else { c as u32 as u8 })
        .chain(std::iter::repeat(b' '))
        .take(20);
    for code in codes {
        frame.push(code >> 4);
        frame.push(code & 0x0F);
    }
    frame.push(RegoCodec::xor(&frame[1..41]));
    frame
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;

    #[test]
    fn test_encode_read_system_register() {
        let frame = RegoCodec
            .encode(&Request::ReadRegister {
                bank: Bank::System,
                register: 0x020A,
            })
            .unwrap();
        // 0x020A -> 00 04 0A
        assert_eq!(frame, vec![0x81, 0x02, 0x00, 0x04, 0x0A, 0x00, 0x00, 0x00, 0x0E]);
    }

    #[test]
    fn test_encode_wheel_left() {
        let frame = RegoCodec
            .encode(&Request::Write {
                bank: Bank::FrontPanel,
                register: 0x0044,
                value: -1,
            })
            .unwrap();
        assert_eq!(&frame[..8], &[0x81, 0x01, 0x00, 0x00, 0x44, 0x03, 0x7F, 0x7F]);
        assert_eq!(frame[8], RegoCodec::xor(&frame[2..8]));
    }

    #[test]
    fn test_encode_derived_is_rejected() {
        let err = RegoCodec
            .encode(&Request::ReadRegister {
                bank: Bank::Derived,
                register: 0xF000,
            })
            .unwrap_err();
        assert!(matches!(err, RegoError::Protocol(_)));
    }

    #[test]
    fn test_decode_register_values() {
        let request = Request::ReadRegister {
            bank: Bank::System,
            register: 0x020A,
        };
        for raw in [0, 1, 215, -35, 32767, -32768] {
            let frame = encode_register_response(raw);
            assert_eq!(
                RegoCodec.decode(&request, &frame).unwrap(),
                Response::Value(raw),
                "raw {raw}"
            );
        }
    }

    #[test]
    fn test_decode_rejects_bad_checksum() {
        let request = Request::ReadRegister {
            bank: Bank::System,
            register: 0x020A,
        };
        let mut frame = encode_register_response(215);
        frame[4] ^= 0x01;
        let err = RegoCodec.decode(&request, &frame).unwrap_err();
        assert!(matches!(err, RegoError::Checksum { .. }));
    }

    #[test]
    fn test_decode_rejects_short_and_misaddressed() {
        let request = Request::ReadRegister {
            bank: Bank::System,
            register: 0x020A,
        };
        let frame = encode_register_response(215);
        assert!(RegoCodec.decode(&request, &frame[..3]).is_err());

        let mut frame = frame;
        frame[0] = 0x81;
        let err = RegoCodec.decode(&request, &frame).unwrap_err();
        assert!(err.to_string().contains("unexpected address"));
    }

    #[test]
    fn test_decode_display_row() {
        let request = Request::ReadDisplay { row: 0 };
        let mut frame = encode_display_response("  Outdoor -3°C");
        assert_eq!(
            RegoCodec.decode(&request, &frame).unwrap(),
            Response::Text("Outdoor -3°C".to_string())
        );

        // 0xFF cells are blank
        frame[1] = 0x0F;
        frame[2] = 0x0F;
        frame[41] = RegoCodec::xor(&frame[1..41]);
        assert_eq!(
            RegoCodec.decode(&request, &frame).unwrap(),
            Response::Text("Outdoor -3°C".to_string())
        );
    }

    #[test]
    fn test_decode_ack() {
        let request = Request::Write {
            bank: Bank::System,
            register: 0x0021,
            value: 215,
        };
        assert_eq!(RegoCodec.decode(&request, &[0x01]).unwrap(), Response::Ack);
        assert!(RegoCodec.decode(&request, &[0x00]).is_err());
    }
}
