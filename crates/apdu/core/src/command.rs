//! APDU command definitions and traits
//!
//! This module provides types and traits for working with APDU commands
//! according to ISO/IEC 7816-4, including both short and extended
//! Lc/Le encodings.

use std::fmt;

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::Error;
use crate::response::Response;

/// Maximum data length carried by a short APDU body
pub const SHORT_APDU_MAX_DATA: usize = 255;

/// Maximum data length carried by an extended APDU body
pub const EXTENDED_APDU_MAX_DATA: usize = 65535;

/// Core trait for typed APDU commands
pub trait ApduCommand {
    /// Success response type
    type Success;

    /// Error response type
    type Error: fmt::Debug;

    /// Convert a core error to the command-specific error type
    fn convert_error(error: Error) -> Self::Error;

    /// Command class (CLA)
    fn class(&self) -> u8;

    /// Instruction code (INS)
    fn instruction(&self) -> u8;

    /// First parameter (P1)
    fn p1(&self) -> u8;

    /// Second parameter (P2)
    fn p2(&self) -> u8;

    /// Command payload data (optional)
    fn data(&self) -> Option<&[u8]>;

    /// Expected response length (optional; 0 means the maximum)
    fn expected_length(&self) -> Option<u16>;

    /// Convert to a generic Command
    fn to_command(&self) -> Command {
        Command {
            cla: self.class(),
            ins: self.instruction(),
            p1: self.p1(),
            p2: self.p2(),
            data: self.data().map(Bytes::copy_from_slice),
            le: self.expected_length(),
        }
    }

    /// Parse a response into the command's response type
    fn parse_response(response: Response) -> Result<Self::Success, Self::Error>;
}

/// Generic APDU command structure
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    /// Command class byte
    pub cla: u8,
    /// Instruction byte
    pub ins: u8,
    /// Parameter 1
    pub p1: u8,
    /// Parameter 2
    pub p2: u8,
    /// Command data (optional)
    pub data: Option<Bytes>,
    /// Expected response length (optional; 0 means the maximum)
    pub le: Option<u16>,
}

impl Command {
    /// Create a new command with just the header bytes
    pub const fn new(cla: u8, ins: u8, p1: u8, p2: u8) -> Self {
        Self {
            cla,
            ins,
            p1,
            p2,
            data: None,
            le: None,
        }
    }

    /// Create a new command with data payload
    pub fn new_with_data<T: Into<Bytes>>(cla: u8, ins: u8, p1: u8, p2: u8, data: T) -> Self {
        Self::new(cla, ins, p1, p2).with_data(data)
    }

    /// Set the data field
    pub fn with_data<T: Into<Bytes>>(mut self, data: T) -> Self {
        self.data = Some(data.into());
        self
    }

    /// Set the expected length field
    pub const fn with_le(mut self, le: u16) -> Self {
        self.le = Some(le);
        self
    }

    /// The four header bytes CLA INS P1 P2
    pub const fn header(&self) -> [u8; 4] {
        [self.cla, self.ins, self.p1, self.p2]
    }

    /// Length of the command data, zero when absent
    pub fn data_len(&self) -> usize {
        self.data.as_ref().map_or(0, Bytes::len)
    }

    /// Whether the command requires the extended encoding
    pub fn requires_extended(&self) -> bool {
        self.data_len() > SHORT_APDU_MAX_DATA || self.le.is_some_and(|le| le > 256)
    }

    /// Serialize into the requested encoding.
    ///
    /// Errors with [`Error::DataTooLong`] when the payload does not fit the
    /// chosen encoding; callers needing to carry more data must use command
    /// chaining.
    pub fn serialize(&self, extended: bool) -> Result<Bytes, Error> {
        let data_len = self.data_len();
        let limit = if extended {
            EXTENDED_APDU_MAX_DATA
        } else {
            SHORT_APDU_MAX_DATA
        };
        if data_len > limit {
            return Err(Error::DataTooLong(data_len));
        }

        let mut buffer = BytesMut::with_capacity(4 + 3 + data_len + 3);
        buffer.put_slice(&self.header());

        if extended {
            if let Some(data) = self.data.as_ref() {
                buffer.put_u8(0x00);
                buffer.put_u16(data_len as u16);
                buffer.put_slice(data);
            }
            if let Some(le) = self.le {
                // Le 0x0000 requests the maximum of 65536 bytes
                if self.data.is_none() {
                    buffer.put_u8(0x00);
                }
                buffer.put_u16(if le == 0 { 0 } else { le });
            }
        } else {
            if let Some(data) = self.data.as_ref() {
                buffer.put_u8(data_len as u8);
                buffer.put_slice(data);
            }
            if let Some(le) = self.le {
                // Le 0x00 requests the maximum of 256 bytes
                buffer.put_u8(if le >= 256 { 0 } else { le as u8 });
            }
        }

        Ok(buffer.freeze())
    }

    /// Serialize into raw APDU bytes, picking the smallest encoding that fits
    pub fn to_bytes(&self) -> Bytes {
        // The extended limit bounds data_len, so this cannot fail
        match self.serialize(self.requires_extended()) {
            Ok(bytes) => bytes,
            Err(_) => Bytes::new(),
        }
    }

    /// Parse a short-encoded command from raw bytes
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, Error> {
        if bytes.len() < 4 {
            return Err(Error::InvalidCommandLength(bytes.len()));
        }

        let mut command = Self::new(bytes[0], bytes[1], bytes[2], bytes[3]);
        let body = &bytes[4..];

        match body.len() {
            0 => {}
            1 => {
                // Le only
                command.le = Some(body[0] as u16);
            }
            _ => {
                let lc = body[0] as usize;
                if body.len() < 1 + lc {
                    return Err(Error::InvalidCommandLength(bytes.len()));
                }
                if lc > 0 {
                    command.data = Some(Bytes::copy_from_slice(&body[1..1 + lc]));
                }
                match body.len() - (1 + lc) {
                    0 => {}
                    1 => command.le = Some(body[1 + lc] as u16),
                    _ => return Err(Error::InvalidCommandLength(bytes.len())),
                }
            }
        }

        Ok(command)
    }
}

impl ApduCommand for Command {
    type Success = Response;
    type Error = Error;

    fn convert_error(error: Error) -> Self::Error {
        error
    }

    fn class(&self) -> u8 {
        self.cla
    }

    fn instruction(&self) -> u8 {
        self.ins
    }

    fn p1(&self) -> u8 {
        self.p1
    }

    fn p2(&self) -> u8 {
        self.p2
    }

    fn data(&self) -> Option<&[u8]> {
        self.data.as_deref()
    }

    fn expected_length(&self) -> Option<u16> {
        self.le
    }

    fn parse_response(response: Response) -> Result<Self::Success, Self::Error> {
        Ok(response)
    }
}
