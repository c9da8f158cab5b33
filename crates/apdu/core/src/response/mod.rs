//! APDU response parsing
//!
//! A response is the payload returned by the card followed by a two-byte
//! status word.

pub mod status;

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::Error;
use status::StatusWord;

/// Parsed APDU response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    payload: Option<Bytes>,
    status: StatusWord,
}

impl Response {
    /// Create a new response from a payload and status word
    pub const fn new(payload: Option<Bytes>, status: StatusWord) -> Self {
        Self { payload, status }
    }

    /// Create a success (0x9000) response
    pub const fn success(payload: Option<Bytes>) -> Self {
        Self::new(payload, StatusWord::new(0x90, 0x00))
    }

    /// Create an empty response with the given status word
    pub const fn status_only(status: StatusWord) -> Self {
        Self::new(None, status)
    }

    /// Parse a response from raw bytes (payload followed by SW1/SW2)
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, Error> {
        if bytes.len() < 2 {
            return Err(Error::Parse("response shorter than status word"));
        }

        let (payload, trailer) = bytes.split_at(bytes.len() - 2);
        let payload = if payload.is_empty() {
            None
        } else {
            Some(Bytes::copy_from_slice(payload))
        };

        Ok(Self {
            payload,
            status: StatusWord::new(trailer[0], trailer[1]),
        })
    }

    /// The response payload, if any
    pub const fn payload(&self) -> Option<&Bytes> {
        self.payload.as_ref()
    }

    /// The response payload as a slice (empty when absent)
    pub fn data(&self) -> &[u8] {
        self.payload.as_deref().unwrap_or_default()
    }

    /// The status word
    pub const fn status(&self) -> StatusWord {
        self.status
    }

    /// Whether the status word is 0x9000
    pub const fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// Consume the response and return its payload (empty when absent)
    pub fn into_payload(self) -> Bytes {
        self.payload.unwrap_or_default()
    }

    /// Pass the response through unless it carries an error status
    pub fn into_success(self) -> Result<Self, Error> {
        if self.is_success() {
            Ok(self)
        } else {
            Err(Error::Status(self.status))
        }
    }
}

impl From<Response> for Bytes {
    fn from(response: Response) -> Self {
        let payload_len = response.payload.as_ref().map_or(0, Bytes::len);
        let mut buffer = BytesMut::with_capacity(payload_len + 2);
        if let Some(payload) = response.payload {
            buffer.put_slice(&payload);
        }
        buffer.put_u8(response.status.sw1);
        buffer.put_u8(response.status.sw2);
        buffer.freeze()
    }
}
