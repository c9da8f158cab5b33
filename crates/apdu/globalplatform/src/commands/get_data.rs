//! GET DATA command
//!
//! Reads a data object identified by its two-byte tag carried in P1/P2.

use bytes::Bytes;
use thiserror::Error;

use tessera_apdu_core::response::status::common::*;
use tessera_apdu_core::{ApduCommand, Error as CoreError, Response, StatusWord};

use crate::constants::{cla, ins};

/// GET DATA
#[derive(Debug, Clone, Copy)]
pub struct GetDataCommand {
    identifier: u16,
}

impl GetDataCommand {
    /// Read the data object with the given identifier
    pub const fn with_identifier(identifier: u16) -> Self {
        Self { identifier }
    }
}

/// Success response of GET DATA
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GetDataOk {
    /// Raw data object contents
    pub data: Bytes,
}

/// Error response of GET DATA
#[derive(Debug, Error)]
pub enum GetDataError {
    /// The data object does not exist
    #[error("referenced data not found")]
    ReferencedDataNotFound,

    /// Security status not satisfied
    #[error("security status not satisfied")]
    SecurityStatusNotSatisfied,

    /// Core error
    #[error(transparent)]
    Core(#[from] CoreError),

    /// Unexpected status word
    #[error("unexpected status {0}")]
    Unknown(StatusWord),
}

impl ApduCommand for GetDataCommand {
    type Success = GetDataOk;
    type Error = GetDataError;

    fn convert_error(error: CoreError) -> Self::Error {
        GetDataError::Core(error)
    }

    fn class(&self) -> u8 {
        cla::ISO
    }

    fn instruction(&self) -> u8 {
        ins::GET_DATA
    }

    fn p1(&self) -> u8 {
        (self.identifier >> 8) as u8
    }

    fn p2(&self) -> u8 {
        (self.identifier & 0xFF) as u8
    }

    fn data(&self) -> Option<&[u8]> {
        None
    }

    fn expected_length(&self) -> Option<u16> {
        Some(0)
    }

    fn parse_response(response: Response) -> Result<Self::Success, Self::Error> {
        match response.status() {
            SW_NO_ERROR => Ok(GetDataOk {
                data: response.into_payload(),
            }),
            SW_REFERENCED_DATA_NOT_FOUND => Err(GetDataError::ReferencedDataNotFound),
            SW_SECURITY_STATUS_NOT_SATISFIED => Err(GetDataError::SecurityStatusNotSatisfied),
            status => Err(GetDataError::Unknown(status)),
        }
    }
}
