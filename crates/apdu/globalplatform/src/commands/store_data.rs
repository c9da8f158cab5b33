//! STORE DATA command
//!
//! Writes a data object in blocks of at most 255 bytes. P1 flags the final
//! block; P2 numbers the blocks.

use bytes::Bytes;
use thiserror::Error;

use tessera_apdu_core::response::status::common::*;
use tessera_apdu_core::{ApduCommand, Error as CoreError, Response, StatusWord};

use crate::constants::{cla, ins};

/// P1 bit marking the final block of a STORE DATA sequence
const P1_LAST_BLOCK: u8 = 0x80;

/// Maximum payload per block
pub const MAX_BLOCK_SIZE: usize = 255;

/// STORE DATA
#[derive(Debug, Clone)]
pub struct StoreDataCommand {
    block: Bytes,
    block_number: u8,
    last: bool,
}

impl StoreDataCommand {
    /// Store one block of a multi-block sequence
    pub fn with_block(block: impl Into<Bytes>, block_number: u8, last: bool) -> Self {
        Self {
            block: block.into(),
            block_number,
            last,
        }
    }

    /// Store a payload that fits in a single block
    pub fn with_payload(payload: impl Into<Bytes>) -> Self {
        Self::with_block(payload, 0, true)
    }
}

/// Success response of STORE DATA
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreDataOk {
    /// Data returned by the application, usually empty
    pub data: Bytes,
}

/// Error response of STORE DATA
#[derive(Debug, Error)]
pub enum StoreDataError {
    /// The data object was rejected
    #[error("invalid data object")]
    WrongData,

    /// Security status not satisfied
    #[error("security status not satisfied")]
    SecurityStatusNotSatisfied,

    /// The referenced object does not exist
    #[error("referenced data not found")]
    ReferencedDataNotFound,

    /// Core error
    #[error(transparent)]
    Core(#[from] CoreError),

    /// Unexpected status word
    #[error("unexpected status {0}")]
    Unknown(StatusWord),
}

impl ApduCommand for StoreDataCommand {
    type Success = StoreDataOk;
    type Error = StoreDataError;

    fn convert_error(error: CoreError) -> Self::Error {
        StoreDataError::Core(error)
    }

    fn class(&self) -> u8 {
        cla::GP
    }

    fn instruction(&self) -> u8 {
        ins::STORE_DATA
    }

    fn p1(&self) -> u8 {
        if self.last {
            P1_LAST_BLOCK
        } else {
            0x00
        }
    }

    fn p2(&self) -> u8 {
        self.block_number
    }

    fn data(&self) -> Option<&[u8]> {
        Some(&self.block)
    }

    fn expected_length(&self) -> Option<u16> {
        None
    }

    fn parse_response(response: Response) -> Result<Self::Success, Self::Error> {
        match response.status() {
            SW_NO_ERROR => Ok(StoreDataOk {
                data: response.into_payload(),
            }),
            SW_WRONG_DATA => Err(StoreDataError::WrongData),
            SW_SECURITY_STATUS_NOT_SATISFIED => Err(StoreDataError::SecurityStatusNotSatisfied),
            SW_REFERENCED_DATA_NOT_FOUND => Err(StoreDataError::ReferencedDataNotFound),
            status => Err(StoreDataError::Unknown(status)),
        }
    }
}
