//! GENERATE KEY command
//!
//! Asks the card to generate an EC keypair in a slot and returns the public
//! point.

use bytes::Bytes;
use thiserror::Error;

use tessera_apdu_core::response::status::common::*;
use tessera_apdu_core::{ApduCommand, Error as CoreError, Response, StatusWord};

use crate::constants::{cla, ins, tags};
use crate::keys::KeyRef;
use crate::tlv;

/// GENERATE KEY
#[derive(Debug, Clone, Copy)]
pub struct GenerateKeyCommand {
    key_ref: KeyRef,
    replace_kvn: u8,
}

impl GenerateKeyCommand {
    /// Generate a keypair in the given slot, optionally replacing a version
    pub const fn with_key_ref(key_ref: KeyRef, replace_kvn: u8) -> Self {
        Self {
            key_ref,
            replace_kvn,
        }
    }
}

/// Success response of GENERATE KEY
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerateKeyOk {
    /// Uncompressed public point of the generated keypair
    pub public_key: Bytes,
}

/// Error response of GENERATE KEY
#[derive(Debug, Error)]
pub enum GenerateKeyError {
    /// Security status not satisfied
    #[error("security status not satisfied")]
    SecurityStatusNotSatisfied,

    /// The referenced slot does not exist
    #[error("referenced key not found")]
    ReferencedDataNotFound,

    /// The generation parameters were rejected
    #[error("invalid generation parameters")]
    WrongData,

    /// Core error
    #[error(transparent)]
    Core(#[from] CoreError),

    /// Unexpected status word
    #[error("unexpected status {0}")]
    Unknown(StatusWord),
}

impl ApduCommand for GenerateKeyCommand {
    type Success = GenerateKeyOk;
    type Error = GenerateKeyError;

    fn convert_error(error: CoreError) -> Self::Error {
        GenerateKeyError::Core(error)
    }

    fn class(&self) -> u8 {
        cla::GP
    }

    fn instruction(&self) -> u8 {
        ins::GENERATE_KEY
    }

    fn p1(&self) -> u8 {
        self.replace_kvn
    }

    fn p2(&self) -> u8 {
        self.key_ref.kid
    }

    fn data(&self) -> Option<&[u8]> {
        Some(std::slice::from_ref(&self.key_ref.kvn))
    }

    fn expected_length(&self) -> Option<u16> {
        Some(0)
    }

    fn parse_response(response: Response) -> Result<Self::Success, Self::Error> {
        match response.status() {
            SW_NO_ERROR => {
                let payload = response.data();
                let point = tlv::expect(payload, tags::EC_PUBLIC_KEY)
                    .map_err(|_| CoreError::Parse("GENERATE KEY response missing public key"))
                    .map_err(GenerateKeyError::Core)?;
                Ok(GenerateKeyOk {
                    public_key: Bytes::copy_from_slice(point),
                })
            }
            SW_SECURITY_STATUS_NOT_SATISFIED => Err(GenerateKeyError::SecurityStatusNotSatisfied),
            SW_REFERENCED_DATA_NOT_FOUND => Err(GenerateKeyError::ReferencedDataNotFound),
            SW_WRONG_DATA => Err(GenerateKeyError::WrongData),
            status => Err(GenerateKeyError::Unknown(status)),
        }
    }
}
