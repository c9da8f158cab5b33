//! INTERNAL AUTHENTICATE command
//!
//! Carries the SCP11b key agreement: the host's ephemeral public key inside
//! a control reference template, answered by the card's ephemeral key and a
//! receipt.

use bytes::Bytes;
use thiserror::Error;

use tessera_apdu_core::response::status::common::*;
use tessera_apdu_core::{ApduCommand, Error as CoreError, Response, StatusWord};

use crate::constants::{cla, ins};
use crate::keys::KeyRef;

/// INTERNAL AUTHENTICATE
#[derive(Debug, Clone)]
pub struct InternalAuthenticateCommand {
    key_ref: KeyRef,
    data: Bytes,
}

impl InternalAuthenticateCommand {
    /// Run an SCP11b key agreement against the given key slot
    pub fn with_key_agreement(key_ref: KeyRef, payload: impl Into<Bytes>) -> Self {
        Self {
            key_ref,
            data: payload.into(),
        }
    }
}

/// Success response of INTERNAL AUTHENTICATE
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InternalAuthenticateOk {
    /// Key-agreement TLVs: the card's ephemeral key and the receipt
    pub data: Bytes,
}

/// Error response of INTERNAL AUTHENTICATE
#[derive(Debug, Error)]
pub enum InternalAuthenticateError {
    /// Security status not satisfied
    #[error("security status not satisfied")]
    SecurityStatusNotSatisfied,

    /// The authentication method is blocked
    #[error("authentication method blocked")]
    AuthenticationMethodBlocked,

    /// The referenced key does not exist
    #[error("referenced key not found")]
    ReferencedDataNotFound,

    /// Core error
    #[error(transparent)]
    Core(#[from] CoreError),

    /// Unexpected status word
    #[error("unexpected status {0}")]
    Unknown(StatusWord),
}

impl ApduCommand for InternalAuthenticateCommand {
    type Success = InternalAuthenticateOk;
    type Error = InternalAuthenticateError;

    fn convert_error(error: CoreError) -> Self::Error {
        InternalAuthenticateError::Core(error)
    }

    fn class(&self) -> u8 {
        cla::GP
    }

    fn instruction(&self) -> u8 {
        ins::INTERNAL_AUTHENTICATE
    }

    fn p1(&self) -> u8 {
        self.key_ref.kvn
    }

    fn p2(&self) -> u8 {
        self.key_ref.kid
    }

    fn data(&self) -> Option<&[u8]> {
        Some(&self.data)
    }

    fn expected_length(&self) -> Option<u16> {
        Some(0)
    }

    fn parse_response(response: Response) -> Result<Self::Success, Self::Error> {
        match response.status() {
            SW_NO_ERROR => Ok(InternalAuthenticateOk {
                data: response.into_payload(),
            }),
            SW_SECURITY_STATUS_NOT_SATISFIED => {
                Err(InternalAuthenticateError::SecurityStatusNotSatisfied)
            }
            SW_AUTHENTICATION_METHOD_BLOCKED => {
                Err(InternalAuthenticateError::AuthenticationMethodBlocked)
            }
            SW_REFERENCED_DATA_NOT_FOUND => Err(InternalAuthenticateError::ReferencedDataNotFound),
            status => Err(InternalAuthenticateError::Unknown(status)),
        }
    }
}
