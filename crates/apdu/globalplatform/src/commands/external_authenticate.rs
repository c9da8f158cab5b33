//! EXTERNAL AUTHENTICATE command
//!
//! Two uses share the instruction: the SCP03 handshake completion carrying
//! the host cryptogram (MACed by the caller before transmission), and the
//! SCP11a/c key agreement carrying the signed control reference template.

use bytes::Bytes;
use thiserror::Error;

use tessera_apdu_core::response::status::common::*;
use tessera_apdu_core::{ApduCommand, Error as CoreError, Response, StatusWord};

use crate::constants::{cla, ins};
use crate::keys::KeyRef;

/// P1 requesting C-DECRYPTION, R-ENCRYPTION, C-MAC and R-MAC
const SECURITY_LEVEL_ENC_MAC: u8 = 0x33;

/// EXTERNAL AUTHENTICATE
#[derive(Debug, Clone)]
pub struct ExternalAuthenticateCommand {
    p1: u8,
    p2: u8,
    data: Bytes,
    le: Option<u16>,
}

impl ExternalAuthenticateCommand {
    /// Complete an SCP03 handshake with the host cryptogram.
    ///
    /// The caller must still wrap the command with a C-MAC under the fresh
    /// session keys before transmitting it.
    pub fn with_host_cryptogram(host_cryptogram: [u8; 8]) -> Self {
        Self {
            p1: SECURITY_LEVEL_ENC_MAC,
            p2: 0x00,
            data: Bytes::copy_from_slice(&host_cryptogram),
            le: None,
        }
    }

    /// Run an SCP11a/c key agreement against the given key slot
    pub fn with_key_agreement(key_ref: KeyRef, payload: impl Into<Bytes>) -> Self {
        Self {
            p1: key_ref.kvn,
            p2: key_ref.kid,
            data: payload.into(),
            le: Some(0),
        }
    }

    /// Check a transmitted handshake response for the expected empty success
    pub fn parse_plain(response: &Response) -> Result<(), ExternalAuthenticateError> {
        match response.status() {
            SW_NO_ERROR => Ok(()),
            SW_SECURITY_STATUS_NOT_SATISFIED => {
                Err(ExternalAuthenticateError::SecurityStatusNotSatisfied)
            }
            SW_AUTHENTICATION_METHOD_BLOCKED => {
                Err(ExternalAuthenticateError::AuthenticationMethodBlocked)
            }
            status => Err(ExternalAuthenticateError::Unknown(status)),
        }
    }
}

/// Success response of EXTERNAL AUTHENTICATE
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalAuthenticateOk {
    /// Response payload; empty for SCP03, the key-agreement TLVs for SCP11
    pub data: Bytes,
}

/// Error response of EXTERNAL AUTHENTICATE
#[derive(Debug, Error)]
pub enum ExternalAuthenticateError {
    /// Security status not satisfied
    #[error("security status not satisfied")]
    SecurityStatusNotSatisfied,

    /// The authentication method is blocked
    #[error("authentication method blocked")]
    AuthenticationMethodBlocked,

    /// Core error
    #[error(transparent)]
    Core(#[from] CoreError),

    /// Unexpected status word
    #[error("unexpected status {0}")]
    Unknown(StatusWord),
}

impl ApduCommand for ExternalAuthenticateCommand {
    type Success = ExternalAuthenticateOk;
    type Error = ExternalAuthenticateError;

    fn convert_error(error: CoreError) -> Self::Error {
        ExternalAuthenticateError::Core(error)
    }

    fn class(&self) -> u8 {
        cla::GP
    }

    fn instruction(&self) -> u8 {
        ins::EXTERNAL_AUTHENTICATE
    }

    fn p1(&self) -> u8 {
        self.p1
    }

    fn p2(&self) -> u8 {
        self.p2
    }

    fn data(&self) -> Option<&[u8]> {
        Some(&self.data)
    }

    fn expected_length(&self) -> Option<u16> {
        self.le
    }

    fn parse_response(response: Response) -> Result<Self::Success, Self::Error> {
        Self::parse_plain(&response)?;
        Ok(ExternalAuthenticateOk {
            data: response.into_payload(),
        })
    }
}
