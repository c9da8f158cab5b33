//! PERFORM SECURITY OPERATION command
//!
//! Uploads one OCE certificate ahead of an SCP11a/c key agreement. The chain
//! is sent leaf last, one certificate per command.

use bytes::Bytes;
use thiserror::Error;

use tessera_apdu_core::response::status::common::*;
use tessera_apdu_core::{ApduCommand, Error as CoreError, Response, StatusWord};

use crate::constants::{cla, ins};
use crate::keys::KeyRef;

/// PERFORM SECURITY OPERATION
#[derive(Debug, Clone)]
pub struct PerformSecurityOperationCommand {
    oce_ref: KeyRef,
    certificate: Bytes,
}

impl PerformSecurityOperationCommand {
    /// Upload one DER-encoded certificate for the given OCE key slot
    pub fn with_certificate(oce_ref: KeyRef, certificate: impl Into<Bytes>) -> Self {
        Self {
            oce_ref,
            certificate: certificate.into(),
        }
    }
}

/// Success response of PERFORM SECURITY OPERATION
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PerformSecurityOperationOk;

/// Error response of PERFORM SECURITY OPERATION
#[derive(Debug, Error)]
pub enum PerformSecurityOperationError {
    /// The certificate was rejected
    #[error("invalid certificate data")]
    WrongData,

    /// The issuer is not recognized by the card
    #[error("issuer not recognized")]
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

impl ApduCommand for PerformSecurityOperationCommand {
    type Success = PerformSecurityOperationOk;
    type Error = PerformSecurityOperationError;

    fn convert_error(error: CoreError) -> Self::Error {
        PerformSecurityOperationError::Core(error)
    }

    fn class(&self) -> u8 {
        cla::GP
    }

    fn instruction(&self) -> u8 {
        ins::PERFORM_SECURITY_OPERATION
    }

    fn p1(&self) -> u8 {
        self.oce_ref.kvn
    }

    fn p2(&self) -> u8 {
        self.oce_ref.kid
    }

    fn data(&self) -> Option<&[u8]> {
        Some(&self.certificate)
    }

    fn expected_length(&self) -> Option<u16> {
        None
    }

    fn parse_response(response: Response) -> Result<Self::Success, Self::Error> {
        match response.status() {
            SW_NO_ERROR => Ok(PerformSecurityOperationOk),
            SW_WRONG_DATA => Err(PerformSecurityOperationError::WrongData),
            SW_REFERENCED_DATA_NOT_FOUND => {
                Err(PerformSecurityOperationError::ReferencedDataNotFound)
            }
            SW_SECURITY_STATUS_NOT_SATISFIED => {
                Err(PerformSecurityOperationError::SecurityStatusNotSatisfied)
            }
            status => Err(PerformSecurityOperationError::Unknown(status)),
        }
    }
}
