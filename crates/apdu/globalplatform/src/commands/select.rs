//! SELECT command
//!
//! Selects a card application by AID and returns its file control
//! information.

use bytes::Bytes;
use thiserror::Error;

use tessera_apdu_core::response::status::common::*;
use tessera_apdu_core::{ApduCommand, Error as CoreError, Response, StatusWord};

use crate::constants::{cla, ins};

/// SELECT by AID
#[derive(Debug, Clone)]
pub struct SelectCommand {
    aid: Bytes,
}

impl SelectCommand {
    /// Select the application identified by `aid`
    pub fn with_aid(aid: impl Into<Bytes>) -> Self {
        Self { aid: aid.into() }
    }
}

/// Success response of SELECT
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectOk {
    /// File control information returned by the application
    pub fci: Bytes,
}

/// Error response of SELECT
#[derive(Debug, Error)]
pub enum SelectError {
    /// The application does not exist on the card
    #[error("application not found")]
    ApplicationNotFound,

    /// Core error
    #[error(transparent)]
    Core(#[from] CoreError),

    /// Unexpected status word
    #[error("unexpected status {0}")]
    Unknown(StatusWord),
}

impl ApduCommand for SelectCommand {
    type Success = SelectOk;
    type Error = SelectError;

    fn convert_error(error: CoreError) -> Self::Error {
        SelectError::Core(error)
    }

    fn class(&self) -> u8 {
        cla::ISO
    }

    fn instruction(&self) -> u8 {
        ins::SELECT
    }

    fn p1(&self) -> u8 {
        0x04
    }

    fn p2(&self) -> u8 {
        0x00
    }

    fn data(&self) -> Option<&[u8]> {
        Some(&self.aid)
    }

    fn expected_length(&self) -> Option<u16> {
        Some(0)
    }

    fn parse_response(response: Response) -> Result<Self::Success, Self::Error> {
        match response.status() {
            SW_NO_ERROR => Ok(SelectOk {
                fci: response.into_payload(),
            }),
            SW_APPLICATION_NOT_FOUND => Err(SelectError::ApplicationNotFound),
            status => Err(SelectError::Unknown(status)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hex_literal::hex;

    #[test]
    fn test_select_serialization() {
        let cmd = SelectCommand::with_aid(hex!("A000000151000000").to_vec());
        assert_eq!(
            cmd.to_command().to_bytes().as_ref(),
            hex!("00A4040008A00000015100000000")
        );
    }

    #[test]
    fn test_select_parse_success() {
        let response = Response::from_bytes(&hex!("6F10840EA0000001519000")).unwrap();
        let ok = SelectCommand::parse_response(response).unwrap();
        assert_eq!(ok.fci.as_ref(), hex!("6F10840EA000000151"));
    }

    #[test]
    fn test_select_parse_not_found() {
        let response = Response::from_bytes(&hex!("6A82")).unwrap();
        assert!(matches!(
            SelectCommand::parse_response(response),
            Err(SelectError::ApplicationNotFound)
        ));
    }
}
