//! INITIALIZE UPDATE command
//!
//! Opens an SCP03 handshake: carries the host challenge and returns the key
//! diversification data, key information, card challenge and card
//! cryptogram. Newer firmware appends a 3-byte sequence counter.

use thiserror::Error;

use tessera_apdu_core::response::status::common::*;
use tessera_apdu_core::{ApduCommand, Error as CoreError, Response, StatusWord};

use crate::constants::{cla, ins};
use crate::keys::KeyRef;

const KEY_DIVERSIFICATION_LEN: usize = 10;
const KEY_INFO_LEN: usize = 3;
const CHALLENGE_LEN: usize = 8;
const CRYPTOGRAM_LEN: usize = 8;
const BASE_LEN: usize = KEY_DIVERSIFICATION_LEN + KEY_INFO_LEN + CHALLENGE_LEN + CRYPTOGRAM_LEN;
const SEQUENCE_COUNTER_LEN: usize = 3;

/// INITIALIZE UPDATE
#[derive(Debug, Clone)]
pub struct InitializeUpdateCommand {
    key_ref: KeyRef,
    host_challenge: [u8; CHALLENGE_LEN],
}

impl InitializeUpdateCommand {
    /// Start a handshake against the given key slot with a host challenge
    pub const fn with_challenge(key_ref: KeyRef, host_challenge: [u8; CHALLENGE_LEN]) -> Self {
        Self {
            key_ref,
            host_challenge,
        }
    }
}

/// Success response of INITIALIZE UPDATE
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InitializeUpdateOk {
    /// Key diversification data
    pub key_diversification_data: [u8; KEY_DIVERSIFICATION_LEN],
    /// Key information: key version number, SCP identifier, parameter
    pub key_info: [u8; KEY_INFO_LEN],
    /// Card challenge
    pub card_challenge: [u8; CHALLENGE_LEN],
    /// Card cryptogram
    pub card_cryptogram: [u8; CRYPTOGRAM_LEN],
    /// Sequence counter, present on newer firmware
    pub sequence_counter: Option<[u8; SEQUENCE_COUNTER_LEN]>,
    /// The status word, preserved because 0x63Cx counter warnings still
    /// carry a full handshake body
    pub status: StatusWord,
}

/// Error response of INITIALIZE UPDATE
#[derive(Debug, Error)]
pub enum InitializeUpdateError {
    /// The referenced key set does not exist
    #[error("referenced key set not found")]
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

impl ApduCommand for InitializeUpdateCommand {
    type Success = InitializeUpdateOk;
    type Error = InitializeUpdateError;

    fn convert_error(error: CoreError) -> Self::Error {
        InitializeUpdateError::Core(error)
    }

    fn class(&self) -> u8 {
        cla::GP
    }

    fn instruction(&self) -> u8 {
        ins::INITIALIZE_UPDATE
    }

    fn p1(&self) -> u8 {
        self.key_ref.kvn
    }

    fn p2(&self) -> u8 {
        self.key_ref.kid
    }

    fn data(&self) -> Option<&[u8]> {
        Some(&self.host_challenge)
    }

    fn expected_length(&self) -> Option<u16> {
        Some(0)
    }

    fn parse_response(response: Response) -> Result<Self::Success, Self::Error> {
        match response.status() {
            // Counter warnings still deliver the handshake body; the caller
            // sees the warning through the preserved status
            status if status == SW_NO_ERROR || status.is_counter_warning() => {
                let payload = response.data();
                let sequence_counter = match payload.len() {
                    BASE_LEN => None,
                    len if len == BASE_LEN + SEQUENCE_COUNTER_LEN => {
                        let mut counter = [0u8; SEQUENCE_COUNTER_LEN];
                        counter.copy_from_slice(&payload[BASE_LEN..]);
                        Some(counter)
                    }
                    _ => {
                        return Err(InitializeUpdateError::Core(CoreError::Parse(
                            "INITIALIZE UPDATE response has unexpected length",
                        )))
                    }
                };

                let mut key_diversification_data = [0u8; KEY_DIVERSIFICATION_LEN];
                let mut key_info = [0u8; KEY_INFO_LEN];
                let mut card_challenge = [0u8; CHALLENGE_LEN];
                let mut card_cryptogram = [0u8; CRYPTOGRAM_LEN];
                key_diversification_data.copy_from_slice(&payload[..10]);
                key_info.copy_from_slice(&payload[10..13]);
                card_challenge.copy_from_slice(&payload[13..21]);
                card_cryptogram.copy_from_slice(&payload[21..29]);

                Ok(InitializeUpdateOk {
                    key_diversification_data,
                    key_info,
                    card_challenge,
                    card_cryptogram,
                    sequence_counter,
                    status,
                })
            }
            SW_REFERENCED_DATA_NOT_FOUND => Err(InitializeUpdateError::ReferencedDataNotFound),
            SW_SECURITY_STATUS_NOT_SATISFIED => {
                Err(InitializeUpdateError::SecurityStatusNotSatisfied)
            }
            status => Err(InitializeUpdateError::Unknown(status)),
        }
    }
}

impl InitializeUpdateOk {
    /// The SCP identifier advertised by the card
    pub const fn scp_identifier(&self) -> u8 {
        self.key_info[1]
    }

    /// The key version number actually selected by the card
    pub const fn key_version_number(&self) -> u8 {
        self.key_info[0]
    }
}
