//! DELETE command
//!
//! Removes a key from a slot. The key is addressed by TLV-encoded identifier
//! and version; a P2 flag permits removing the last key of a set.

use bytes::{Bytes, BytesMut};
use thiserror::Error;

use tessera_apdu_core::response::status::common::*;
use tessera_apdu_core::{ApduCommand, Error as CoreError, Response, StatusWord};

use crate::constants::{cla, ins};
use crate::keys::KeyRef;
use crate::tlv::{self, Tag};

/// Key identifier TLV in the DELETE payload
const TAG_KEY_IDENTIFIER: Tag = Tag::new(0xD0);
/// Key version TLV in the DELETE payload
const TAG_KEY_VERSION: Tag = Tag::new(0xD2);

/// P2 flag permitting deletion of the last key of a set
const P2_DELETE_LAST: u8 = 0x01;

/// DELETE (key)
#[derive(Debug, Clone)]
pub struct DeleteCommand {
    data: Bytes,
    delete_last: bool,
}

impl DeleteCommand {
    /// Delete the key in the given slot. Zero-valued identifier or version
    /// act as wildcards and are omitted from the payload.
    pub fn key(key_ref: KeyRef, delete_last: bool) -> Self {
        let mut data = BytesMut::new();
        if key_ref.kid != 0 {
            tlv::encode_into(&mut data, TAG_KEY_IDENTIFIER, &[key_ref.kid]);
        }
        if key_ref.kvn != 0 {
            tlv::encode_into(&mut data, TAG_KEY_VERSION, &[key_ref.kvn]);
        }
        Self {
            data: data.freeze(),
            delete_last,
        }
    }
}

/// Success response of DELETE
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeleteOk {
    /// Confirmation data, usually empty
    pub data: Bytes,
}

/// Error response of DELETE
#[derive(Debug, Error)]
pub enum DeleteError {
    /// The referenced key does not exist
    #[error("referenced key not found")]
    ReferencedDataNotFound,

    /// Deleting the last key of the set was not permitted
    #[error("conditions of use not satisfied")]
    ConditionsNotSatisfied,

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

impl ApduCommand for DeleteCommand {
    type Success = DeleteOk;
    type Error = DeleteError;

    fn convert_error(error: CoreError) -> Self::Error {
        DeleteError::Core(error)
    }

    fn class(&self) -> u8 {
        cla::GP
    }

    fn instruction(&self) -> u8 {
        ins::DELETE
    }

    fn p1(&self) -> u8 {
        0x00
    }

    fn p2(&self) -> u8 {
        if self.delete_last {
            P2_DELETE_LAST
        } else {
            0x00
        }
    }

    fn data(&self) -> Option<&[u8]> {
        Some(&self.data)
    }

    fn expected_length(&self) -> Option<u16> {
        Some(0)
    }

    fn parse_response(response: Response) -> Result<Self::Success, Self::Error> {
        match response.status() {
            SW_NO_ERROR => Ok(DeleteOk {
                data: response.into_payload(),
            }),
            SW_REFERENCED_DATA_NOT_FOUND => Err(DeleteError::ReferencedDataNotFound),
            SW_CONDITIONS_NOT_SATISFIED => Err(DeleteError::ConditionsNotSatisfied),
            SW_SECURITY_STATUS_NOT_SATISFIED => Err(DeleteError::SecurityStatusNotSatisfied),
            status => Err(DeleteError::Unknown(status)),
        }
    }
}
