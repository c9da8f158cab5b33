//! PUT KEY command
//!
//! Imports key material into a slot. AES components travel wrapped under the
//! session data encryption key with a key check value; EC public keys travel
//! as TLV-encoded points; EC private scalars travel wrapped.

use bytes::{BufMut, Bytes, BytesMut};
use thiserror::Error;

use tessera_apdu_core::response::status::common::*;
use tessera_apdu_core::{ApduCommand, Error as CoreError, Response, StatusWord};

use crate::constants::{cla, ins, tags};
use crate::crypto;
use crate::keys::{DataEncryptionKey, KeyRef, StaticKeys};
use crate::tlv;

/// Key type byte shared by AES-128 and P-256 components; the slot context
/// disambiguates.
const KEY_TYPE: u8 = 0x88;

/// P2 bit marking a multi-component key set
const P2_MULTIPLE_KEYS: u8 = 0x80;

/// PUT KEY
#[derive(Debug, Clone)]
pub struct PutKeyCommand {
    key_ref: KeyRef,
    replace_kvn: u8,
    multiple: bool,
    data: Bytes,
    expected_check_values: Bytes,
}

impl PutKeyCommand {
    /// Import a full SCP03 static key set, each component wrapped under the
    /// session data encryption key.
    pub fn with_static_keys(
        key_ref: KeyRef,
        replace_kvn: u8,
        keys: &StaticKeys,
        dek: &DataEncryptionKey,
    ) -> Self {
        let mut data = BytesMut::new();
        let mut expected = BytesMut::new();
        data.put_u8(key_ref.kvn);
        expected.put_u8(key_ref.kvn);

        for component in [keys.enc(), keys.mac(), keys.dek()] {
            let wrapped = dek.wrap_block(component);
            let kcv = crypto::key_check_value(component);
            data.put_u8(KEY_TYPE);
            data.put_u8(wrapped.len() as u8);
            data.put_slice(&wrapped);
            data.put_u8(kcv.len() as u8);
            data.put_slice(&kcv);
            expected.put_slice(&kcv);
        }

        Self {
            key_ref,
            replace_kvn,
            multiple: true,
            data: data.freeze(),
            expected_check_values: expected.freeze(),
        }
    }

    /// Import an EC public key as an uncompressed TLV-encoded point
    pub fn with_ec_public_key(key_ref: KeyRef, replace_kvn: u8, point: &[u8]) -> Self {
        let encoded_point = tlv::encode(tags::EC_PUBLIC_KEY, point);
        let mut data = BytesMut::new();
        data.put_u8(key_ref.kvn);
        data.put_u8(KEY_TYPE);
        data.put_u8(encoded_point.len() as u8);
        data.put_slice(&encoded_point);
        // Public components carry no check value
        data.put_u8(0x00);

        let expected = Bytes::copy_from_slice(&[key_ref.kvn]);
        Self {
            key_ref,
            replace_kvn,
            multiple: false,
            data: data.freeze(),
            expected_check_values: expected,
        }
    }

    /// Import an EC private scalar wrapped under the session data encryption
    /// key
    pub fn with_ec_private_key(
        key_ref: KeyRef,
        replace_kvn: u8,
        secret_key: &p256::SecretKey,
        dek: &DataEncryptionKey,
    ) -> Self {
        let scalar = secret_key.to_bytes();
        let wrapped = dek.wrap(&scalar);

        let mut data = BytesMut::new();
        data.put_u8(key_ref.kvn);
        data.put_u8(KEY_TYPE);
        data.put_u8(wrapped.len() as u8);
        data.put_slice(&wrapped);
        data.put_u8(0x00);

        let expected = Bytes::copy_from_slice(&[key_ref.kvn]);
        Self {
            key_ref,
            replace_kvn,
            multiple: false,
            data: data.freeze(),
            expected_check_values: expected,
        }
    }

    /// The check values the card must echo on success
    pub const fn expected_check_values(&self) -> &Bytes {
        &self.expected_check_values
    }
}

/// Success response of PUT KEY
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PutKeyOk {
    /// New key version number followed by the per-component check values
    pub key_check_values: Bytes,
}

/// Error response of PUT KEY
#[derive(Debug, Error)]
pub enum PutKeyError {
    /// The key data was rejected
    #[error("invalid key data")]
    WrongData,

    /// Security status not satisfied
    #[error("security status not satisfied")]
    SecurityStatusNotSatisfied,

    /// The slot to replace does not exist
    #[error("referenced key not found")]
    ReferencedDataNotFound,

    /// The card echoed check values that do not match the imported keys
    #[error("key check value mismatch")]
    CheckValueMismatch,

    /// Core error
    #[error(transparent)]
    Core(#[from] CoreError),

    /// Unexpected status word
    #[error("unexpected status {0}")]
    Unknown(StatusWord),
}

impl ApduCommand for PutKeyCommand {
    type Success = PutKeyOk;
    type Error = PutKeyError;

    fn convert_error(error: CoreError) -> Self::Error {
        PutKeyError::Core(error)
    }

    fn class(&self) -> u8 {
        cla::GP
    }

    fn instruction(&self) -> u8 {
        ins::PUT_KEY
    }

    fn p1(&self) -> u8 {
        self.replace_kvn
    }

    fn p2(&self) -> u8 {
        if self.multiple {
            P2_MULTIPLE_KEYS | self.key_ref.kid
        } else {
            self.key_ref.kid
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
            SW_NO_ERROR => Ok(PutKeyOk {
                key_check_values: response.into_payload(),
            }),
            SW_WRONG_DATA => Err(PutKeyError::WrongData),
            SW_SECURITY_STATUS_NOT_SATISFIED => Err(PutKeyError::SecurityStatusNotSatisfied),
            SW_REFERENCED_DATA_NOT_FOUND => Err(PutKeyError::ReferencedDataNotFound),
            status => Err(PutKeyError::Unknown(status)),
        }
    }
}
