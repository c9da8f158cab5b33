//! Security Domain session
//!
//! High-level interface to the GlobalPlatform Security Domain: selection,
//! secure channel establishment, key lifecycle (put, delete, generate),
//! certificate and allowlist storage, and factory reset.

use std::collections::BTreeMap;
use std::fmt;

use bytes::{BufMut, Bytes, BytesMut};
use p256::elliptic_curve::sec1::ToEncodedPoint;
use tracing::{debug, trace, warn};

use tessera_apdu_core::response::status::common::*;
use tessera_apdu_core::{Command, Executor};

use crate::commands::put_key::{PutKeyError, PutKeyOk};
use crate::commands::select::SelectError;
use crate::commands::store_data::MAX_BLOCK_SIZE;
use crate::commands::{
    DeleteCommand, GenerateKeyCommand, GetDataCommand, PerformSecurityOperationCommand,
    PutKeyCommand, SelectCommand, StoreDataCommand,
};
use crate::constants::{cla, data_object, ins, kid, tags, SECURITY_DOMAIN_AID};
use crate::error::{Error, Result};
use crate::keys::{Certificate, DataEncryptionKey, KeyRef, ScpKeyParams, StaticKeys};
use crate::secure_channel::{establish_secure_channel, require_open};
use crate::tlv;

/// Upper bound on factory-reset attempts per key slot; enough to exhaust
/// any retry counter the device enforces.
const RESET_ATTEMPTS: usize = 65;

/// Key slot metadata reported by GET DATA (key information)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyInformation {
    /// The slot
    pub key_ref: KeyRef,
    /// Component identifier to attribute mapping
    pub components: BTreeMap<u8, u8>,
}

/// Session with the Security Domain application of one device
pub struct SecurityDomain<E: Executor> {
    executor: E,
    /// Session data encryption key of the open secure channel, if any
    dek: Option<DataEncryptionKey>,
}

impl<E: Executor> fmt::Debug for SecurityDomain<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecurityDomain")
            .field("executor", &self.executor)
            .field("has_dek", &self.dek.is_some())
            .finish()
    }
}

impl<E: Executor> SecurityDomain<E> {
    /// Create a session over the given executor without selecting anything
    pub const fn new(executor: E) -> Self {
        Self {
            executor,
            dek: None,
        }
    }

    /// Get a reference to the executor
    pub const fn executor(&self) -> &E {
        &self.executor
    }

    /// Get a mutable reference to the executor
    pub fn executor_mut(&mut self) -> &mut E {
        &mut self.executor
    }

    /// Select the Security Domain by its default AID
    pub fn select_security_domain(&mut self) -> Result<Bytes> {
        self.select(&SECURITY_DOMAIN_AID)
    }

    /// Select an application by AID and return its file control information
    pub fn select(&mut self, aid: &[u8]) -> Result<Bytes> {
        trace!(aid = %hex::encode(aid), "selecting application");
        match self
            .executor
            .execute(&SelectCommand::with_aid(aid.to_vec()))
        {
            Ok(ok) => {
                self.dek = None;
                self.executor.notify_selected();
                Ok(ok.fci)
            }
            Err(SelectError::ApplicationNotFound) => Err(Error::ApplicationNotFound),
            Err(err) => Err(err.into()),
        }
    }

    /// Establish a secure channel with the given key parameters.
    ///
    /// Authenticating an already-open channel tears the previous session
    /// down and starts a new one, which is how key rotation re-authenticates
    /// under freshly imported keys.
    pub fn authenticate(&mut self, params: ScpKeyParams) -> Result<()> {
        self.dek = establish_secure_channel(&mut self.executor, params)?;
        Ok(())
    }

    /// Close the session and terminate the channel
    pub fn close(&mut self) {
        self.dek = None;
        self.executor.terminate();
    }

    /// Read a data object
    pub fn get_data(&mut self, identifier: u16) -> Result<Bytes> {
        let ok = self
            .executor
            .execute(&GetDataCommand::with_identifier(identifier))?;
        Ok(ok.data)
    }

    /// Read the card recognition data object
    pub fn get_card_recognition_data(&mut self) -> Result<Bytes> {
        self.get_data(data_object::CARD_RECOGNITION_DATA)
    }

    /// List the key slots present on the device
    pub fn get_key_information(&mut self) -> Result<Vec<KeyInformation>> {
        let data = self.get_data(data_object::KEY_INFORMATION)?;

        // The payload is either a bare list of entries or wrapped in the
        // key information template
        let entries = match tlv::find(&data, tags::KEY_INFORMATION_TEMPLATE)? {
            Some(inner) => inner.to_vec(),
            None => data.to_vec(),
        };

        let mut result = Vec::new();
        for item in tlv::iter(&entries) {
            let (tag, value) = item?;
            if tag != tags::KEY_INFORMATION {
                continue;
            }
            if value.len() < 2 {
                return Err(Error::InvalidResponse("key information entry too short"));
            }
            let key_ref = KeyRef::new(value[0], value[1]);
            let components = value[2..]
                .chunks_exact(2)
                .map(|pair| (pair[0], pair[1]))
                .collect();
            result.push(KeyInformation {
                key_ref,
                components,
            });
        }
        Ok(result)
    }

    /// Write a data object, splitting it into STORE DATA blocks
    pub fn store_data(&mut self, payload: &[u8]) -> Result<()> {
        let blocks: Vec<&[u8]> = payload.chunks(MAX_BLOCK_SIZE).collect();
        let last_index = blocks.len().saturating_sub(1);
        for (index, block) in blocks.iter().enumerate() {
            let command =
                StoreDataCommand::with_block(block.to_vec(), index as u8, index == last_index);
            self.executor.execute(&command)?;
        }
        Ok(())
    }

    /// Import a full SCP03 static key set
    pub fn put_static_keys(
        &mut self,
        key_ref: KeyRef,
        keys: StaticKeys,
        replace_kvn: u8,
    ) -> Result<()> {
        require_open(&self.executor)?;
        let dek = self.dek.as_ref().ok_or(Error::NoSecureChannel)?;
        let command = PutKeyCommand::with_static_keys(key_ref, replace_kvn, &keys, dek);
        let ok = self.executor.execute(&command)?;
        verify_check_values(&command, &ok)?;
        debug!(%key_ref, "imported SCP03 key set");
        Ok(())
    }

    /// Import an EC public key
    pub fn put_ec_public_key(
        &mut self,
        key_ref: KeyRef,
        public_key: &p256::PublicKey,
        replace_kvn: u8,
    ) -> Result<()> {
        require_open(&self.executor)?;
        let point = public_key.to_encoded_point(false);
        let command = PutKeyCommand::with_ec_public_key(key_ref, replace_kvn, point.as_bytes());
        let ok = self.executor.execute(&command)?;
        verify_check_values(&command, &ok)?;
        debug!(%key_ref, "imported EC public key");
        Ok(())
    }

    /// Import an EC private key wrapped under the session DEK
    pub fn put_ec_private_key(
        &mut self,
        key_ref: KeyRef,
        secret_key: &p256::SecretKey,
        replace_kvn: u8,
    ) -> Result<()> {
        require_open(&self.executor)?;
        let dek = self.dek.as_ref().ok_or(Error::NoSecureChannel)?;
        let command = PutKeyCommand::with_ec_private_key(key_ref, replace_kvn, secret_key, dek);
        let ok = self.executor.execute(&command)?;
        verify_check_values(&command, &ok)?;
        debug!(%key_ref, "imported EC private key");
        Ok(())
    }

    /// Delete a key, optionally permitting removal of the last key of a set
    pub fn delete_key(&mut self, key_ref: KeyRef, delete_last: bool) -> Result<()> {
        use crate::commands::delete::DeleteError;
        match self.executor.execute(&DeleteCommand::key(key_ref, delete_last)) {
            Ok(_) => {
                debug!(%key_ref, "deleted key");
                Ok(())
            }
            Err(DeleteError::Unknown(status)) => Err(Error::KeyOperation { key_ref, status }),
            Err(err) => Err(err.into()),
        }
    }

    /// Generate an EC keypair on the device and return its public point
    pub fn generate_ec_key(&mut self, key_ref: KeyRef, replace_kvn: u8) -> Result<Bytes> {
        let ok = self
            .executor
            .execute(&GenerateKeyCommand::with_key_ref(key_ref, replace_kvn))?;
        debug!(%key_ref, "generated EC key");
        Ok(ok.public_key)
    }

    /// Associate a CA issuer's Subject Key Identifier with an OCE key slot
    pub fn store_ca_issuer(&mut self, key_ref: KeyRef, ski: &[u8]) -> Result<()> {
        let klcc = matches!(key_ref.kid, kid::SCP11A | kid::SCP11B | kid::SCP11C);

        let mut template = BytesMut::new();
        tlv::encode_into(&mut template, tags::KEY_TYPE, &[u8::from(klcc)]);
        tlv::encode_into(&mut template, tags::CA_ISSUER, ski);
        tlv::encode_into(&mut template, tags::KEY_REFERENCE, &key_ref.to_bytes());

        let mut payload = BytesMut::new();
        tlv::encode_into(&mut payload, tags::CONTROL_REFERENCE_TEMPLATE, &template);
        self.store_data(&payload)
    }

    /// Store a certificate chain for a key slot, leaf last
    pub fn store_certificate_bundle(
        &mut self,
        key_ref: KeyRef,
        chain: &[Certificate],
    ) -> Result<()> {
        let mut certificates = BytesMut::new();
        for certificate in chain {
            certificates.put_slice(certificate.der());
        }

        let mut payload = BytesMut::new();
        let mut template = BytesMut::new();
        tlv::encode_into(&mut template, tags::KEY_REFERENCE, &key_ref.to_bytes());
        tlv::encode_into(&mut payload, tags::CONTROL_REFERENCE_TEMPLATE, &template);
        tlv::encode_into(&mut payload, tags::CERTIFICATE_STORE, &certificates);
        self.store_data(&payload)
    }

    /// Store the certificate serial allowlist for a key slot
    pub fn store_allowlist<S: AsRef<[u8]>>(&mut self, key_ref: KeyRef, serials: &[S]) -> Result<()> {
        let mut list = BytesMut::new();
        for serial in serials {
            tlv::encode_into(&mut list, tags::SERIAL_NUMBER, serial.as_ref());
        }

        let mut payload = BytesMut::new();
        let mut template = BytesMut::new();
        tlv::encode_into(&mut template, tags::KEY_REFERENCE, &key_ref.to_bytes());
        tlv::encode_into(&mut payload, tags::CONTROL_REFERENCE_TEMPLATE, &template);
        tlv::encode_into(&mut payload, tags::ALLOWLIST, &list);
        self.store_data(&payload)
    }

    /// Factory reset: block every key slot by exhausting its retry counter
    /// with garbage authentication attempts, then re-select.
    ///
    /// Each slot is attacked with the instruction matching its protocol;
    /// the loop for a slot ends when the device reports it blocked.
    pub fn reset(&mut self) -> Result<()> {
        let key_information = self.get_key_information()?;

        // The probes must reach the card unwrapped; tear down any open
        // secure channel before attacking the slots
        self.dek = None;
        self.executor.remove_processors();

        for info in key_information {
            let (instruction, target) = match info.key_ref.kid {
                kid::SCP03 => (ins::INITIALIZE_UPDATE, KeyRef::new(0x00, 0x00)),
                kid::SCP11A | kid::SCP11C => (ins::EXTERNAL_AUTHENTICATE, info.key_ref),
                kid::SCP11B => (ins::INTERNAL_AUTHENTICATE, info.key_ref),
                _ => (ins::PERFORM_SECURITY_OPERATION, info.key_ref),
            };
            trace!(key_ref = %info.key_ref, instruction, "blocking key slot");

            for _ in 0..RESET_ATTEMPTS {
                let command = Command::new_with_data(
                    cla::GP,
                    instruction,
                    target.kvn,
                    target.kid,
                    [0u8; 8].to_vec(),
                );
                let response = self.executor.transmit(&command)?;
                match response.status() {
                    SW_AUTHENTICATION_METHOD_BLOCKED | SW_SECURITY_STATUS_NOT_SATISFIED => {
                        debug!(key_ref = %info.key_ref, "key slot blocked");
                        break;
                    }
                    SW_NO_ERROR | SW_WRONG_DATA => {}
                    status => {
                        warn!(key_ref = %info.key_ref, %status, "unexpected status during reset");
                    }
                }
            }
        }

        self.select_security_domain()?;
        debug!("factory reset complete");
        Ok(())
    }
}

/// Check the key check values echoed by PUT KEY against the expected ones
fn verify_check_values(command: &PutKeyCommand, ok: &PutKeyOk) -> Result<()> {
    if !ok.key_check_values.is_empty()
        && ok.key_check_values != *command.expected_check_values()
    {
        return Err(PutKeyError::CheckValueMismatch.into());
    }
    Ok(())
}

// PERFORM SECURITY OPERATION is driven from the SCP11 handshake; re-exported
// here so applications can upload certificates ahead of time as well.
impl<E: Executor> SecurityDomain<E> {
    /// Upload one OCE certificate for a key slot outside a handshake
    pub fn perform_security_operation(
        &mut self,
        oce_ref: KeyRef,
        certificate: &Certificate,
    ) -> Result<()> {
        self.executor
            .execute(&PerformSecurityOperationCommand::with_certificate(
                oce_ref,
                certificate.der().to_vec(),
            ))?;
        Ok(())
    }
}
