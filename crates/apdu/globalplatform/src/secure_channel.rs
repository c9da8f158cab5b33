//! Secure channel wrapper shared by SCP03 and SCP11
//!
//! Once a handshake has derived session keys, both protocols protect traffic
//! identically: commands are CBC-encrypted under S-ENC with a counter-derived
//! ICV and MACed under S-MAC with a carried chaining value; responses are
//! verified under S-RMAC and decrypted. [`ScpChannel`] implements that
//! pipeline stage; [`establish_secure_channel`] dispatches the handshake.

use std::fmt;

use bytes::{BufMut, Bytes, BytesMut};
use tracing::{debug, trace};

use tessera_apdu_core::{
    Command, CommandProcessor, Error as CoreError, Executor, Response, SecurityLevel,
};

use crate::constants::cla;
use crate::crypto::{self, BLOCK_SIZE, MAC_SIZE};
use crate::error::{Error, Result};
use crate::keys::{DataEncryptionKey, ScpKeyParams, SessionKeys};
use crate::{scp03, scp11};

/// Secure-messaging stage for an authenticated SCP03 or SCP11 session
pub struct ScpChannel {
    keys: SessionKeys,
    /// Chaining value carried across consecutive command MACs
    mac_chain: [u8; BLOCK_SIZE],
    /// Monotonic encryption counter, seeds the C-ENC/R-ENC ICVs
    enc_counter: u32,
    /// ICV for the response to the command wrapped last
    response_icv: Option<[u8; BLOCK_SIZE]>,
}

impl fmt::Debug for ScpChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScpChannel")
            .field("enc_counter", &self.enc_counter)
            .finish_non_exhaustive()
    }
}

impl ScpChannel {
    pub(crate) const fn new(keys: SessionKeys) -> Self {
        Self {
            keys,
            mac_chain: [0u8; BLOCK_SIZE],
            enc_counter: 1,
            response_icv: None,
        }
    }

    /// Move the session data encryption key out of the channel
    pub(crate) fn take_dek(&mut self) -> Option<DataEncryptionKey> {
        self.keys.take_dek()
    }

    /// Current value of the encryption counter
    pub(crate) const fn enc_counter(&self) -> u32 {
        self.enc_counter
    }

    /// Current MAC chaining value
    pub(crate) const fn mac_chain(&self) -> &[u8; BLOCK_SIZE] {
        &self.mac_chain
    }

    /// Append a command MAC without encrypting the payload.
    ///
    /// The MAC covers the chaining value, the adjusted header (secure
    /// messaging bit set, Lc including the MAC itself) and the payload; its
    /// full 16 bytes become the next chaining value and its first 8 bytes
    /// travel with the command.
    pub(crate) fn wrap_with_mac(&mut self, command: &Command) -> Command {
        let payload = command.data.as_deref().unwrap_or_default();
        let cla = command.cla | cla::SECURE_MESSAGING;
        let header = [
            cla,
            command.ins,
            command.p1,
            command.p2,
            (payload.len() + MAC_SIZE) as u8,
        ];

        let mac = crypto::cmac_aes128(&self.keys.mac, &[&self.mac_chain, &header, payload]);
        self.mac_chain = mac;

        let mut data = BytesMut::with_capacity(payload.len() + MAC_SIZE);
        data.put_slice(payload);
        data.put_slice(&mac[..MAC_SIZE]);

        let mut wrapped = Command::new(cla, command.ins, command.p1, command.p2).with_data(data);
        wrapped.le = command.le;
        wrapped
    }

    /// Encrypt the payload under S-ENC and advance the encryption counter.
    /// Commands without a payload still consume a counter value, which also
    /// seeds the ICV of the matching response.
    fn encrypt_payload(&mut self, command: &Command) -> std::result::Result<Command, CoreError> {
        if self.enc_counter == u32::MAX {
            return Err(CoreError::SecureChannel("session counter exhausted"));
        }

        let icv = crypto::derive_icv(&self.keys.enc, self.enc_counter, false);
        self.response_icv = Some(crypto::derive_icv(&self.keys.enc, self.enc_counter, true));
        self.enc_counter += 1;

        let mut encrypted = command.clone();
        if let Some(payload) = command.data.as_deref() {
            if !payload.is_empty() {
                let mut buf = BytesMut::from(payload);
                encrypted.data = Some(crypto::cbc_encrypt_padded(&self.keys.enc, &icv, &mut buf));
            }
        }
        Ok(encrypted)
    }
}

impl CommandProcessor for ScpChannel {
    fn protect_command(&mut self, command: &Command) -> std::result::Result<Command, CoreError> {
        trace!(
            ins = command.ins,
            counter = self.enc_counter,
            "wrapping command for secure channel"
        );
        let encrypted = self.encrypt_payload(command)?;
        Ok(self.wrap_with_mac(&encrypted))
    }

    fn process_response(&mut self, response: Response) -> std::result::Result<Response, CoreError> {
        let data = response.data();

        // Error statuses carry neither R-MAC nor payload; surface unchanged
        if data.is_empty() {
            return Ok(response);
        }
        if data.len() < MAC_SIZE {
            return Err(CoreError::SecureChannel("response too short for R-MAC"));
        }

        let (body, mac) = data.split_at(data.len() - MAC_SIZE);
        let status = response.status();
        let trailer = [status.sw1, status.sw2];
        let expected = crypto::cmac_aes128(&self.keys.rmac, &[&self.mac_chain, body, &trailer]);
        if !crypto::ct_eq(&expected[..MAC_SIZE], mac) {
            debug!("response MAC verification failed");
            return Err(CoreError::SecureChannel("response MAC verification failed"));
        }

        let payload = if body.is_empty() {
            None
        } else {
            let icv = self
                .response_icv
                .take()
                .ok_or(CoreError::SecureChannel("unexpected encrypted response"))?;
            let mut buf = BytesMut::from(body);
            let plaintext = crypto::cbc_decrypt_unpad(&self.keys.enc, &icv, &mut buf)
                .map_err(|_| CoreError::SecureChannel("invalid response padding"))?;
            Some(plaintext)
        };

        Ok(Response::new(payload, status))
    }

    fn security_level(&self) -> SecurityLevel {
        SecurityLevel::auth_enc()
    }
}

/// Run the handshake selected by the key parameters and install the
/// resulting secure-messaging stage on the executor.
///
/// Calling this on an already-open channel tears the previous session down
/// first, so re-authenticating after a key rotation works on one channel.
/// Returns the session data encryption key when the protocol derives one.
pub fn establish_secure_channel<E: Executor>(
    executor: &mut E,
    params: ScpKeyParams,
) -> Result<Option<DataEncryptionKey>> {
    match params {
        ScpKeyParams::Scp03(params) => scp03::establish(executor, params),
        ScpKeyParams::Scp11(params) => scp11::establish(executor, params),
    }
}

/// Wrap raw response bytes the way a card does: body, R-MAC, status word.
/// Exposed for the software card used in integration tests.
#[doc(hidden)]
pub fn seal_response(
    rmac_key: &[u8; BLOCK_SIZE],
    mac_chain: &[u8; BLOCK_SIZE],
    body: &[u8],
    status: [u8; 2],
) -> Bytes {
    let mac = crypto::cmac_aes128(rmac_key, &[mac_chain, body, &status]);
    let mut out = BytesMut::with_capacity(body.len() + MAC_SIZE + 2);
    out.put_slice(body);
    out.put_slice(&mac[..MAC_SIZE]);
    out.put_slice(&status);
    out.freeze()
}

/// Fail an operation that requires an open secure channel
pub(crate) fn require_open<E: Executor>(executor: &E) -> Result<()> {
    if executor.security_level().authenticated {
        Ok(())
    } else {
        Err(Error::NoSecureChannel)
    }
}
