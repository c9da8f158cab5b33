//! SCP03 mutual authentication
//!
//! The symmetric handshake: host and card exchange 8-byte challenges via
//! INITIALIZE UPDATE, derive session keys from the static key set, prove key
//! possession with truncated cryptograms, and complete with a MACed EXTERNAL
//! AUTHENTICATE. The card cryptogram is verified in constant time before
//! anything else is sent.

use rand::rngs::OsRng;
use rand::RngCore;
use tracing::{debug, trace};

use tessera_apdu_core::{ApduCommand, Executor};

use crate::commands::external_authenticate::{
    ExternalAuthenticateCommand, ExternalAuthenticateError,
};
use crate::commands::initialize_update::{InitializeUpdateCommand, InitializeUpdateError};
use crate::crypto::{self, derivation, BLOCK_SIZE, CRYPTOGRAM_SIZE};
use crate::error::{Error, Result};
use crate::keys::{DataEncryptionKey, Scp03KeyParams, SessionKeys};
use crate::secure_channel::ScpChannel;

/// Size of the host and card challenges
pub const CHALLENGE_SIZE: usize = 8;

/// Run the SCP03 handshake and install the session on the executor.
///
/// Returns the session data encryption key for subsequent key imports. Any
/// failure terminates the channel.
pub(crate) fn establish<E: Executor>(
    executor: &mut E,
    params: Scp03KeyParams,
) -> Result<Option<DataEncryptionKey>> {
    executor.begin_authentication()?;

    let mut host_challenge = [0u8; CHALLENGE_SIZE];
    OsRng.fill_bytes(&mut host_challenge);

    match run_handshake(executor, &params, host_challenge) {
        Ok(dek) => Ok(dek),
        Err(err) => {
            debug!(key_ref = %params.key_ref, error = %err, "SCP03 handshake failed");
            executor.terminate();
            Err(err)
        }
    }
}

fn run_handshake<E: Executor>(
    executor: &mut E,
    params: &Scp03KeyParams,
    host_challenge: [u8; CHALLENGE_SIZE],
) -> Result<Option<DataEncryptionKey>> {
    trace!(key_ref = %params.key_ref, "starting SCP03 handshake");

    let init = match executor.execute(&InitializeUpdateCommand::with_challenge(
        params.key_ref,
        host_challenge,
    )) {
        Ok(init) => init,
        Err(InitializeUpdateError::SecurityStatusNotSatisfied) => {
            return Err(Error::AuthenticationFailed("security status not satisfied"))
        }
        Err(err) => return Err(err.into()),
    };
    if init.scp_identifier() != 0x03 {
        return Err(
            tessera_apdu_core::Error::UnsupportedOperation("device does not offer SCP03").into(),
        );
    }

    // Derivation context: both challenges concatenated
    let mut context = [0u8; BLOCK_SIZE];
    context[..CHALLENGE_SIZE].copy_from_slice(&host_challenge);
    context[CHALLENGE_SIZE..].copy_from_slice(&init.card_challenge);

    let keys = &params.keys;
    let mut s_enc = [0u8; BLOCK_SIZE];
    let mut s_mac = [0u8; BLOCK_SIZE];
    let mut s_rmac = [0u8; BLOCK_SIZE];
    crypto::scp03_derive(keys.enc(), derivation::S_ENC, &context, &mut s_enc);
    crypto::scp03_derive(keys.mac(), derivation::S_MAC, &context, &mut s_mac);
    crypto::scp03_derive(keys.mac(), derivation::S_RMAC, &context, &mut s_rmac);

    let mut card_cryptogram = [0u8; CRYPTOGRAM_SIZE];
    crypto::scp03_derive(
        &s_mac,
        derivation::CARD_CRYPTOGRAM,
        &context,
        &mut card_cryptogram,
    );
    if !crypto::ct_eq(&card_cryptogram, &init.card_cryptogram) {
        // The card failed to prove key possession; EXTERNAL AUTHENTICATE is
        // never sent.
        return Err(Error::AuthenticationFailed("card cryptogram mismatch"));
    }

    let mut host_cryptogram = [0u8; CRYPTOGRAM_SIZE];
    crypto::scp03_derive(
        &s_mac,
        derivation::HOST_CRYPTOGRAM,
        &context,
        &mut host_cryptogram,
    );

    let session = SessionKeys::new(
        s_enc,
        s_mac,
        s_rmac,
        Some(DataEncryptionKey::new(*keys.dek())),
    );
    let mut channel = ScpChannel::new(session);

    // EXTERNAL AUTHENTICATE is MACed under the fresh session keys but not
    // encrypted; wrapping it here advances the MAC chain to its full value.
    let authenticate = ExternalAuthenticateCommand::with_host_cryptogram(host_cryptogram);
    let wrapped = channel.wrap_with_mac(&authenticate.to_command());
    let response = executor.transmit(&wrapped)?;
    match ExternalAuthenticateCommand::parse_plain(&response) {
        Ok(()) => {}
        Err(
            ExternalAuthenticateError::SecurityStatusNotSatisfied
            | ExternalAuthenticateError::AuthenticationMethodBlocked,
        ) => return Err(Error::AuthenticationFailed("card rejected host cryptogram")),
        Err(err) => return Err(err.into()),
    }

    debug!(key_ref = %params.key_ref, "SCP03 secure channel established");
    let dek = channel.take_dek();
    executor.install_processor(Box::new(channel));
    Ok(dek)
}
