//! SCP11 key agreement
//!
//! The asymmetric handshake: the host generates an ephemeral P-256 keypair,
//! exchanges it with the card, and derives session keys from the combined
//! ephemeral and static ECDH secrets through an X9.63 KDF. SCP11b
//! authenticates the card only; SCP11a/c additionally authenticate the host
//! through its OCE certificate chain and an ECDSA signature over the
//! key-agreement payload.

use bytes::{BufMut, Bytes, BytesMut};
use p256::ecdsa::signature::Signer;
use p256::ecdsa::{Signature, SigningKey};
use p256::elliptic_curve::ecdh;
use p256::elliptic_curve::sec1::ToEncodedPoint;
use p256::{PublicKey, SecretKey};
use rand::rngs::OsRng;
use sha2::{Digest, Sha256};
use tracing::{debug, trace};
use zeroize::Zeroizing;

use tessera_apdu_core::Executor;

use crate::commands::external_authenticate::{
    ExternalAuthenticateCommand, ExternalAuthenticateError,
};
use crate::commands::internal_authenticate::{
    InternalAuthenticateCommand, InternalAuthenticateError,
};
use crate::commands::perform_security_operation::{
    PerformSecurityOperationCommand, PerformSecurityOperationError,
};
use crate::constants::{kid, tags};
use crate::crypto::{self, BLOCK_SIZE};
use crate::error::{Error, Result};
use crate::keys::{DataEncryptionKey, Scp11KeyParams, SessionKeys};
use crate::secure_channel::ScpChannel;
use crate::tlv;

/// Total X9.63 KDF output: S-ENC, S-MAC, S-RMAC, S-DEK and the receipt key
const SESSION_KEY_MATERIAL: usize = 5 * BLOCK_SIZE;

/// SCP11 protocol variants
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scp11Variant {
    /// Host authentication through an OCE certificate chain
    A,
    /// Card-only authentication
    B,
    /// Like `a` with updated chaining semantics
    C,
}

impl Scp11Variant {
    /// Map a key identifier to its protocol variant
    pub fn from_kid(value: u8) -> Result<Self> {
        match value {
            kid::SCP11A => Ok(Self::A),
            kid::SCP11B => Ok(Self::B),
            kid::SCP11C => Ok(Self::C),
            other => Err(Error::UnsupportedKid { kid: other }),
        }
    }

    /// Whether the variant authenticates the host
    pub const fn authenticates_host(self) -> bool {
        matches!(self, Self::A | Self::C)
    }

    /// The parameter byte carried in the SCP parameters TLV
    const fn parameter(self) -> u8 {
        match self {
            Self::A => 0x01,
            Self::B => 0x00,
            Self::C => 0x03,
        }
    }
}

/// Run the SCP11 handshake and install the session on the executor.
///
/// Returns the session data encryption key. Any failure terminates the
/// channel.
pub(crate) fn establish<E: Executor>(
    executor: &mut E,
    params: Scp11KeyParams,
) -> Result<Option<DataEncryptionKey>> {
    let variant = Scp11Variant::from_kid(params.key_ref.kid)?;
    executor.begin_authentication()?;

    match run_handshake(executor, &params, variant) {
        Ok(dek) => Ok(dek),
        Err(err) => {
            debug!(key_ref = %params.key_ref, error = %err, "SCP11 handshake failed");
            executor.terminate();
            Err(err)
        }
    }
}

fn run_handshake<E: Executor>(
    executor: &mut E,
    params: &Scp11KeyParams,
    variant: Scp11Variant,
) -> Result<Option<DataEncryptionKey>> {
    trace!(key_ref = %params.key_ref, ?variant, "starting SCP11 handshake");

    if variant.authenticates_host() {
        upload_certificate_chain(executor, params)?;
    }

    // Ephemeral host keypair; the secret scalar is wiped on drop
    let ephemeral_secret = SecretKey::random(&mut OsRng);
    let ephemeral_point = ephemeral_secret.public_key().to_encoded_point(false);

    // Key-agreement payload: control reference template plus our ephemeral key
    let mut payload = BytesMut::new();
    tlv::encode_into(
        &mut payload,
        tags::CONTROL_REFERENCE_TEMPLATE,
        &key_params_tlv(variant),
    );
    tlv::encode_into(&mut payload, tags::EC_PUBLIC_KEY, ephemeral_point.as_bytes());
    // The receipt commits to exactly these TLVs plus the card's reply
    let key_agreement_data = payload.clone().freeze();

    if variant.authenticates_host() {
        let oce_secret = params
            .oce_secret_key
            .as_ref()
            .ok_or(Error::InvalidKeyParams("OCE secret key required"))?;
        let signer = SigningKey::from(oce_secret);
        let signature: Signature = signer.sign(&payload);
        tlv::encode_into(&mut payload, tags::SIGNATURE, signature.to_der().as_bytes());
    }

    let response = send_key_agreement(executor, params, variant, payload.freeze())?;

    let card_point = tlv::expect(&response, tags::EC_PUBLIC_KEY)?;
    let receipt = tlv::expect(&response, tags::RECEIPT)?;
    let card_ephemeral = PublicKey::from_sec1_bytes(card_point)
        .map_err(|_| Error::Crypto("invalid card ephemeral public key"))?;

    // Shared secrets: ephemeral-ephemeral, then ephemeral-static
    let z_ephemeral = ecdh::diffie_hellman(
        ephemeral_secret.to_nonzero_scalar(),
        card_ephemeral.as_affine(),
    );
    let z_static = ecdh::diffie_hellman(
        ephemeral_secret.to_nonzero_scalar(),
        params.security_domain_public_key.as_affine(),
    );
    let mut secret = Zeroizing::new(Vec::with_capacity(64));
    secret.extend_from_slice(z_ephemeral.raw_secret_bytes());
    secret.extend_from_slice(z_static.raw_secret_bytes());

    let mut shared_info = BytesMut::new();
    shared_info.put_slice(&key_params_tlv(variant));
    if variant.authenticates_host() {
        // Commit to the certificate chain presented by the host
        let mut hasher = Sha256::new();
        for certificate in &params.certificate_chain {
            hasher.update(certificate.der());
        }
        shared_info.put_slice(&hasher.finalize());
    }

    let mut key_material = Zeroizing::new([0u8; SESSION_KEY_MATERIAL]);
    crypto::x963_kdf(&secret, &shared_info, &mut *key_material);

    let mut s_enc = [0u8; BLOCK_SIZE];
    let mut s_mac = [0u8; BLOCK_SIZE];
    let mut s_rmac = [0u8; BLOCK_SIZE];
    let mut s_dek = [0u8; BLOCK_SIZE];
    let mut receipt_key = [0u8; BLOCK_SIZE];
    s_enc.copy_from_slice(&key_material[..16]);
    s_mac.copy_from_slice(&key_material[16..32]);
    s_rmac.copy_from_slice(&key_material[32..48]);
    s_dek.copy_from_slice(&key_material[48..64]);
    receipt_key.copy_from_slice(&key_material[64..80]);

    // The receipt proves the card derived the same keys from the transcript
    let card_point_tlv = tlv::encode(tags::EC_PUBLIC_KEY, card_point);
    let expected = crypto::cmac_aes128(&receipt_key, &[&key_agreement_data, &card_point_tlv]);
    if !crypto::ct_eq(&expected, receipt) {
        return Err(Error::AuthenticationFailed("receipt verification failed"));
    }

    let session = SessionKeys::new(s_enc, s_mac, s_rmac, Some(DataEncryptionKey::new(s_dek)));
    let mut channel = ScpChannel::new(session);
    let dek = channel.take_dek();

    debug!(key_ref = %params.key_ref, ?variant, "SCP11 secure channel established");
    executor.install_processor(Box::new(channel));
    Ok(dek)
}

/// Upload the OCE certificate chain, leaf last, one certificate per command
fn upload_certificate_chain<E: Executor>(
    executor: &mut E,
    params: &Scp11KeyParams,
) -> Result<()> {
    let oce_ref = params
        .oce_key_ref
        .ok_or(Error::InvalidKeyParams("OCE key reference required"))?;
    if params.certificate_chain.is_empty() {
        return Err(Error::InvalidKeyParams("certificate chain required"));
    }

    for certificate in &params.certificate_chain {
        match executor.execute(&PerformSecurityOperationCommand::with_certificate(
            oce_ref,
            certificate.der().to_vec(),
        )) {
            Ok(_) => {}
            Err(PerformSecurityOperationError::SecurityStatusNotSatisfied) => {
                return Err(Error::AuthenticationFailed("card refused OCE certificate"))
            }
            Err(err) => return Err(err.into()),
        }
    }
    Ok(())
}

/// The key parameters committed to by both sides: protocol identifier and
/// variant, key usage, key type and key length.
fn key_params_tlv(variant: Scp11Variant) -> Bytes {
    let mut buf = BytesMut::new();
    tlv::encode_into(&mut buf, tags::SCP_PARAMETERS, &[0x11, variant.parameter()]);
    tlv::encode_into(&mut buf, tags::KEY_USAGE, &[0x3C]);
    tlv::encode_into(&mut buf, tags::KEY_TYPE, &[0x88]);
    tlv::encode_into(&mut buf, tags::KEY_LENGTH, &[BLOCK_SIZE as u8]);
    buf.freeze()
}

/// Send the key agreement through the instruction matching the variant:
/// INTERNAL AUTHENTICATE for SCP11b, EXTERNAL AUTHENTICATE for SCP11a/c.
fn send_key_agreement<E: Executor>(
    executor: &mut E,
    params: &Scp11KeyParams,
    variant: Scp11Variant,
    payload: Bytes,
) -> Result<Bytes> {
    if variant.authenticates_host() {
        match executor.execute(&ExternalAuthenticateCommand::with_key_agreement(
            params.key_ref,
            payload,
        )) {
            Ok(ok) => Ok(ok.data),
            Err(
                ExternalAuthenticateError::SecurityStatusNotSatisfied
                | ExternalAuthenticateError::AuthenticationMethodBlocked,
            ) => Err(Error::AuthenticationFailed("card refused key agreement")),
            Err(err) => Err(err.into()),
        }
    } else {
        match executor.execute(&InternalAuthenticateCommand::with_key_agreement(
            params.key_ref,
            payload,
        )) {
            Ok(ok) => Ok(ok.data),
            Err(
                InternalAuthenticateError::SecurityStatusNotSatisfied
                | InternalAuthenticateError::AuthenticationMethodBlocked,
            ) => Err(Error::AuthenticationFailed("card refused key agreement")),
            Err(err) => Err(err.into()),
        }
    }
}
