//! Key material and key-parameter types
//!
//! Static and session keys are wiped on every exit path: the containers
//! implement [`Zeroize`] and zeroize on drop, and nothing here exposes key
//! bytes through `Debug`.

use std::fmt;

use bytes::Bytes;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::constants::{kid, DEFAULT_KVN};
use crate::crypto::{self, BLOCK_SIZE};
use crate::tlv::{self, Tag, TlvError};

/// Reference to a key slot on the device: key identifier plus version number
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct KeyRef {
    /// Key identifier, selecting purpose and type
    pub kid: u8,
    /// Key version number
    pub kvn: u8,
}

impl KeyRef {
    /// Create a new key reference
    pub const fn new(kid: u8, kvn: u8) -> Self {
        Self { kid, kvn }
    }

    /// The two raw bytes `kid || kvn`
    pub const fn to_bytes(self) -> [u8; 2] {
        [self.kid, self.kvn]
    }
}

impl fmt::Debug for KeyRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "KeyRef(kid={:#04x}, kvn={:#04x})", self.kid, self.kvn)
    }
}

impl fmt::Display for KeyRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(kid={:#04x}, kvn={:#04x})", self.kid, self.kvn)
    }
}

/// The static SCP03 key triple: K-ENC, K-MAC and K-DEK.
///
/// Consumed once by the handshake and zeroized afterwards.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct StaticKeys {
    enc: [u8; BLOCK_SIZE],
    mac: [u8; BLOCK_SIZE],
    dek: [u8; BLOCK_SIZE],
}

impl StaticKeys {
    /// Create a key set from its three components
    pub const fn new(enc: [u8; BLOCK_SIZE], mac: [u8; BLOCK_SIZE], dek: [u8; BLOCK_SIZE]) -> Self {
        Self { enc, mac, dek }
    }

    /// The transport key set present on factory-fresh devices
    pub const fn default_keys() -> Self {
        const DEFAULT: [u8; BLOCK_SIZE] = [
            0x40, 0x41, 0x42, 0x43, 0x44, 0x45, 0x46, 0x47, 0x48, 0x49, 0x4A, 0x4B, 0x4C, 0x4D,
            0x4E, 0x4F,
        ];
        Self::new(DEFAULT, DEFAULT, DEFAULT)
    }

    pub(crate) const fn enc(&self) -> &[u8; BLOCK_SIZE] {
        &self.enc
    }

    pub(crate) const fn mac(&self) -> &[u8; BLOCK_SIZE] {
        &self.mac
    }

    pub(crate) const fn dek(&self) -> &[u8; BLOCK_SIZE] {
        &self.dek
    }
}

impl fmt::Debug for StaticKeys {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("StaticKeys(..)")
    }
}

/// Data encryption key of an open session, used to wrap imported keys
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct DataEncryptionKey([u8; BLOCK_SIZE]);

impl DataEncryptionKey {
    pub(crate) const fn new(key: [u8; BLOCK_SIZE]) -> Self {
        Self(key)
    }

    /// Wrap a single-block key component
    pub(crate) fn wrap_block(&self, key: &[u8; BLOCK_SIZE]) -> [u8; BLOCK_SIZE] {
        crypto::wrap_key(&self.0, key)
    }

    /// Wrap a block-aligned secret
    pub(crate) fn wrap(&self, data: &[u8]) -> Bytes {
        crypto::wrap_blocks(&self.0, data)
    }
}

impl fmt::Debug for DataEncryptionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("DataEncryptionKey(..)")
    }
}

/// Session keys derived by a handshake: S-ENC, S-MAC, S-RMAC and, when key
/// import is expected, S-DEK.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct SessionKeys {
    pub(crate) enc: [u8; BLOCK_SIZE],
    pub(crate) mac: [u8; BLOCK_SIZE],
    pub(crate) rmac: [u8; BLOCK_SIZE],
    pub(crate) dek: Option<DataEncryptionKey>,
}

impl SessionKeys {
    pub(crate) const fn new(
        enc: [u8; BLOCK_SIZE],
        mac: [u8; BLOCK_SIZE],
        rmac: [u8; BLOCK_SIZE],
        dek: Option<DataEncryptionKey>,
    ) -> Self {
        Self {
            enc,
            mac,
            rmac,
            dek,
        }
    }

    /// Move the data encryption key out of the set
    pub(crate) fn take_dek(&mut self) -> Option<DataEncryptionKey> {
        self.dek.take()
    }
}

impl fmt::Debug for SessionKeys {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SessionKeys(..)")
    }
}

/// An X.509 certificate carried as opaque DER bytes.
///
/// The protocol only ever forwards certificates and commits to their hashes;
/// the single field the host must be able to read is the serial number.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Certificate(Bytes);

impl Certificate {
    /// Wrap DER-encoded certificate bytes
    pub fn from_der(der: impl Into<Bytes>) -> Self {
        Self(der.into())
    }

    /// The raw DER encoding
    pub fn der(&self) -> &[u8] {
        &self.0
    }

    /// The serial number (raw INTEGER content bytes) from the TBS structure
    pub fn serial(&self) -> Result<&[u8], TlvError> {
        let certificate = tlv::expect(&self.0, Tag::new(0x30))?;
        let tbs = tlv::expect(certificate, Tag::new(0x30))?;
        // An explicit version [0] may precede the serial INTEGER
        for item in tlv::iter(tbs) {
            let (tag, value) = item?;
            if tag == Tag::new(0xA0) {
                continue;
            }
            return if tag == Tag::new(0x02) {
                Ok(value)
            } else {
                Err(TlvError::Missing(Tag::new(0x02)))
            };
        }
        Err(TlvError::Missing(Tag::new(0x02)))
    }
}

/// Parameters for an SCP03 handshake
#[derive(Debug)]
pub struct Scp03KeyParams {
    /// Slot holding the static key set
    pub key_ref: KeyRef,
    /// The static key triple
    pub keys: StaticKeys,
}

impl Scp03KeyParams {
    /// Parameters authenticating the factory-default key set of a
    /// delivery-state device
    pub const fn factory_default() -> Self {
        Self {
            key_ref: KeyRef::new(kid::SCP03, DEFAULT_KVN),
            keys: StaticKeys::default_keys(),
        }
    }
}

/// Parameters for an SCP11 handshake.
///
/// SCP11b needs only the Security Domain public key; SCP11a/c additionally
/// authenticate the host and require the OCE key reference, its secret key
/// and the certificate chain (leaf last).
pub struct Scp11KeyParams {
    /// Slot holding the Security Domain key
    pub key_ref: KeyRef,
    /// Static public key of the Security Domain
    pub security_domain_public_key: p256::PublicKey,
    /// Slot holding the CA issuer reference for the OCE (SCP11a/c)
    pub oce_key_ref: Option<KeyRef>,
    /// Signing key of the Off-Card Entity (SCP11a/c)
    pub oce_secret_key: Option<p256::SecretKey>,
    /// OCE certificate chain, leaf last (SCP11a/c)
    pub certificate_chain: Vec<Certificate>,
}

impl fmt::Debug for Scp11KeyParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scp11KeyParams")
            .field("key_ref", &self.key_ref)
            .field("oce_key_ref", &self.oce_key_ref)
            .field("certificate_chain", &self.certificate_chain.len())
            .finish_non_exhaustive()
    }
}

/// Key parameters for a secure channel handshake
#[derive(Debug)]
pub enum ScpKeyParams {
    /// Symmetric, AES-based SCP03
    Scp03(Scp03KeyParams),
    /// Asymmetric, EC-based SCP11 (variants a, b, c)
    Scp11(Scp11KeyParams),
}

impl From<Scp03KeyParams> for ScpKeyParams {
    fn from(params: Scp03KeyParams) -> Self {
        Self::Scp03(params)
    }
}

impl From<Scp11KeyParams> for ScpKeyParams {
    fn from(params: Scp11KeyParams) -> Self {
        Self::Scp11(params)
    }
}
