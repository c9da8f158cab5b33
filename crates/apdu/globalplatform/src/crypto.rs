//! Cryptographic primitives for the secure channel protocols
//!
//! AES-CMAC (NIST SP 800-38B) is the workhorse: it MACs commands and
//! responses, derives SCP03 session keys (SP 800-108 CMAC counter mode) and
//! proves key possession in SCP11 receipts. SCP11 session keys come from an
//! ANSI X9.63 KDF over SHA-256.

use aes::cipher::{
    block_padding::Iso7816, BlockDecryptMut, BlockEncrypt, BlockEncryptMut, KeyInit, KeyIvInit,
};
use aes::Aes128;
use bytes::{Bytes, BytesMut};
use cipher::block_padding::UnpadError;
use cmac::{Cmac, Mac};
use generic_array::GenericArray;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

/// AES block and key size in bytes
pub const BLOCK_SIZE: usize = 16;

/// Size of a truncated SCP03 MAC
pub const MAC_SIZE: usize = 8;

/// Size of an SCP03 cryptogram
pub const CRYPTOGRAM_SIZE: usize = 8;

/// Size of a key check value
pub const KCV_SIZE: usize = 3;

type Encryptor = cbc::Encryptor<Aes128>;
type Decryptor = cbc::Decryptor<Aes128>;

/// Compute an AES-128 CMAC over the concatenation of `parts`
pub fn cmac_aes128(key: &[u8; BLOCK_SIZE], parts: &[&[u8]]) -> [u8; BLOCK_SIZE] {
    let mut mac = <Cmac<Aes128> as Mac>::new(GenericArray::from_slice(key));
    for part in parts {
        mac.update(part);
    }
    mac.finalize().into_bytes().into()
}

/// Constant-time equality for MACs, cryptograms and receipts
pub fn ct_eq(a: &[u8], b: &[u8]) -> bool {
    a.ct_eq(b).into()
}

/// Derive data using the SCP03 KDF: CMAC (SP 800-38B) as the PRF of a
/// counter-mode KDF (SP 800-108) with the fixed input layout of SCP03.
///
/// The context is the concatenated host and card challenges. At most one
/// block of output is ever needed, so the counter is fixed to 1.
pub fn scp03_derive(
    key: &[u8; BLOCK_SIZE],
    label: u8,
    context: &[u8; BLOCK_SIZE],
    output: &mut [u8],
) {
    debug_assert!(output.len() <= BLOCK_SIZE);

    let mut derivation_data = [0u8; 32];

    // "label": 11 zero bytes followed by the derivation constant
    derivation_data[11] = label;

    // "separation indicator" stays zero at index 12

    // "L": length of the derived data in bits
    let bits = (output.len() * 8) as u16;
    derivation_data[13..15].copy_from_slice(&bits.to_be_bytes());

    // "i": KDF counter
    derivation_data[15] = 0x01;

    derivation_data[16..].copy_from_slice(context);

    let mac = cmac_aes128(key, &[&derivation_data]);
    output.copy_from_slice(&mac[..output.len()]);
}

/// SCP03 derivation constants
pub mod derivation {
    /// Card cryptogram
    pub const CARD_CRYPTOGRAM: u8 = 0x00;
    /// Host cryptogram
    pub const HOST_CRYPTOGRAM: u8 = 0x01;
    /// Session encryption key (S-ENC)
    pub const S_ENC: u8 = 0x04;
    /// Session command MAC key (S-MAC)
    pub const S_MAC: u8 = 0x06;
    /// Session response MAC key (S-RMAC)
    pub const S_RMAC: u8 = 0x07;
}

/// ANSI X9.63 KDF over SHA-256: hash `Z || counter || shared_info` in
/// counter-prefixed blocks until `output` is filled.
pub fn x963_kdf(z: &[u8], shared_info: &[u8], output: &mut [u8]) {
    let mut counter = 1u32;
    for chunk in output.chunks_mut(32) {
        let mut hasher = Sha256::new();
        hasher.update(z);
        hasher.update(counter.to_be_bytes());
        hasher.update(shared_info);
        let digest = hasher.finalize();
        chunk.copy_from_slice(&digest[..chunk.len()]);
        counter += 1;
    }
}

/// Encrypt a single AES block in place, ECB mode
pub fn ecb_encrypt_block(key: &[u8; BLOCK_SIZE], block: &mut [u8; BLOCK_SIZE]) {
    let cipher = Aes128::new(GenericArray::from_slice(key));
    cipher.encrypt_block(GenericArray::from_mut_slice(block));
}

/// Key check value: leading bytes of the key applied to an all-zero block
pub fn key_check_value(key: &[u8; BLOCK_SIZE]) -> [u8; KCV_SIZE] {
    let mut block = [0u8; BLOCK_SIZE];
    ecb_encrypt_block(key, &mut block);
    let mut kcv = [0u8; KCV_SIZE];
    kcv.copy_from_slice(&block[..KCV_SIZE]);
    kcv
}

/// Wrap a single-block key component under the data encryption key
pub fn wrap_key(dek: &[u8; BLOCK_SIZE], key: &[u8; BLOCK_SIZE]) -> [u8; BLOCK_SIZE] {
    let mut block = *key;
    ecb_encrypt_block(dek, &mut block);
    block
}

/// Wrap an arbitrary-length secret (e.g. an EC private scalar) under the
/// data encryption key: AES-CBC with a zero IV, no padding. The input must
/// already be a multiple of the block size.
pub fn wrap_blocks(dek: &[u8; BLOCK_SIZE], data: &[u8]) -> Bytes {
    debug_assert_eq!(data.len() % BLOCK_SIZE, 0);
    let mut buf = BytesMut::from(data);
    let mut encryptor = Encryptor::new(
        GenericArray::from_slice(dek),
        GenericArray::from_slice(&[0u8; BLOCK_SIZE]),
    );
    for chunk in buf.chunks_mut(BLOCK_SIZE) {
        encryptor.encrypt_block_mut(GenericArray::from_mut_slice(chunk));
    }
    buf.freeze()
}

/// Derive the ICV for C-ENC/R-ENC: the encryption counter as a big-endian
/// block, high bit set for the response direction, encrypted under S-ENC.
pub fn derive_icv(
    s_enc: &[u8; BLOCK_SIZE],
    counter: u32,
    response: bool,
) -> [u8; BLOCK_SIZE] {
    let mut block = [0u8; BLOCK_SIZE];
    if response {
        block[0] = 0x80;
    }
    block[12..].copy_from_slice(&counter.to_be_bytes());
    ecb_encrypt_block(s_enc, &mut block);
    block
}

/// Pad with 0x80 then zeros up to the next block boundary and encrypt with
/// AES-CBC under the given key and IV.
pub fn cbc_encrypt_padded(
    key: &[u8; BLOCK_SIZE],
    iv: &[u8; BLOCK_SIZE],
    data: &mut BytesMut,
) -> Bytes {
    let msg_len = data.len();
    data.resize(msg_len + BLOCK_SIZE - msg_len % BLOCK_SIZE, 0);
    let encryptor = Encryptor::new(GenericArray::from_slice(key), GenericArray::from_slice(iv));
    // The buffer was resized to a block multiple above, so padding cannot fail
    match encryptor.encrypt_padded_mut::<Iso7816>(data, msg_len) {
        Ok(ciphertext) => Bytes::copy_from_slice(ciphertext),
        Err(_) => Bytes::new(),
    }
}

/// Decrypt AES-CBC and strip the 0x80 || 0x00… padding
pub fn cbc_decrypt_unpad(
    key: &[u8; BLOCK_SIZE],
    iv: &[u8; BLOCK_SIZE],
    data: &mut BytesMut,
) -> Result<Bytes, UnpadError> {
    let decryptor = Decryptor::new(GenericArray::from_slice(key), GenericArray::from_slice(iv));
    let plaintext = decryptor.decrypt_padded_mut::<Iso7816>(data)?;
    Ok(Bytes::copy_from_slice(plaintext))
}
