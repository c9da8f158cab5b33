//! Software card for integration tests
//!
//! Implements the device side of SELECT, SCP03, SCP11b/a and the Security
//! Domain operations with the crate's own primitives, so the suites can
//! exercise the full client pipeline against a faithful peer.

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::fmt;

use aes::cipher::{BlockDecrypt, KeyInit};
use aes::Aes128;
use bytes::{BufMut, Bytes, BytesMut};
use p256::ecdsa::signature::Verifier;
use p256::ecdsa::{Signature, VerifyingKey};
use p256::elliptic_curve::sec1::ToEncodedPoint;
use p256::{ecdh, PublicKey, SecretKey};
use rand::rngs::OsRng;

use generic_array::GenericArray;
use tessera_apdu_core::{CardTransport, Error as CoreError};
use tessera_apdu_globalplatform::crypto::{self, derivation};
use tessera_apdu_globalplatform::tlv::{self, Tag};

pub const SD_AID: [u8; 8] = [0xA0, 0x00, 0x00, 0x01, 0x51, 0x00, 0x00, 0x00];
pub const DEFAULT_KEY: [u8; 16] = [
    0x40, 0x41, 0x42, 0x43, 0x44, 0x45, 0x46, 0x47, 0x48, 0x49, 0x4A, 0x4B, 0x4C, 0x4D, 0x4E,
    0x4F,
];
pub const CARD_CHALLENGE: [u8; 8] = [0xA0, 0xA1, 0xA2, 0xA3, 0xA4, 0xA5, 0xA6, 0xA7];
pub const FCI: &[u8] = &[0x6F, 0x04, 0x84, 0x02, 0xA5, 0x01];

const TAG_CRT: Tag = Tag::new(0xA6);
const TAG_EPK: Tag = Tag::new(0x5F49);
const TAG_RECEIPT: Tag = Tag::new(0x86);
const TAG_SIGNATURE: Tag = Tag::new(0x5F37);

struct Scp03Session {
    s_enc: [u8; 16],
    s_mac: [u8; 16],
    s_rmac: [u8; 16],
    host_cryptogram: [u8; 8],
}

struct OpenSession {
    s_enc: [u8; 16],
    s_mac: [u8; 16],
    s_rmac: [u8; 16],
    mac_chain: [u8; 16],
    enc_counter: u32,
}

enum ScpState {
    None,
    PendingAuth(Scp03Session),
    Open(OpenSession),
}

/// Scripted device: static keys, key slots and protocol state
pub struct SoftCard {
    // SCP03 static keys and the version they live under
    scp03_keys: ([u8; 16], [u8; 16], [u8; 16]),
    scp03_kvn: u8,
    // SCP11 static keypair and the slot it lives in
    scp11_secret: Option<SecretKey>,
    scp11_key_ref: (u8, u8),
    // OCE public key for SCP11a/c signature verification
    oce_public_key: Option<PublicKey>,
    state: ScpState,
    selected: bool,

    // Data objects served by GET DATA
    data_objects: BTreeMap<u16, Bytes>,
    key_slots: Vec<(u8, u8)>,

    // Command chaining reassembly
    chain_buffer: BytesMut,
    // Response chaining: remaining body and the final status word
    outgoing: Option<(BytesMut, [u8; 2])>,
    response_window: usize,

    // STORE DATA reassembly
    store_buffer: BytesMut,
    pub stored_payloads: Vec<Bytes>,
    pub received_certificates: Vec<Bytes>,

    // Factory-reset behavior
    pub reset_mode: bool,
    reset_counters: BTreeMap<(u8, u8), u32>,

    // Introspection for assertions
    pub commands_seen: Vec<Bytes>,
    pub instructions_seen: Vec<u8>,
    pub select_count: usize,

    // Fault injection
    pub tamper_next_wrapped_response: bool,
    pub corrupt_receipt: bool,
}

impl fmt::Debug for SoftCard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SoftCard")
            .field("selected", &self.selected)
            .field("commands_seen", &self.commands_seen.len())
            .finish()
    }
}

impl Default for SoftCard {
    fn default() -> Self {
        Self::new()
    }
}

impl SoftCard {
    pub fn new() -> Self {
        let mut data_objects = BTreeMap::new();
        data_objects.insert(
            0x0066,
            Bytes::from_static(&[0x66, 0x04, 0x73, 0x02, 0x06, 0x07]),
        );

        Self {
            scp03_keys: (DEFAULT_KEY, DEFAULT_KEY, DEFAULT_KEY),
            scp03_kvn: 0xFF,
            scp11_secret: None,
            scp11_key_ref: (0x13, 0x01),
            oce_public_key: None,
            state: ScpState::None,
            selected: false,
            data_objects,
            key_slots: vec![(0x01, 0xFF)],
            chain_buffer: BytesMut::new(),
            outgoing: None,
            response_window: usize::MAX,
            store_buffer: BytesMut::new(),
            stored_payloads: Vec::new(),
            received_certificates: Vec::new(),
            reset_mode: false,
            reset_counters: BTreeMap::new(),
            commands_seen: Vec::new(),
            instructions_seen: Vec::new(),
            select_count: 0,
            tamper_next_wrapped_response: false,
            corrupt_receipt: false,
        }
    }

    /// Install an SCP11 static keypair and return the public key for the host
    pub fn with_scp11_key(mut self, kid: u8, kvn: u8) -> (Self, PublicKey) {
        let secret = SecretKey::random(&mut OsRng);
        let public = secret.public_key();
        self.scp11_secret = Some(secret);
        self.scp11_key_ref = (kid, kvn);
        self.key_slots.push((kid, kvn));
        (self, public)
    }

    /// Trust an OCE verification key for SCP11a/c handshakes
    pub fn trust_oce(&mut self, public_key: PublicKey) {
        self.oce_public_key = Some(public_key);
    }

    pub fn set_data_object(&mut self, identifier: u16, value: impl Into<Bytes>) {
        self.data_objects.insert(identifier, value.into());
    }

    /// Serve responses in windows of at most `window` bytes via 61xx chaining
    pub fn set_response_window(&mut self, window: usize) {
        self.response_window = window;
    }

    /// Configure the key slots reported by GET DATA (key information)
    pub fn set_key_slots(&mut self, slots: &[(u8, u8)]) {
        self.key_slots = slots.to_vec();
    }

    /// Enter factory-reset scripting: each slot answers 6A80 until its
    /// counter is exhausted, then 6983.
    pub fn arm_reset(&mut self, counters: &[((u8, u8), u32)]) {
        self.reset_mode = true;
        self.reset_counters = counters.iter().copied().collect();
    }

    pub fn attempts_for_instruction(&self, ins: u8) -> usize {
        self.instructions_seen.iter().filter(|&&i| i == ins).count()
    }

    fn key_information_object(&self) -> Bytes {
        let mut entries = BytesMut::new();
        for (kid, kvn) in &self.key_slots {
            tlv::encode_into(&mut entries, Tag::new(0xC0), &[*kid, *kvn, 0x88, 0x10]);
        }
        tlv::encode(Tag::new(0xE0), &entries)
    }

    fn respond(&mut self, body: Bytes, sw: [u8; 2]) -> Bytes {
        if body.len() > self.response_window {
            let mut buffer = BytesMut::from(body.as_ref());
            let first = buffer.split_to(self.response_window);
            let remaining = buffer.len().min(0xFF) as u8;
            self.outgoing = Some((buffer, sw));
            let mut out = BytesMut::from(first.as_ref());
            out.put_slice(&[0x61, remaining]);
            return out.freeze();
        }
        let mut out = BytesMut::from(body.as_ref());
        out.put_slice(&sw);
        out.freeze()
    }

    fn drain_response(&mut self) -> Bytes {
        match self.outgoing.take() {
            Some((mut buffer, sw)) => {
                if buffer.len() > self.response_window {
                    let first = buffer.split_to(self.response_window);
                    let remaining = buffer.len().min(0xFF) as u8;
                    self.outgoing = Some((buffer, sw));
                    let mut out = BytesMut::from(first.as_ref());
                    out.put_slice(&[0x61, remaining]);
                    out.freeze()
                } else {
                    let mut out = buffer;
                    out.put_slice(&sw);
                    out.freeze()
                }
            }
            None => Bytes::from_static(&[0x6F, 0x00]),
        }
    }

    fn unwrap_aes_block(&self, wrapped: &[u8]) -> Vec<u8> {
        let cipher = Aes128::new(GenericArray::from_slice(&self.scp03_keys.2));
        let mut out = wrapped.to_vec();
        for chunk in out.chunks_mut(16) {
            cipher.decrypt_block(GenericArray::from_mut_slice(chunk));
        }
        out
    }

    fn handle_reset_attempt(&mut self, ins: u8) -> ([u8; 2], bool) {
        // Map the attacked instruction back to the slot it burns
        let target = match ins {
            0x50 => self.key_slots.iter().copied().find(|(kid, _)| *kid == 0x01),
            0x88 => self.key_slots.iter().copied().find(|(kid, _)| *kid == 0x13),
            0x82 => self
                .key_slots
                .iter()
                .copied()
                .find(|(kid, _)| *kid == 0x11 || *kid == 0x15),
            _ => self
                .key_slots
                .iter()
                .copied()
                .find(|(kid, _)| !matches!(*kid, 0x01 | 0x11 | 0x13 | 0x15)),
        };

        let Some(target) = target else {
            return ([0x6A, 0x88], false);
        };
        let counter = self.reset_counters.entry(target).or_insert(0);
        if *counter == 0 {
            ([0x69, 0x83], true)
        } else {
            *counter -= 1;
            ([0x6A, 0x80], false)
        }
    }

    fn handle_initialize_update(&mut self, p1: u8, p2: u8, data: &[u8]) -> (Bytes, [u8; 2]) {
        if data.len() != 8 {
            return (Bytes::new(), [0x67, 0x00]);
        }
        if p2 != 0x00 && p2 != 0x01 {
            return (Bytes::new(), [0x6A, 0x88]);
        }
        if p1 != 0x00 && p1 != self.scp03_kvn {
            return (Bytes::new(), [0x6A, 0x88]);
        }

        let mut host_challenge = [0u8; 8];
        host_challenge.copy_from_slice(data);

        let mut context = [0u8; 16];
        context[..8].copy_from_slice(&host_challenge);
        context[8..].copy_from_slice(&CARD_CHALLENGE);

        let (enc, mac, _) = &self.scp03_keys;
        let mut s_enc = [0u8; 16];
        let mut s_mac = [0u8; 16];
        let mut s_rmac = [0u8; 16];
        crypto::scp03_derive(enc, derivation::S_ENC, &context, &mut s_enc);
        crypto::scp03_derive(mac, derivation::S_MAC, &context, &mut s_mac);
        crypto::scp03_derive(mac, derivation::S_RMAC, &context, &mut s_rmac);

        let mut card_cryptogram = [0u8; 8];
        crypto::scp03_derive(
            &s_mac,
            derivation::CARD_CRYPTOGRAM,
            &context,
            &mut card_cryptogram,
        );
        let mut host_cryptogram = [0u8; 8];
        crypto::scp03_derive(
            &s_mac,
            derivation::HOST_CRYPTOGRAM,
            &context,
            &mut host_cryptogram,
        );

        let mut body = BytesMut::new();
        body.put_slice(&[0u8; 10]); // key diversification data
        body.put_slice(&[self.scp03_kvn, 0x03, 0x70]); // key information
        body.put_slice(&CARD_CHALLENGE);
        body.put_slice(&card_cryptogram);

        self.state = ScpState::PendingAuth(Scp03Session {
            s_enc,
            s_mac,
            s_rmac,
            host_cryptogram,
        });
        (body.freeze(), [0x90, 0x00])
    }

    fn handle_external_authenticate(&mut self, header: [u8; 4], data: &[u8]) -> (Bytes, [u8; 2]) {
        let ScpState::PendingAuth(session) = &self.state else {
            return (Bytes::new(), [0x69, 0x85]);
        };
        if data.len() != 16 {
            return (Bytes::new(), [0x67, 0x00]);
        }

        let (cryptogram, mac) = data.split_at(8);
        if cryptogram != session.host_cryptogram {
            self.state = ScpState::None;
            return (Bytes::new(), [0x69, 0x82]);
        }

        let zero_chain = [0u8; 16];
        let mac_header = [header[0], header[1], header[2], header[3], 0x10];
        let expected = crypto::cmac_aes128(&session.s_mac, &[&zero_chain, &mac_header, cryptogram]);
        if &expected[..8] != mac {
            self.state = ScpState::None;
            return (Bytes::new(), [0x69, 0x82]);
        }

        self.state = ScpState::Open(OpenSession {
            s_enc: session.s_enc,
            s_mac: session.s_mac,
            s_rmac: session.s_rmac,
            mac_chain: expected,
            enc_counter: 1,
        });
        (Bytes::new(), [0x90, 0x00])
    }

    fn handle_internal_authenticate(&mut self, p1: u8, p2: u8, data: &[u8]) -> (Bytes, [u8; 2]) {
        let Some(static_secret) = self.scp11_secret.clone() else {
            return (Bytes::new(), [0x6A, 0x88]);
        };
        if (p2, p1) != self.scp11_key_ref {
            return (Bytes::new(), [0x6A, 0x88]);
        }
        self.run_scp11_key_agreement(&static_secret, data, false)
    }

    fn handle_scp11_external_authenticate(&mut self, data: &[u8]) -> (Bytes, [u8; 2]) {
        let Some(static_secret) = self.scp11_secret.clone() else {
            return (Bytes::new(), [0x6A, 0x88]);
        };
        self.run_scp11_key_agreement(&static_secret, data, true)
    }

    fn run_scp11_key_agreement(
        &mut self,
        static_secret: &SecretKey,
        data: &[u8],
        verify_signature: bool,
    ) -> (Bytes, [u8; 2]) {
        let Ok(Some(crt)) = tlv::find(data, TAG_CRT) else {
            return (Bytes::new(), [0x6A, 0x80]);
        };
        let Ok(Some(host_point)) = tlv::find(data, TAG_EPK) else {
            return (Bytes::new(), [0x6A, 0x80]);
        };
        let Ok(host_ephemeral) = PublicKey::from_sec1_bytes(host_point) else {
            return (Bytes::new(), [0x6A, 0x80]);
        };

        // The receipt input is the transcript up to and excluding the signature
        let mut agreement = BytesMut::new();
        tlv::encode_into(&mut agreement, TAG_CRT, crt);
        tlv::encode_into(&mut agreement, TAG_EPK, host_point);

        if verify_signature {
            let Some(oce_key) = self.oce_public_key.as_ref() else {
                return (Bytes::new(), [0x69, 0x82]);
            };
            let Ok(Some(signature_der)) = tlv::find(data, TAG_SIGNATURE) else {
                return (Bytes::new(), [0x69, 0x82]);
            };
            let Ok(signature) = Signature::from_der(signature_der) else {
                return (Bytes::new(), [0x6A, 0x80]);
            };
            if VerifyingKey::from(oce_key)
                .verify(&agreement, &signature)
                .is_err()
            {
                return (Bytes::new(), [0x69, 0x82]);
            }
        }

        let card_ephemeral = SecretKey::random(&mut OsRng);
        let card_point = card_ephemeral.public_key().to_encoded_point(false);

        let z_ephemeral = ecdh::diffie_hellman(
            card_ephemeral.to_nonzero_scalar(),
            host_ephemeral.as_affine(),
        );
        let z_static =
            ecdh::diffie_hellman(static_secret.to_nonzero_scalar(), host_ephemeral.as_affine());
        let mut secret = Vec::with_capacity(64);
        secret.extend_from_slice(z_ephemeral.raw_secret_bytes());
        secret.extend_from_slice(z_static.raw_secret_bytes());

        let mut shared_info = BytesMut::from(crt);
        if verify_signature {
            use sha2::{Digest, Sha256};
            let mut hasher = Sha256::new();
            for certificate in &self.received_certificates {
                hasher.update(certificate);
            }
            shared_info.put_slice(&hasher.finalize());
        }

        let mut key_material = [0u8; 80];
        crypto::x963_kdf(&secret, &shared_info, &mut key_material);

        let mut s_enc = [0u8; 16];
        let mut s_mac = [0u8; 16];
        let mut s_rmac = [0u8; 16];
        let mut receipt_key = [0u8; 16];
        s_enc.copy_from_slice(&key_material[..16]);
        s_mac.copy_from_slice(&key_material[16..32]);
        s_rmac.copy_from_slice(&key_material[32..48]);
        receipt_key.copy_from_slice(&key_material[64..80]);

        let card_point_tlv = tlv::encode(TAG_EPK, card_point.as_bytes());
        let mut receipt = crypto::cmac_aes128(&receipt_key, &[&agreement, &card_point_tlv]);
        if self.corrupt_receipt {
            receipt[0] ^= 0xFF;
        }

        let mut body = BytesMut::new();
        body.put_slice(&card_point_tlv);
        tlv::encode_into(&mut body, TAG_RECEIPT, &receipt);

        self.state = ScpState::Open(OpenSession {
            s_enc,
            s_mac,
            s_rmac,
            mac_chain: [0u8; 16],
            enc_counter: 1,
        });
        (body.freeze(), [0x90, 0x00])
    }

    fn handle_put_key(&mut self, p1: u8, p2: u8, data: &[u8]) -> (Bytes, [u8; 2]) {
        if data.is_empty() {
            return (Bytes::new(), [0x6A, 0x80]);
        }
        let new_kvn = data[0];
        let mut echo = BytesMut::new();
        echo.put_u8(new_kvn);

        if p2 & 0x80 != 0 {
            // Full static key set: three wrapped AES components
            let mut offset = 1;
            let mut components = Vec::new();
            for _ in 0..3 {
                if data.len() < offset + 3 {
                    return (Bytes::new(), [0x6A, 0x80]);
                }
                let len = data[offset + 1] as usize;
                if len != 16 || data.len() < offset + 3 + len {
                    return (Bytes::new(), [0x6A, 0x80]);
                }
                let wrapped = &data[offset + 2..offset + 2 + len];
                let kcv_len = data[offset + 2 + len] as usize;
                if kcv_len != 3 || data.len() < offset + 3 + len + kcv_len {
                    return (Bytes::new(), [0x6A, 0x80]);
                }
                let kcv = &data[offset + 3 + len..offset + 3 + len + kcv_len];

                let plain = self.unwrap_aes_block(wrapped);
                let mut key = [0u8; 16];
                key.copy_from_slice(&plain);
                if crypto::key_check_value(&key) != kcv[..3] {
                    return (Bytes::new(), [0x6A, 0x80]);
                }
                echo.put_slice(kcv);
                components.push(key);
                offset += 3 + len + kcv_len;
            }

            self.scp03_keys = (components[0], components[1], components[2]);
            self.scp03_kvn = new_kvn;
            let _ = p1;
        }

        (echo.freeze(), [0x90, 0x00])
    }

    fn handle_store_data(&mut self, p1: u8, data: &[u8]) -> (Bytes, [u8; 2]) {
        self.store_buffer.put_slice(data);
        if p1 & 0x80 != 0 {
            let payload = std::mem::take(&mut self.store_buffer).freeze();
            self.stored_payloads.push(payload);
        }
        (Bytes::new(), [0x90, 0x00])
    }

    fn handle_delete(&mut self, data: &[u8]) -> (Bytes, [u8; 2]) {
        let kid = tlv::find(data, Tag::new(0xD0))
            .ok()
            .flatten()
            .and_then(|v| v.first().copied());
        let kvn = tlv::find(data, Tag::new(0xD2))
            .ok()
            .flatten()
            .and_then(|v| v.first().copied());

        let before = self.key_slots.len();
        self.key_slots.retain(|(slot_kid, slot_kvn)| {
            !(kid.map_or(true, |k| k == *slot_kid) && kvn.map_or(true, |k| k == *slot_kvn))
        });
        if self.key_slots.len() == before {
            return (Bytes::new(), [0x6A, 0x88]);
        }
        (Bytes::new(), [0x90, 0x00])
    }

    fn handle_generate_key(&mut self, p2: u8, data: &[u8]) -> (Bytes, [u8; 2]) {
        if data.len() != 1 {
            return (Bytes::new(), [0x6A, 0x80]);
        }
        let secret = SecretKey::random(&mut OsRng);
        let point = secret.public_key().to_encoded_point(false);
        self.key_slots.push((p2, data[0]));
        (tlv::encode(TAG_EPK, point.as_bytes()), [0x90, 0x00])
    }

    fn dispatch(&mut self, header: [u8; 4], data: &[u8]) -> (Bytes, [u8; 2]) {
        let [_, ins, p1, p2] = header;
        match ins {
            0xA4 => {
                if data == SD_AID.as_slice() {
                    self.selected = true;
                    self.select_count += 1;
                    self.state = ScpState::None;
                    // A completed factory reset leaves the card in its
                    // delivery state on the next selection
                    if self.reset_mode && self.reset_counters.values().all(|c| *c == 0) {
                        self.reset_mode = false;
                        self.key_slots = vec![(0x01, 0xFF)];
                        self.scp03_keys = (DEFAULT_KEY, DEFAULT_KEY, DEFAULT_KEY);
                        self.scp03_kvn = 0xFF;
                    }
                    (Bytes::from_static(FCI), [0x90, 0x00])
                } else {
                    (Bytes::new(), [0x6A, 0x82])
                }
            }
            0xCA => {
                let identifier = u16::from_be_bytes([p1, p2]);
                if identifier == 0x00E0 {
                    return (self.key_information_object(), [0x90, 0x00]);
                }
                match self.data_objects.get(&identifier) {
                    Some(value) => (value.clone(), [0x90, 0x00]),
                    None => (Bytes::new(), [0x6A, 0x88]),
                }
            }
            0x50 => self.handle_initialize_update(p1, p2, data),
            0x88 => self.handle_internal_authenticate(p1, p2, data),
            0x82 => self.handle_scp11_external_authenticate(data),
            0x2A => {
                self.received_certificates.push(Bytes::copy_from_slice(data));
                (Bytes::new(), [0x90, 0x00])
            }
            0xD8 => self.handle_put_key(p1, p2, data),
            0xE2 => self.handle_store_data(p1, data),
            0xE4 => self.handle_delete(data),
            0xF1 => self.handle_generate_key(p2, data),
            _ => (Bytes::new(), [0x6D, 0x00]),
        }
    }

    fn handle_wrapped(&mut self, header: [u8; 4], data: &[u8]) -> Result<Bytes, CoreError> {
        // EXTERNAL AUTHENTICATE completes the SCP03 handshake
        if matches!(self.state, ScpState::PendingAuth(_)) && header[1] == 0x82 {
            let (body, sw) = self.handle_external_authenticate(header, data);
            return Ok(self.respond(body, sw));
        }

        let ScpState::Open(mut session) = std::mem::replace(&mut self.state, ScpState::None)
        else {
            return Ok(Bytes::from_static(&[0x69, 0x85]));
        };

        if data.len() < 8 {
            return Ok(Bytes::from_static(&[0x67, 0x00]));
        }
        let (body, mac) = data.split_at(data.len() - 8);
        let mac_header = [header[0], header[1], header[2], header[3], data.len() as u8];
        let expected =
            crypto::cmac_aes128(&session.s_mac, &[&session.mac_chain, &mac_header, body]);
        if &expected[..8] != mac {
            // A broken C-MAC leaves the card session closed
            return Ok(Bytes::from_static(&[0x69, 0x82]));
        }
        session.mac_chain = expected;

        let plaintext = if body.is_empty() {
            Bytes::new()
        } else {
            let icv = crypto::derive_icv(&session.s_enc, session.enc_counter, false);
            let mut buffer = BytesMut::from(body);
            match crypto::cbc_decrypt_unpad(&session.s_enc, &icv, &mut buffer) {
                Ok(plain) => plain,
                Err(_) => return Ok(Bytes::from_static(&[0x69, 0x88])),
            }
        };

        let (response_body, sw) = self.dispatch(header, &plaintext);

        let sealed_body = if response_body.is_empty() {
            Bytes::new()
        } else {
            let icv = crypto::derive_icv(&session.s_enc, session.enc_counter, true);
            let mut buffer = BytesMut::from(response_body.as_ref());
            crypto::cbc_encrypt_padded(&session.s_enc, &icv, &mut buffer)
        };

        let mac =
            crypto::cmac_aes128(&session.s_rmac, &[&session.mac_chain, &sealed_body, &sw]);
        let mut out = BytesMut::with_capacity(sealed_body.len() + 8);
        out.put_slice(&sealed_body);
        out.put_slice(&mac[..8]);

        if self.tamper_next_wrapped_response {
            self.tamper_next_wrapped_response = false;
            out[0] ^= 0x01;
        }

        session.enc_counter += 1;
        self.state = ScpState::Open(session);
        Ok(self.respond(out.freeze(), sw))
    }
}

impl CardTransport for SoftCard {
    fn transmit_raw(&mut self, command: &[u8]) -> Result<Bytes, CoreError> {
        self.commands_seen.push(Bytes::copy_from_slice(command));
        if command.len() < 4 {
            return Err(CoreError::Transport("short command".into()));
        }
        let header = [command[0], command[1], command[2], command[3]];
        self.instructions_seen.push(header[1]);

        if header[1] == 0xC0 {
            return Ok(self.drain_response());
        }

        // Body of a short APDU; Le (if any) is ignored
        let data = match command.len() {
            4 | 5 => &[][..],
            _ => {
                let lc = command[4] as usize;
                if command.len() < 5 + lc {
                    return Err(CoreError::Transport("truncated command body".into()));
                }
                &command[5..5 + lc]
            }
        };

        // Command chaining: buffer non-final fragments
        if header[0] & 0x10 != 0 {
            self.chain_buffer.put_slice(data);
            return Ok(Bytes::from_static(&[0x90, 0x00]));
        }
        let assembled;
        let data = if self.chain_buffer.is_empty() {
            data
        } else {
            self.chain_buffer.put_slice(data);
            assembled = std::mem::take(&mut self.chain_buffer).freeze();
            &assembled
        };

        if self.reset_mode && matches!(header[1], 0x50 | 0x82 | 0x88 | 0x2A) {
            let (sw, _) = self.handle_reset_attempt(header[1]);
            return Ok(Bytes::copy_from_slice(&sw));
        }

        if header[0] & 0x04 != 0 {
            return self.handle_wrapped(header, data);
        }

        let (body, sw) = self.dispatch(header, data);
        Ok(self.respond(body, sw))
    }

    fn reset(&mut self) -> Result<(), CoreError> {
        self.state = ScpState::None;
        self.selected = false;
        Ok(())
    }
}
