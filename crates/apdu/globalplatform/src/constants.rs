//! Constants for GlobalPlatform operations

/// Class bytes
pub mod cla {
    /// ISO 7816-4 interindustry class
    pub const ISO: u8 = 0x00;
    /// GlobalPlatform proprietary class
    pub const GP: u8 = 0x80;
    /// Secure-messaging indicator bit
    pub const SECURE_MESSAGING: u8 = 0x04;
}

/// Instruction bytes
pub mod ins {
    /// SELECT
    pub const SELECT: u8 = 0xA4;
    /// INITIALIZE UPDATE (SCP03 handshake, first half)
    pub const INITIALIZE_UPDATE: u8 = 0x50;
    /// EXTERNAL AUTHENTICATE (SCP03 handshake second half, SCP11a/c key agreement)
    pub const EXTERNAL_AUTHENTICATE: u8 = 0x82;
    /// INTERNAL AUTHENTICATE (SCP11b key agreement)
    pub const INTERNAL_AUTHENTICATE: u8 = 0x88;
    /// PERFORM SECURITY OPERATION (OCE certificate upload)
    pub const PERFORM_SECURITY_OPERATION: u8 = 0x2A;
    /// GET DATA
    pub const GET_DATA: u8 = 0xCA;
    /// PUT KEY
    pub const PUT_KEY: u8 = 0xD8;
    /// STORE DATA
    pub const STORE_DATA: u8 = 0xE2;
    /// DELETE
    pub const DELETE: u8 = 0xE4;
    /// GENERATE KEY
    pub const GENERATE_KEY: u8 = 0xF1;
}

/// Key identifiers addressing key purpose within a slot
pub mod kid {
    /// SCP03 static key set
    pub const SCP03: u8 = 0x01;
    /// Off-Card Entity key for SCP11a/c
    pub const OCE: u8 = 0x10;
    /// SCP11a key
    pub const SCP11A: u8 = 0x11;
    /// SCP11b key
    pub const SCP11B: u8 = 0x13;
    /// SCP11c key
    pub const SCP11C: u8 = 0x15;
}

/// BER-TLV tags used in handshakes and data objects
pub mod tags {
    use crate::tlv::Tag;

    /// Key information template
    pub const KEY_INFORMATION_TEMPLATE: Tag = Tag::new(0xE0);
    /// Key information entry
    pub const KEY_INFORMATION: Tag = Tag::new(0xC0);
    /// Control reference template
    pub const CONTROL_REFERENCE_TEMPLATE: Tag = Tag::new(0xA6);
    /// SCP protocol identifier and parameter
    pub const SCP_PARAMETERS: Tag = Tag::new(0x90);
    /// Key usage qualifier
    pub const KEY_USAGE: Tag = Tag::new(0x95);
    /// Key type
    pub const KEY_TYPE: Tag = Tag::new(0x80);
    /// Key length
    pub const KEY_LENGTH: Tag = Tag::new(0x81);
    /// Key reference (KID, KVN)
    pub const KEY_REFERENCE: Tag = Tag::new(0x83);
    /// CA issuer identifier (Subject Key Identifier)
    pub const CA_ISSUER: Tag = Tag::new(0x42);
    /// Uncompressed EC public key point
    pub const EC_PUBLIC_KEY: Tag = Tag::new(0x5F49);
    /// ECDSA signature
    pub const SIGNATURE: Tag = Tag::new(0x5F37);
    /// Key-agreement receipt
    pub const RECEIPT: Tag = Tag::new(0x86);
    /// Certificate store
    pub const CERTIFICATE_STORE: Tag = Tag::new(0xBF21);
    /// Certificate serial allowlist
    pub const ALLOWLIST: Tag = Tag::new(0x70);
    /// Certificate serial number
    pub const SERIAL_NUMBER: Tag = Tag::new(0x93);
}

/// GET DATA object identifiers (P1/P2 values)
pub mod data_object {
    /// Key information template
    pub const KEY_INFORMATION: u16 = 0x00E0;
    /// Card recognition data
    pub const CARD_RECOGNITION_DATA: u16 = 0x0066;
}

/// AID of the Issuer Security Domain
pub const SECURITY_DOMAIN_AID: [u8; 8] = [0xA0, 0x00, 0x00, 0x01, 0x51, 0x00, 0x00, 0x00];

/// Key version number selecting the factory-default SCP03 key set
pub const DEFAULT_KVN: u8 = 0xFF;
