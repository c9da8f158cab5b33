//! GlobalPlatform secure channels and Security Domain management
//!
//! Client-side implementation of the GlobalPlatform Secure Channel Protocols
//! used by hardware authenticator devices, layered on the APDU stack of
//! [`tessera_apdu_core`]:
//!
//! - **SCP03**: symmetric mutual authentication with AES-CMAC and session-key
//!   derivation per SP 800-108, then an encrypt/MAC/verify/decrypt pipeline
//!   over every command
//! - **SCP11** (variants a/b/c): ephemeral ECDH on P-256 with X9.63 session
//!   key derivation, optionally authenticating the host through its OCE
//!   certificate chain, then the same pipeline
//! - **Security Domain session**: key lifecycle operations (PUT KEY, DELETE,
//!   GENERATE KEY), certificate and allowlist storage, and factory reset
//!
//! The entry point is [`SecurityDomain`] over any
//! [`Executor`](tessera_apdu_core::Executor).

#![forbid(unsafe_code)]
#![warn(missing_docs, rustdoc::missing_crate_level_docs)]

pub mod application;
pub mod commands;
pub mod constants;
pub mod crypto;
pub mod error;
pub mod keys;
pub mod scp03;
pub mod scp11;
pub mod secure_channel;
pub mod tlv;

// Re-exports
pub use application::{KeyInformation, SecurityDomain};
pub use error::{CoreResultExt, Error, Result, ResultExt};
pub use keys::{
    Certificate, DataEncryptionKey, KeyRef, Scp03KeyParams, Scp11KeyParams, ScpKeyParams,
    SessionKeys, StaticKeys,
};
pub use scp11::Scp11Variant;
pub use secure_channel::{establish_secure_channel, ScpChannel};

// Re-export from the core crate for convenience
pub use tessera_apdu_core::{CardExecutor, CardTransport, ChannelState, Executor};

/// Convenience alias: a Security Domain session over a card executor
pub type DefaultSecurityDomain<T> = SecurityDomain<CardExecutor<T>>;

/// Connect to the Security Domain over a transport: build an executor,
/// select the default AID and return the session.
pub fn connect<T: CardTransport>(transport: T) -> Result<SecurityDomain<CardExecutor<T>>> {
    let executor = CardExecutor::new(transport);
    let mut session = SecurityDomain::new(executor);
    session.select_security_domain()?;
    Ok(session)
}
