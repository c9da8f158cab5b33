//! Error types for GlobalPlatform operations
//!
//! This module centralizes the error variants of the secure channel engines
//! and the Security Domain session, wrapping the core APDU error and the
//! command-specific errors.

use thiserror::Error;

use tessera_apdu_core::StatusWord;

use crate::commands::{
    delete::DeleteError, external_authenticate::ExternalAuthenticateError,
    generate_key::GenerateKeyError, get_data::GetDataError,
    initialize_update::InitializeUpdateError, internal_authenticate::InternalAuthenticateError,
    perform_security_operation::PerformSecurityOperationError, put_key::PutKeyError,
    select::SelectError, store_data::StoreDataError,
};
use crate::keys::KeyRef;
use crate::tlv::TlvError;

/// Result type for GlobalPlatform operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for GlobalPlatform operations
#[derive(Debug, Error)]
pub enum Error {
    /// Core APDU error
    #[error(transparent)]
    Core(tessera_apdu_core::Error),

    /// TLV encoding/decoding error
    #[error("TLV error: {0}")]
    Tlv(#[from] TlvError),

    /// The requested application does not exist on the card
    #[error("application not found")]
    ApplicationNotFound,

    /// Mutual authentication failed
    #[error("authentication failed: {0}")]
    AuthenticationFailed(&'static str),

    /// Message protection failed after authentication; the channel is dead
    #[error("secure channel broken: {0}")]
    SecureChannelBroken(&'static str),

    /// The operation requires an open secure channel
    #[error("secure channel not established")]
    NoSecureChannel,

    /// Cryptographic operation failed
    #[error("cryptographic error: {0}")]
    Crypto(&'static str),

    /// Handshake parameters do not match the selected protocol variant
    #[error("invalid key parameters: {0}")]
    InvalidKeyParams(&'static str),

    /// The key identifier does not select a known SCP variant
    #[error("unsupported key identifier {kid:#04x}")]
    UnsupportedKid {
        /// The offending key identifier
        kid: u8,
    },

    /// Response body failed structural parsing
    #[error("invalid response: {0}")]
    InvalidResponse(&'static str),

    /// A key operation failed against a specific slot
    #[error("key operation failed for {key_ref}: {status}")]
    KeyOperation {
        /// The slot addressed by the operation
        key_ref: KeyRef,
        /// The status word returned by the card
        status: StatusWord,
    },

    /// Error from the SELECT command
    #[error(transparent)]
    Select(#[from] SelectError),

    /// Error from the INITIALIZE UPDATE command
    #[error(transparent)]
    InitializeUpdate(#[from] InitializeUpdateError),

    /// Error from the EXTERNAL AUTHENTICATE command
    #[error(transparent)]
    ExternalAuthenticate(#[from] ExternalAuthenticateError),

    /// Error from the INTERNAL AUTHENTICATE command
    #[error(transparent)]
    InternalAuthenticate(#[from] InternalAuthenticateError),

    /// Error from the PERFORM SECURITY OPERATION command
    #[error(transparent)]
    PerformSecurityOperation(#[from] PerformSecurityOperationError),

    /// Error from the GET DATA command
    #[error(transparent)]
    GetData(#[from] GetDataError),

    /// Error from the PUT KEY command
    #[error(transparent)]
    PutKey(#[from] PutKeyError),

    /// Error from the STORE DATA command
    #[error(transparent)]
    StoreData(#[from] StoreDataError),

    /// Error from the DELETE command
    #[error(transparent)]
    Delete(#[from] DeleteError),

    /// Error from the GENERATE KEY command
    #[error(transparent)]
    GenerateKey(#[from] GenerateKeyError),

    /// Context with source error
    #[error("{context}: {source}")]
    Context {
        /// Contextual message
        context: String,
        /// Source error
        source: Box<Self>,
    },

    /// Other error with dynamic message
    #[error("{0}")]
    Message(String),

    /// Other error with static message
    #[error("{0}")]
    Other(&'static str),
}

impl Error {
    /// Create a new error with context information
    pub fn with_context<S: Into<String>>(self, context: S) -> Self {
        Self::Context {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// Create a new error with a static message
    pub const fn other(message: &'static str) -> Self {
        Self::Other(message)
    }

    /// Create a new error with a dynamic message
    pub fn message<S: Into<String>>(message: S) -> Self {
        Self::Message(message.into())
    }
}

impl From<tessera_apdu_core::Error> for Error {
    fn from(error: tessera_apdu_core::Error) -> Self {
        match error {
            // A rejected wrap or failed response verification means the
            // channel is gone
            tessera_apdu_core::Error::SecureChannel(reason) => Self::SecureChannelBroken(reason),
            other => Self::Core(other),
        }
    }
}

/// Extension trait for Result with context addition
pub trait ResultExt<T> {
    /// Add context to an error
    fn context<S: Into<String>>(self, context: S) -> Result<T>;
}

impl<T> ResultExt<T> for Result<T> {
    fn context<S: Into<String>>(self, context: S) -> Self {
        self.map_err(|e| e.with_context(context))
    }
}

/// Extension trait for core results
pub trait CoreResultExt<T> {
    /// Convert a core result into a GlobalPlatform result
    fn to_gp(self) -> Result<T>;
}

impl<T> CoreResultExt<T> for std::result::Result<T, tessera_apdu_core::Error> {
    fn to_gp(self) -> Result<T> {
        self.map_err(Error::from)
    }
}
