//! Error types for APDU operations
//!
//! This module provides the core error type shared by the transport, framing
//! and executor layers.

use thiserror::Error;

use crate::response::status::StatusWord;

/// Result type for core APDU operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for core APDU operations
#[derive(Debug, Error)]
pub enum Error {
    /// Opaque failure reported by the underlying transport
    #[error("transport error: {0}")]
    Transport(String),

    /// The transport observed a cancellation signal mid-exchange
    #[error("operation cancelled")]
    Cancelled,

    /// Response body failed structural parsing
    #[error("malformed response: {0}")]
    Parse(&'static str),

    /// Raw command bytes could not be parsed back into a command
    #[error("invalid command length: {0}")]
    InvalidCommandLength(usize),

    /// Command payload cannot be carried by the transport in any encoding
    #[error("command data too long: {0} bytes")]
    DataTooLong(usize),

    /// The card returned a non-success status word not handled internally
    #[error("card returned error status: {0}")]
    Status(StatusWord),

    /// A non-final command-chain fragment was not acknowledged with 0x9000
    #[error("command chaining aborted by card: {0}")]
    Chaining(StatusWord),

    /// The channel is terminated and rejects all further operations
    #[error("channel is terminated")]
    ChannelTerminated,

    /// A secure-messaging stage rejected the exchange
    #[error("secure channel error: {0}")]
    SecureChannel(&'static str),

    /// The operation is not supported by the card or the local stack
    #[error("unsupported operation: {0}")]
    UnsupportedOperation(&'static str),

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

    /// Create a new transport error from any displayable source
    pub fn transport<E: std::fmt::Display>(source: E) -> Self {
        Self::Transport(source.to_string())
    }

    /// The status word carried by this error, if any
    pub const fn status(&self) -> Option<StatusWord> {
        match self {
            Self::Status(sw) | Self::Chaining(sw) => Some(*sw),
            _ => None,
        }
    }

    /// Whether this error leaves the channel unusable
    pub const fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Transport(_) | Self::Cancelled | Self::Chaining(_) | Self::SecureChannel(_)
        )
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
