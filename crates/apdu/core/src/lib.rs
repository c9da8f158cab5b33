//! Core traits and types for APDU (Application Protocol Data Unit) operations
//!
//! This crate provides the foundational types and traits for talking to smart
//! card applications according to ISO/IEC 7816-4:
//!
//! - Creating, serializing and parsing APDU commands and responses, in both
//!   short and extended encodings
//! - Command chaining for oversized requests and `GET RESPONSE` driven
//!   response chaining for oversized replies
//! - A [`CardTransport`] contract that device transports implement
//! - A [`CommandProcessor`] pipeline for secure-messaging stages installed on
//!   top of the raw transport
//! - A [`CardExecutor`] that ties transport, framing and processors together
//!   behind a single transceive operation with a channel lifecycle
//!
//! Protocol-specific functionality (GlobalPlatform secure channels, Security
//! Domain management) lives in higher-level crates built on these types.

#![forbid(unsafe_code)]
#![warn(missing_docs, rustdoc::missing_crate_level_docs)]

// Re-export bytes for convenience
pub use bytes::{Bytes, BytesMut};

// Main modules
pub mod card;
pub mod command;
pub mod error;
pub mod executor;
pub mod framer;
pub mod processor;
pub mod response;
pub mod transport;

pub use card::{CardExecutor, ChannelState};
pub use command::{ApduCommand, Command};
pub use error::{Error, ResultExt};
pub use executor::Executor;
pub use framer::Framer;
pub use processor::pipeline::ProcessorPipeline;
pub use processor::{CommandProcessor, SecurityLevel};
pub use response::status::StatusWord;
pub use response::Response;
pub use transport::{CardTransport, MockTransport};

/// Prelude module containing commonly used traits and types
pub mod prelude {
    // Core types
    pub use crate::{Bytes, BytesMut, Error, ResultExt};

    // Command related
    pub use crate::command::{ApduCommand, Command};

    // Response related
    pub use crate::response::status::{common as status, StatusWord};
    pub use crate::response::Response;

    // Transport layer
    pub use crate::transport::CardTransport;

    // Processor layer
    pub use crate::processor::pipeline::ProcessorPipeline;
    pub use crate::processor::{CommandProcessor, SecurityLevel};

    // Executor layer
    pub use crate::card::{CardExecutor, ChannelState};
    pub use crate::executor::Executor;
}
