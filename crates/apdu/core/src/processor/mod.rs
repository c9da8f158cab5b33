//! Command processors for APDU traffic
//!
//! A processor is a secure-messaging stage installed between the caller and
//! the framer: it transforms outgoing commands (MAC, encryption) and incoming
//! responses (verification, decryption). Stages are owned by the executor and
//! applied as a linear pipeline.

pub mod pipeline;

use std::fmt;

use crate::command::Command;
use crate::error::Error;
use crate::response::Response;

/// Security properties currently provided by a channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SecurityLevel {
    /// Mutual authentication has completed
    pub authenticated: bool,
    /// Commands and responses are integrity protected (MAC)
    pub integrity: bool,
    /// Commands and responses are encrypted
    pub confidentiality: bool,
}

impl SecurityLevel {
    /// No security properties
    pub const fn none() -> Self {
        Self {
            authenticated: false,
            integrity: false,
            confidentiality: false,
        }
    }

    /// Authenticated with MAC protection
    pub const fn auth_mac() -> Self {
        Self {
            authenticated: true,
            integrity: true,
            confidentiality: false,
        }
    }

    /// Authenticated with MAC protection and encryption
    pub const fn auth_enc() -> Self {
        Self {
            authenticated: true,
            integrity: true,
            confidentiality: true,
        }
    }

    /// Whether this level provides everything `other` requires
    pub const fn satisfies(&self, other: &Self) -> bool {
        (self.authenticated || !other.authenticated)
            && (self.integrity || !other.integrity)
            && (self.confidentiality || !other.confidentiality)
    }
}

/// Trait for secure-messaging stages
pub trait CommandProcessor: Send + fmt::Debug {
    /// Transform an outgoing command before it is framed and transmitted
    fn protect_command(&mut self, command: &Command) -> Result<Command, Error>;

    /// Transform an incoming response after frame reassembly.
    ///
    /// A verification failure here is fatal for the channel; the executor
    /// terminates it and the error propagates to the caller.
    fn process_response(&mut self, response: Response) -> Result<Response, Error>;

    /// Security properties this stage provides
    fn security_level(&self) -> SecurityLevel {
        SecurityLevel::none()
    }
}

/// Processor that passes commands and responses through unchanged
#[derive(Debug, Default)]
pub struct IdentityProcessor;

impl CommandProcessor for IdentityProcessor {
    fn protect_command(&mut self, command: &Command) -> Result<Command, Error> {
        Ok(command.clone())
    }

    fn process_response(&mut self, response: Response) -> Result<Response, Error> {
        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_security_level_satisfies() {
        assert!(SecurityLevel::auth_enc().satisfies(&SecurityLevel::auth_mac()));
        assert!(SecurityLevel::auth_enc().satisfies(&SecurityLevel::none()));
        assert!(!SecurityLevel::auth_mac().satisfies(&SecurityLevel::auth_enc()));
        assert!(!SecurityLevel::none().satisfies(&SecurityLevel::auth_mac()));
    }

    #[test]
    fn test_identity_processor() {
        let mut processor = IdentityProcessor;
        let command = Command::new(0x00, 0xA4, 0x04, 0x00);
        assert_eq!(processor.protect_command(&command).unwrap(), command);
        let response = Response::success(None);
        assert_eq!(
            processor.process_response(response.clone()).unwrap(),
            response
        );
    }
}
