//! Card transport abstraction
//!
//! A transport delivers raw APDU bytes to a card application and returns the
//! raw reply including the status word. Each call is independent; the core
//! assumes no reliability beyond per-call semantics.

use std::collections::VecDeque;
use std::fmt;

use bytes::Bytes;

use crate::error::Error;

/// Trait for card transports
pub trait CardTransport: Send + fmt::Debug {
    /// Transmit a raw command to the card and return the raw response,
    /// including the trailing status word.
    fn transmit_raw(&mut self, command: &[u8]) -> Result<Bytes, Error>;

    /// Whether the transport can carry extended-length APDUs
    fn supports_extended_length(&self) -> bool {
        false
    }

    /// Reset the transport
    fn reset(&mut self) -> Result<(), Error>;
}

impl<T: CardTransport + ?Sized> CardTransport for &mut T {
    fn transmit_raw(&mut self, command: &[u8]) -> Result<Bytes, Error> {
        (**self).transmit_raw(command)
    }

    fn supports_extended_length(&self) -> bool {
        (**self).supports_extended_length()
    }

    fn reset(&mut self) -> Result<(), Error> {
        (**self).reset()
    }
}

/// In-memory transport replaying canned responses, for tests and examples.
///
/// Responses are returned in FIFO order; every transmitted command is
/// recorded and can be inspected afterwards.
#[derive(Default)]
pub struct MockTransport {
    responses: VecDeque<Result<Bytes, Error>>,
    commands: Vec<Bytes>,
    extended: bool,
}

impl fmt::Debug for MockTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MockTransport")
            .field("queued_responses", &self.responses.len())
            .field("commands_seen", &self.commands.len())
            .field("extended", &self.extended)
            .finish()
    }
}

impl MockTransport {
    /// Create an empty mock transport
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a mock transport with a single canned response
    pub fn with_response(response: impl Into<Bytes>) -> Self {
        let mut transport = Self::new();
        transport.push_response(response);
        transport
    }

    /// Enable extended-length APDU support
    pub fn with_extended_length(mut self) -> Self {
        self.extended = true;
        self
    }

    /// Queue another canned response
    pub fn push_response(&mut self, response: impl Into<Bytes>) -> &mut Self {
        self.responses.push_back(Ok(response.into()));
        self
    }

    /// Queue an error to be returned instead of a response
    pub fn push_error(&mut self, error: Error) -> &mut Self {
        self.responses.push_back(Err(error));
        self
    }

    /// Commands transmitted so far, in order
    pub fn commands(&self) -> &[Bytes] {
        &self.commands
    }

    /// Number of responses still queued
    pub fn remaining_responses(&self) -> usize {
        self.responses.len()
    }
}

impl CardTransport for MockTransport {
    fn transmit_raw(&mut self, command: &[u8]) -> Result<Bytes, Error> {
        self.commands.push(Bytes::copy_from_slice(command));
        self.responses
            .pop_front()
            .unwrap_or_else(|| Err(Error::Transport("no more canned responses".into())))
    }

    fn supports_extended_length(&self) -> bool {
        self.extended
    }

    fn reset(&mut self) -> Result<(), Error> {
        Ok(())
    }
}
