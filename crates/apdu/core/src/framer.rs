//! APDU framing: encoding selection, command chaining, response chaining
//!
//! The framer turns one logical command into however many wire exchanges the
//! transport needs: it picks the short or extended encoding, splits oversized
//! bodies into chained fragments, and drives the `GET RESPONSE` loop that
//! reassembles oversized replies.

use bytes::BytesMut;
use tracing::{trace, warn};

use crate::command::{Command, SHORT_APDU_MAX_DATA};
use crate::error::Error;
use crate::response::Response;
use crate::transport::CardTransport;

/// CLA bit marking a non-final fragment of a chained command
pub const CLA_COMMAND_CHAINING: u8 = 0x10;

/// Instruction used to fetch buffered response data
pub const INS_GET_RESPONSE: u8 = 0xC0;

/// Stateless framing engine for a transport
#[derive(Debug, Default, Clone, Copy)]
pub struct Framer;

impl Framer {
    /// Create a new framer
    pub const fn new() -> Self {
        Self
    }

    /// Transmit a logical command, transparently applying command and
    /// response chaining, and return the reassembled response.
    pub fn transmit(
        &self,
        transport: &mut dyn CardTransport,
        command: &Command,
    ) -> Result<Response, Error> {
        let extended = transport.supports_extended_length();

        if command.data_len() > SHORT_APDU_MAX_DATA && !extended {
            return self.transmit_chained(transport, command);
        }

        let encoded = if extended && command.requires_extended() {
            command.serialize(true)?
        } else {
            command.serialize(false)?
        };
        self.exchange(transport, &encoded)
    }

    /// Split an oversized command into short fragments of at most 255 data
    /// bytes. Every fragment except the last carries the chaining CLA bit and
    /// must be acknowledged with 0x9000; the real response belongs to the
    /// final fragment.
    fn transmit_chained(
        &self,
        transport: &mut dyn CardTransport,
        command: &Command,
    ) -> Result<Response, Error> {
        let data = command.data.as_deref().unwrap_or_default();
        let mut chunks = data.chunks(SHORT_APDU_MAX_DATA).peekable();

        trace!(
            ins = command.ins,
            total = data.len(),
            "splitting command into chained fragments"
        );

        while let Some(chunk) = chunks.next() {
            let is_last = chunks.peek().is_none();
            let mut fragment = Command::new(command.cla, command.ins, command.p1, command.p2)
                .with_data(chunk.to_vec());

            if is_last {
                fragment.le = command.le;
                return self.exchange(transport, &fragment.serialize(false)?);
            }

            fragment.cla |= CLA_COMMAND_CHAINING;
            let raw = transport.transmit_raw(&fragment.serialize(false)?)?;
            let ack = Response::from_bytes(&raw)?;
            if !ack.is_success() {
                warn!(status = %ack.status(), "card aborted command chain");
                return Err(Error::Chaining(ack.status()));
            }
        }

        // Chaining is only entered with a non-empty body
        Err(Error::Other("empty command chain"))
    }

    /// Transmit encoded bytes and reassemble a chained response: while the
    /// status is 0x61xx, issue GET RESPONSE for the remaining bytes and
    /// append. The final status word is reported unchanged.
    fn exchange(
        &self,
        transport: &mut dyn CardTransport,
        encoded: &[u8],
    ) -> Result<Response, Error> {
        trace!(command = %hex::encode(encoded), "transmitting");
        let raw = transport.transmit_raw(encoded)?;
        let mut response = Response::from_bytes(&raw)?;
        trace!(status = %response.status(), len = response.data().len(), "received");

        if !response.status().has_more_data() {
            return Ok(response);
        }

        let mut accumulated = BytesMut::from(response.data());
        while response.status().has_more_data() {
            let le = response.status().remaining_bytes() as u16;
            let get_response = Command::new(0x00, INS_GET_RESPONSE, 0x00, 0x00).with_le(le);
            let raw = transport.transmit_raw(&get_response.serialize(false)?)?;
            response = Response::from_bytes(&raw)?;
            accumulated.extend_from_slice(response.data());
            trace!(
                status = %response.status(),
                accumulated = accumulated.len(),
                "fetched response fragment"
            );
        }

        let payload = if accumulated.is_empty() {
            None
        } else {
            Some(accumulated.freeze())
        };
        Ok(Response::new(payload, response.status()))
    }
}
