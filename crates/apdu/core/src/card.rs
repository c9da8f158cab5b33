//! Card executor implementation
//!
//! This module provides [`CardExecutor`], which combines a card transport
//! with the framer and the secure-messaging pipeline and enforces the
//! channel lifecycle.

use std::fmt;

use bytes::Bytes;
use tracing::{debug, trace};

use crate::command::Command;
use crate::error::Error;
use crate::executor::Executor;
use crate::framer::Framer;
use crate::processor::pipeline::ProcessorPipeline;
use crate::processor::{CommandProcessor, SecurityLevel};
use crate::response::Response;
use crate::transport::CardTransport;

/// Lifecycle state of a channel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    /// No application selected yet
    Fresh,
    /// An application has been selected
    Selected,
    /// A secure-channel handshake is in progress
    Authenticating,
    /// The channel is open (with or without secure messaging)
    Open,
    /// The channel is dead; every operation is rejected
    Terminated,
}

/// Card executor with a transport, framer and processor pipeline
pub struct CardExecutor<T: CardTransport> {
    transport: T,
    framer: Framer,
    pipeline: ProcessorPipeline,
    state: ChannelState,
    last_response: Option<Bytes>,
}

impl<T: CardTransport> fmt::Debug for CardExecutor<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CardExecutor")
            .field("transport", &self.transport)
            .field("pipeline", &self.pipeline)
            .field("state", &self.state)
            .finish()
    }
}

impl<T: CardTransport> CardExecutor<T> {
    /// Create a new executor over the given transport
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            framer: Framer::new(),
            pipeline: ProcessorPipeline::new(),
            state: ChannelState::Fresh,
            last_response: None,
        }
    }

    /// Get a reference to the underlying transport
    pub const fn transport(&self) -> &T {
        &self.transport
    }

    /// Get a mutable reference to the underlying transport
    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// The raw bytes of the last reassembled response, if any
    pub const fn last_response(&self) -> Option<&Bytes> {
        self.last_response.as_ref()
    }

    /// Consume the executor and return the transport
    pub fn into_transport(self) -> T {
        self.transport
    }
}

impl<T: CardTransport> Executor for CardExecutor<T> {
    fn transmit(&mut self, command: &Command) -> Result<Response, Error> {
        if self.state == ChannelState::Terminated {
            return Err(Error::ChannelTerminated);
        }

        let protected = match self.pipeline.protect_command(command) {
            Ok(protected) => protected,
            Err(err) => {
                debug!(error = %err, "secure-messaging stage rejected command");
                self.terminate();
                return Err(err);
            }
        };

        let response = match self.framer.transmit(&mut self.transport, &protected) {
            Ok(response) => response,
            Err(err) => {
                if err.is_fatal() {
                    debug!(error = %err, "terminating channel after transmit failure");
                    self.terminate();
                }
                return Err(err);
            }
        };

        match self.pipeline.process_response(response) {
            Ok(response) => {
                self.last_response = Some(response.clone().into());
                Ok(response)
            }
            Err(err) => {
                debug!(error = %err, "terminating channel after response verification failure");
                self.terminate();
                Err(err)
            }
        }
    }

    fn channel_state(&self) -> ChannelState {
        self.state
    }

    fn notify_selected(&mut self) {
        trace!(previous = ?self.state, "application selected");
        self.pipeline.clear();
        if self.state != ChannelState::Terminated {
            self.state = ChannelState::Selected;
        }
    }

    fn begin_authentication(&mut self) -> Result<(), Error> {
        if self.state == ChannelState::Terminated {
            return Err(Error::ChannelTerminated);
        }
        self.pipeline.clear();
        self.state = ChannelState::Authenticating;
        Ok(())
    }

    fn install_processor(&mut self, stage: Box<dyn CommandProcessor>) {
        self.pipeline.add_stage(stage);
        self.state = ChannelState::Open;
        debug!("secure-messaging stage installed, channel open");
    }

    fn remove_processors(&mut self) {
        self.pipeline.clear();
        if matches!(self.state, ChannelState::Open | ChannelState::Authenticating) {
            self.state = ChannelState::Selected;
        }
    }

    fn terminate(&mut self) {
        self.pipeline.clear();
        self.state = ChannelState::Terminated;
    }

    fn security_level(&self) -> SecurityLevel {
        self.pipeline.security_level()
    }

    fn supports_extended_length(&self) -> bool {
        self.transport.supports_extended_length()
    }
}
