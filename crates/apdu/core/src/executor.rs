//! Executor trait for APDU command execution
//!
//! An executor owns a channel to one card application: it transmits logical
//! commands, tracks the channel lifecycle and hosts the secure-messaging
//! pipeline. [`CardExecutor`](crate::card::CardExecutor) is the standard
//! implementation.

use std::fmt;

use crate::card::ChannelState;
use crate::command::{ApduCommand, Command};
use crate::error::Error;
use crate::processor::{CommandProcessor, SecurityLevel};
use crate::response::Response;

/// Trait for APDU command execution over one channel
pub trait Executor: Send + fmt::Debug {
    /// Transmit a logical command and return the reassembled response.
    ///
    /// The command passes through the installed secure-messaging stages and
    /// the framer; the response comes back through the same stages in
    /// reverse. Fails fast with [`Error::ChannelTerminated`] once the channel
    /// is terminated.
    fn transmit(&mut self, command: &Command) -> Result<Response, Error>;

    /// Current lifecycle state of the channel
    fn channel_state(&self) -> ChannelState;

    /// Record that an application was selected on this channel.
    ///
    /// Drops any installed secure-messaging stages: selection resets the
    /// card-side session.
    fn notify_selected(&mut self);

    /// Enter the authenticating state, dropping any previous session
    fn begin_authentication(&mut self) -> Result<(), Error>;

    /// Install a secure-messaging stage and mark the channel open
    fn install_processor(&mut self, stage: Box<dyn CommandProcessor>);

    /// Remove all secure-messaging stages, reverting an open channel to the
    /// selected state
    fn remove_processors(&mut self);

    /// Terminate the channel; all further operations are rejected
    fn terminate(&mut self);

    /// Security properties currently provided by the channel
    fn security_level(&self) -> SecurityLevel;

    /// Whether the underlying transport carries extended-length APDUs
    fn supports_extended_length(&self) -> bool;

    /// Execute a typed command and parse its response
    fn execute<C>(&mut self, command: &C) -> Result<C::Success, C::Error>
    where
        C: ApduCommand,
        Self: Sized,
    {
        let response = self
            .transmit(&command.to_command())
            .map_err(C::convert_error)?;
        C::parse_response(response)
    }
}
