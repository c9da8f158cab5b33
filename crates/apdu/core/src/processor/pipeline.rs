//! Linear pipeline of command processors
//!
//! Outgoing commands pass through the stages in installation order; incoming
//! responses pass through them in reverse.

use std::fmt;

use super::{CommandProcessor, SecurityLevel};
use crate::command::Command;
use crate::error::Error;
use crate::response::Response;

/// Ordered pipeline of secure-messaging stages
#[derive(Default)]
pub struct ProcessorPipeline {
    stages: Vec<Box<dyn CommandProcessor>>,
}

impl fmt::Debug for ProcessorPipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcessorPipeline")
            .field("stage_count", &self.stages.len())
            .finish()
    }
}

impl ProcessorPipeline {
    /// Create a new empty pipeline
    pub fn new() -> Self {
        Self { stages: Vec::new() }
    }

    /// Add a stage to the end of the pipeline
    pub fn add_stage(&mut self, stage: Box<dyn CommandProcessor>) -> &mut Self {
        self.stages.push(stage);
        self
    }

    /// Remove all stages
    pub fn clear(&mut self) {
        self.stages.clear();
    }

    /// Whether the pipeline has no stages
    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Apply every stage to an outgoing command, in order
    pub fn protect_command(&mut self, command: &Command) -> Result<Command, Error> {
        let mut current = command.clone();
        for stage in &mut self.stages {
            current = stage.protect_command(&current)?;
        }
        Ok(current)
    }

    /// Apply every stage to an incoming response, in reverse order
    pub fn process_response(&mut self, response: Response) -> Result<Response, Error> {
        let mut current = response;
        for stage in self.stages.iter_mut().rev() {
            current = stage.process_response(current)?;
        }
        Ok(current)
    }

    /// The combined security level provided by all stages
    pub fn security_level(&self) -> SecurityLevel {
        let mut level = SecurityLevel::none();
        for stage in &self.stages {
            let stage_level = stage.security_level();
            level.authenticated |= stage_level.authenticated;
            level.integrity |= stage_level.integrity;
            level.confidentiality |= stage_level.confidentiality;
        }
        level
    }
}
