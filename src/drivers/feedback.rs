// GestureGate - Device Feedback Commander
//
// Maps each feedback decision to exactly one command line for the device
// (LED on a match, buzzer on a mismatch). Best effort: a closed link or a
// failed write drops the command.

use crate::config::DeviceConfig;
use crate::drivers::serial::CommandSink;
use crate::error::TransportError;
use crate::events::FeedbackDecision;

pub struct DeviceCommander<S: CommandSink> {
    sink: S,
    matched_command: String,
    mismatched_command: String,
    sent: u64,
    dropped: u64,
}

impl<S: CommandSink> DeviceCommander<S> {
    pub fn new(sink: S, config: &DeviceConfig) -> Self {
        Self {
            sink,
            matched_command: config.matched_command.clone(),
            mismatched_command: config.mismatched_command.clone(),
            sent: 0,
            dropped: 0,
        }
    }

    pub fn command_for(&self, decision: &FeedbackDecision) -> &str {
        match decision {
            FeedbackDecision::Matched { .. } => &self.matched_command,
            FeedbackDecision::Mismatched { .. } => &self.mismatched_command,
        }
    }

    /// Send the command for `decision`. Never retries.
    pub fn send(&mut self, decision: &FeedbackDecision) -> Result<(), TransportError> {
        let command = self.command_for(decision).to_string();

        if !self.sink.is_open() {
            self.dropped += 1;
            log::warn!("Transport unavailable, dropped command {:?}", command);
            return Err(TransportError::Unavailable);
        }

        match self.sink.write_line(&command) {
            Ok(()) => {
                self.sent += 1;
                log::debug!("Sent {:?}", command);
                Ok(())
            }
            Err(e) => {
                self.dropped += 1;
                log::warn!("Failed to send {:?}: {}", command, e);
                Err(e)
            }
        }
    }

    pub fn sent(&self) -> u64 {
        self.sent
    }

    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }
}
