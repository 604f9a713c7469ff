// GestureGate - Classification Worker
//
// Receives one window at a time from the scheduler, classifies it, feeds the
// top label to the sequence validator and sends the resulting command to the
// device. The in-flight permit travels with the window and is released when
// processing is over, whatever the outcome.

use crossbeam_channel::Receiver;

use crate::classify::ClassificationAdapter;
use crate::drivers::feedback::DeviceCommander;
use crate::drivers::serial::CommandSink;
use crate::error::{ClassifierError, TransportError};
use crate::events::{FeedbackDecision, Window};
use crate::scheduler::Dispatch;
use crate::sequence::SequenceValidator;

/// What happened to one window.
#[derive(Debug)]
pub enum WindowOutcome {
    /// Classification failed; the window was dropped and the validator left
    /// untouched.
    Failed { seq: u64, error: ClassifierError },
    /// A decision was made. `delivery` reports whether the command reached
    /// the device; the decision stands either way.
    Decided {
        seq: u64,
        decision: FeedbackDecision,
        delivery: Result<(), TransportError>,
    },
}

pub struct FeedbackPipeline<S: CommandSink> {
    adapter: ClassificationAdapter,
    validator: SequenceValidator,
    commander: DeviceCommander<S>,
    failures: u64,
}

impl<S: CommandSink> FeedbackPipeline<S> {
    pub fn new(
        adapter: ClassificationAdapter,
        validator: SequenceValidator,
        commander: DeviceCommander<S>,
    ) -> Self {
        Self {
            adapter,
            validator,
            commander,
            failures: 0,
        }
    }

    pub fn process(&mut self, window: &Window) -> WindowOutcome {
        let seq = window.seq;

        let result = match self.adapter.classify(window) {
            Ok(result) => result,
            Err(error) => {
                self.failures += 1;
                log::error!(
                    "Window #{} dropped: {} (code {})",
                    seq,
                    error,
                    error.code()
                );
                return WindowOutcome::Failed { seq, error };
            }
        };

        match result.top() {
            Some((label, score)) => log::info!(
                "Window #{} ({} samples): {} ({:.1}%)",
                seq,
                window.len(),
                label,
                score * 100.0
            ),
            None => log::info!("Window #{} ({} samples): no candidates", seq, window.len()),
        }

        let decision = self.validator.validate(&result);
        if let FeedbackDecision::Mismatched { expected, actual } = &decision {
            log::info!("Expected {:?}, got {:?}", expected, actual);
        }

        let delivery = self.commander.send(&decision);
        WindowOutcome::Decided {
            seq,
            decision,
            delivery,
        }
    }

    pub fn validator(&self) -> &SequenceValidator {
        &self.validator
    }

    pub fn commander(&self) -> &DeviceCommander<S> {
        &self.commander
    }

    pub fn failures(&self) -> u64 {
        self.failures
    }
}

/// Worker loop. Returns the pipeline once the scheduler side hangs up.
pub fn ai_task<S: CommandSink>(
    windows: Receiver<Dispatch>,
    mut pipeline: FeedbackPipeline<S>,
) -> FeedbackPipeline<S> {
    log::info!("AI task started");

    for Dispatch { window, permit } in windows.iter() {
        pipeline.process(&window);
        drop(permit);
    }

    log::warn!("Window channel closed - exiting AI task");
    pipeline
}
