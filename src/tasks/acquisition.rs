// GestureGate - Acquisition Loop
//
// Single-threaded event loop over three sources: transport events, the
// window ticker and the shutdown signal. Line handling only parses and
// appends, so it is never held up by a classification in progress.

use std::time::Instant;

use crossbeam_channel::{never, select, Receiver};

use crate::events::TransportEvent;
use crate::ingest::SampleIngestor;
use crate::scheduler::{TickOutcome, WindowScheduler};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AcquisitionStats {
    pub accepted: u64,
    pub rejected: u64,
    pub acks: u64,
    pub windows: u64,
    pub skipped: u64,
    pub transport_errors: u64,
}

pub struct Acquisition {
    ingestor: SampleIngestor,
    scheduler: WindowScheduler,
    ack_prefix: String,
    acks: u64,
    windows: u64,
    transport_errors: u64,
}

impl Acquisition {
    pub fn new(ingestor: SampleIngestor, scheduler: WindowScheduler, ack_prefix: &str) -> Self {
        Self {
            ingestor,
            scheduler,
            ack_prefix: ack_prefix.to_string(),
            acks: 0,
            windows: 0,
            transport_errors: 0,
        }
    }

    pub fn on_transport_event(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::Opened(port) => log::info!("Serial link open on {}", port),
            TransportEvent::Line(line) => {
                if !self.ack_prefix.is_empty() && line.starts_with(&self.ack_prefix) {
                    self.acks += 1;
                    log::debug!("Device ack: {}", line);
                } else {
                    // Rejections are logged by the ingestor.
                    let _ = self.ingestor.ingest(&line);
                }
            }
            TransportEvent::Error(reason) => {
                self.transport_errors += 1;
                log::error!("Transport error: {}", reason);
            }
            TransportEvent::Closed => log::warn!("Serial link closed by device"),
        }
    }

    pub fn on_tick(&mut self) -> TickOutcome {
        let outcome = self.scheduler.on_tick();
        if matches!(outcome, TickOutcome::Dispatched { .. }) {
            self.windows += 1;
        }
        outcome
    }

    pub fn stats(&self) -> AcquisitionStats {
        AcquisitionStats {
            accepted: self.ingestor.accepted(),
            rejected: self.ingestor.rejected(),
            acks: self.acks,
            windows: self.windows,
            skipped: self.scheduler.skipped(),
            transport_errors: self.transport_errors,
        }
    }

    /// Run until `shutdown` fires (or its sender is dropped).
    pub fn run(
        mut self,
        events: Receiver<TransportEvent>,
        ticker: Receiver<Instant>,
        shutdown: Receiver<()>,
    ) -> AcquisitionStats {
        log::info!("Acquisition task started");

        let mut events = events;
        loop {
            select! {
                recv(events) -> msg => match msg {
                    Ok(event) => self.on_transport_event(event),
                    Err(_) => {
                        log::warn!("Transport event channel closed");
                        events = never();
                    }
                },
                recv(ticker) -> _ => {
                    self.on_tick();
                }
                recv(shutdown) -> _ => {
                    log::info!("Shutdown requested");
                    break;
                }
            }
        }

        self.stats()
    }
}
