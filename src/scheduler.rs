// GestureGate - Window Scheduler
//
// On every tick the scheduler swaps the accumulation buffer for an empty one
// and hands the drained samples to the classification worker. Only one window
// may be in flight: the slot is claimed here and released by the worker when
// it drops the permit.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crossbeam_channel::{Sender, TrySendError};

use crate::events::Window;
use crate::ingest::SampleBuffer;

/// Single-slot guard for the in-flight window.
#[derive(Debug, Clone, Default)]
pub struct InFlightSlot {
    busy: Arc<AtomicBool>,
}

impl InFlightSlot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    /// Claim the slot. Returns `None` if a window is already in flight.
    pub fn try_claim(&self) -> Option<SlotPermit> {
        self.busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| SlotPermit {
                busy: Arc::clone(&self.busy),
            })
    }
}

/// Held while a window is being classified. Dropping it frees the slot, on
/// every path including unwinding.
#[derive(Debug)]
pub struct SlotPermit {
    busy: Arc<AtomicBool>,
}

impl Drop for SlotPermit {
    fn drop(&mut self) {
        self.busy.store(false, Ordering::Release);
    }
}

/// A window plus the permit that keeps the slot claimed.
#[derive(Debug)]
pub struct Dispatch {
    pub window: Window,
    pub permit: SlotPermit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Buffer was empty; nothing was classified.
    NoData,
    /// Previous window still in flight; samples stay for the next tick.
    Busy,
    /// A window with this many samples was handed to the worker.
    Dispatched { seq: u64, samples: usize },
    /// The worker has gone away; samples were kept.
    WorkerGone,
}

pub struct WindowScheduler {
    buffer: SampleBuffer,
    slot: InFlightSlot,
    window_tx: Sender<Dispatch>,
    next_seq: u64,
    skipped: u64,
}

impl WindowScheduler {
    pub fn new(buffer: SampleBuffer, slot: InFlightSlot, window_tx: Sender<Dispatch>) -> Self {
        Self {
            buffer,
            slot,
            window_tx,
            next_seq: 1,
            skipped: 0,
        }
    }

    pub fn on_tick(&mut self) -> TickOutcome {
        let pending = self.buffer.len();
        if pending == 0 {
            log::info!("No data received in this window");
            return TickOutcome::NoData;
        }

        let Some(permit) = self.slot.try_claim() else {
            self.skipped += 1;
            log::warn!(
                "Window still in flight; skipping tick ({} samples carried over)",
                pending
            );
            return TickOutcome::Busy;
        };

        // Only this scheduler drains, so the buffer can only have grown.
        let samples = self.buffer.take();

        let seq = self.next_seq;
        let count = samples.len();
        let dispatch = Dispatch {
            window: Window::new(seq, samples),
            permit,
        };

        match self.window_tx.try_send(dispatch) {
            Ok(()) => {
                self.next_seq += 1;
                log::debug!("Window #{} dispatched ({} samples)", seq, count);
                TickOutcome::Dispatched {
                    seq,
                    samples: count,
                }
            }
            Err(TrySendError::Full(d)) => {
                let Dispatch { window, permit } = d;
                drop(permit);
                self.buffer.restore(window.samples);
                self.skipped += 1;
                log::warn!("Window queue full; skipping tick");
                TickOutcome::Busy
            }
            Err(TrySendError::Disconnected(d)) => {
                let Dispatch { window, permit } = d;
                drop(permit);
                self.buffer.restore(window.samples);
                log::error!("Classification worker is gone; window #{} kept", seq);
                TickOutcome::WorkerGone
            }
        }
    }

    pub fn skipped(&self) -> u64 {
        self.skipped
    }
}
