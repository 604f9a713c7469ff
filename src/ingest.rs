// GestureGate - Sample Ingestor
//
// Turns transport lines into samples and appends them to the accumulation
// buffer shared with the window scheduler. A malformed line is rejected
// whole; nothing is ever partially appended.

use std::sync::{Arc, Mutex, MutexGuard};

use crate::config::AXES_PER_SAMPLE;
use crate::error::ParseError;
use crate::events::Sample;

/// Accumulation buffer shared between one writer (the ingestor) and one
/// drainer (the scheduler). `take` swaps the contents out under the lock, so
/// a sample is either in the drained batch or still in the buffer, never both.
#[derive(Debug, Clone, Default)]
pub struct SampleBuffer {
    inner: Arc<Mutex<Vec<Sample>>>,
}

impl SampleBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Sample>> {
        // A panicking holder cannot leave the Vec half-written, so keep going.
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn push(&self, sample: Sample) {
        self.lock().push(sample);
    }

    /// Take everything accumulated so far, leaving an empty buffer behind.
    pub fn take(&self) -> Vec<Sample> {
        std::mem::take(&mut *self.lock())
    }

    /// Put a drained batch back in front of anything appended since.
    pub fn restore(&self, mut samples: Vec<Sample>) {
        let mut buf = self.lock();
        samples.append(&mut buf);
        *buf = samples;
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

/// Parse one `ax,ay,az` line.
pub fn parse_sample(line: &str) -> Result<Sample, ParseError> {
    let trimmed = line.trim();
    let fields: Vec<&str> = if trimmed.is_empty() {
        Vec::new()
    } else {
        trimmed.split(',').map(str::trim).collect()
    };

    if fields.len() != AXES_PER_SAMPLE {
        return Err(ParseError::FieldCount {
            line: line.to_string(),
            found: fields.len(),
        });
    }

    let mut axes = [0.0f32; AXES_PER_SAMPLE];
    for (slot, field) in axes.iter_mut().zip(&fields) {
        *slot = match field.parse::<f32>() {
            Ok(v) if v.is_finite() => v,
            _ => {
                return Err(ParseError::NotANumber {
                    line: line.to_string(),
                    field: field.to_string(),
                })
            }
        };
    }

    Ok(Sample::new(axes[0], axes[1], axes[2]))
}

pub struct SampleIngestor {
    buffer: SampleBuffer,
    accepted: u64,
    rejected: u64,
}

impl SampleIngestor {
    pub fn new(buffer: SampleBuffer) -> Self {
        Self {
            buffer,
            accepted: 0,
            rejected: 0,
        }
    }

    /// Parse `line` and append the sample. Rejected lines are logged with
    /// their raw content and returned to the caller; they never abort the
    /// stream.
    pub fn ingest(&mut self, line: &str) -> Result<Sample, ParseError> {
        match parse_sample(line) {
            Ok(sample) => {
                self.buffer.push(sample);
                self.accepted += 1;
                Ok(sample)
            }
            Err(e) => {
                self.rejected += 1;
                log::warn!("Dropped line: {}", e);
                Err(e)
            }
        }
    }

    pub fn accepted(&self) -> u64 {
        self.accepted
    }

    pub fn rejected(&self) -> u64 {
        self.rejected
    }

    pub fn buffer(&self) -> &SampleBuffer {
        &self.buffer
    }
}
