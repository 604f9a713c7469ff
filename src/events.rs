// GestureGate - Data Types & Events

use crate::config::AXES_PER_SAMPLE;

// ---------------------------------------------------------------------------
// Sensor Data (3-axis accelerometer reading from the device)
// ---------------------------------------------------------------------------
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Sample {
    pub ax: f32,
    pub ay: f32,
    pub az: f32,
}

impl Sample {
    pub fn new(ax: f32, ay: f32, az: f32) -> Self {
        Self { ax, ay, az }
    }

    pub fn axes(&self) -> [f32; AXES_PER_SAMPLE] {
        [self.ax, self.ay, self.az]
    }
}

// ---------------------------------------------------------------------------
// Window: samples collected between two scheduler ticks
// ---------------------------------------------------------------------------
#[derive(Debug, Clone, PartialEq)]
pub struct Window {
    /// Monotonic window number, starting at 1.
    pub seq: u64,
    pub samples: Vec<Sample>,
}

impl Window {
    pub fn new(seq: u64, samples: Vec<Sample>) -> Self {
        Self { seq, samples }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Interleaved `[ax0, ay0, az0, ax1, ...]`, the layout the classifier
    /// expects.
    pub fn flatten(&self) -> Vec<f32> {
        let mut features = Vec::with_capacity(self.samples.len() * AXES_PER_SAMPLE);
        for s in &self.samples {
            features.extend_from_slice(&s.axes());
        }
        features
    }
}

// ---------------------------------------------------------------------------
// Transport Events: sent from the reader task to the acquisition loop
// ---------------------------------------------------------------------------
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// Link opened (or re-opened) on the given port.
    Opened(String),
    /// One decoded line, line terminator stripped.
    Line(String),
    /// Open failure or mid-stream error. The link is closed after this.
    Error(String),
    /// Reader reached end of stream.
    Closed,
}

// ---------------------------------------------------------------------------
// Feedback Decisions: produced by the sequence validator
// ---------------------------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedbackDecision {
    /// The top label matched the expected one and the cursor advanced.
    /// `completed` is set when the advance wrapped the cursor back to 0.
    Matched { label: String, completed: bool },
    Mismatched { expected: String, actual: String },
}

impl FeedbackDecision {
    pub fn is_match(&self) -> bool {
        matches!(self, Self::Matched { .. })
    }
}
