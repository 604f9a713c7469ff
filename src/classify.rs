// GestureGate - Classification Adapter
//
// Flattens a window, runs it through the classifier and normalises the
// output into one `ClassificationResult`. The output shape is chosen from
// the model properties read at start-up, never guessed from which fields a
// response happens to carry.

use crate::ei::{BoundingBox, Classifier, ModelProperties, RawOutput};
use crate::error::ClassifierError;
use crate::events::Window;

/// Which normalised shape the adapter produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputShape {
    PlainLabel,
    SpatialDetection,
    VisualAnomaly,
}

impl OutputShape {
    pub fn for_model(props: &ModelProperties) -> Self {
        if props.has_visual_anomaly_detection {
            Self::VisualAnomaly
        } else if props.model_type.is_detection() {
            Self::SpatialDetection
        } else {
            Self::PlainLabel
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub label: String,
    pub score: f32,
}

/// Normalised output for one window. Never mutated after creation.
#[derive(Debug, Clone, PartialEq)]
pub enum ClassificationResult {
    PlainLabel {
        candidates: Vec<Candidate>,
        anomaly: Option<f32>,
    },
    SpatialDetection {
        boxes: Vec<BoundingBox>,
    },
    VisualAnomaly {
        candidates: Vec<Candidate>,
        grid: Vec<BoundingBox>,
        max: f32,
        mean: f32,
    },
}

impl ClassificationResult {
    fn from_raw(shape: OutputShape, raw: RawOutput) -> Self {
        let candidates = |pairs: Vec<(String, f32)>| {
            pairs
                .into_iter()
                .map(|(label, score)| Candidate { label, score })
                .collect::<Vec<_>>()
        };

        match shape {
            OutputShape::PlainLabel => Self::PlainLabel {
                candidates: candidates(raw.classification),
                anomaly: raw.anomaly,
            },
            OutputShape::SpatialDetection => Self::SpatialDetection {
                boxes: raw.bounding_boxes,
            },
            OutputShape::VisualAnomaly => {
                let grid = raw.visual_anomaly_grid;
                let max = raw
                    .visual_anomaly_max
                    .unwrap_or_else(|| grid.iter().map(|c| c.value).fold(0.0, f32::max));
                let mean = raw.visual_anomaly_mean.unwrap_or_else(|| {
                    if grid.is_empty() {
                        0.0
                    } else {
                        grid.iter().map(|c| c.value).sum::<f32>() / grid.len() as f32
                    }
                });
                Self::VisualAnomaly {
                    candidates: candidates(raw.classification),
                    grid,
                    max,
                    mean,
                }
            }
        }
    }

    /// `(label, score)` for every candidate, in classifier order.
    pub fn scores(&self) -> Vec<(&str, f32)> {
        match self {
            Self::PlainLabel { candidates, .. } | Self::VisualAnomaly { candidates, .. } => {
                candidates.iter().map(|c| (c.label.as_str(), c.score)).collect()
            }
            Self::SpatialDetection { boxes } => {
                boxes.iter().map(|b| (b.label.as_str(), b.value)).collect()
            }
        }
    }

    /// Highest-scoring candidate. Scanning uses a strict `>`, so on an exact
    /// tie the first one seen wins. NaN and infinite scores never win.
    pub fn top(&self) -> Option<(&str, f32)> {
        let mut best: Option<(&str, f32)> = None;
        for (label, score) in self.scores() {
            if !score.is_finite() {
                continue;
            }
            match best {
                Some((_, s)) if score > s => best = Some((label, score)),
                None => best = Some((label, score)),
                _ => {}
            }
        }
        best
    }

    pub fn shape(&self) -> OutputShape {
        match self {
            Self::PlainLabel { .. } => OutputShape::PlainLabel,
            Self::SpatialDetection { .. } => OutputShape::SpatialDetection,
            Self::VisualAnomaly { .. } => OutputShape::VisualAnomaly,
        }
    }
}

pub struct ClassificationAdapter {
    classifier: Box<dyn Classifier>,
    shape: OutputShape,
}

impl ClassificationAdapter {
    /// Initialise the classifier (exactly once) and fix the output shape from
    /// the properties it reports.
    pub fn new(mut classifier: Box<dyn Classifier>) -> Result<Self, ClassifierError> {
        classifier.initialize()?;
        let shape = OutputShape::for_model(classifier.properties()?);
        log::info!("Classifier initialised, output shape {:?}", shape);
        Ok(Self { classifier, shape })
    }

    pub fn shape(&self) -> OutputShape {
        self.shape
    }

    pub fn properties(&self) -> Result<&ModelProperties, ClassifierError> {
        self.classifier.properties()
    }

    /// Classify one window. Failures are returned as-is; the caller drops the
    /// window, nothing is retried.
    pub fn classify(&mut self, window: &Window) -> Result<ClassificationResult, ClassifierError> {
        let features = window.flatten();
        if let Some(expected) = self.classifier.properties()?.input_features_count {
            if expected != features.len() {
                log::debug!(
                    "Window #{} has {} features, model expects {}",
                    window.seq,
                    features.len(),
                    expected
                );
            }
        }

        let raw = self.classifier.classify(&features)?;
        if raw.result_code != 0 {
            return Err(ClassifierError::ClassificationFailed {
                code: raw.result_code,
                detail: format!("window #{}", window.seq),
            });
        }
        Ok(ClassificationResult::from_raw(self.shape, raw))
    }
}
