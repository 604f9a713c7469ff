// GestureGate - Edge Impulse Classifier Interface
//
// The classifier is an external collaborator consumed through the
// `Classifier` trait: initialise once, read the model properties, then feed
// it flat `[ax, ay, az, ...]` vectors.
//
// Back-ends:
//   1. STUB (default) - heuristic scorer so the rest of the gateway can be
//      run and tested without a trained model.
//   2. EIM - Edge Impulse Linux `.eim` model runner over a Unix socket.
//   3. FFI - the Edge Impulse C++ SDK linked in through `ffi/ei_shim.cpp`
//      (cargo feature `edge-impulse`).

#[cfg(unix)]
pub mod eim;
#[cfg(feature = "edge-impulse")]
pub mod ffi;

use serde::Deserialize;

use crate::config::{Backend, ClassifierConfig};
use crate::error::ClassifierError;

// ---------------------------------------------------------------------------
// Public interface
// ---------------------------------------------------------------------------

/// Output layout of the loaded model, as reported by the classifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelType {
    Classification,
    ObjectDetection,
    ConstrainedObjectDetection,
    AnomalyDetection,
}

impl ModelType {
    pub fn is_detection(self) -> bool {
        matches!(self, Self::ObjectDetection | Self::ConstrainedObjectDetection)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ModelProperties {
    pub model_type: ModelType,
    pub has_visual_anomaly_detection: bool,
    pub labels: Vec<String>,
    /// Expected flat vector length, when the model reports one.
    pub input_features_count: Option<usize>,
}

/// A labelled score with spatial attributes (detection boxes and visual
/// anomaly grid cells).
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct BoundingBox {
    pub label: String,
    pub value: f32,
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// Everything one classify call produced, copied out of the classifier.
/// Which fields are meaningful depends on the model type.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawOutput {
    /// 0 on success, classifier-specific error code otherwise.
    pub result_code: i32,
    /// Label/score pairs in model order.
    pub classification: Vec<(String, f32)>,
    pub bounding_boxes: Vec<BoundingBox>,
    pub anomaly: Option<f32>,
    pub visual_anomaly_grid: Vec<BoundingBox>,
    pub visual_anomaly_max: Option<f32>,
    pub visual_anomaly_mean: Option<f32>,
}

pub trait Classifier: Send {
    /// Bring the classifier up. Must be called exactly once before anything
    /// else; returns the model properties as the ready signal.
    fn initialize(&mut self) -> Result<ModelProperties, ClassifierError>;

    /// Properties reported at initialisation.
    fn properties(&self) -> Result<&ModelProperties, ClassifierError>;

    /// Score one flat feature vector.
    fn classify(&mut self, features: &[f32]) -> Result<RawOutput, ClassifierError>;
}

/// Build the back-end selected in the configuration (not yet initialised).
pub fn open_backend(config: &ClassifierConfig) -> Result<Box<dyn Classifier>, ClassifierError> {
    match config.backend {
        Backend::Stub => Ok(Box::new(StubClassifier::new())),
        #[cfg(unix)]
        Backend::Eim => {
            let model = config
                .model_path
                .as_deref()
                .ok_or_else(|| ClassifierError::Spawn("no model_path configured".into()))?;
            let timeout = std::time::Duration::from_millis(config.timeout_ms);
            Ok(Box::new(eim::EimRunner::spawn(model, timeout)?))
        }
        #[cfg(not(unix))]
        Backend::Eim => Err(ClassifierError::Spawn(
            "the eim runner needs Unix domain sockets".into(),
        )),
        #[cfg(feature = "edge-impulse")]
        Backend::Ffi => Ok(Box::new(ffi::SdkClassifier::new())),
        #[cfg(not(feature = "edge-impulse"))]
        Backend::Ffi => Err(ClassifierError::Spawn(
            "built without the `edge-impulse` feature".into(),
        )),
    }
}

// ---------------------------------------------------------------------------
// Stub back-end - development / testing without a trained model
// ---------------------------------------------------------------------------

/// Labels the stub scores, in output order.
pub const STUB_LABELS: [&str; 4] = ["default", "up-down", "left-right", "circle-right"];

pub struct StubClassifier {
    properties: Option<ModelProperties>,
}

impl StubClassifier {
    pub fn new() -> Self {
        Self { properties: None }
    }
}

impl Default for StubClassifier {
    fn default() -> Self {
        Self::new()
    }
}

impl Classifier for StubClassifier {
    fn initialize(&mut self) -> Result<ModelProperties, ClassifierError> {
        let props = ModelProperties {
            model_type: ModelType::Classification,
            has_visual_anomaly_detection: false,
            labels: STUB_LABELS.iter().map(|l| l.to_string()).collect(),
            input_features_count: None,
        };
        self.properties = Some(props.clone());
        Ok(props)
    }

    fn properties(&self) -> Result<&ModelProperties, ClassifierError> {
        self.properties.as_ref().ok_or(ClassifierError::NotInitialized)
    }

    fn classify(&mut self, features: &[f32]) -> Result<RawOutput, ClassifierError> {
        self.properties()?;

        // Mean absolute acceleration picks the bucket; enough to drive the
        // pipeline end-to-end on a bench.
        let mean_abs = if features.is_empty() {
            0.0
        } else {
            features.iter().map(|v| v.abs()).sum::<f32>() / features.len() as f32
        };

        let preds = if mean_abs < 0.3 {
            [0.90, 0.03, 0.04, 0.03]
        } else if mean_abs < 0.8 {
            [0.05, 0.85, 0.05, 0.05]
        } else if mean_abs < 1.5 {
            [0.03, 0.04, 0.88, 0.05]
        } else {
            [0.02, 0.03, 0.03, 0.92]
        };

        log::debug!(
            "STUB inference - mean |a| = {:.2}, preds = {:?}",
            mean_abs,
            preds
        );

        Ok(RawOutput {
            classification: STUB_LABELS
                .iter()
                .zip(preds)
                .map(|(l, v)| (l.to_string(), v))
                .collect(),
            ..RawOutput::default()
        })
    }
}
