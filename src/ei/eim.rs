// GestureGate - Edge Impulse Linux Model Runner
//
// A `.eim` file is a self-contained executable. Started with a socket path
// as its only argument it serves JSON requests on that Unix socket: the
// gateway writes one JSON object per request and reads one NUL-terminated
// JSON object per response. Requests carry an `id` that the response echoes.

use std::fs;
use std::io::{self, BufRead, BufReader, Write};
use std::os::unix::net::UnixStream;
use std::path::{Path, PathBuf};
use std::process::{self, Child, Command, Stdio};
use std::thread;
use std::time::Duration;

use serde::Deserialize;
use serde_json::{json, Map, Value};

use super::{BoundingBox, Classifier, ModelProperties, ModelType, RawOutput};
use crate::config::{EIM_CONNECT_ATTEMPTS, EIM_CONNECT_RETRY_MS};
use crate::error::ClassifierError;

/// Result code reported when the runner answers `success: false`; the runner
/// only sends an error string.
pub const EIM_FAILURE_CODE: i32 = -1;

/// `has_anomaly` value the runner uses for visual (GMM) anomaly models.
const ANOMALY_VISUAL_GMM: u32 = 3;

#[derive(Debug, Deserialize)]
struct Response {
    success: bool,
    #[serde(default)]
    id: Option<u64>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    model_parameters: Option<ModelParameters>,
    #[serde(default)]
    result: Option<ClassifyResult>,
}

#[derive(Debug, Deserialize)]
struct ModelParameters {
    #[serde(default = "default_model_type")]
    model_type: ModelType,
    #[serde(default)]
    has_anomaly: u32,
    #[serde(default)]
    has_visual_anomaly_detection: Option<bool>,
    #[serde(default)]
    labels: Vec<String>,
    #[serde(default)]
    input_features_count: Option<usize>,
}

fn default_model_type() -> ModelType {
    ModelType::Classification
}

#[derive(Debug, Default, Deserialize)]
struct ClassifyResult {
    #[serde(default)]
    classification: Map<String, Value>,
    #[serde(default)]
    bounding_boxes: Vec<BoundingBox>,
    #[serde(default)]
    anomaly: Option<f32>,
    #[serde(default)]
    visual_anomaly_grid: Vec<BoundingBox>,
    #[serde(default)]
    visual_anomaly_max: Option<f32>,
    #[serde(default)]
    visual_anomaly_mean: Option<f32>,
}

impl ClassifyResult {
    fn into_raw(self) -> Result<RawOutput, ClassifierError> {
        let mut classification = Vec::with_capacity(self.classification.len());
        for (label, value) in self.classification {
            let score = value.as_f64().ok_or_else(|| {
                ClassifierError::Protocol(format!("score for {label:?} is not a number"))
            })?;
            classification.push((label, score as f32));
        }
        Ok(RawOutput {
            result_code: 0,
            classification,
            bounding_boxes: self.bounding_boxes,
            anomaly: self.anomaly,
            visual_anomaly_grid: self.visual_anomaly_grid,
            visual_anomaly_max: self.visual_anomaly_max,
            visual_anomaly_mean: self.visual_anomaly_mean,
        })
    }
}

pub struct EimRunner {
    child: Option<Child>,
    /// Socket file to remove on drop (only when we started the runner).
    owned_socket: Option<PathBuf>,
    reader: BufReader<UnixStream>,
    writer: UnixStream,
    /// Bytes of a response cut short by a read timeout. Kept until its NUL
    /// arrives so the next read resumes at the right place.
    partial: Vec<u8>,
    next_id: u64,
    properties: Option<ModelProperties>,
}

impl EimRunner {
    /// Start the model executable and connect to its socket.
    pub fn spawn(model_path: &str, timeout: Duration) -> Result<Self, ClassifierError> {
        let socket_path =
            std::env::temp_dir().join(format!("gesturegate-{}.sock", process::id()));
        let _ = fs::remove_file(&socket_path);

        log::info!("Starting model runner {}", model_path);
        let mut child = Command::new(model_path)
            .arg(&socket_path)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(|e| ClassifierError::Spawn(format!("{model_path}: {e}")))?;

        let stream = match wait_for_socket(&mut child, &socket_path) {
            Ok(stream) => stream,
            Err(e) => {
                let _ = child.kill();
                let _ = child.wait();
                let _ = fs::remove_file(&socket_path);
                return Err(e);
            }
        };

        let mut runner = Self::from_stream(stream, timeout)?;
        runner.child = Some(child);
        runner.owned_socket = Some(socket_path);
        Ok(runner)
    }

    /// Attach to a runner that is already listening on `socket_path`.
    pub fn connect(socket_path: &Path, timeout: Duration) -> Result<Self, ClassifierError> {
        let stream = UnixStream::connect(socket_path)?;
        Self::from_stream(stream, timeout)
    }

    fn from_stream(stream: UnixStream, timeout: Duration) -> Result<Self, ClassifierError> {
        stream.set_read_timeout(Some(timeout))?;
        let writer = stream.try_clone()?;
        Ok(Self {
            child: None,
            owned_socket: None,
            reader: BufReader::new(stream),
            writer,
            partial: Vec::new(),
            next_id: 1,
            properties: None,
        })
    }

    fn request(&mut self, mut body: Map<String, Value>) -> Result<Response, ClassifierError> {
        let id = self.next_id;
        self.next_id += 1;
        body.insert("id".into(), json!(id));

        serde_json::to_writer(&mut self.writer, &body)?;
        self.writer.flush()?;

        loop {
            let response = self.read_response()?;
            match response.id {
                Some(rid) if rid == id => return Ok(response),
                // Late answer to a request that already timed out.
                Some(rid) if rid < id => {
                    log::debug!("Discarding stale runner response #{}", rid);
                }
                other => {
                    return Err(ClassifierError::Protocol(format!(
                        "expected response #{id}, got {other:?}"
                    )))
                }
            }
        }
    }

    fn read_response(&mut self) -> Result<Response, ClassifierError> {
        match self.reader.read_until(0, &mut self.partial) {
            Ok(_) => {}
            Err(e) if matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut) => {
                return Err(ClassifierError::Timeout)
            }
            Err(e) => return Err(e.into()),
        }
        let mut buf = std::mem::take(&mut self.partial);
        if buf.pop() != Some(0) {
            return Err(ClassifierError::Protocol("runner closed the socket".into()));
        }
        Ok(serde_json::from_slice(&buf)?)
    }
}

fn wait_for_socket(child: &mut Child, socket_path: &Path) -> Result<UnixStream, ClassifierError> {
    for _ in 0..EIM_CONNECT_ATTEMPTS {
        if let Some(status) = child.try_wait()? {
            return Err(ClassifierError::Spawn(format!(
                "model runner exited early ({status})"
            )));
        }
        if let Ok(stream) = UnixStream::connect(socket_path) {
            return Ok(stream);
        }
        thread::sleep(Duration::from_millis(EIM_CONNECT_RETRY_MS));
    }
    Err(ClassifierError::Spawn(format!(
        "no socket at {} after {} attempts",
        socket_path.display(),
        EIM_CONNECT_ATTEMPTS
    )))
}

impl Classifier for EimRunner {
    fn initialize(&mut self) -> Result<ModelProperties, ClassifierError> {
        let mut body = Map::new();
        body.insert("hello".into(), json!(1));
        let response = self.request(body)?;

        if !response.success {
            return Err(ClassifierError::Protocol(format!(
                "hello rejected: {}",
                response.error.unwrap_or_default()
            )));
        }
        let params = response
            .model_parameters
            .ok_or_else(|| ClassifierError::Protocol("hello without model_parameters".into()))?;

        let props = ModelProperties {
            model_type: params.model_type,
            has_visual_anomaly_detection: params
                .has_visual_anomaly_detection
                .unwrap_or(params.has_anomaly == ANOMALY_VISUAL_GMM),
            labels: params.labels,
            input_features_count: params.input_features_count,
        };
        log::info!(
            "Model runner ready: {:?}, {} labels, visual anomaly: {}",
            props.model_type,
            props.labels.len(),
            props.has_visual_anomaly_detection
        );
        self.properties = Some(props.clone());
        Ok(props)
    }

    fn properties(&self) -> Result<&ModelProperties, ClassifierError> {
        self.properties.as_ref().ok_or(ClassifierError::NotInitialized)
    }

    fn classify(&mut self, features: &[f32]) -> Result<RawOutput, ClassifierError> {
        self.properties()?;

        let mut body = Map::new();
        body.insert("classify".into(), json!(features));
        let response = self.request(body)?;

        if !response.success {
            return Err(ClassifierError::ClassificationFailed {
                code: EIM_FAILURE_CODE,
                detail: response.error.unwrap_or_else(|| "unknown error".into()),
            });
        }
        response.result.unwrap_or_default().into_raw()
    }
}

impl Drop for EimRunner {
    fn drop(&mut self) {
        if let Some(mut child) = self.child.take() {
            let _ = child.kill();
            let _ = child.wait();
        }
        if let Some(path) = self.owned_socket.take() {
            let _ = fs::remove_file(path);
        }
    }
}
