// GestureGate - Gateway Configuration
//
// Compile-time defaults live in the constants below. Every value can be
// overridden from an optional TOML file and a handful of command-line flags.

use std::fs;
use std::path::Path;

use serde::Deserialize;

use crate::error::ConfigError;
use crate::sequence::MismatchPolicy;

// ---------------------------------------------------------------------------
// Serial Link
// ---------------------------------------------------------------------------
pub const DEFAULT_SERIAL_PORT: &str = "/dev/ttyACM0";
pub const DEFAULT_BAUD: u32 = 115_200;
pub const DEFAULT_RECONNECT_MS: u64 = 2000;

// ---------------------------------------------------------------------------
// Timing (milliseconds)
// ---------------------------------------------------------------------------
pub const DEFAULT_WINDOW_PERIOD_MS: u64 = 5000;
pub const DEFAULT_CLASSIFY_TIMEOUT_MS: u64 = 3000;
pub const EIM_CONNECT_ATTEMPTS: u32 = 50;
pub const EIM_CONNECT_RETRY_MS: u64 = 100;

// ---------------------------------------------------------------------------
// Samples
// ---------------------------------------------------------------------------
pub const AXES_PER_SAMPLE: usize = 3; // ax, ay, az

// ---------------------------------------------------------------------------
// Gesture Sequence
// ---------------------------------------------------------------------------
pub const DEFAULT_SEQUENCE: [&str; 6] = [
    "default",
    "up-down",
    "left-right",
    "circle-right",
    "square-right",
    "square-left",
];
pub const UNKNOWN_LABEL: &str = "unknown";

// ---------------------------------------------------------------------------
// Device Command Vocabulary
// ---------------------------------------------------------------------------
pub const CMD_MATCHED: &str = "LED_ON";
pub const CMD_MISMATCHED: &str = "BUZZER_ON";
pub const ACK_PREFIX: &str = "ACK";

// ---------------------------------------------------------------------------
// Config file model
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub serial: SerialConfig,
    pub window: WindowConfig,
    pub sequence: SequenceConfig,
    pub device: DeviceConfig,
    pub classifier: ClassifierConfig,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SerialConfig {
    pub port: String,
    pub baud: u32,
    pub reconnect_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WindowConfig {
    pub period_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SequenceConfig {
    pub labels: Vec<String>,
    pub on_mismatch: MismatchPolicy,
    pub unknown_label: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DeviceConfig {
    pub matched_command: String,
    pub mismatched_command: String,
    pub ack_prefix: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    Stub,
    Eim,
    Ffi,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ClassifierConfig {
    pub backend: Backend,
    pub model_path: Option<String>,
    pub timeout_ms: u64,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_SERIAL_PORT.to_string(),
            baud: DEFAULT_BAUD,
            reconnect_ms: DEFAULT_RECONNECT_MS,
        }
    }
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            period_ms: DEFAULT_WINDOW_PERIOD_MS,
        }
    }
}

impl Default for SequenceConfig {
    fn default() -> Self {
        Self {
            labels: DEFAULT_SEQUENCE.iter().map(|l| l.to_string()).collect(),
            on_mismatch: MismatchPolicy::Hold,
            unknown_label: UNKNOWN_LABEL.to_string(),
        }
    }
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            matched_command: CMD_MATCHED.to_string(),
            mismatched_command: CMD_MISMATCHED.to_string(),
            ack_prefix: ACK_PREFIX.to_string(),
        }
    }
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            backend: Backend::Stub,
            model_path: None,
            timeout_ms: DEFAULT_CLASSIFY_TIMEOUT_MS,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            serial: SerialConfig::default(),
            window: WindowConfig::default(),
            sequence: SequenceConfig::default(),
            device: DeviceConfig::default(),
            classifier: ClassifierConfig::default(),
        }
    }
}

impl Config {
    /// Load from `path` if given, otherwise start from the built-in defaults.
    /// Not validated: call `validate` once command-line overrides are applied.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => {
                let text = fs::read_to_string(path)?;
                Self::from_toml(&text)
            }
            None => Ok(Self::default()),
        }
    }

    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.window.period_ms == 0 {
            return Err(ConfigError::Invalid("window.period_ms must be > 0".into()));
        }
        if self.sequence.labels.is_empty() {
            return Err(ConfigError::Invalid("sequence.labels must not be empty".into()));
        }
        if let Some(ix) = self.sequence.labels.iter().position(|l| l.trim().is_empty()) {
            return Err(ConfigError::Invalid(format!(
                "sequence.labels[{ix}] is empty"
            )));
        }
        if self.device.matched_command.is_empty() || self.device.mismatched_command.is_empty() {
            return Err(ConfigError::Invalid("device commands must not be empty".into()));
        }
        if self.classifier.backend == Backend::Eim && self.classifier.model_path.is_none() {
            return Err(ConfigError::Invalid(
                "classifier.model_path is required for the eim backend".into(),
            ));
        }
        Ok(())
    }
}
