//! Scheduler configuration with TOML support
//!
//! Options mirror what a media pipeline passes on the command line, with
//! environment variable override and validation.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::warn;

use crate::utils::error::{FrameflowError, Result};

/// Inclusive bounds for the request pool size
pub const NIREQ_RANGE: (usize, usize) = (1, 128);

/// Inclusive bounds for frames per inference dispatch
pub const BATCH_SIZE_RANGE: (usize, usize) = (1, 1024);

/// Options controlling how a model is opened and scheduled
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InferenceOptions {
    /// Target execution device
    pub device: String,

    /// Batched asynchronous execution; false falls back to one-frame
    /// synchronous execution with no request pool
    #[serde(rename = "async")]
    pub async_exec: bool,

    /// Size of the inference request pool
    pub nireq: usize,

    /// Frames per inference dispatch
    pub batch_size: usize,

    /// Model file consumed by the runtime
    pub model_path: PathBuf,

    /// Input tensor name
    pub input_name: String,

    /// Output tensor name
    pub output_name: String,
}

impl Default for InferenceOptions {
    fn default() -> Self {
        Self {
            device: "CPU".to_string(),
            async_exec: true,
            nireq: 8,
            batch_size: 4,
            model_path: PathBuf::new(),
            input_name: String::new(),
            output_name: String::new(),
        }
    }
}

impl InferenceOptions {
    pub fn with_device(mut self, device: impl Into<String>) -> Self {
        self.device = device.into();
        self
    }

    pub fn with_async(mut self, async_exec: bool) -> Self {
        self.async_exec = async_exec;
        self
    }

    pub fn with_nireq(mut self, nireq: usize) -> Self {
        self.nireq = nireq;
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn with_model_path(mut self, path: impl AsRef<Path>) -> Self {
        self.model_path = path.as_ref().to_path_buf();
        self
    }

    pub fn with_input_name(mut self, name: impl Into<String>) -> Self {
        self.input_name = name.into();
        self
    }

    pub fn with_output_name(mut self, name: impl Into<String>) -> Self {
        self.output_name = name.into();
        self
    }

    /// Load options from a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let contents = std::fs::read_to_string(path.as_ref())?;
        toml::from_str(&contents)
            .map_err(|e| FrameflowError::Config(format!("failed to parse options: {}", e)))
    }

    /// Apply `FRAMEFLOW_*` environment variable overrides
    pub fn apply_env_overrides(&mut self) {
        if let Ok(device) = std::env::var("FRAMEFLOW_DEVICE") {
            self.device = device;
        }
        if let Ok(v) = std::env::var("FRAMEFLOW_ASYNC") {
            self.async_exec = v != "0" && !v.eq_ignore_ascii_case("false");
        }
        if let Ok(v) = std::env::var("FRAMEFLOW_NIREQ") {
            match v.parse() {
                Ok(n) => self.nireq = n,
                Err(_) => warn!("ignoring unparseable FRAMEFLOW_NIREQ={}", v),
            }
        }
        if let Ok(v) = std::env::var("FRAMEFLOW_BATCH_SIZE") {
            match v.parse() {
                Ok(n) => self.batch_size = n,
                Err(_) => warn!("ignoring unparseable FRAMEFLOW_BATCH_SIZE={}", v),
            }
        }
        if let Ok(path) = std::env::var("FRAMEFLOW_MODEL") {
            self.model_path = PathBuf::from(path);
        }
        if let Ok(name) = std::env::var("FRAMEFLOW_INPUT") {
            self.input_name = name;
        }
        if let Ok(name) = std::env::var("FRAMEFLOW_OUTPUT") {
            self.output_name = name;
        }
    }

    /// Validate option ranges and required fields
    pub fn validate(&self) -> Result<()> {
        if self.model_path.as_os_str().is_empty() {
            return Err(FrameflowError::Config("model path is not set".to_string()));
        }
        if self.input_name.is_empty() {
            return Err(FrameflowError::Config(
                "input name of the model is not set".to_string(),
            ));
        }
        if self.output_name.is_empty() {
            return Err(FrameflowError::Config(
                "output name of the model is not set".to_string(),
            ));
        }
        if self.nireq < NIREQ_RANGE.0 || self.nireq > NIREQ_RANGE.1 {
            return Err(FrameflowError::Config(format!(
                "nireq {} outside [{}, {}]",
                self.nireq, NIREQ_RANGE.0, NIREQ_RANGE.1
            )));
        }
        if self.batch_size < BATCH_SIZE_RANGE.0 || self.batch_size > BATCH_SIZE_RANGE.1 {
            return Err(FrameflowError::Config(format!(
                "batch_size {} outside [{}, {}]",
                self.batch_size, BATCH_SIZE_RANGE.0, BATCH_SIZE_RANGE.1
            )));
        }
        Ok(())
    }
}
