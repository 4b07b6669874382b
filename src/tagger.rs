//! This module provides the `TaggerModel` struct for running ONNX-based image tagging models.
//!
//! It includes functionality for:
//! - Resolving an ordered backend preference into one concrete execution provider.
//! - Loading a model with a single fallback to the CPU backend.
//! - Running one forward pass on a preprocessed image tensor.
//!
//! Sessions are owned by the `TaggerModel` and inference takes `&mut self`;
//! callers running tagging in parallel load one model per worker.

use std::{fmt, path::Path, str::FromStr};

use ndarray::{Array, Axis, Ix4};
use ort::{
    execution_providers::{CPUExecutionProvider, ExecutionProviderDispatch},
    session::Session,
    value::Tensor,
};

#[cfg(any(feature = "cuda", feature = "tensorrt", feature = "coreml"))]
use ort::execution_providers::ExecutionProvider;

#[cfg(feature = "cuda")]
use ort::execution_providers::CUDAExecutionProvider;

#[cfg(feature = "tensorrt")]
use ort::execution_providers::TensorRTExecutionProvider;

#[cfg(feature = "coreml")]
use ort::execution_providers::CoreMLExecutionProvider;

use crate::{
    error::{Result, TaggerError},
    file::ModelFiles,
};

/// The execution environment a session runs on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    /// Baseline, always compiled in.
    Cpu,
    #[cfg(feature = "cuda")]
    Cuda(i32),
    #[cfg(feature = "tensorrt")]
    TensorRT(i32),
    #[cfg(feature = "coreml")]
    CoreML,
}

impl Backend {
    /// The accelerated backends compiled into this build, best first,
    /// followed by the CPU.
    pub fn default_preferences() -> Vec<Self> {
        let mut backends = Vec::new();
        #[cfg(feature = "tensorrt")]
        backends.push(Self::TensorRT(0));
        #[cfg(feature = "cuda")]
        backends.push(Self::Cuda(0));
        #[cfg(feature = "coreml")]
        backends.push(Self::CoreML);
        backends.push(Self::Cpu);
        backends
    }

    /// Picks the first backend whose provider reports itself available.
    pub fn resolve(preferences: &[Backend]) -> Backend {
        preferences
            .iter()
            .copied()
            .find(|b| b.is_available())
            .unwrap_or(Backend::Cpu)
    }

    pub fn is_available(&self) -> bool {
        match self {
            Backend::Cpu => true,
            #[cfg(feature = "cuda")]
            Backend::Cuda(_) => CUDAExecutionProvider::default()
                .is_available()
                .unwrap_or(false),
            #[cfg(feature = "tensorrt")]
            Backend::TensorRT(_) => TensorRTExecutionProvider::default()
                .is_available()
                .unwrap_or(false),
            #[cfg(feature = "coreml")]
            Backend::CoreML => CoreMLExecutionProvider::default()
                .is_available()
                .unwrap_or(false),
        }
    }

    fn provider(&self) -> ExecutionProviderDispatch {
        match self {
            Backend::Cpu => CPUExecutionProvider::default().build(),
            #[cfg(feature = "cuda")]
            Backend::Cuda(device_id) => CUDAExecutionProvider::default()
                .with_device_id(*device_id)
                .build(),
            #[cfg(feature = "tensorrt")]
            Backend::TensorRT(device_id) => TensorRTExecutionProvider::default()
                .with_device_id(*device_id)
                .build(),
            #[cfg(feature = "coreml")]
            Backend::CoreML => CoreMLExecutionProvider::default().build(),
        }
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Backend::Cpu => write!(f, "cpu"),
            #[cfg(feature = "cuda")]
            Backend::Cuda(id) => write!(f, "cuda:{}", id),
            #[cfg(feature = "tensorrt")]
            Backend::TensorRT(id) => write!(f, "tensorrt:{}", id),
            #[cfg(feature = "coreml")]
            Backend::CoreML => write!(f, "coreml"),
        }
    }
}

impl FromStr for Backend {
    type Err = TaggerError;

    /// Parses `cpu`, `cuda[:id]`, `tensorrt[:id]` or `coreml`.
    fn from_str(s: &str) -> Result<Self> {
        let lower = s.trim().to_lowercase();
        let (kind, device) = lower.split_once(':').unwrap_or((lower.as_str(), "0"));
        #[allow(unused_variables)]
        let device_id = || {
            device.parse::<i32>().map_err(|_| {
                TaggerError::Configuration(format!("invalid device id in backend '{}'", s))
            })
        };
        match kind {
            "cpu" => Ok(Backend::Cpu),
            #[cfg(feature = "cuda")]
            "cuda" => Ok(Backend::Cuda(device_id()?)),
            #[cfg(feature = "tensorrt")]
            "tensorrt" => Ok(Backend::TensorRT(device_id()?)),
            #[cfg(feature = "coreml")]
            "coreml" => Ok(Backend::CoreML),
            "cuda" | "tensorrt" | "coreml" => Err(TaggerError::Configuration(format!(
                "backend '{}' is not compiled into this build",
                kind
            ))),
            _ => Err(TaggerError::Configuration(format!("unknown backend '{}'", s))),
        }
    }
}

/// A wrapper around an ONNX Runtime session for image tagging.
#[derive(Debug)]
pub struct TaggerModel {
    session: Session,
    backend: Backend,
    input_name: String,
    output_name: String,
    input_size: u32,
    output_size: Option<usize>,
}

impl TaggerModel {
    /// Loads the model of `files` on the first available backend of
    /// `preferences`.
    ///
    /// The model file is checked for existence and size before any session is
    /// created. If the session fails on an accelerated backend, one more
    /// attempt is made on the CPU.
    pub fn load(files: &ModelFiles, preferences: &[Backend]) -> Result<Self> {
        let model_path = files.check_model()?;
        let backend = Backend::resolve(preferences);
        tracing::info!(model = files.name(), %backend, "loading model");

        let (session, backend) = with_fallback(backend, Backend::Cpu, |backend| {
            build_session(&model_path, backend)
        })?;

        Self::from_session(session, backend)
    }

    fn from_session(session: Session, backend: Backend) -> Result<Self> {
        let input = session
            .inputs
            .first()
            .ok_or_else(|| TaggerError::Configuration("Model has no inputs".to_string()))?;
        let input_name = input.name.clone();
        // Taggers take NHWC input, so the square side is dimension 1.
        let input_size = input
            .input_type
            .tensor_shape()
            .and_then(|shape| shape.get(1).copied())
            .filter(|&d| d > 0)
            .ok_or_else(|| {
                TaggerError::Configuration(format!(
                    "Model input '{}' has no fixed [1, H, H, 3] shape",
                    input_name
                ))
            })? as u32;

        let output = session
            .outputs
            .first()
            .ok_or_else(|| TaggerError::Configuration("Model has no outputs".to_string()))?;
        let output_name = output.name.clone();
        // Dynamic dimensions are reported as -1.
        let output_size = output
            .output_type
            .tensor_shape()
            .and_then(|shape| shape.get(1).copied())
            .filter(|&d| d > 0)
            .map(|d| d as usize);

        tracing::debug!(%input_name, %output_name, input_size, ?output_size, %backend, "model ready");
        Ok(Self {
            session,
            backend,
            input_name,
            output_name,
            input_size,
            output_size,
        })
    }

    /// The backend the session ended up on.
    pub fn backend(&self) -> Backend {
        self.backend
    }

    /// Side length of the square image the model expects.
    pub fn input_size(&self) -> u32 {
        self.input_size
    }

    /// Number of scores per row, when the model declares a fixed width.
    pub fn output_size(&self) -> Option<usize> {
        self.output_size
    }

    /// Runs one forward pass and returns the first score row.
    ///
    /// # Arguments
    ///
    /// * `input_tensor` - A tensor with shape `[1, height, width, 3]`.
    pub fn predict(&mut self, input_tensor: Array<f32, Ix4>) -> Result<Vec<f32>> {
        let input_tensor = Tensor::from_array(input_tensor)?;

        let outputs = self
            .session
            .run(ort::inputs![self.input_name.as_str() => input_tensor])?;

        let preds = outputs[self.output_name.as_str()].try_extract_array::<f32>()?;

        let row = preds
            .axis_iter(Axis(0))
            .next()
            .map(|row| row.iter().copied().collect::<Vec<_>>())
            .ok_or_else(|| TaggerError::Inference("Model returned an empty batch".to_string()))?;

        Ok(row)
    }
}

/// Builds on `preferred`, then once more on `baseline` if that fails.
///
/// The returned error carries the cause of the first failure.
fn with_fallback<B, S>(
    preferred: B,
    baseline: B,
    mut build: impl FnMut(B) -> std::result::Result<S, String>,
) -> Result<(S, B)>
where
    B: Copy + PartialEq + fmt::Display,
{
    let cause = match build(preferred) {
        Ok(session) => return Ok((session, preferred)),
        Err(cause) => cause,
    };
    if preferred == baseline {
        return Err(TaggerError::RuntimeInitialization {
            backend: preferred.to_string(),
            cause,
        });
    }

    tracing::warn!(backend = %preferred, %cause, "backend failed to initialize, falling back to {}", baseline);
    match build(baseline) {
        Ok(session) => Ok((session, baseline)),
        Err(fallback) => {
            tracing::debug!(%fallback, "{} fallback failed", baseline);
            Err(TaggerError::RuntimeInitialization {
                backend: format!("{} ({} fallback also failed)", preferred, baseline),
                cause,
            })
        }
    }
}

fn build_session(model_path: &Path, backend: Backend) -> std::result::Result<Session, String> {
    let threads = std::thread::available_parallelism()
        .map(std::num::NonZero::get)
        .unwrap_or(1);

    let mut builder = Session::builder().map_err(|e| e.to_string())?;
    if backend != Backend::Cpu {
        builder = builder
            .with_execution_providers([backend.provider().error_on_failure()])
            .map_err(|e| e.to_string())?;
    }
    builder
        .with_intra_threads(threads)
        .map_err(|e| e.to_string())?
        .commit_from_file(model_path)
        .map_err(|e| e.to_string())
}
