//! # aitag
//!
//! aitag is a library for tagging anime-style images with WD14 ONNX models. It
//! turns one image into a comma-separated list of descriptive labels suitable
//! for use as a text-to-image prompt.
//!
//! ## Features
//!
//! - **High-level API**: A `TaggingPipeline` for end-to-end image tagging.
//! - **ONNX Runtime**: Powered by `ort`, with CUDA, TensorRT and CoreML behind
//!   cargo features and an automatic fallback to the CPU.
//! - **Model management**: Downloads `<model>.onnx` / `<model>.csv` pairs with
//!   retry and a regional mirror.
//! - **Extras**: Dominant color extraction and Stable Diffusion generation
//!   metadata from PNG text chunks.
//!
//! ## Modules
//!
//! - `pipeline`: The main entry point for using the tagging functionality.
//! - `tagger`: Handles the ONNX model, backend choice and session management.
//! - `processor`: Image preprocessing into the model's input tensor.
//! - `tags`: The tag vocabulary and its category partition.
//! - `config`: Per-call tagging configuration.
//! - `file`: Model file layout on disk.
//! - `download`: Fetching model files over HTTP.
//! - `colors`: Dominant color extraction.
//! - `metadata`: Generation metadata parsing.
//! - `error`: Contains the error types for the library.
//! - `prelude`: A collection of the most commonly used types.

pub mod colors;
pub mod config;
pub mod download;
pub mod error;
pub mod file;
pub mod metadata;
pub mod pipeline;
pub mod prelude;
pub mod processor;
pub mod tagger;
pub mod tags;

pub use crate::error::{Result, TaggerError};
