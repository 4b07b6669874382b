//! # Error Handling
//!
//! This module defines the custom error type for the `aitag` library.
//!
//! The `TaggerError` enum represents all possible errors that can occur
//! within the library. The first four variants are the tagger's own failure
//! taxonomy; the rest wrap errors bubbling up from the image, CSV, JSON and
//! HTTP stacks.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TaggerError {
    /// A required resource file does not exist.
    #[error("Resource not found: {}", .0.display())]
    NotFound(PathBuf),

    /// A resource exists but is empty, truncated or unreadable.
    #[error("Resource is corrupt: {} ({reason})", .path.display())]
    CorruptResource { path: PathBuf, reason: String },

    /// The resource set is internally inconsistent.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The inference session could not be created on any attempted backend.
    #[error("Failed to initialize model on {backend}: {cause}")]
    RuntimeInitialization { backend: String, cause: String },

    #[error("Inference error: {0}")]
    Inference(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<ort::Error> for TaggerError {
    fn from(e: ort::Error) -> Self {
        TaggerError::Inference(e.to_string())
    }
}

impl From<reqwest::Error> for TaggerError {
    fn from(e: reqwest::Error) -> Self {
        TaggerError::Network(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, TaggerError>;
