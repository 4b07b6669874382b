//! Commonly used types, for `use aitag::prelude::*`.

pub use crate::{
    colors::{dominant_colors, DominantColor},
    config::TaggingConfig,
    download::{ModelDownloader, RetryPolicy},
    error::{Result, TaggerError},
    file::{available_models, ModelFiles},
    metadata::{read_generation_metadata, GenerationMetadata},
    pipeline::{ScoredTag, TaggingPipeline, TaggingResult},
    processor::{ImagePreprocessor, ImageProcessor},
    tagger::{Backend, TaggerModel},
    tags::{Tag, TagCategory, TagVocabulary},
};
