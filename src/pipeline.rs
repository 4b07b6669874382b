//! This module provides a high-level `TaggingPipeline` for processing images and generating tags.
//!
//! The pipeline combines a `TaggerModel`, an `ImagePreprocessor` and the model's
//! `TagVocabulary` into an end-to-end tagger: one image in, the thresholded
//! tags and their rendered label string out.
//!
//! The post-processing step is exposed separately as `TaggingResult::from_scores`
//! so it can run on score rows that did not come from a live session.

use std::path::Path;

use image::DynamicImage;
use itertools::Itertools;
use serde::Serialize;

use crate::{
    config::TaggingConfig,
    error::{Result, TaggerError},
    file::ModelFiles,
    processor::{ImagePreprocessor, ImageProcessor},
    tagger::{Backend, TaggerModel},
    tags::TagVocabulary,
};

/// A tag that passed its threshold, with the model's confidence.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredTag {
    pub name: String,
    pub score: f32,
}

impl ScoredTag {
    pub fn new(name: impl Into<String>, score: f32) -> Self {
        Self {
            name: name.into(),
            score,
        }
    }
}

/// The result of a tagging operation.
///
/// `tags` holds the character tags first, then the general tags, each group
/// in vocabulary order. `text` is the rendered label string.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaggingResult {
    pub tags: Vec<ScoredTag>,
    pub text: String,
}

impl TaggingResult {
    /// Thresholds, orders, filters and renders one score row.
    pub fn from_scores(
        vocabulary: &TagVocabulary,
        scores: &[f32],
        config: &TaggingConfig,
    ) -> Result<Self> {
        vocabulary.check_scores(scores)?;

        // Strict comparison: a score equal to the threshold is dropped.
        let pick = move |range: std::ops::Range<usize>, threshold: f32| {
            range
                .filter(move |&i| scores[i] > threshold)
                .map(move |i| ScoredTag::new(vocabulary.tags()[i].name(), scores[i]))
        };

        let tags: Vec<ScoredTag> = pick(vocabulary.character_range(), config.character_threshold)
            .chain(pick(vocabulary.general_range(), config.general_threshold))
            .filter(|tag| !config.is_excluded(&tag.name))
            .collect();

        let text = render_tags(&tags, config.trailing_comma);
        Ok(Self { tags, text })
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.tags.iter().map(|t| t.name.as_str())
    }
}

/// Escapes parentheses so the names survive prompt syntax.
pub fn escape_tag(name: &str) -> String {
    name.replace('(', "\\(").replace(')', "\\)")
}

/// Joins tags with `", "`, or terminates every tag with `", "` in
/// trailing-comma mode.
pub fn render_tags(tags: &[ScoredTag], trailing_comma: bool) -> String {
    if trailing_comma {
        tags.iter()
            .map(|t| format!("{}, ", escape_tag(&t.name)))
            .collect()
    } else {
        tags.iter().map(|t| escape_tag(&t.name)).join(", ")
    }
}

/// An end-to-end pipeline for image tagging.
#[derive(Debug)]
pub struct TaggingPipeline {
    /// The underlying ONNX model for tagging.
    pub model: TaggerModel,
    /// The preprocessor for preparing images.
    pub preprocessor: ImagePreprocessor,
    /// The set of labels the model can predict.
    pub vocabulary: TagVocabulary,
    config: TaggingConfig,
}

impl TaggingPipeline {
    /// Creates a new `TaggingPipeline` from already loaded parts.
    pub fn new(model: TaggerModel, vocabulary: TagVocabulary, config: TaggingConfig) -> Self {
        let preprocessor = ImagePreprocessor::new(model.input_size());
        Self {
            model,
            preprocessor,
            vocabulary,
            config,
        }
    }

    /// Loads the model named by `config.model` from `models_dir`.
    ///
    /// The model file is checked before the tag listing, so a missing model
    /// is reported as such even when its listing is missing too.
    pub fn load<P: AsRef<Path>>(
        models_dir: P,
        config: TaggingConfig,
        backends: &[Backend],
    ) -> Result<Self> {
        config.validate()?;
        let files = ModelFiles::new(models_dir, &config.model);
        let model = TaggerModel::load(&files, backends)?;
        let vocabulary = TagVocabulary::load(files.tags_path(), config.replace_underscore)?;
        if let Some(output_size) = model.output_size() {
            vocabulary.check_output_size(output_size)?;
        }
        Ok(Self::new(model, vocabulary, config))
    }

    pub fn config(&self) -> &TaggingConfig {
        &self.config
    }

    /// Tags a single image.
    pub fn predict(&mut self, image: &DynamicImage) -> Result<TaggingResult> {
        let tensor = self.preprocessor.process(image)?;
        let scores = self.model.predict(tensor)?;
        let result = TaggingResult::from_scores(&self.vocabulary, &scores, &self.config)?;
        tracing::debug!(count = result.tags.len(), "tagging complete");
        Ok(result)
    }

    /// Opens and tags the image at `path`.
    pub fn predict_path<P: AsRef<Path>>(&mut self, path: P) -> Result<TaggingResult> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(TaggerError::NotFound(path.to_path_buf()));
        }
        let image = image::open(path)?;
        self.predict(&image)
    }
}
