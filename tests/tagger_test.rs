use aitag::{
    config::TaggingConfig,
    file::{ModelFiles, MODEL_ROOT},
    pipeline::TaggingPipeline,
    processor::{ImagePreprocessor, ImageProcessor},
    tagger::{Backend, TaggerModel},
    tags::TagVocabulary,
};
use std::path::PathBuf;

mod common;
use common::{setup, TEST_IMAGE};

/// Local model files, or `None` when they have not been downloaded.
fn local_model() -> Option<ModelFiles> {
    let dir = std::env::var_os("AITAG_MODELS_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(MODEL_ROOT));
    let files = ModelFiles::new(dir, &TaggingConfig::default().model);
    if files.model_path().is_file() && files.tags_path().is_file() {
        Some(files)
    } else {
        eprintln!("skipping: no model at {}", files.model_path().display());
        None
    }
}

#[test]
fn test_predict() {
    setup();
    let Some(files) = local_model() else { return };
    let mut model = TaggerModel::load(&files, &[Backend::Cpu]).unwrap();
    assert_eq!(model.backend(), Backend::Cpu);

    let vocabulary = TagVocabulary::load(files.tags_path(), false).unwrap();
    let processor = ImagePreprocessor::new(model.input_size());
    let image = image::open(TEST_IMAGE).unwrap();
    let predictions = model.predict(processor.process(&image).unwrap()).unwrap();

    assert_eq!(predictions.len(), vocabulary.len());
    assert!(predictions.iter().all(|p| (0.0..=1.0).contains(p)));
}

#[test]
fn test_pipeline_is_deterministic() {
    setup();
    let Some(files) = local_model() else { return };
    let mut pipeline =
        TaggingPipeline::load(files.dir(), TaggingConfig::default(), &Backend::default_preferences())
            .unwrap();

    let first = pipeline.predict_path(TEST_IMAGE).unwrap();
    let second = pipeline.predict_path(TEST_IMAGE).unwrap();
    assert_eq!(first, second);
}
