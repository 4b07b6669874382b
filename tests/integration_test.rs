use aitag::prelude::*;
use std::fs;
use tempfile::tempdir;

mod common;
use common::{setup, write_tag_listing, TEST_IMAGE};

#[test]
fn test_colors_of_test_image() {
    setup();
    let image = image::open(TEST_IMAGE).unwrap();
    let colors = dominant_colors(&image, 5).unwrap();

    // A single-color image fills one cluster.
    assert_eq!(colors[0].color, "#ff0000");
    assert_eq!(colors[0].percentage, 100.0);
    assert!(colors[1..].iter().all(|c| c.percentage == 0.0));
}

#[test]
fn test_plain_image_has_no_metadata() {
    setup();
    assert!(read_generation_metadata(TEST_IMAGE).unwrap().is_none());
}

#[test]
fn test_model_directory_listing() {
    let temp_dir = tempdir().unwrap();
    for name in ["wd-v1-4-vit-tagger-v2", "wd-v1-4-moat-tagger-v2"] {
        fs::write(temp_dir.path().join(format!("{}.onnx", name)), b"x").unwrap();
        write_tag_listing(temp_dir.path(), name, &[("1girl", "0")]);
    }
    fs::write(temp_dir.path().join("half-downloaded.onnx"), b"x").unwrap();

    assert_eq!(
        available_models(temp_dir.path()).unwrap(),
        vec!["wd-v1-4-moat-tagger-v2", "wd-v1-4-vit-tagger-v2"]
    );
    assert!(matches!(
        available_models(temp_dir.path().join("absent")),
        Err(TaggerError::NotFound(_))
    ));
}

#[test]
fn test_config_file_roundtrip_into_pipeline_options() {
    let temp_dir = tempdir().unwrap();
    let path = temp_dir.path().join("config.json");
    fs::write(
        &path,
        r#"{"model": "wd-v1-4-vit-tagger-v2", "threshold": 0.5, "exclude_tags": "Solo, 1girl", "trailing_comma": true}"#,
    )
    .unwrap();

    let config = TaggingConfig::load(&path).unwrap();
    assert_eq!(config.model, "wd-v1-4-vit-tagger-v2");
    assert_eq!(config.general_threshold, 0.5);
    assert_eq!(config.character_threshold, 0.85);
    assert!(config.is_excluded("SOLO"));
    assert!(config.trailing_comma);

    let vocabulary = TagVocabulary::new(vec![
        Tag::new("1girl", TagCategory::General),
        Tag::new("solo", TagCategory::General),
        Tag::new("smile", TagCategory::General),
    ])
    .unwrap();
    let result = TaggingResult::from_scores(&vocabulary, &[0.9, 0.9, 0.6], &config).unwrap();
    assert_eq!(result.text, "smile, ");
}
