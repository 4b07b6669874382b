use aitag::tags::{Tag, TagCategory, TagVocabulary};
use image::{ImageBuffer, Rgb};
use rand::{rngs::StdRng, Rng, SeedableRng};
use std::{
    fs,
    path::{Path, PathBuf},
    sync::Once,
};

#[allow(dead_code)]
static SETUP: Once = Once::new();

#[allow(dead_code)]
pub const TEST_IMAGE: &str = "tests/assets/test_image.png";

#[allow(dead_code)]
fn generate_test_image(path: &Path) {
    // Wide red strip: exercises padding and channel order.
    let img = ImageBuffer::from_pixel(800, 200, Rgb([255u8, 0, 0]));
    img.save(path).unwrap();
}

#[allow(dead_code)]
pub fn setup() {
    SETUP.call_once(|| {
        let assets_dir = Path::new("tests/assets");
        if !assets_dir.exists() {
            fs::create_dir_all(assets_dir).unwrap();
        }

        let image_path = Path::new(TEST_IMAGE);
        if !image_path.exists() {
            generate_test_image(image_path);
        }
    });
}

/// Writes a WD14-style tag listing: ratings, then general, then character.
#[allow(dead_code)]
pub fn write_tag_listing(dir: &Path, name: &str, rows: &[(&str, &str)]) -> PathBuf {
    let path = dir.join(format!("{}.csv", name));
    let mut body = String::from("tag_id,name,category,count\n");
    for (i, (tag, code)) in rows.iter().enumerate() {
        body.push_str(&format!("{},{},{},{}\n", i, tag, code, 100 - i));
    }
    fs::write(&path, body).unwrap();
    path
}

/// A vocabulary of `general` general tags followed by `character` character
/// tags, with names like `general_3` and `character_(7)`.
#[allow(dead_code)]
pub fn synthetic_vocabulary(general: usize, character: usize) -> TagVocabulary {
    let tags = (0..general)
        .map(|i| Tag::new(format!("general_{}", i), TagCategory::General))
        .chain((0..character).map(|i| Tag::new(format!("character_({})", i), TagCategory::Character)))
        .collect();
    TagVocabulary::new(tags).unwrap()
}

#[allow(dead_code)]
pub fn random_scores(rng: &mut StdRng, len: usize) -> Vec<f32> {
    (0..len).map(|_| rng.random::<f32>()).collect()
}

#[allow(dead_code)]
pub fn seeded_rng(seed: u64) -> StdRng {
    StdRng::seed_from_u64(seed)
}
