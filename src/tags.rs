use crate::error::{Result, TaggerError};
use std::path::Path;

/// Tag category, from the third column of the listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagCategory {
    General,
    Character,
    /// Ratings, meta tags and anything else the tagger does not report.
    Other,
}

impl TagCategory {
    pub fn from_code(code: &str) -> Self {
        match code.trim() {
            "0" => TagCategory::General,
            "4" => TagCategory::Character,
            _ => TagCategory::Other,
        }
    }
}

/// Each record in the CSV file
#[derive(Debug, Clone, PartialEq)]
pub struct Tag {
    name: String,
    category: TagCategory,
}

impl Tag {
    pub fn new(name: impl Into<String>, category: TagCategory) -> Self {
        Self {
            name: name.into(),
            category,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn category(&self) -> TagCategory {
        self.category
    }
}

/// The ordered tag listing paired with a model's output row.
#[derive(Debug, Clone)]
pub struct TagVocabulary {
    tags: Vec<Tag>,
    general_start: usize,
    character_start: usize,
}

impl TagVocabulary {
    /// Builds a vocabulary and validates the category layout.
    ///
    /// General entries must form one contiguous run, and every character
    /// entry must come after it. A listing without character entries has an
    /// empty character range.
    pub fn new(tags: Vec<Tag>) -> Result<Self> {
        let general_start = tags
            .iter()
            .position(|t| t.category == TagCategory::General)
            .ok_or_else(|| {
                TaggerError::Configuration("tag listing has no general entries".to_string())
            })?;
        let character_start = tags
            .iter()
            .position(|t| t.category == TagCategory::Character)
            .unwrap_or(tags.len());

        if character_start < general_start {
            return Err(TaggerError::Configuration(format!(
                "character tags (from index {}) precede general tags (from index {})",
                character_start, general_start
            )));
        }
        if let Some(i) = (general_start..character_start)
            .find(|&i| tags[i].category != TagCategory::General)
        {
            return Err(TaggerError::Configuration(format!(
                "general tags are not contiguous: '{}' at index {} interrupts the run",
                tags[i].name, i
            )));
        }
        if let Some(i) =
            (character_start..tags.len()).find(|&i| tags[i].category == TagCategory::General)
        {
            return Err(TaggerError::Configuration(format!(
                "general tag '{}' at index {} follows the character tags",
                tags[i].name, i
            )));
        }

        Ok(Self {
            tags,
            general_start,
            character_start,
        })
    }

    /// Load from the local CSV file.
    ///
    /// Columns are read by position: `[0]` id (ignored), `[1]` name,
    /// `[2]` category code. The header row is skipped.
    pub fn load<P: AsRef<Path>>(csv_path: P, replace_underscore: bool) -> Result<Self> {
        let path = csv_path.as_ref();
        if !path.exists() {
            return Err(TaggerError::Configuration(format!(
                "no tag listing found for model at {}",
                path.display()
            )));
        }

        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_path(path)?;

        let mut tags = Vec::new();
        for (i, record) in reader.records().enumerate() {
            let record = record?;
            let (Some(name), Some(code)) = (record.get(1), record.get(2)) else {
                return Err(TaggerError::Configuration(format!(
                    "tag listing row {} has {} columns, expected at least 3",
                    i + 1,
                    record.len()
                )));
            };
            let name = if replace_underscore {
                name.replace('_', " ")
            } else {
                name.to_string()
            };
            tags.push(Tag::new(name, TagCategory::from_code(code)));
        }

        let vocabulary = Self::new(tags)?;
        tracing::debug!(
            path = %path.display(),
            len = vocabulary.len(),
            general_start = vocabulary.general_start,
            character_start = vocabulary.character_start,
            "loaded tag listing"
        );
        Ok(vocabulary)
    }

    pub fn len(&self) -> usize {
        self.tags.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }

    pub fn tags(&self) -> &[Tag] {
        &self.tags
    }

    pub fn general_start(&self) -> usize {
        self.general_start
    }

    pub fn character_start(&self) -> usize {
        self.character_start
    }

    /// Index ranges of the general and character tags.
    pub fn general_range(&self) -> std::ops::Range<usize> {
        self.general_start..self.character_start
    }

    pub fn character_range(&self) -> std::ops::Range<usize> {
        self.character_start..self.tags.len()
    }

    /// Checks that a score row lines up with the vocabulary.
    pub fn check_scores(&self, scores: &[f32]) -> Result<()> {
        self.check_output_size(scores.len())
    }

    /// Checks a model's output width against the listing.
    pub fn check_output_size(&self, output_size: usize) -> Result<()> {
        if output_size != self.tags.len() {
            return Err(TaggerError::Configuration(format!(
                "model produces {} scores but the tag listing has {} entries",
                output_size,
                self.tags.len()
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::fs;

    fn write_csv(dir: &Path, body: &str) -> std::path::PathBuf {
        let path = dir.join("model.csv");
        fs::write(&path, body).unwrap();
        path
    }

    #[test]
    fn test_load_partitions_ranges() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_csv(
            dir.path(),
            "tag_id,name,category,count\n\
             9999999,general,9,807\n\
             9999998,sensitive,9,1\n\
             470575,1girl,0,4225150\n\
             212816,solo,0,3495142\n\
             1,hatsune_miku,4,100\n\
             2,kaname_madoka,4,50\n",
        );
        let vocab = TagVocabulary::load(&path, false).unwrap();
        assert_eq!(vocab.len(), 6);
        assert_eq!(vocab.general_range(), 2..4);
        assert_eq!(vocab.character_range(), 4..6);
        assert_eq!(vocab.tags()[4].name(), "hatsune_miku");
    }

    #[test]
    fn test_load_replaces_underscores() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_csv(dir.path(), "id,name,category\n1,long_hair,0\n2,hatsune_miku,4\n");
        let vocab = TagVocabulary::load(&path, true).unwrap();
        assert_eq!(vocab.tags()[0].name(), "long hair");
        assert_eq!(vocab.tags()[1].name(), "hatsune miku");
    }

    #[test]
    fn test_missing_listing_is_configuration_error() {
        let err = TagVocabulary::load("models/nope.csv", false).unwrap_err();
        assert!(matches!(err, TaggerError::Configuration(_)));
    }

    #[test]
    fn test_interleaved_categories_rejected() {
        let tags = vec![
            Tag::new("1girl", TagCategory::General),
            Tag::new("hatsune_miku", TagCategory::Character),
            Tag::new("solo", TagCategory::General),
        ];
        let err = TagVocabulary::new(tags).unwrap_err();
        assert!(matches!(err, TaggerError::Configuration(_)));
    }

    #[test]
    fn test_general_run_interrupted_rejected() {
        let tags = vec![
            Tag::new("1girl", TagCategory::General),
            Tag::new("explicit", TagCategory::Other),
            Tag::new("solo", TagCategory::General),
        ];
        assert!(TagVocabulary::new(tags).is_err());
    }

    #[test]
    fn test_character_before_general_rejected() {
        let tags = vec![
            Tag::new("hatsune_miku", TagCategory::Character),
            Tag::new("1girl", TagCategory::General),
        ];
        assert!(TagVocabulary::new(tags).is_err());
    }

    #[test]
    fn test_no_character_tags_gives_empty_range() {
        let tags = vec![
            Tag::new("safe", TagCategory::Other),
            Tag::new("1girl", TagCategory::General),
        ];
        let vocab = TagVocabulary::new(tags).unwrap();
        assert_eq!(vocab.general_range(), 1..2);
        assert!(vocab.character_range().is_empty());
    }

    #[test]
    fn test_check_scores_length_mismatch() {
        let vocab = TagVocabulary::new(vec![Tag::new("1girl", TagCategory::General)]).unwrap();
        assert!(vocab.check_scores(&[0.5]).is_ok());
        assert!(matches!(
            vocab.check_scores(&[0.5, 0.1]),
            Err(TaggerError::Configuration(_))
        ));
    }

    #[test]
    fn test_check_output_size_against_listing() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_csv(
            dir.path(),
            "tag_id,name,category,count\n0,general,9,1\n1,1girl,0,1\n2,hatsune_miku,4,1\n",
        );
        let vocab = TagVocabulary::load(path, false).unwrap();
        assert!(vocab.check_output_size(3).is_ok());
        match vocab.check_output_size(9083) {
            Err(TaggerError::Configuration(msg)) => {
                assert!(msg.contains("9083") && msg.contains("3 entries"))
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }
}
