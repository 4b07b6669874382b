use crate::error::{Result, TaggerError};
use serde::{Deserialize, Deserializer, Serialize};
use std::{collections::BTreeSet, fs, path::Path};

pub const DEFAULT_MODEL: &str = "wd-v1-4-moat-tagger-v2";
pub const DEFAULT_GENERAL_THRESHOLD: f32 = 0.35;
pub const DEFAULT_CHARACTER_THRESHOLD: f32 = 0.85;

/// Options for one tagging invocation.
///
/// The value is immutable once handed to a pipeline; build a new one to
/// change thresholds or formatting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TaggingConfig {
    pub model: String,
    #[serde(alias = "threshold")]
    pub general_threshold: f32,
    pub character_threshold: f32,
    /// Lower-cased tag names removed from the output.
    #[serde(deserialize_with = "deserialize_exclusions")]
    pub exclude_tags: BTreeSet<String>,
    pub replace_underscore: bool,
    pub trailing_comma: bool,
}

impl Default for TaggingConfig {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            general_threshold: DEFAULT_GENERAL_THRESHOLD,
            character_threshold: DEFAULT_CHARACTER_THRESHOLD,
            exclude_tags: BTreeSet::new(),
            replace_underscore: false,
            trailing_comma: false,
        }
    }
}

impl TaggingConfig {
    pub fn load<P: AsRef<Path>>(config_path: P) -> Result<Self> {
        let path = config_path.as_ref();
        if !path.exists() {
            return Err(TaggerError::NotFound(path.to_path_buf()));
        }
        let json = fs::read_to_string(path)?;
        let config: TaggingConfig = serde_json::from_str(&json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_thresholds(mut self, general: f32, character: f32) -> Self {
        self.general_threshold = general;
        self.character_threshold = character;
        self
    }

    /// Adds a comma-separated list of tags to the exclusion set.
    pub fn with_exclusions(mut self, tags: &str) -> Self {
        self.exclude_tags.extend(parse_exclusions(tags));
        self
    }

    pub fn with_replace_underscore(mut self, replace: bool) -> Self {
        self.replace_underscore = replace;
        self
    }

    pub fn with_trailing_comma(mut self, trailing: bool) -> Self {
        self.trailing_comma = trailing;
        self
    }

    pub fn is_excluded(&self, tag: &str) -> bool {
        !self.exclude_tags.is_empty() && self.exclude_tags.contains(&tag.to_lowercase())
    }

    pub fn validate(&self) -> Result<()> {
        if self.model.trim().is_empty() {
            return Err(TaggerError::Configuration(
                "model identifier must not be empty".to_string(),
            ));
        }
        for (name, value) in [
            ("general_threshold", self.general_threshold),
            ("character_threshold", self.character_threshold),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(TaggerError::Configuration(format!(
                    "{} must be within [0, 1], got {}",
                    name, value
                )));
            }
        }
        Ok(())
    }
}

fn parse_exclusions(tags: &str) -> impl Iterator<Item = String> + '_ {
    tags.split(',')
        .map(|s| s.trim().to_lowercase())
        .filter(|s| !s.is_empty())
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Exclusions {
    Joined(String),
    List(Vec<String>),
}

fn deserialize_exclusions<'de, D>(deserializer: D) -> std::result::Result<BTreeSet<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Exclusions::deserialize(deserializer)? {
        Exclusions::Joined(s) => parse_exclusions(&s).collect(),
        Exclusions::List(v) => v
            .iter()
            .map(|s| s.trim().to_lowercase())
            .filter(|s| !s.is_empty())
            .collect(),
    })
}
