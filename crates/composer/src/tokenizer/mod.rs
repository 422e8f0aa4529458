//! Preprocessing graph generation
//!
//! A preprocessing graph turns raw strings into the integer tensors a
//! transformer expects. Generators return `Ok(None)` for a tokenizer they do
//! not know how to express as a graph; the composer treats that as fatal.

pub mod bert;
pub mod source;

pub use bert::{TokenizerKind, CONTRIB_DOMAIN, CONTRIB_OPSET_VERSION, PREPROCESSING_IR_VERSION};
pub use source::{SpecialToken, TokenizerConfig, TokenizerFiles};

use crate::proto::{ModelProto, StringStringEntryProto};
use crate::{ComposerError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Default maximum sequence length
pub const DEFAULT_MAX_LENGTH: usize = 128;

/// How sequences are padded inside a batch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Padding {
    /// Pad each batch to its own longest sequence
    #[default]
    Longest,
    /// Pad every sequence to `max_length`; the BertTokenizer graph cannot express it
    MaxLength,
}

impl std::str::FromStr for Padding {
    type Err = ComposerError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().replace('-', "_").as_str() {
            "longest" | "dynamic" | "true" => Ok(Padding::Longest),
            "max_length" | "fixed" => Ok(Padding::MaxLength),
            other => Err(ComposerError::ConfigError(format!(
                "Unknown padding '{}' (expected 'longest' or 'max_length')",
                other
            ))),
        }
    }
}

/// Tokenization options baked into the preprocessing graph
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreprocessingOptions {
    pub max_length: usize,
    pub padding: Padding,
    pub truncation: bool,
}

impl Default for PreprocessingOptions {
    fn default() -> Self {
        Self {
            max_length: DEFAULT_MAX_LENGTH,
            padding: Padding::Longest,
            truncation: true,
        }
    }
}

/// Produces the preprocessing model for a tokenizer
pub trait PreprocessingGenerator {
    /// Generate the graph, or `None` when the tokenizer is not supported
    fn generate(&self, options: &PreprocessingOptions) -> Result<Option<ModelProto>>;
}

/// Generator backed by a HuggingFace tokenizer directory
#[derive(Debug, Clone)]
pub struct HfPreprocessingGenerator {
    files: TokenizerFiles,
    class_override: Option<String>,
    source: Option<String>,
}

/// Metadata key recording which tokenizer a preprocessing model was built from
pub const TOKENIZER_SOURCE_KEY: &str = "tokenizer_source";

impl HfPreprocessingGenerator {
    pub fn new(files: TokenizerFiles) -> Self {
        Self {
            files,
            class_override: None,
            source: None,
        }
    }

    /// Load the tokenizer files from `dir`
    pub fn from_dir(dir: impl AsRef<Path>) -> Result<Self> {
        Ok(Self::new(TokenizerFiles::load(dir)?))
    }

    /// Force the tokenizer class instead of reading it from `tokenizer_config.json`
    pub fn with_class(mut self, class: Option<String>) -> Self {
        self.class_override = class;
        self
    }

    /// Tokenizer identifier recorded in the model's `tokenizer_source` metadata
    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    /// Effective tokenizer class name
    pub fn class_name(&self) -> Option<&str> {
        self.class_override
            .as_deref()
            .or(self.files.config.tokenizer_class.as_deref())
    }
}

impl PreprocessingGenerator for HfPreprocessingGenerator {
    fn generate(&self, options: &PreprocessingOptions) -> Result<Option<ModelProto>> {
        let Some(class) = self.class_name() else {
            tracing::warn!("Tokenizer in {} declares no tokenizer_class", self.files.dir.display());
            return Ok(None);
        };

        let Some(kind) = TokenizerKind::from_class(class) else {
            tracing::warn!("No preprocessing graph available for tokenizer class '{}'", class);
            return Ok(None);
        };

        if options.padding != Padding::Longest {
            tracing::warn!(
                "{:?} padding is not supported by the {} preprocessing graph",
                options.padding,
                class
            );
            return Ok(None);
        }

        if options.max_length == 0 {
            return Err(ComposerError::InvalidTokenizer(
                "max_length must be greater than zero".to_string(),
            ));
        }

        if let Some(limit) = self.files.config.model_max_length() {
            if options.max_length > limit {
                tracing::warn!(
                    "max_length {} exceeds the tokenizer's model_max_length {}",
                    options.max_length,
                    limit
                );
            }
        }

        let mut model = bert::build_model(kind, &self.files, options)?;
        if let Some(source) = &self.source {
            model.metadata_props.push(StringStringEntryProto {
                key: TOKENIZER_SOURCE_KEY.to_string(),
                value: source.clone(),
            });
        }
        Ok(Some(model))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn tokenizer_dir(class: &str) -> TempDir {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join("tokenizer_config.json"),
            format!(
                r#"{{"tokenizer_class": "{}", "do_lower_case": true, "model_max_length": 512}}"#,
                class
            ),
        )
        .unwrap();
        fs::write(
            dir.path().join("vocab.txt"),
            "[PAD]\n[UNK]\n[CLS]\n[SEP]\n[MASK]\nhello\nworld\n",
        )
        .unwrap();
        dir
    }

    #[test]
    fn test_default_options() {
        let options = PreprocessingOptions::default();
        assert_eq!(options.max_length, 128);
        assert_eq!(options.padding, Padding::Longest);
        assert!(options.truncation);
    }

    #[test]
    fn test_padding_from_str() {
        assert_eq!("longest".parse::<Padding>().unwrap(), Padding::Longest);
        assert_eq!("max-length".parse::<Padding>().unwrap(), Padding::MaxLength);
        assert!("sideways".parse::<Padding>().is_err());
    }

    #[test]
    fn test_bert_generates_model() {
        let dir = tokenizer_dir("BertTokenizer");
        let generator = HfPreprocessingGenerator::from_dir(dir.path()).unwrap();
        let model = generator
            .generate(&PreprocessingOptions::default())
            .unwrap()
            .expect("bert is supported");

        let outputs: Vec<&str> = model
            .graph
            .as_ref()
            .unwrap()
            .output
            .iter()
            .map(|o| o.name.as_str())
            .collect();
        assert_eq!(outputs, vec!["input_ids", "token_type_ids", "attention_mask"]);
    }

    #[test]
    fn test_unknown_class_yields_none() {
        let dir = tokenizer_dir("GPT2Tokenizer");
        let generator = HfPreprocessingGenerator::from_dir(dir.path()).unwrap();
        assert!(generator
            .generate(&PreprocessingOptions::default())
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_class_override_wins() {
        let dir = tokenizer_dir("GPT2Tokenizer");
        let generator = HfPreprocessingGenerator::from_dir(dir.path())
            .unwrap()
            .with_class(Some("BertTokenizer".to_string()));
        assert_eq!(generator.class_name(), Some("BertTokenizer"));
        assert!(generator
            .generate(&PreprocessingOptions::default())
            .unwrap()
            .is_some());
    }

    #[test]
    fn test_source_recorded_as_identifier() {
        let dir = tokenizer_dir("BertTokenizer");
        let generator = HfPreprocessingGenerator::from_dir(dir.path())
            .unwrap()
            .with_source("sentence-transformers/all-MiniLM-L6-v2");
        let model = generator
            .generate(&PreprocessingOptions::default())
            .unwrap()
            .unwrap();

        assert_eq!(model.metadata_props.len(), 1);
        assert_eq!(model.metadata_props[0].key, TOKENIZER_SOURCE_KEY);
        assert_eq!(
            model.metadata_props[0].value,
            "sentence-transformers/all-MiniLM-L6-v2"
        );
        let dir_text = dir.path().display().to_string();
        assert!(model.metadata_props.iter().all(|m| !m.value.contains(&dir_text)));
    }

    #[test]
    fn test_fixed_padding_yields_none() {
        let dir = tokenizer_dir("BertTokenizer");
        let generator = HfPreprocessingGenerator::from_dir(dir.path()).unwrap();
        let options = PreprocessingOptions {
            padding: Padding::MaxLength,
            ..Default::default()
        };
        assert!(generator.generate(&options).unwrap().is_none());
    }

    #[test]
    fn test_zero_max_length_rejected() {
        let dir = tokenizer_dir("BertTokenizer");
        let generator = HfPreprocessingGenerator::from_dir(dir.path()).unwrap();
        let options = PreprocessingOptions {
            max_length: 0,
            ..Default::default()
        };
        assert!(matches!(
            generator.generate(&options),
            Err(ComposerError::InvalidTokenizer(_))
        ));
    }
}
