//! HuggingFace tokenizer directory
//!
//! Only the files a WordPiece tokenizer needs are read:
//! `tokenizer_config.json` (required), `vocab.txt` (required) and
//! `special_tokens_map.json` (optional, fills tokens the config leaves out).

use crate::{ComposerError, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

pub const TOKENIZER_CONFIG_FILE: &str = "tokenizer_config.json";
pub const VOCAB_FILE: &str = "vocab.txt";
pub const SPECIAL_TOKENS_FILE: &str = "special_tokens_map.json";

/// Values above this are HuggingFace's "no limit" sentinel (int(1e30))
const UNBOUNDED_MODEL_MAX_LENGTH: f64 = 1e15;

/// A special token, either a bare string or an `AddedToken` object
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum SpecialToken {
    Plain(String),
    Added { content: String },
}

impl SpecialToken {
    pub fn content(&self) -> &str {
        match self {
            SpecialToken::Plain(s) => s,
            SpecialToken::Added { content } => content,
        }
    }
}

fn default_true() -> bool {
    true
}

/// Subset of `tokenizer_config.json` used to build the graph
#[derive(Debug, Clone, Deserialize)]
pub struct TokenizerConfig {
    #[serde(default)]
    pub tokenizer_class: Option<String>,
    #[serde(default = "default_true")]
    pub do_lower_case: bool,
    /// `None` follows `do_lower_case`
    #[serde(default)]
    pub strip_accents: Option<bool>,
    #[serde(default = "default_true")]
    pub tokenize_chinese_chars: bool,
    #[serde(default)]
    pub model_max_length: Option<f64>,
    #[serde(default)]
    pub unk_token: Option<SpecialToken>,
    #[serde(default)]
    pub sep_token: Option<SpecialToken>,
    #[serde(default)]
    pub pad_token: Option<SpecialToken>,
    #[serde(default)]
    pub cls_token: Option<SpecialToken>,
    #[serde(default)]
    pub mask_token: Option<SpecialToken>,
}

impl Default for TokenizerConfig {
    fn default() -> Self {
        Self {
            tokenizer_class: None,
            do_lower_case: true,
            strip_accents: None,
            tokenize_chinese_chars: true,
            model_max_length: None,
            unk_token: None,
            sep_token: None,
            pad_token: None,
            cls_token: None,
            mask_token: None,
        }
    }
}

impl TokenizerConfig {
    /// Finite `model_max_length`, if declared
    pub fn model_max_length(&self) -> Option<usize> {
        self.model_max_length
            .filter(|v| v.is_finite() && *v > 0.0 && *v < UNBOUNDED_MODEL_MAX_LENGTH)
            .map(|v| v as usize)
    }
}

#[derive(Debug, Default, Deserialize)]
struct SpecialTokensMap {
    unk_token: Option<SpecialToken>,
    sep_token: Option<SpecialToken>,
    pad_token: Option<SpecialToken>,
    cls_token: Option<SpecialToken>,
    mask_token: Option<SpecialToken>,
}

/// Special tokens with BERT defaults applied
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpecialTokens {
    pub unk: String,
    pub sep: String,
    pub pad: String,
    pub cls: String,
    pub mask: String,
}

/// Contents of a tokenizer directory
#[derive(Debug, Clone)]
pub struct TokenizerFiles {
    pub dir: PathBuf,
    pub config: TokenizerConfig,
    /// Vocabulary in id order
    pub vocab: Vec<String>,
}

impl TokenizerFiles {
    pub fn load(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();

        let config_path = dir.join(TOKENIZER_CONFIG_FILE);
        let text = fs::read_to_string(&config_path).map_err(|e| {
            ComposerError::InvalidTokenizer(format!("{}: {}", config_path.display(), e))
        })?;
        let mut config: TokenizerConfig = serde_json::from_str(&text)?;

        let special_path = dir.join(SPECIAL_TOKENS_FILE);
        if special_path.exists() {
            let map: SpecialTokensMap = serde_json::from_str(&fs::read_to_string(&special_path)?)?;
            config.unk_token = config.unk_token.or(map.unk_token);
            config.sep_token = config.sep_token.or(map.sep_token);
            config.pad_token = config.pad_token.or(map.pad_token);
            config.cls_token = config.cls_token.or(map.cls_token);
            config.mask_token = config.mask_token.or(map.mask_token);
        }

        let vocab_path = dir.join(VOCAB_FILE);
        let vocab_text = fs::read_to_string(&vocab_path).map_err(|e| {
            ComposerError::InvalidTokenizer(format!("{}: {}", vocab_path.display(), e))
        })?;
        let vocab: Vec<String> = vocab_text
            .lines()
            .map(|line| line.trim_end_matches('\r').to_string())
            .collect();
        if vocab.iter().all(|t| t.is_empty()) {
            return Err(ComposerError::InvalidTokenizer(format!(
                "{} is empty",
                vocab_path.display()
            )));
        }

        tracing::debug!(
            "Loaded tokenizer from {} ({} vocab entries)",
            dir.display(),
            vocab.len()
        );

        Ok(Self { dir, config, vocab })
    }

    pub fn special_tokens(&self) -> SpecialTokens {
        let pick = |token: &Option<SpecialToken>, default: &str| {
            token
                .as_ref()
                .map(|t| t.content().to_string())
                .unwrap_or_else(|| default.to_string())
        };
        SpecialTokens {
            unk: pick(&self.config.unk_token, "[UNK]"),
            sep: pick(&self.config.sep_token, "[SEP]"),
            pad: pick(&self.config.pad_token, "[PAD]"),
            cls: pick(&self.config.cls_token, "[CLS]"),
            mask: pick(&self.config.mask_token, "[MASK]"),
        }
    }

    /// Whether `token` is a vocabulary entry
    pub fn contains(&self, token: &str) -> bool {
        self.vocab.iter().any(|t| t == token)
    }
}
