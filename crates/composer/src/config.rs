//! Configuration file support
//!
//! Every fixed path and identifier of the bake step can be set from a TOML
//! file. CLI arguments override file values; anything left unset falls back
//! to the defaults below, which reproduce the stock MiniLM build.
//!
//! # Config File Locations
//!
//! Searched in order when no `--config` is given:
//! 1. `./sentinel-onnx.toml`
//! 2. `./.sentinel-onnx.toml`
//! 3. `~/.config/sentinel/onnx-composer.toml`
//!
//! # Example Config File
//!
//! ```toml
//! [model]
//! input = "engine/model/model_quint8_avx2.onnx"
//! output_name = "sentinel-minilm-with-tokenizer.onnx"
//!
//! [tokenizer]
//! id = "sentence-transformers/all-MiniLM-L6-v2"
//! max_length = 128
//! padding = "longest"
//! truncation = true
//!
//! [compose]
//! version_policy = "relabel"
//! max_ir_gap = 3
//!
//! [[compose.connections]]
//! from = "input_ids"
//! to = "input_ids"
//! ```

use crate::compose::io_map::Connection;
use crate::compose::version::{VersionPolicy, DEFAULT_MAX_IR_GAP};
use crate::tokenizer::{Padding, PreprocessingOptions, DEFAULT_MAX_LENGTH};
use crate::{ComposerError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default base model path, relative to the working directory
pub const DEFAULT_INPUT: &str = "engine/model/model_quint8_avx2.onnx";

/// Default merged model file name, written next to the base model
pub const DEFAULT_OUTPUT_NAME: &str = "sentinel-minilm-with-tokenizer.onnx";

/// Default tokenizer identifier on the HuggingFace Hub
pub const DEFAULT_TOKENIZER: &str = "sentence-transformers/all-MiniLM-L6-v2";

/// Default hub revision
pub const DEFAULT_REVISION: &str = "main";

/// `[model]` section
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ModelSection {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input: Option<PathBuf>,
    /// File name of the merged model inside the input's directory
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_name: Option<String>,
    /// Full output path; wins over `output_name`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<PathBuf>,
}

/// `[tokenizer]` section
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TokenizerSection {
    /// Hub repo id or local directory
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Force the tokenizer class (e.g. "BertTokenizer")
    #[serde(skip_serializing_if = "Option::is_none")]
    pub class: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_length: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub padding: Option<Padding>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub truncation: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub revision: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache_dir: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub offline: Option<bool>,
}

/// `[compose]` section
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ComposeSection {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version_policy: Option<VersionPolicy>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_ir_gap: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prefix_preprocessing: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prefix_base: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub graph_name: Option<String>,
    /// Explicit connection table; replaces name matching when non-empty
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub connections: Vec<Connection>,
}

/// Configuration loaded from a TOML file; all fields optional
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ComposerConfig {
    #[serde(default)]
    pub model: ModelSection,
    #[serde(default)]
    pub tokenizer: TokenizerSection,
    #[serde(default)]
    pub compose: ComposeSection,
}

/// Values supplied on the command line
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub input: Option<PathBuf>,
    pub output: Option<PathBuf>,
    pub tokenizer: Option<String>,
    pub tokenizer_class: Option<String>,
    pub max_length: Option<usize>,
    pub padding: Option<Padding>,
    pub truncation: Option<bool>,
    pub revision: Option<String>,
    pub cache_dir: Option<PathBuf>,
    pub offline: Option<bool>,
    pub version_policy: Option<VersionPolicy>,
    pub connections: Vec<Connection>,
}

/// Configuration after combining file values, CLI values and defaults
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedConfig {
    pub input: PathBuf,
    pub output: PathBuf,
    pub tokenizer: String,
    pub tokenizer_class: Option<String>,
    pub revision: String,
    pub cache_dir: Option<PathBuf>,
    pub offline: bool,
    pub options: PreprocessingOptions,
    pub version_policy: VersionPolicy,
    pub max_ir_gap: u32,
    pub prefix_preprocessing: Option<String>,
    pub prefix_base: Option<String>,
    pub graph_name: Option<String>,
    pub connections: Vec<Connection>,
}

impl Default for ResolvedConfig {
    fn default() -> Self {
        ComposerConfig::default().merge_with_cli(CliOverrides::default())
    }
}

/// Merged model path for a base model: same directory, `name` as file name
pub fn output_path_for(input: &Path, name: &str) -> PathBuf {
    input
        .parent()
        .map(|dir| dir.join(name))
        .unwrap_or_else(|| PathBuf::from(name))
}

impl ComposerConfig {
    /// Load config from a TOML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| {
            ComposerError::ConfigError(format!("Failed to read {}: {}", path.display(), e))
        })?;
        toml::from_str(&contents).map_err(|e| {
            ComposerError::ConfigError(format!("Failed to parse {}: {}", path.display(), e))
        })
    }

    /// Find and load a config file from the standard locations
    ///
    /// Returns `None` if no config file exists.
    pub fn find_and_load() -> Result<Option<Self>> {
        for candidate in Self::search_paths() {
            if candidate.exists() {
                tracing::debug!("Loading config from {}", candidate.display());
                return Ok(Some(Self::load(&candidate)?));
            }
        }
        Ok(None)
    }

    /// Candidate config locations, in priority order
    pub fn search_paths() -> Vec<PathBuf> {
        let mut paths = vec![
            PathBuf::from("./sentinel-onnx.toml"),
            PathBuf::from("./.sentinel-onnx.toml"),
        ];
        if let Some(home) = dirs::home_dir() {
            paths.push(home.join(".config/sentinel/onnx-composer.toml"));
        }
        paths
    }

    /// Save config to a TOML file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        std::fs::write(path.as_ref(), self.to_toml()?)?;
        Ok(())
    }

    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Merge with CLI arguments (CLI args take precedence)
    pub fn merge_with_cli(&self, cli: CliOverrides) -> ResolvedConfig {
        let model = &self.model;
        let tok = &self.tokenizer;
        let compose = &self.compose;

        let input = cli
            .input
            .or_else(|| model.input.clone())
            .unwrap_or_else(|| PathBuf::from(DEFAULT_INPUT));
        let output = cli.output.or_else(|| model.output.clone()).unwrap_or_else(|| {
            output_path_for(
                &input,
                model.output_name.as_deref().unwrap_or(DEFAULT_OUTPUT_NAME),
            )
        });

        let connections = if cli.connections.is_empty() {
            compose.connections.clone()
        } else {
            cli.connections
        };

        ResolvedConfig {
            input,
            output,
            tokenizer: cli
                .tokenizer
                .or_else(|| tok.id.clone())
                .unwrap_or_else(|| DEFAULT_TOKENIZER.to_string()),
            tokenizer_class: cli.tokenizer_class.or_else(|| tok.class.clone()),
            revision: cli
                .revision
                .or_else(|| tok.revision.clone())
                .unwrap_or_else(|| DEFAULT_REVISION.to_string()),
            cache_dir: cli.cache_dir.or_else(|| tok.cache_dir.clone()),
            offline: cli.offline.or(tok.offline).unwrap_or(false),
            options: PreprocessingOptions {
                max_length: cli.max_length.or(tok.max_length).unwrap_or(DEFAULT_MAX_LENGTH),
                padding: cli.padding.or(tok.padding).unwrap_or_default(),
                truncation: cli.truncation.or(tok.truncation).unwrap_or(true),
            },
            version_policy: cli
                .version_policy
                .or(compose.version_policy)
                .unwrap_or_default(),
            max_ir_gap: compose.max_ir_gap.unwrap_or(DEFAULT_MAX_IR_GAP),
            prefix_preprocessing: compose.prefix_preprocessing.clone(),
            prefix_base: compose.prefix_base.clone(),
            graph_name: compose.graph_name.clone(),
            connections,
        }
    }
}
