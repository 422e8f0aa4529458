//! Error types for the graph composer

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Result type for composer operations
pub type Result<T> = std::result::Result<T, ComposerError>;

/// Errors that can occur while building the merged model
#[derive(Debug, Error)]
pub enum ComposerError {
    #[error("Failed to parse ONNX model {path}: {source}")]
    ParseError {
        path: PathBuf,
        #[source]
        source: prost::DecodeError,
    },

    #[error("Unsupported tokenizer configuration: {0}")]
    UnsupportedTokenizer(String),

    #[error("Invalid tokenizer: {0}")]
    InvalidTokenizer(String),

    #[error("IR version mismatch: preprocessing graph has {preprocessing}, base graph has {base}")]
    VersionMismatch { preprocessing: i64, base: i64 },

    #[error("Refusing to relabel IR version: {0}")]
    IncompatibleVersions(String),

    #[error("Conflicting opset versions for domain '{domain}': {left} vs {right}")]
    OpsetConflict {
        domain: String,
        left: i64,
        right: i64,
    },

    #[error("No connections between preprocessing outputs {outputs:?} and base inputs {inputs:?}")]
    NoConnections {
        outputs: Vec<String>,
        inputs: Vec<String>,
    },

    #[error("Unknown connection endpoint: {0}")]
    UnknownConnectionEndpoint(String),

    #[error("Base input '{0}' is the target of more than one connection")]
    DuplicateConnectionTarget(String),

    #[error("Type mismatch on connection {from} -> {to}: {from_type} vs {to_type}")]
    TypeMismatch {
        from: String,
        to: String,
        from_type: String,
        to_type: String,
    },

    #[error("Can't merge graphs with overlapping names: {0:?}")]
    OverlappingNames(Vec<String>),

    #[error("Conflicting metadata for key '{0}'")]
    MetadataConflict(String),

    #[error("Invalid model structure: {0}")]
    InvalidModel(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Graph error: {0}")]
    GraphError(String),
}

// Manual From implementations for error types
impl From<anyhow::Error> for ComposerError {
    fn from(err: anyhow::Error) -> Self {
        ComposerError::GraphError(err.to_string())
    }
}

impl From<serde_json::Error> for ComposerError {
    fn from(err: serde_json::Error) -> Self {
        ComposerError::SerializationError(err.to_string())
    }
}

impl From<toml::de::Error> for ComposerError {
    fn from(err: toml::de::Error) -> Self {
        ComposerError::ConfigError(err.to_string())
    }
}

impl From<toml::ser::Error> for ComposerError {
    fn from(err: toml::ser::Error) -> Self {
        ComposerError::SerializationError(err.to_string())
    }
}
