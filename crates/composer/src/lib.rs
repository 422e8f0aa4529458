//! # Sentinel ONNX Composer
//!
//! Bakes a tokenizer into a sentence-embedding model: a preprocessing graph
//! (raw strings → token ids, attention mask, token type ids) is generated from
//! a HuggingFace tokenizer and spliced in front of an ONNX inference graph, so
//! the merged model takes text directly.
//!
//! ## Pipeline
//!
//! ```text
//! tokenizer dir ──► PreprocessingGenerator ──► preprocessing ModelProto ─┐
//!                                                                        ├─► reconcile IR ─► connect ─► merge ─► check ─► save
//! base .onnx ─────► load_model ─────────────► base ModelProto ───────────┘
//! ```
//!
//! ## Example
//!
//! ```no_run
//! use sentinel_onnx_composer::{Composer, HfPreprocessingGenerator, ResolvedConfig};
//!
//! let config = ResolvedConfig::default();
//! let generator = HfPreprocessingGenerator::from_dir("tokenizer/")?;
//! let report = Composer::new(config).run(&generator)?;
//! println!("Saved: {}", report.output.display());
//! # Ok::<(), sentinel_onnx_composer::ComposerError>(())
//! ```

pub mod checker;
pub mod compose;
pub mod config;
pub mod error;
pub mod graph;
pub mod model_io;
pub mod proto;
pub mod tokenizer;

pub use checker::check_model;
pub use compose::{
    ComposeReport, Composer, Composition, Connection, MergeOptions, VersionPolicy,
    VersionReconciliation,
};
pub use config::{CliOverrides, ComposerConfig, ResolvedConfig};
pub use error::{ComposerError, Result};
pub use graph::{GraphStatistics, TensorGraph};
pub use model_io::{load_model, save_model};
pub use tokenizer::{
    HfPreprocessingGenerator, Padding, PreprocessingGenerator, PreprocessingOptions,
};
