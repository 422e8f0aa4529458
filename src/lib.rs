//! # Sentinel ONNX
//!
//! Offline build tool that bakes a tokenizer into a sentence-embedding ONNX
//! model, so the result accepts raw text in a single inference call.
//!
//! ## CLI Usage
//!
//! ```bash
//! # Build engine/model/sentinel-minilm-with-tokenizer.onnx with the stock settings
//! sentinel-onnx bake
//!
//! # Same, from a local tokenizer directory and an explicit wiring
//! sentinel-onnx bake --tokenizer ./tokenizer --connect input_ids=input_ids
//!
//! # Look at a model's external surface
//! sentinel-onnx inspect engine/model/sentinel-minilm-with-tokenizer.onnx
//! ```
//!
//! ## Library Usage
//!
//! ```no_run
//! use sentinel_onnx::{Composer, HfPreprocessingGenerator, ResolvedConfig};
//!
//! let generator = HfPreprocessingGenerator::from_dir("tokenizer/")?;
//! let report = Composer::new(ResolvedConfig::default()).run(&generator)?;
//! println!("Inputs : {:?}", report.inputs);
//! # Ok::<(), sentinel_onnx::ComposerError>(())
//! ```

// Re-export everything from the composer crate
pub use sentinel_onnx_composer::*;

// Re-export the downloader crate
pub use sentinel_onnx_downloader as downloader;
pub use sentinel_onnx_downloader::{fetch_tokenizer, parse_hf_model_spec, FetchOptions};

/// Crate version
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
