//! Reading and writing `.onnx` files

use crate::proto::ModelProto;
use crate::{ComposerError, Result};
use prost::Message as ProstMessage;
use std::io::Write;
use std::path::Path;

/// Load an ONNX model from disk
pub fn load_model(path: impl AsRef<Path>) -> Result<ModelProto> {
    let path = path.as_ref();
    let bytes = std::fs::read(path).map_err(|e| {
        ComposerError::IoError(std::io::Error::new(
            e.kind(),
            format!("Failed to read ONNX model {}: {}", path.display(), e),
        ))
    })?;

    let model = ModelProto::decode(bytes.as_slice()).map_err(|source| ComposerError::ParseError {
        path: path.to_path_buf(),
        source,
    })?;

    tracing::debug!(
        "Loaded {} ({} bytes, ir_version {})",
        path.display(),
        bytes.len(),
        model.ir_version
    );

    Ok(model)
}

/// Write an ONNX model to disk, replacing any existing file
///
/// The bytes go to a temporary file in the destination directory first and are
/// renamed over `path` once fully written, so a failed write never leaves a
/// truncated model behind.
pub fn save_model(model: &ModelProto, path: impl AsRef<Path>) -> Result<u64> {
    let path = path.as_ref();
    let bytes = model.encode_to_vec();

    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };

    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(&bytes)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| ComposerError::IoError(e.error))?;

    tracing::debug!("Wrote {} ({} bytes)", path.display(), bytes.len());

    Ok(bytes.len() as u64)
}
