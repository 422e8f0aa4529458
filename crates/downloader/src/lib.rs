//! HuggingFace Tokenizer Downloader (Token-Free)
//!
//! Fetches the handful of files a WordPiece tokenizer needs from a
//! HuggingFace repository into a local cache, so the bake step can run
//! offline afterwards.
//!
//! ## Features
//! - Streaming downloads with incremental SHA256 hashing
//! - Atomic writes (temp file in the cache directory, then rename)
//! - Automatic retry with exponential backoff on transient failures
//! - Cache reuse and an offline mode (`HF_HUB_OFFLINE=1`); optional files a
//!   repository lacks are remembered under `.no_exist/`
//! - `HF_ENDPOINT` to point at a mirror
//!
//! ## Example
//!
//! ```no_run
//! use sentinel_onnx_downloader::{fetch_tokenizer, FetchOptions};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let dir = fetch_tokenizer(
//!     "sentence-transformers/all-MiniLM-L6-v2",
//!     &FetchOptions::default(),
//! )
//! .await?;
//! println!("tokenizer files in {}", dir.display());
//! # Ok(())
//! # }
//! ```

use anyhow::{Context, Result};
use futures_util::StreamExt;
use sha2::Digest;
use std::io::Write;
use std::path::{Component, Path, PathBuf};
use std::time::Duration;

/// Base URL for HuggingFace
const DEFAULT_BASE_URL: &str = "https://huggingface.co";

/// Default repository revision
pub const DEFAULT_REVISION: &str = "main";

/// Default number of retries per file
pub const DEFAULT_RETRIES: u32 = 3;

/// Cache subdirectory marking optional files the repository does not have
pub const NO_EXIST_DIR: &str = ".no_exist";

const INITIAL_BACKOFF: Duration = Duration::from_millis(500);
const MAX_BACKOFF: Duration = Duration::from_secs(8);

/// A file the tokenizer may need
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenizerFile {
    pub name: &'static str,
    pub required: bool,
}

/// Files fetched for a tokenizer, in download order
pub const TOKENIZER_FILES: &[TokenizerFile] = &[
    TokenizerFile {
        name: "tokenizer_config.json",
        required: true,
    },
    TokenizerFile {
        name: "vocab.txt",
        required: true,
    },
    TokenizerFile {
        name: "special_tokens_map.json",
        required: false,
    },
];

/// Options for [`fetch_tokenizer`]
#[derive(Debug, Clone)]
pub struct FetchOptions {
    /// Branch, tag or commit
    pub revision: String,

    /// Cache root (defaults to [`default_cache_dir`])
    pub cache_dir: Option<PathBuf>,

    /// Never touch the network; only cached files are used
    pub offline: bool,

    /// Retries per file after the first attempt
    pub retries: u32,

    /// Verbose output
    pub verbose: bool,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            revision: DEFAULT_REVISION.to_string(),
            cache_dir: None,
            offline: false,
            retries: DEFAULT_RETRIES,
            verbose: false,
        }
    }
}

/// Result of one download attempt
enum DownloadOutcome {
    Done { bytes: u64, sha256: String },
    NotFound,
    Rejected(reqwest::StatusCode),
}

/// Cache root used when none is configured
pub fn default_cache_dir() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(|| PathBuf::from(".cache"))
        .join("sentinel-onnx")
        .join("tokenizers")
}

/// Hub base URL, honouring `HF_ENDPOINT`
pub fn base_url() -> String {
    std::env::var("HF_ENDPOINT").unwrap_or_else(|_| DEFAULT_BASE_URL.to_string())
}

/// Whether `HF_HUB_OFFLINE` requests offline mode
pub fn offline_from_env() -> bool {
    std::env::var("HF_HUB_OFFLINE")
        .map(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"))
        .unwrap_or(false)
}

/// URL of a file in a repository at a revision
pub fn file_url(base_url: &str, repo_id: &str, revision: &str, filename: &str) -> String {
    format!(
        "{}/{}/resolve/{}/{}",
        base_url.trim_end_matches('/'),
        repo_id,
        revision,
        filename
    )
}

/// Delay before retry number `attempt` (0-based)
pub fn backoff_delay(attempt: u32) -> Duration {
    INITIAL_BACKOFF
        .checked_mul(1u32 << attempt.min(16))
        .map(|d| d.min(MAX_BACKOFF))
        .unwrap_or(MAX_BACKOFF)
}

fn validate_repo_id(repo_id: &str) -> Result<()> {
    let path = Path::new(repo_id);
    let well_formed = !repo_id.is_empty()
        && !path.is_absolute()
        && path
            .components()
            .all(|c| matches!(c, Component::Normal(_)));
    if !well_formed {
        anyhow::bail!("Invalid repository id '{}'", repo_id);
    }
    Ok(())
}

/// Make the tokenizer files of `repo_id` available locally
///
/// # Returns
///
/// The cache directory holding the files (`{cache}/{repo_id}/{revision}`)
pub async fn fetch_tokenizer(repo_id: &str, options: &FetchOptions) -> Result<PathBuf> {
    validate_repo_id(repo_id)?;
    validate_repo_id(&options.revision).context("Invalid revision")?;

    let dest = options
        .cache_dir
        .clone()
        .unwrap_or_else(default_cache_dir)
        .join(repo_id)
        .join(&options.revision);
    std::fs::create_dir_all(&dest)
        .with_context(|| format!("Failed to create cache directory {}", dest.display()))?;

    let offline = options.offline || offline_from_env();

    if options.verbose {
        tracing::info!("Resolving tokenizer {}@{}", repo_id, options.revision);
    }

    let mut missing = Vec::new();
    for file in TOKENIZER_FILES {
        let path = dest.join(file.name);
        if path.exists() {
            tracing::debug!("Using cached {}", path.display());
        } else if dest.join(NO_EXIST_DIR).join(file.name).exists() {
            tracing::debug!("{} is known to be absent from {}", file.name, repo_id);
        } else if !offline {
            missing.push(file);
        } else if file.required {
            anyhow::bail!(
                "{} for {} is not cached and offline mode is enabled",
                file.name,
                repo_id
            );
        }
    }

    if missing.is_empty() {
        return Ok(dest);
    }

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(60))
        .build()
        .context("Failed to create HTTP client")?;
    let base = base_url();

    for file in missing {
        let path = dest.join(file.name);
        let url = file_url(&base, repo_id, &options.revision, file.name);
        match download_with_retry(&client, &url, &path, options.retries).await? {
            DownloadOutcome::Done { bytes, sha256 } => {
                tracing::info!("✓ Downloaded {} ({} bytes, sha256 {})", file.name, bytes, sha256);
            }
            DownloadOutcome::NotFound if !file.required => {
                tracing::debug!("{} not present in {}", file.name, repo_id);
                let marker_dir = dest.join(NO_EXIST_DIR);
                std::fs::create_dir_all(&marker_dir)?;
                std::fs::write(marker_dir.join(file.name), b"")?;
            }
            DownloadOutcome::NotFound => {
                anyhow::bail!("{} not found in {} ({})", file.name, repo_id, url);
            }
            DownloadOutcome::Rejected(status) => {
                anyhow::bail!("Download failed with status {}: {}", status, url);
            }
        }
    }

    Ok(dest)
}

async fn download_with_retry(
    client: &reqwest::Client,
    url: &str,
    dest: &Path,
    retries: u32,
) -> Result<DownloadOutcome> {
    let mut attempt = 0;
    loop {
        match download_file(client, url, dest).await {
            Ok(outcome) => return Ok(outcome),
            Err(e) if attempt < retries => {
                let delay = backoff_delay(attempt);
                tracing::warn!("Download of {} failed: {:#} - retrying in {:?}", url, e, delay);
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => {
                return Err(e.context(format!("Giving up on {} after {} attempts", url, attempt + 1)))
            }
        }
    }
}

/// Stream one file to `dest`; server errors and transport failures are `Err`
async fn download_file(client: &reqwest::Client, url: &str, dest: &Path) -> Result<DownloadOutcome> {
    tracing::debug!("URL: {}", url);

    let response = client
        .get(url)
        .send()
        .await
        .with_context(|| format!("Failed to download from {}", url))?;

    let status = response.status();
    if status == reqwest::StatusCode::NOT_FOUND {
        return Ok(DownloadOutcome::NotFound);
    }
    if status.is_server_error() || status == reqwest::StatusCode::TOO_MANY_REQUESTS {
        anyhow::bail!("Server returned {}", status);
    }
    if !status.is_success() {
        return Ok(DownloadOutcome::Rejected(status));
    }

    let parent = dest.parent().unwrap_or_else(|| Path::new("."));
    let mut tmp = tempfile::NamedTempFile::new_in(parent)
        .with_context(|| format!("Failed to create temp file in {}", parent.display()))?;

    let mut hasher = sha2::Sha256::new();
    let mut bytes: u64 = 0;
    let mut stream = response.bytes_stream();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.context("Error reading chunk")?;
        tmp.write_all(&chunk).context("Failed to write chunk")?;
        hasher.update(&chunk);
        bytes += chunk.len() as u64;
    }

    tmp.as_file().sync_all()?;
    tmp.persist(dest)
        .map_err(|e| e.error)
        .with_context(|| format!("Failed to move download into {}", dest.display()))?;

    Ok(DownloadOutcome::Done {
        bytes,
        sha256: format!("{:x}", hasher.finalize()),
    })
}

/// Parse a tokenizer specification
///
/// Supports formats:
/// - "owner/repo" - default revision
/// - "owner/repo@revision" - specific branch, tag or commit
pub fn parse_hf_model_spec(spec: &str) -> Result<(String, Option<String>)> {
    let (repo, revision) = match spec.split_once('@') {
        Some((repo, rev)) => (repo, Some(rev.to_string())),
        None => (spec, None),
    };
    if repo.is_empty() || revision.as_deref() == Some("") {
        anyhow::bail!("Invalid model spec '{}'. Expected 'owner/repo[@revision]'", spec);
    }
    Ok((repo.to_string(), revision))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_parse_hf_model_spec() {
        let (repo, rev) = parse_hf_model_spec("owner/repo").unwrap();
        assert_eq!(repo, "owner/repo");
        assert_eq!(rev, None);

        let (repo, rev) = parse_hf_model_spec("owner/repo@v1.0").unwrap();
        assert_eq!(repo, "owner/repo");
        assert_eq!(rev, Some("v1.0".to_string()));

        assert!(parse_hf_model_spec("owner/repo@").is_err());
        assert!(parse_hf_model_spec("@main").is_err());
    }

    #[test]
    fn test_file_url() {
        assert_eq!(
            file_url(
                "https://huggingface.co/",
                "sentence-transformers/all-MiniLM-L6-v2",
                "main",
                "vocab.txt"
            ),
            "https://huggingface.co/sentence-transformers/all-MiniLM-L6-v2/resolve/main/vocab.txt"
        );
    }

    #[test]
    fn test_backoff_grows_and_caps() {
        assert_eq!(backoff_delay(0), Duration::from_millis(500));
        assert_eq!(backoff_delay(1), Duration::from_secs(1));
        assert_eq!(backoff_delay(3), Duration::from_secs(4));
        assert_eq!(backoff_delay(10), MAX_BACKOFF);
        assert_eq!(backoff_delay(u32::MAX), MAX_BACKOFF);
    }

    #[test]
    fn test_repo_id_validation() {
        assert!(validate_repo_id("owner/repo").is_ok());
        assert!(validate_repo_id("bert-base-uncased").is_ok());
        assert!(validate_repo_id("../etc").is_err());
        assert!(validate_repo_id("/abs/path").is_err());
        assert!(validate_repo_id("").is_err());
    }

    #[test]
    fn test_fetch_options_default() {
        let options = FetchOptions::default();
        assert_eq!(options.revision, "main");
        assert_eq!(options.retries, DEFAULT_RETRIES);
        assert!(!options.offline);
    }

    #[tokio::test]
    async fn test_cached_files_are_reused() {
        let cache = TempDir::new().unwrap();
        let dir = cache.path().join("owner/repo/main");
        fs::create_dir_all(&dir).unwrap();
        for file in TOKENIZER_FILES {
            fs::write(dir.join(file.name), "{}").unwrap();
        }

        let options = FetchOptions {
            cache_dir: Some(cache.path().to_path_buf()),
            ..Default::default()
        };
        let resolved = fetch_tokenizer("owner/repo", &options).await.unwrap();
        assert_eq!(resolved, dir);
    }

    #[tokio::test]
    async fn test_offline_skips_missing_optional_files() {
        let cache = TempDir::new().unwrap();
        let dir = cache.path().join("owner/repo/main");
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("tokenizer_config.json"), "{}").unwrap();
        fs::write(dir.join("vocab.txt"), "[UNK]\n").unwrap();

        let options = FetchOptions {
            cache_dir: Some(cache.path().to_path_buf()),
            offline: true,
            ..Default::default()
        };
        let resolved = fetch_tokenizer("owner/repo", &options).await.unwrap();
        assert_eq!(resolved, dir);
        assert!(!dir.join("special_tokens_map.json").exists());
    }

    #[tokio::test]
    async fn test_offline_missing_vocab_is_an_error() {
        let cache = TempDir::new().unwrap();
        let dir = cache.path().join("owner/repo/main");
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("tokenizer_config.json"), "{}").unwrap();

        let options = FetchOptions {
            cache_dir: Some(cache.path().to_path_buf()),
            offline: true,
            ..Default::default()
        };
        let err = fetch_tokenizer("owner/repo", &options).await.unwrap_err();
        assert!(err.to_string().contains("vocab.txt"));
    }

    #[tokio::test]
    async fn test_known_absent_optional_file_not_requested() {
        let cache = TempDir::new().unwrap();
        let dir = cache.path().join("owner/repo/main");
        fs::create_dir_all(dir.join(NO_EXIST_DIR)).unwrap();
        fs::write(dir.join("tokenizer_config.json"), "{}").unwrap();
        fs::write(dir.join("vocab.txt"), "[UNK]\n").unwrap();
        fs::write(dir.join(NO_EXIST_DIR).join("special_tokens_map.json"), "").unwrap();

        // Online, but nothing is missing, so no request is made
        let options = FetchOptions {
            cache_dir: Some(cache.path().to_path_buf()),
            ..Default::default()
        };
        let resolved = fetch_tokenizer("owner/repo", &options).await.unwrap();
        assert_eq!(resolved, dir);
    }

    #[tokio::test]
    async fn test_offline_missing_required_file() {
        let cache = TempDir::new().unwrap();
        let options = FetchOptions {
            cache_dir: Some(cache.path().to_path_buf()),
            offline: true,
            ..Default::default()
        };
        let err = fetch_tokenizer("owner/repo", &options).await.unwrap_err();
        assert!(err.to_string().contains("offline"));
    }
}
