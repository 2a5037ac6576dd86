// src/artifacts.rs

//! Inspection of files produced by a step attempt.

use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use sha2::{Digest, Sha256};

/// Size and content hash of one produced file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactInfo {
    /// Path relative to `base`, with `/` separators.
    pub relative_path: String,
    pub size: u64,
    pub hash: String,
}

/// SHA-256 hex digest of a file, read in 8 KiB chunks.
pub fn compute_file_hash(path: &Path) -> Result<String> {
    let mut hasher = Sha256::new();
    let mut file =
        File::open(path).with_context(|| format!("opening file for hashing: {:?}", path))?;
    let mut buf = [0u8; 8192];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}

/// Path of `path` relative to `base`, falling back to the bare file name when
/// it does not live under `base`.
pub fn relative_to(path: &Path, base: &Path) -> String {
    if let Ok(rel) = path.strip_prefix(base) {
        return to_slash(rel);
    }
    if let (Ok(abs_path), Ok(abs_base)) = (path.canonicalize(), base.canonicalize()) {
        if let Ok(rel) = abs_path.strip_prefix(&abs_base) {
            return to_slash(rel);
        }
    }
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| to_slash(path))
}

fn to_slash(path: &Path) -> String {
    path.components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

/// Stat and hash `path`. Blocking; call from `spawn_blocking`.
pub fn inspect(path: &Path, base: &Path) -> Result<ArtifactInfo> {
    let metadata =
        std::fs::metadata(path).with_context(|| format!("reading metadata of {:?}", path))?;
    Ok(ArtifactInfo {
        relative_path: relative_to(path, base),
        size: metadata.len(),
        hash: compute_file_hash(path)?,
    })
}

/// [`inspect`] on the blocking thread pool.
pub async fn inspect_async(path: PathBuf, base: PathBuf) -> Result<ArtifactInfo> {
    tokio::task::spawn_blocking(move || inspect(&path, &base))
        .await
        .context("artifact inspection task panicked")?
}
