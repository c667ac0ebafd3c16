//! Model artifact sources and file resolution.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ArtifactError {
    #[error("model file not found at {path}")]
    Missing { path: PathBuf },
    #[error("failed to create cache directory: {0}")]
    CacheDir(#[source] std::io::Error),
    #[error("download failed for {url}: {source}")]
    Download {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("failed to write model to {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("could not determine cache directory")]
    NoCacheDir,
}

/// Where model artifacts come from. A model set is always resolved wholly
/// from one source; artifacts are never mixed across sources.
#[derive(Clone, Debug)]
pub enum ModelSource {
    /// Local directory holding the artifact files directly.
    Dir(PathBuf),
    /// Remote base URL; artifacts are fetched as `<base>/<name>` into the
    /// platform cache directory.
    Http(String),
}

impl ModelSource {
    /// Resolve one named artifact to a local file path.
    ///
    /// `Dir` sources require the file to exist already. `Http` sources check
    /// the cache first and otherwise download via a `.part` temp file with an
    /// atomic rename, so an interrupted download never leaves a usable path.
    pub fn resolve_artifact(&self, name: &str) -> Result<PathBuf, ArtifactError> {
        match self {
            ModelSource::Dir(dir) => {
                let path = dir.join(name);
                if path.exists() {
                    Ok(path)
                } else {
                    Err(ArtifactError::Missing { path })
                }
            }
            ModelSource::Http(base) => {
                let cache_dir = artifact_cache_dir()?;
                let cached = cache_dir.join(name);
                if cached.exists() {
                    return Ok(cached);
                }
                fs::create_dir_all(&cache_dir).map_err(ArtifactError::CacheDir)?;
                let url = artifact_url(base, name);
                log::info!("downloading {name} from {url}");
                download(&url, &cached)?;
                Ok(cached)
            }
        }
    }
}

/// Platform-specific cache directory for downloaded artifacts.
///
/// - macOS: `~/Library/Application Support/FaceLive/models/`
/// - Linux: `$XDG_CACHE_HOME/FaceLive/models/` or `~/.cache/FaceLive/models/`
/// - Windows: `%LOCALAPPDATA%/FaceLive/models/`
pub fn artifact_cache_dir() -> Result<PathBuf, ArtifactError> {
    #[cfg(target_os = "macos")]
    {
        dirs::data_dir()
            .map(|d| d.join("FaceLive").join("models"))
            .ok_or(ArtifactError::NoCacheDir)
    }
    #[cfg(not(target_os = "macos"))]
    {
        dirs::cache_dir()
            .map(|d| d.join("FaceLive").join("models"))
            .ok_or(ArtifactError::NoCacheDir)
    }
}

fn artifact_url(base: &str, name: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), name)
}

fn download(url: &str, dest: &Path) -> Result<(), ArtifactError> {
    let response = reqwest::blocking::get(url)
        .and_then(|r| r.error_for_status())
        .map_err(|e| ArtifactError::Download {
            url: url.to_string(),
            source: e,
        })?;

    // Write to a temp file first, then rename for atomicity
    let temp_path = dest.with_extension("part");
    let mut file = fs::File::create(&temp_path).map_err(|e| ArtifactError::Write {
        path: temp_path.clone(),
        source: e,
    })?;

    let bytes = response.bytes().map_err(|e| ArtifactError::Download {
        url: url.to_string(),
        source: e,
    })?;

    file.write_all(&bytes).map_err(|e| ArtifactError::Write {
        path: temp_path.clone(),
        source: e,
    })?;
    file.flush().map_err(|e| ArtifactError::Write {
        path: temp_path.clone(),
        source: e,
    })?;
    drop(file);

    fs::rename(&temp_path, dest).map_err(|e| ArtifactError::Write {
        path: dest.to_path_buf(),
        source: e,
    })?;

    Ok(())
}
