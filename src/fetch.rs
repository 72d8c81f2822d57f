//! Repository fetching via the `git` CLI.
//!
//! A repository is cloned once into its local path and reused afterwards:
//! if `<path>/.git` exists the copy is taken as-is, without pulling.

use sha2::{Digest, Sha256};
use std::path::Path;
use tokio::process::Command;

use crate::error::FetchError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchOutcome {
    Cloned,
    AlreadyPresent,
}

/// Short stable identifier for a repository URL.
pub fn session_id(repo_url: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(repo_url.as_bytes());
    format!("{:x}", hasher.finalize())[..12].to_string()
}

#[derive(Debug, Clone, Default)]
pub struct RepositoryFetcher;

impl RepositoryFetcher {
    pub fn new() -> Self {
        Self
    }

    /// Ensure a working copy of `url` exists at `local_path`.
    pub async fn fetch(&self, url: &str, local_path: &Path) -> Result<FetchOutcome, FetchError> {
        validate_url(url)?;

        if local_path.join(".git").exists() {
            tracing::info!(path = %local_path.display(), "repository already present, skipping clone");
            return Ok(FetchOutcome::AlreadyPresent);
        }

        if local_path.exists() {
            tracing::warn!(path = %local_path.display(), "removing incomplete checkout");
            remove_path(local_path).await?;
        }
        if let Some(parent) = local_path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|source| FetchError::Io {
                    path: parent.to_path_buf(),
                    source,
                })?;
        }

        tracing::info!(url, path = %local_path.display(), "cloning repository");
        let output = Command::new("git")
            .args(["clone", "--quiet", "--"])
            .arg(url)
            .arg(local_path)
            .env("GIT_TERMINAL_PROMPT", "0")
            .kill_on_drop(true)
            .output()
            .await
            .map_err(FetchError::Spawn)?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            if local_path.exists() {
                if let Err(e) = remove_path(local_path).await {
                    tracing::warn!(error = %e, "failed to remove partial clone");
                }
            }
            return Err(FetchError::Clone(stderr));
        }

        Ok(FetchOutcome::Cloned)
    }
}

fn validate_url(url: &str) -> Result<(), FetchError> {
    if url.is_empty() || url.starts_with('-') || url.chars().any(char::is_whitespace) {
        return Err(FetchError::InvalidUrl(url.to_string()));
    }
    Ok(())
}

async fn remove_path(path: &Path) -> Result<(), FetchError> {
    let result = if path.is_dir() {
        tokio::fs::remove_dir_all(path).await
    } else {
        tokio::fs::remove_file(path).await
    };
    result.map_err(|source| FetchError::Io {
        path: path.to_path_buf(),
        source,
    })
}
