//! Error taxonomy.
//!
//! Each pipeline stage has its own error type so the failing stage is
//! visible in the message surfaced to HTTP clients. [`ServiceError`] is the
//! umbrella returned by the service operations; the HTTP layer maps it to a
//! status code and a `{"detail": ...}` body.

use std::path::PathBuf;

use thiserror::Error;

/// Failure while obtaining a local working copy of a repository.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("invalid repository url: {0:?}")]
    InvalidUrl(String),

    #[error("failed to prepare {}: {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to execute 'git clone' (is git installed?): {0}")]
    Spawn(std::io::Error),

    #[error("git clone failed: {0}")]
    Clone(String),
}

/// Failure while enumerating or splitting repository files.
#[derive(Debug, Error)]
pub enum ChunkError {
    #[error("repository path does not exist: {}", .0.display())]
    RootMissing(PathBuf),

    #[error("repository path is not readable: {}: {source}", path.display())]
    RootUnreadable {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("no indexable files found under {} (extensions: {extensions})", root.display())]
    NoDocuments { root: PathBuf, extensions: String },
}

/// Failure talking to a remote OpenAI-compatible API.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0} environment variable not set")]
    MissingApiKey(String),

    #[error("{service} API error {status}: {body}")]
    Status {
        service: &'static str,
        status: u16,
        body: String,
    },

    #[error("{service} request failed: {source}")]
    Transport {
        service: &'static str,
        source: reqwest::Error,
    },

    #[error("invalid {service} response: {reason}")]
    InvalidResponse {
        service: &'static str,
        reason: String,
    },
}

/// Failure producing embedding vectors.
#[derive(Debug, Error)]
pub enum EmbeddingError {
    #[error("embedding provider is disabled; set [embedding] provider in config")]
    Disabled,

    #[error("embedding request failed: {0}")]
    Api(#[from] ApiError),

    #[error("embedding response had {actual} vectors for {expected} inputs")]
    CountMismatch { expected: usize, actual: usize },

    #[error("embedding has {actual} dimensions, configured dims is {expected}")]
    DimensionMismatch { expected: usize, actual: usize },
}

/// Failure producing a chat completion.
#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("chat completion failed: {0}")]
    Api(#[from] ApiError),

    #[error("chat completion returned no choices")]
    EmptyResponse,
}

/// Failure building or querying the vector index.
#[derive(Debug, Error)]
pub enum IndexError {
    #[error(transparent)]
    Embedding(#[from] EmbeddingError),

    #[error("vector index storage error: {0}")]
    Storage(#[from] sqlx::Error),

    #[error("vector index I/O error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
}

/// Errors returned by the service operations (initialize, chat).
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Chunk(#[from] ChunkError),

    #[error(transparent)]
    Index(#[from] IndexError),

    #[error(transparent)]
    Generation(#[from] GenerationError),

    #[error("Please initialize a repository first")]
    Uninitialized,

    #[error("{0}")]
    InvalidRequest(String),
}

impl ServiceError {
    /// Whether the failure was caused by the caller rather than the service.
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::Uninitialized | Self::InvalidRequest(_))
    }
}
