//! Transport-independent service operations: initialize, chat and status.
//!
//! The HTTP layer in [`crate::server`] is a thin binding over
//! [`ChatService`]; tests drive the service directly with stub models.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::agent::ConversationAgent;
use crate::chunker::DocumentChunker;
use crate::config::Config;
use crate::embedding::{create_embedder, Embedder};
use crate::error::{ChunkError, ServiceError};
use crate::fetch::{session_id, FetchOutcome, RepositoryFetcher};
use crate::index::VectorIndex;
use crate::llm::{create_chat_model, ChatModel};
use crate::search::QueryOptions;
use crate::session::{Session, SessionManager};

/// Result of a successful initialize.
#[derive(Debug, Clone)]
pub struct InitializeOutcome {
    pub session_id: String,
    pub fetch: FetchOutcome,
    pub file_count: usize,
    pub chunk_count: usize,
}

impl InitializeOutcome {
    pub fn message(&self) -> String {
        format!(
            "Repository initialized successfully ({} chunks from {} files)",
            self.chunk_count, self.file_count
        )
    }
}

pub struct ChatService {
    config: Config,
    embedder: Arc<dyn Embedder>,
    chat_model: Arc<dyn ChatModel>,
    fetcher: RepositoryFetcher,
    chunker: DocumentChunker,
    sessions: SessionManager,
}

impl ChatService {
    pub fn new(config: Config, embedder: Arc<dyn Embedder>, chat_model: Arc<dyn ChatModel>) -> Self {
        Self {
            config,
            embedder,
            chat_model,
            fetcher: RepositoryFetcher::new(),
            chunker: DocumentChunker::default(),
            sessions: SessionManager::new(),
        }
    }

    /// Build the service with the remote providers named in `config`.
    pub fn from_config(config: Config) -> anyhow::Result<Self> {
        let embedder: Arc<dyn Embedder> = Arc::from(create_embedder(&config.embedding)?);
        let chat_model: Arc<dyn ChatModel> = Arc::from(create_chat_model(&config.llm)?);
        tracing::info!(
            embedding_model = embedder.model_name(),
            chat_model = chat_model.model_name(),
            "providers configured"
        );
        Ok(Self::new(config, embedder, chat_model))
    }

    /// Fetch, chunk and index `repo_url`, then make it the active session.
    ///
    /// Any failure clears the active session. The cloned repository stays
    /// on disk and is reused by the next initialize of the same URL.
    pub async fn initialize(&self, repo_url: &str) -> Result<InitializeOutcome, ServiceError> {
        let repo_url = repo_url.trim();
        let _slot = self.sessions.begin_initialize().await;

        match self.build_session(repo_url).await {
            Ok((session, outcome)) => {
                self.sessions.replace(session).await;
                tracing::info!(
                    session = %outcome.session_id,
                    chunks = outcome.chunk_count,
                    files = outcome.file_count,
                    "repository initialized"
                );
                Ok(outcome)
            }
            Err(e) => {
                self.sessions.clear().await;
                tracing::error!(url = repo_url, error = %e, "initialize failed");
                Err(e)
            }
        }
    }

    async fn build_session(
        &self,
        repo_url: &str,
    ) -> Result<(Session, InitializeOutcome), ServiceError> {
        let id = session_id(repo_url);
        let repo_path = self.config.storage.repos_dir().join(&id);

        let fetch = self.fetcher.fetch(repo_url, &repo_path).await?;

        let live_build = self
            .sessions
            .current()
            .await
            .and_then(|s| s.index.path().parent().map(Path::to_path_buf));
        prune_stale_builds(&self.config.storage.index_dir(), live_build.as_deref()).await;

        let chunks = self.chunker.chunk(&repo_path)?;
        let no_documents = || ChunkError::NoDocuments {
            root: repo_path.clone(),
            extensions: self.chunker.settings().extensions.join(", "),
        };
        if chunks.file_count() == 0 {
            return Err(no_documents().into());
        }

        let build_dir = self
            .config
            .storage
            .index_dir()
            .join(&id)
            .join(uuid::Uuid::new_v4().to_string());
        let index = VectorIndex::build(
            &build_dir,
            self.embedder.clone(),
            &chunks,
            self.config.embedding.batch_size,
        )
        .await?;
        if index.is_empty() {
            index.close().await;
            return Err(no_documents().into());
        }

        let index = Arc::new(index);
        let chunk_count = index.len();
        tracing::debug!(
            path = %index.path().display(),
            chunks = chunk_count,
            dims = index.dims(),
            "vector index built"
        );
        let agent = ConversationAgent::new(
            index.clone(),
            self.chat_model.clone(),
            QueryOptions::from_config(&self.config.retrieval),
            self.config.memory.max_recent_turns,
        );

        let outcome = InitializeOutcome {
            session_id: id.clone(),
            fetch,
            file_count: chunks.file_count(),
            chunk_count,
        };
        let session = Session {
            id,
            repo_url: repo_url.to_string(),
            repo_path,
            index,
            agent,
            chunk_count,
        };
        Ok((session, outcome))
    }

    pub async fn chat(&self, question: &str) -> Result<String, ServiceError> {
        if question.trim().is_empty() {
            return Err(ServiceError::InvalidRequest(
                "question must not be empty".to_string(),
            ));
        }
        let session = self
            .sessions
            .current()
            .await
            .ok_or(ServiceError::Uninitialized)?;
        session.agent.answer(question).await
    }

    pub async fn status(&self) -> bool {
        self.sessions.is_active().await
    }

    pub async fn current_session(&self) -> Option<Arc<Session>> {
        self.sessions.current().await
    }
}

/// Remove every index build under `index_root` except `keep`.
///
/// Failures are logged; a leftover build only costs disk space.
async fn prune_stale_builds(index_root: &Path, keep: Option<&Path>) {
    for session_dir in list_dirs(index_root).await {
        for build in list_dirs(&session_dir).await {
            if Some(build.as_path()) == keep {
                continue;
            }
            match tokio::fs::remove_dir_all(&build).await {
                Ok(()) => tracing::debug!(path = %build.display(), "pruned stale index build"),
                Err(e) => {
                    tracing::warn!(path = %build.display(), error = %e, "failed to prune index build")
                }
            }
        }
    }
}

async fn list_dirs(dir: &Path) -> Vec<PathBuf> {
    let mut dirs = Vec::new();
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(_) => return dirs,
    };
    while let Ok(Some(entry)) = entries.next_entry().await {
        if entry.file_type().await.is_ok_and(|t| t.is_dir()) {
            dirs.push(entry.path());
        }
    }
    dirs
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_prune_keeps_live_build() {
        let tmp = TempDir::new().unwrap();
        let live = tmp.path().join("aaa").join("live");
        let stale = tmp.path().join("aaa").join("stale");
        let other = tmp.path().join("bbb").join("old");
        for dir in [&live, &stale, &other] {
            std::fs::create_dir_all(dir).unwrap();
        }

        prune_stale_builds(tmp.path(), Some(&live)).await;

        assert!(live.exists());
        assert!(!stale.exists());
        assert!(!other.exists());
    }

    #[tokio::test]
    async fn test_prune_missing_root_is_noop() {
        let tmp = TempDir::new().unwrap();
        prune_stale_builds(&tmp.path().join("absent"), None).await;
    }

    #[test]
    fn test_outcome_message() {
        let outcome = InitializeOutcome {
            session_id: "abc".into(),
            fetch: FetchOutcome::Cloned,
            file_count: 3,
            chunk_count: 7,
        };
        assert_eq!(
            outcome.message(),
            "Repository initialized successfully (7 chunks from 3 files)"
        );
    }
}
