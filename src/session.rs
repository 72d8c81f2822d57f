//! The single active chat session.
//!
//! Readers clone the current `Arc<Session>` and keep using it even if an
//! initialize replaces it meanwhile. Writers go through
//! [`SessionManager::begin_initialize`] first, so at most one initialize
//! runs at a time.

use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{Mutex, MutexGuard, RwLock};

use crate::agent::ConversationAgent;
use crate::index::VectorIndex;

pub struct Session {
    /// Short hash of the repository URL; namespaces on-disk state.
    pub id: String,
    pub repo_url: String,
    pub repo_path: PathBuf,
    pub index: Arc<VectorIndex>,
    pub agent: ConversationAgent,
    pub chunk_count: usize,
}

#[derive(Default)]
pub struct SessionManager {
    current: RwLock<Option<Arc<Session>>>,
    init_lock: Mutex<()>,
}

impl SessionManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for any running initialize and hold the writer slot.
    pub async fn begin_initialize(&self) -> MutexGuard<'_, ()> {
        self.init_lock.lock().await
    }

    pub async fn current(&self) -> Option<Arc<Session>> {
        self.current.read().await.clone()
    }

    pub async fn is_active(&self) -> bool {
        self.current.read().await.is_some()
    }

    /// Install `session`, returning the one it replaced.
    pub async fn replace(&self, session: Session) -> Option<Arc<Session>> {
        self.current.write().await.replace(Arc::new(session))
    }

    pub async fn clear(&self) -> Option<Arc<Session>> {
        self.current.write().await.take()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::Embedder;
    use crate::error::{EmbeddingError, GenerationError};
    use crate::llm::{ChatMessage, ChatModel};
    use crate::search::QueryOptions;
    use async_trait::async_trait;
    use std::time::Duration;
    use tempfile::TempDir;

    struct UnitEmbedder;

    #[async_trait]
    impl Embedder for UnitEmbedder {
        fn model_name(&self) -> &str {
            "unit"
        }

        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
            Ok(texts.iter().map(|_| vec![1.0]).collect())
        }
    }

    struct SilentModel;

    #[async_trait]
    impl ChatModel for SilentModel {
        fn model_name(&self) -> &str {
            "silent"
        }

        async fn complete(&self, _messages: &[ChatMessage]) -> Result<String, GenerationError> {
            Ok("ok".to_string())
        }
    }

    async fn session(tmp: &TempDir, id: &str) -> Session {
        let index = Arc::new(
            VectorIndex::build(&tmp.path().join(id), Arc::new(UnitEmbedder), Vec::new(), 8)
                .await
                .unwrap(),
        );
        Session {
            id: id.to_string(),
            repo_url: format!("https://example.com/{}.git", id),
            repo_path: tmp.path().join("repos").join(id),
            agent: ConversationAgent::new(
                index.clone(),
                Arc::new(SilentModel),
                QueryOptions::default(),
                4,
            ),
            index,
            chunk_count: 0,
        }
    }

    #[tokio::test]
    async fn test_replace_and_clear() {
        let tmp = TempDir::new().unwrap();
        let manager = SessionManager::new();
        assert!(!manager.is_active().await);
        assert!(manager.current().await.is_none());

        assert!(manager.replace(session(&tmp, "first").await).await.is_none());
        assert!(manager.is_active().await);

        let held = manager.current().await.unwrap();
        let previous = manager.replace(session(&tmp, "second").await).await.unwrap();
        assert_eq!(previous.id, "first");
        // A reader holding the old session keeps a usable handle
        assert_eq!(held.id, "first");
        assert_eq!(manager.current().await.unwrap().id, "second");

        assert_eq!(manager.clear().await.unwrap().id, "second");
        assert!(!manager.is_active().await);
    }

    #[tokio::test]
    async fn test_initialize_slot_is_exclusive() {
        let manager = Arc::new(SessionManager::new());
        let guard = manager.begin_initialize().await;

        let contender = manager.clone();
        let waiting = tokio::spawn(async move {
            let _slot = contender.begin_initialize().await;
        });

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!waiting.is_finished());
        // Readers are not blocked by the writer slot
        assert!(!manager.is_active().await);

        drop(guard);
        waiting.await.unwrap();
    }
}
