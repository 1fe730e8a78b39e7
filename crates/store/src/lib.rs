//! Storage implementations for authorchat.
//!
//! Both backends implement [`ContentSourceStore`], [`ConversationStore`]
//! and [`Catalog`]:
//! - [`SqliteStore`] - a single SQLite file, the production default
//! - [`InMemoryStore`] - tests and throwaway sessions

pub mod in_memory;
pub mod sqlite;

use async_trait::async_trait;
use authorchat_config::StoreConfig;
use authorchat_core::error::StoreError;
use authorchat_core::source::{Author, ContentSource};
use authorchat_core::store::{ContentSourceStore, ConversationStore};
use std::sync::Arc;

pub use in_memory::InMemoryStore;
pub use sqlite::SqliteStore;

/// Write access to authors and books, used by provisioning.
#[async_trait]
pub trait Catalog: Send + Sync {
    /// Insert or update an author. `sources` on the argument are ignored.
    async fn upsert_author(&self, author: &Author) -> Result<(), StoreError>;

    /// Insert or update a book. New books go after the author's existing ones.
    /// Fails with `NotFound` if the owning author does not exist.
    async fn upsert_source(&self, source: &ContentSource) -> Result<(), StoreError>;

    /// Every author, with sources populated.
    async fn list_authors(&self) -> Result<Vec<Author>, StoreError>;
}

/// One backend seen through each of its capabilities.
#[derive(Clone)]
pub struct Stores {
    pub sources: Arc<dyn ContentSourceStore>,
    pub conversations: Arc<dyn ConversationStore>,
    pub catalog: Arc<dyn Catalog>,
}

impl Stores {
    fn from_backend<S>(backend: Arc<S>) -> Self
    where
        S: ContentSourceStore + ConversationStore + Catalog + 'static,
    {
        Self {
            sources: backend.clone(),
            conversations: backend.clone(),
            catalog: backend,
        }
    }

    pub fn in_memory(store: InMemoryStore) -> Self {
        Self::from_backend(Arc::new(store))
    }

    pub fn sqlite(store: SqliteStore) -> Self {
        Self::from_backend(Arc::new(store))
    }
}

/// Open the backend named in configuration.
pub async fn open(config: &StoreConfig) -> Result<Stores, StoreError> {
    match config.backend.as_str() {
        "memory" => Ok(Stores::in_memory(InMemoryStore::new())),
        "sqlite" => {
            let path = config.database_path();
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    StoreError::Storage(format!("Cannot create {}: {e}", parent.display()))
                })?;
            }
            let store = SqliteStore::new(&format!("sqlite://{}", path.display())).await?;
            Ok(Stores::sqlite(store))
        }
        other => Err(StoreError::Storage(format!("Unknown store backend '{other}'"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn open_memory_backend() {
        let config = StoreConfig {
            backend: "memory".into(),
            path: None,
        };
        let stores = open(&config).await.unwrap();
        assert_eq!(stores.conversations.name(), "in_memory");
    }

    #[tokio::test]
    async fn open_sqlite_file_creates_parent_dir() {
        let dir = tempfile::tempdir().unwrap();
        let config = StoreConfig {
            backend: "sqlite".into(),
            path: Some(dir.path().join("nested").join("authorchat.db")),
        };
        let stores = open(&config).await.unwrap();
        assert_eq!(stores.conversations.name(), "sqlite");
        assert!(dir.path().join("nested").join("authorchat.db").exists());
    }

    #[tokio::test]
    async fn open_unknown_backend_fails() {
        let config = StoreConfig {
            backend: "redis".into(),
            path: None,
        };
        assert!(open(&config).await.is_err());
    }
}
