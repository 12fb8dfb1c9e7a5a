//! Vector-store collaborator.
//!
//! The executor only needs three operations: add a file's chunks to a
//! collection, drop every chunk of a file from a collection, and count.
//! Chunks are keyed for deletion by [`Chunk::source`], the absolute path of
//! the file they came from.
//!
//! | Backend | Type |
//! |---------|------|
//! | `sqlite` | [`SqliteVectorStore`] |
//! | `memory` | [`InMemoryVectorStore`] |

mod memory;
mod sqlite;

pub use memory::InMemoryVectorStore;
pub use sqlite::SqliteVectorStore;

use std::sync::Arc;

use anyhow::{bail, Result};
use async_trait::async_trait;

use crate::config::Config;
use crate::embedding::create_provider;
use crate::models::Chunk;

#[async_trait]
pub trait VectorStore: Send + Sync {
    async fn add_documents(&self, collection: &str, chunks: &[Chunk]) -> Result<()>;

    /// Remove every chunk whose source is `source`; returns how many went.
    async fn delete_by_source(&self, collection: &str, source: &str) -> Result<u64>;

    async fn count(&self, collection: &str) -> Result<usize>;
}

/// Open the configured backend.
pub async fn open_vector_store(config: &Config) -> Result<Arc<dyn VectorStore>> {
    match config.vector_store.backend.as_str() {
        "memory" => Ok(Arc::new(InMemoryVectorStore::new())),
        "sqlite" => {
            let provider = create_provider(&config.embedding)?;
            let store = SqliteVectorStore::open(
                &config.vector_store.path,
                provider,
                config.embedding.batch_size,
            )
            .await?;
            Ok(Arc::new(store))
        }
        other => bail!("unknown vector store backend: {other}"),
    }
}
