//! In-process vector store, used by tests and the `memory` backend.

use std::collections::HashMap;
use std::sync::RwLock;

use anyhow::{anyhow, Result};
use async_trait::async_trait;

use super::VectorStore;
use crate::models::Chunk;

/// Chunks per collection behind a `RwLock`. Nothing is persisted.
#[derive(Default)]
pub struct InMemoryVectorStore {
    collections: RwLock<HashMap<String, Vec<Chunk>>>,
}

impl InMemoryVectorStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of a collection's chunks for one source, in insertion order.
    pub fn chunks_for(&self, collection: &str, source: &str) -> Vec<Chunk> {
        self.collections
            .read()
            .map(|c| {
                c.get(collection)
                    .map(|chunks| {
                        chunks
                            .iter()
                            .filter(|chunk| chunk.source == source)
                            .cloned()
                            .collect()
                    })
                    .unwrap_or_default()
            })
            .unwrap_or_default()
    }
}

fn poisoned<T>(_: T) -> anyhow::Error {
    anyhow!("in-memory vector store lock poisoned")
}

#[async_trait]
impl VectorStore for InMemoryVectorStore {
    async fn add_documents(&self, collection: &str, chunks: &[Chunk]) -> Result<()> {
        let mut collections = self.collections.write().map_err(poisoned)?;
        collections
            .entry(collection.to_string())
            .or_default()
            .extend_from_slice(chunks);
        Ok(())
    }

    async fn delete_by_source(&self, collection: &str, source: &str) -> Result<u64> {
        let mut collections = self.collections.write().map_err(poisoned)?;
        let Some(chunks) = collections.get_mut(collection) else {
            return Ok(0);
        };
        let before = chunks.len();
        chunks.retain(|c| c.source != source);
        Ok((before - chunks.len()) as u64)
    }

    async fn count(&self, collection: &str) -> Result<usize> {
        let collections = self.collections.read().map_err(poisoned)?;
        Ok(collections.get(collection).map_or(0, Vec::len))
    }
}
