//! SQLite-backed vector store.
//!
//! Lives in its own database file, separate from the ledger. When an
//! embedding provider is configured every chunk is stored with its vector
//! (little-endian f32 BLOB) and the model that produced it; otherwise
//! `embedding` and `model` are NULL.

use std::path::Path;

use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::SqlitePool;
use tracing::debug;

use super::VectorStore;
use crate::db;
use crate::embedding::{vec_to_blob, EmbeddingProvider};
use crate::models::Chunk;

pub struct SqliteVectorStore {
    pool: SqlitePool,
    provider: Option<Box<dyn EmbeddingProvider>>,
    batch_size: usize,
}

impl SqliteVectorStore {
    pub async fn open(
        path: &Path,
        provider: Option<Box<dyn EmbeddingProvider>>,
        batch_size: usize,
    ) -> Result<Self> {
        let pool = db::connect(path).await?;
        Self::from_pool(pool, provider, batch_size).await
    }

    pub async fn from_pool(
        pool: SqlitePool,
        provider: Option<Box<dyn EmbeddingProvider>>,
        batch_size: usize,
    ) -> Result<Self> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS vector_chunks (
                id TEXT NOT NULL,
                collection TEXT NOT NULL,
                source TEXT NOT NULL,
                chunk_index INTEGER NOT NULL,
                text TEXT NOT NULL,
                hash TEXT NOT NULL,
                embedding BLOB,
                model TEXT,
                PRIMARY KEY (collection, id)
            )
            "#,
        )
        .execute(&pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_vector_chunks_source ON vector_chunks(collection, source)",
        )
        .execute(&pool)
        .await?;

        Ok(Self {
            pool,
            provider,
            batch_size: batch_size.max(1),
        })
    }

    async fn embed_all(&self, chunks: &[Chunk]) -> Result<Option<Vec<Vec<f32>>>> {
        let Some(provider) = &self.provider else {
            return Ok(None);
        };
        let mut vectors = Vec::with_capacity(chunks.len());
        for batch in chunks.chunks(self.batch_size) {
            let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();
            let embedded = provider
                .embed(&texts)
                .await
                .with_context(|| format!("embedding {} chunks", texts.len()))?;
            vectors.extend(embedded);
        }
        Ok(Some(vectors))
    }
}

#[async_trait]
impl VectorStore for SqliteVectorStore {
    async fn add_documents(&self, collection: &str, chunks: &[Chunk]) -> Result<()> {
        // Embed before opening the transaction.
        let vectors = self.embed_all(chunks).await?;
        let model = self.provider.as_ref().map(|p| p.model_name().to_string());

        let mut tx = self.pool.begin().await?;
        for (i, chunk) in chunks.iter().enumerate() {
            let blob = vectors
                .as_ref()
                .and_then(|v| v.get(i))
                .map(|v| vec_to_blob(v));
            sqlx::query(
                r#"
                INSERT INTO vector_chunks (id, collection, source, chunk_index, text, hash, embedding, model)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT(collection, id) DO UPDATE SET
                    source = excluded.source,
                    chunk_index = excluded.chunk_index,
                    text = excluded.text,
                    hash = excluded.hash,
                    embedding = excluded.embedding,
                    model = excluded.model
                "#,
            )
            .bind(&chunk.id)
            .bind(collection)
            .bind(&chunk.source)
            .bind(chunk.chunk_index)
            .bind(&chunk.text)
            .bind(&chunk.hash)
            .bind(blob)
            .bind(&model)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;

        debug!(collection, chunks = chunks.len(), "added chunks");
        Ok(())
    }

    async fn delete_by_source(&self, collection: &str, source: &str) -> Result<u64> {
        let result = sqlx::query("DELETE FROM vector_chunks WHERE collection = ? AND source = ?")
            .bind(collection)
            .bind(source)
            .execute(&self.pool)
            .await?;
        debug!(collection, source, removed = result.rows_affected(), "deleted chunks");
        Ok(result.rows_affected())
    }

    async fn count(&self, collection: &str) -> Result<usize> {
        let n: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM vector_chunks WHERE collection = ?")
            .bind(collection)
            .fetch_one(&self.pool)
            .await?;
        Ok(n as usize)
    }
}
