//! Document loading: a file path in, tagged chunks out.

use std::path::Path;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tracing::debug;

use crate::chunk::chunk_text;
use crate::extract::extract_file;
use crate::models::Chunk;

/// Turns one file into the chunks to be stored for it.
///
/// An empty result is legal and means the document had no usable text;
/// errors mean the file could not be parsed at all.
#[async_trait]
pub trait DocumentLoader: Send + Sync {
    async fn load_into_chunks(&self, path: &Path) -> Result<Vec<Chunk>>;
}

/// Extract text by file format and split it on paragraph boundaries.
#[derive(Debug, Clone)]
pub struct FileLoader {
    max_tokens: usize,
}

impl FileLoader {
    pub fn new(max_tokens: usize) -> Self {
        Self { max_tokens }
    }
}

#[async_trait]
impl DocumentLoader for FileLoader {
    async fn load_into_chunks(&self, path: &Path) -> Result<Vec<Chunk>> {
        let text = extract_file(path)
            .await
            .with_context(|| format!("failed to load {}", path.display()))?;
        let chunks = chunk_text(&path.to_string_lossy(), &text, self.max_tokens);
        debug!(path = %path.display(), chunks = chunks.len(), "loaded document");
        Ok(chunks)
    }
}
