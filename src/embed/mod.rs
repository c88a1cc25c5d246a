//! Embedding generation
//!
//! This module provides an abstraction over embedding models with:
//! - A trait for different embedding backends
//! - Local embedding support via fastembed (feature `local-embed`)
//! - Batch processing for efficiency
//!
//! The embedding function itself is an external capability: the engine only
//! depends on the [`Embedder`] contract.

#[cfg(feature = "local-embed")]
mod fastembed_impl;

#[cfg(feature = "local-embed")]
pub use fastembed_impl::*;

use crate::config::EmbeddingConfig;
use crate::error::{Error, Result};
use async_trait::async_trait;
use std::sync::Arc;

/// Trait for embedding providers
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Embed a batch of texts
    async fn embed(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>>;

    /// Get the embedding dimension
    fn dimension(&self) -> usize;

    /// Get the model name
    fn model_name(&self) -> &str;
}

/// Create an embedder based on configuration
pub fn create_embedder(config: &EmbeddingConfig) -> Result<Arc<dyn Embedder>> {
    #[cfg(feature = "local-embed")]
    {
        let embedder = FastEmbedder::new(config)?;
        Ok(Arc::new(embedder))
    }

    #[cfg(not(feature = "local-embed"))]
    {
        let _ = config;
        Err(Error::Embedding(
            "No embedding backend available. Enable the 'local-embed' feature.".to_string(),
        ))
    }
}

/// Placeholder embedder for deployments without an embedding backend.
///
/// Metadata-only operations (list, delete, consistency tooling) work
/// normally; any attempt to embed fails with a clear message.
pub struct NullEmbedder {
    dimension: usize,
}

impl NullEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self { dimension }
    }
}

#[async_trait]
impl Embedder for NullEmbedder {
    async fn embed(&self, _texts: Vec<String>) -> Result<Vec<Vec<f32>>> {
        Err(Error::Embedding(
            "No embedding backend configured; rebuild with --features local-embed".to_string(),
        ))
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn model_name(&self) -> &str {
        "null"
    }
}

/// Helper to embed in batches
pub async fn embed_in_batches(
    embedder: &dyn Embedder,
    texts: Vec<String>,
    batch_size: usize,
) -> Result<Vec<Vec<f32>>> {
    let mut all_embeddings = Vec::with_capacity(texts.len());

    for chunk in texts.chunks(batch_size.max(1)) {
        let batch_texts: Vec<String> = chunk.to_vec();
        let embeddings = embedder.embed(batch_texts).await?;
        all_embeddings.extend(embeddings);
    }

    Ok(all_embeddings)
}

#[cfg(test)]
pub mod testing {
    //! Deterministic embedder for tests: no model download, stable output.

    use super::*;

    pub struct StubEmbedder {
        dimension: usize,
    }

    impl StubEmbedder {
        pub fn new(dimension: usize) -> Self {
            Self { dimension }
        }
    }

    #[async_trait]
    impl Embedder for StubEmbedder {
        async fn embed(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>> {
            Ok(texts
                .iter()
                .map(|text| {
                    let bytes = text.as_bytes();
                    (0..self.dimension)
                        .map(|i| {
                            if bytes.is_empty() {
                                0.0
                            } else {
                                f32::from(bytes[i % bytes.len()]) / 255.0
                            }
                        })
                        .collect()
                })
                .collect())
        }

        fn dimension(&self) -> usize {
            self.dimension
        }

        fn model_name(&self) -> &str {
            "stub"
        }
    }
}
