use crate::history::HistoryStoreError;
use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
use std::path::Path;
use tracing::info;

/// Turns text into a fixed-dimension vector. Implementations must be
/// deterministic for a given input so nearest-neighbor results are
/// reproducible.
pub trait Embedder: Send + Sync {
    fn dim(&self) -> usize;
    fn embed(&self, text: &str) -> Result<Vec<f32>, HistoryStoreError>;
}

/// Embedding dimension of AllMiniLM-L6-v2.
pub const MINILM_DIM: usize = 384;

/// Local sentence-transformer embeddings via fastembed. The model weights are
/// downloaded on first use and cached under `cache_dir`.
pub struct FastEmbedder {
    model: TextEmbedding,
}

impl FastEmbedder {
    pub fn new(cache_dir: &Path) -> Result<Self, HistoryStoreError> {
        std::fs::create_dir_all(cache_dir)
            .map_err(|e| HistoryStoreError::EmbeddingError(e.to_string()))?;

        info!("Initializing embedding model (AllMiniLM-L6-v2)");

        let options = InitOptions::new(EmbeddingModel::AllMiniLML6V2)
            .with_cache_dir(cache_dir.to_path_buf())
            .with_show_download_progress(false);

        let model = TextEmbedding::try_new(options)
            .map_err(|e| HistoryStoreError::EmbeddingError(e.to_string()))?;

        Ok(Self { model })
    }
}

impl Embedder for FastEmbedder {
    fn dim(&self) -> usize {
        MINILM_DIM
    }

    fn embed(&self, text: &str) -> Result<Vec<f32>, HistoryStoreError> {
        let mut embeddings = self
            .model
            .embed(vec![text], None)
            .map_err(|e| HistoryStoreError::EmbeddingError(e.to_string()))?;

        if embeddings.is_empty() {
            return Err(HistoryStoreError::EmbeddingError(
                "embedding returned no vectors".to_string(),
            ));
        }

        let embedding = embeddings.remove(0);
        if embedding.len() != self.dim() {
            return Err(HistoryStoreError::EmbeddingError(format!(
                "unexpected embedding dimension: {} (expected {})",
                embedding.len(),
                self.dim()
            )));
        }

        Ok(embedding)
    }
}
