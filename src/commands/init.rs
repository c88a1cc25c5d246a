//! Init command implementation

use crate::config::Config;
use crate::error::{Error, Result};
use crate::store::{DistanceMetric, LocalVectorBackend, QdrantBackend, VectorBackend};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

/// Initialize archivist configuration and storage directories
pub async fn cmd_init(base_dir: Option<PathBuf>, force: bool) -> Result<Config> {
    let mut config = Config::default();
    config.init_paths(base_dir);

    // Check if already initialized
    if config.paths.config_file.exists() && !force {
        return Err(Error::AlreadyInitialized(
            config.paths.base_dir.display().to_string(),
        ));
    }

    std::fs::create_dir_all(&config.paths.base_dir)?;
    std::fs::create_dir_all(&config.paths.data_dir)?;
    std::fs::create_dir_all(&config.paths.backup_dir)?;

    config.validate()?;
    config.save()?;
    info!("Created config at {:?}", config.paths.config_file);

    // Best effort: set up the vector collection so the first ingest does
    // not have to
    let distance = config
        .vector
        .distance
        .parse()
        .unwrap_or(DistanceMetric::Cosine);
    match build_backend(&config) {
        Ok(vectors) => {
            if let Err(e) = vectors
                .create_collection(config.embedding.dimension, distance)
                .await
            {
                warn!(
                    "Could not create vector collection: {}. You can create it later with 'archivist recreate-collection --force'.",
                    e
                );
            } else {
                info!("Vector collection '{}' ready", config.vector.collection_name);
            }
        }
        Err(e) => {
            warn!("Could not reach vector backend: {}", e);
        }
    }

    Ok(config)
}

/// Build the configured vector backend
pub fn build_backend(config: &Config) -> Result<Arc<dyn VectorBackend>> {
    match config.vector.backend.as_str() {
        "qdrant" => Ok(Arc::new(QdrantBackend::new(
            &config.vector.qdrant_url,
            &config.vector.collection_name,
            config.embedding.dimension,
            config.qdrant_api_key(),
        )?)),
        _ => Ok(Arc::new(LocalVectorBackend::open(&config.paths.data_dir)?)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_init_creates_layout() {
        let tmp = TempDir::new().unwrap();
        let config = cmd_init(Some(tmp.path().to_path_buf()), false).await.unwrap();

        assert!(config.paths.config_file.exists());
        assert!(config.paths.data_dir.is_dir());
        assert!(config.paths.backup_dir.is_dir());
    }

    #[tokio::test]
    async fn test_init_refuses_reinit_without_force() {
        let tmp = TempDir::new().unwrap();
        cmd_init(Some(tmp.path().to_path_buf()), false).await.unwrap();

        let err = cmd_init(Some(tmp.path().to_path_buf()), false)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::AlreadyInitialized(_)));

        // Force allows overwriting
        cmd_init(Some(tmp.path().to_path_buf()), true).await.unwrap();
    }
}
