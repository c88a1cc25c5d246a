//! Default values for configuration

/// Default vector backend ("local" or "qdrant")
pub fn default_vector_backend() -> String {
    "local".to_string()
}

/// Default Qdrant URL for local development
pub fn default_qdrant_url() -> String {
    std::env::var("QDRANT_URL").unwrap_or_else(|_| "http://127.0.0.1:6334".to_string())
}

/// Default environment variable name for Qdrant API key
pub fn default_qdrant_api_key_env() -> String {
    "QDRANT_API_KEY".to_string()
}

/// Default collection name
pub fn default_collection_name() -> String {
    "archivist_docs".to_string()
}

/// Default distance metric for the vector collection
pub fn default_distance_metric() -> String {
    "cosine".to_string()
}

/// Default embedding model (BAAI/bge-small-en-v1.5)
pub fn default_embedding_model() -> String {
    "BAAI/bge-small-en-v1.5".to_string()
}

/// Default embedding dimension for bge-small-en-v1.5
pub fn default_embedding_dimension() -> usize {
    384
}

/// Default batch size for embedding
pub fn default_embedding_batch_size() -> usize {
    32
}

/// Default maximum characters per node
pub fn default_chunk_max_chars() -> usize {
    1500
}

/// Default minimum characters per node
pub fn default_chunk_min_chars() -> usize {
    100
}

/// Default overlap characters between nodes
pub fn default_chunk_overlap() -> usize {
    200
}
