use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub neo4j_uri: String,
    pub neo4j_user: String,
    pub neo4j_password: String,
    pub qdrant_url: String,
    pub qdrant_collection: String,
    pub anthropic_api_key: String,
    pub openai_api_key: String,
    pub embedding_dim: usize,
    pub data_dir: String,
    pub server_host: String,
    pub server_port: u16,
    pub llm_timeout_secs: u64,
    pub graph_timeout_secs: u64,
    pub vector_timeout_secs: u64,
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.into())
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self {
            neo4j_uri: env_or("NEO4J_URI", "bolt://localhost:7687"),
            neo4j_user: env_or("NEO4J_USER", "neo4j"),
            neo4j_password: env_or("NEO4J_PASSWORD", "lattice"),
            qdrant_url: env_or("QDRANT_URL", "http://localhost:6334"),
            qdrant_collection: env_or("QDRANT_COLLECTION", "lattice_chunks"),
            anthropic_api_key: std::env::var("ANTHROPIC_API_KEY").unwrap_or_default(),
            openai_api_key: std::env::var("OPENAI_API_KEY").unwrap_or_default(),
            embedding_dim: env_parse("EMBEDDING_DIM", 1536),
            data_dir: env_or("LATTICE_DATA_DIR", "./data/staging"),
            server_host: env_or("SERVER_HOST", "0.0.0.0"),
            server_port: env_parse("SERVER_PORT", 8080),
            llm_timeout_secs: env_parse("LLM_TIMEOUT_SECS", 60),
            graph_timeout_secs: env_parse("GRAPH_TIMEOUT_SECS", 15),
            vector_timeout_secs: env_parse("VECTOR_TIMEOUT_SECS", 10),
        }
    }
}
