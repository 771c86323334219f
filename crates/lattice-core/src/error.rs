use thiserror::Error;

#[derive(Error, Debug)]
pub enum LatticeError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Provider error ({provider}): {message}")]
    Provider { provider: String, message: String },

    #[error("Extraction error: {0}")]
    Extraction(String),

    #[error("Commit error: {0}")]
    Commit(String),

    #[error("Graph database error: {0}")]
    Graph(String),

    #[error("Vector store error: {0}")]
    Vector(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl LatticeError {
    pub fn provider(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Provider {
            provider: provider.into(),
            message: message.into(),
        }
    }

    /// Stable kind string used in API error bodies.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::NotFound(_) => "not_found",
            Self::Conflict(_) => "conflict",
            Self::Provider { .. } => "provider",
            Self::Extraction(_) => "extraction",
            Self::Commit(_) => "commit",
            Self::Graph(_) => "graph",
            Self::Vector(_) => "vector",
            Self::Config(_) => "config",
            Self::Http(_) => "provider",
            Self::Json(_) => "validation",
            Self::Io(_) => "internal",
            Self::Internal(_) => "internal",
        }
    }
}

pub type Result<T> = std::result::Result<T, LatticeError>;
