pub mod chunker;
pub mod embedder;
pub mod extractor;
pub mod pipeline;

pub use chunker::{bind_chunks, chunk_text, ChunkSlice};
pub use embedder::OpenAiEmbedder;
pub use extractor::LlmEntityExtractor;
pub use pipeline::{IngestPipeline, IngestReport};
