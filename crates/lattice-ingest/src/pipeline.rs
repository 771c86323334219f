//! Ingestion orchestration: chunk, then embed and extract concurrently,
//! then stage the extraction for human review.

use std::sync::Arc;

use lattice_core::{
    ChunkConfig, ChunkPoint, Document, Embedder, EntityExtractor, ExtractionConfig, ItemPayload,
    Result, StagingItem, StagingSession, VectorStore,
};
use lattice_staging::FileStagingStore;

use crate::chunker::{bind_chunks, chunk_text};

pub struct IngestPipeline {
    embedder: Arc<dyn Embedder>,
    extractor: Arc<dyn EntityExtractor>,
    vectors: Arc<dyn VectorStore>,
    staging: Arc<FileStagingStore>,
}

#[derive(Debug)]
pub struct IngestReport {
    pub session: StagingSession,
    pub document: Document,
    pub chunk_count: usize,
    pub entity_count: usize,
    pub relationship_count: usize,
    pub extraction_errors: usize,
}

impl IngestPipeline {
    pub fn new(
        embedder: Arc<dyn Embedder>,
        extractor: Arc<dyn EntityExtractor>,
        vectors: Arc<dyn VectorStore>,
        staging: Arc<FileStagingStore>,
    ) -> Self {
        Self {
            embedder,
            extractor,
            vectors,
            staging,
        }
    }

    pub async fn ingest(
        &self,
        text: &str,
        title: String,
        source: String,
        chunk_config: &ChunkConfig,
        extraction_config: &ExtractionConfig,
    ) -> Result<IngestReport> {
        let document = Document::new(title, source);
        let chunks = bind_chunks(document.id, chunk_text(text, chunk_config));
        tracing::info!(
            document_id = %document.id,
            chunks = chunks.len(),
            "Chunked document"
        );

        if chunks.is_empty() {
            let doc = document.clone();
            let session = self
                .staging
                .run_blocking(move |s| s.create_session(&doc, &[]))
                .await?;
            return Ok(IngestReport {
                session,
                document,
                chunk_count: 0,
                entity_count: 0,
                relationship_count: 0,
                extraction_errors: 0,
            });
        }

        // Embedding and extraction hit different providers; run them
        // concurrently.
        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let (embeddings, extraction) = tokio::join!(
            self.embedder.embed_batch(&texts),
            self.extractor.extract(&chunks, extraction_config),
        );
        let embeddings = embeddings?;
        let extraction = extraction?;

        let points: Vec<ChunkPoint> = chunks
            .iter()
            .zip(embeddings)
            .map(|(chunk, embedding)| ChunkPoint {
                chunk_id: chunk.id,
                document_id: document.id,
                ordinal: chunk.ordinal,
                text: chunk.text.clone(),
                document_title: document.title.clone(),
                document_source: document.source.clone(),
                embedding,
            })
            .collect();
        self.vectors.upsert(points).await?;

        let doc = document.clone();
        let errors = extraction.errors.clone();
        let session = self
            .staging
            .run_blocking(move |s| s.create_session(&doc, &errors))
            .await?;
        let entity_count = extraction.entities.len();
        let relationship_count = extraction.relationships.len();
        let extraction_errors = extraction.errors.len();

        let mut items = Vec::with_capacity(entity_count + relationship_count);
        for scored in extraction.entities {
            items.push(StagingItem::new(
                ItemPayload::Entity(scored.entity),
                scored.confidence,
                scored.low_confidence,
            ));
        }
        for edge in extraction.relationships {
            let low = edge.confidence < extraction_config.min_confidence;
            let confidence = edge.confidence;
            items.push(StagingItem::new(
                ItemPayload::Relationship(edge),
                confidence,
                low,
            ));
        }
        let session_id = session.id;
        let session = self
            .staging
            .run_blocking(move |s| {
                s.add_items(session_id, items)?;
                s.get_session(session_id)
            })
            .await?;

        tracing::info!(
            session_id = %session.id,
            entities = entity_count,
            relationships = relationship_count,
            errors = extraction_errors,
            "Staged extraction for review"
        );

        Ok(IngestReport {
            session,
            document,
            chunk_count: chunks.len(),
            entity_count,
            relationship_count,
            extraction_errors,
        })
    }
}
