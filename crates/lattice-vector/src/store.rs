use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use qdrant_client::qdrant::value::Kind;
use qdrant_client::qdrant::{
    CreateCollectionBuilder, Distance, PointStruct, SearchPointsBuilder, UpsertPointsBuilder,
    Value, VectorParamsBuilder,
};
use qdrant_client::{Payload, Qdrant};
use uuid::Uuid;

use lattice_core::{AppConfig, ChunkPoint, LatticeError, Result, VectorHit, VectorStore};

pub struct QdrantVectorStore {
    client: Option<Qdrant>,
    collection: String,
    dim: usize,
    timeout: Duration,
}

impl QdrantVectorStore {
    pub fn new(config: &AppConfig) -> Self {
        let timeout = Duration::from_secs(config.vector_timeout_secs);
        match Qdrant::from_url(&config.qdrant_url).build() {
            Ok(client) => {
                tracing::info!(url = %config.qdrant_url, "Connected to Qdrant");
                Self {
                    client: Some(client),
                    collection: config.qdrant_collection.clone(),
                    dim: config.embedding_dim,
                    timeout,
                }
            }
            Err(e) => {
                tracing::warn!(url = %config.qdrant_url, error = %e, "Failed to connect to Qdrant, running in degraded mode");
                Self {
                    client: None,
                    collection: config.qdrant_collection.clone(),
                    dim: config.embedding_dim,
                    timeout,
                }
            }
        }
    }

    fn client(&self) -> Result<&Qdrant> {
        self.client
            .as_ref()
            .ok_or_else(|| LatticeError::Vector("Qdrant not connected".into()))
    }

    pub fn is_connected(&self) -> bool {
        self.client.is_some()
    }

    async fn timed<T, F: Future<Output = T>>(&self, op: F) -> Result<T> {
        tokio::time::timeout(self.timeout, op).await.map_err(|_| {
            tracing::warn!("Qdrant operation timed out after {:?}", self.timeout);
            LatticeError::Vector(format!(
                "Qdrant operation timed out after {:?}",
                self.timeout
            ))
        })
    }
}

fn point_payload(point: &ChunkPoint) -> Payload {
    let mut payload = Payload::new();
    payload.insert("chunk_id", point.chunk_id.to_string());
    payload.insert("document_id", point.document_id.to_string());
    payload.insert("ordinal", point.ordinal as i64);
    payload.insert("text", point.text.clone());
    payload.insert("document_title", point.document_title.clone());
    payload.insert("document_source", point.document_source.clone());
    payload
}

fn payload_str(map: &HashMap<String, Value>, key: &str) -> String {
    match map.get(key).and_then(|v| v.kind.as_ref()) {
        Some(Kind::StringValue(s)) => s.clone(),
        _ => String::new(),
    }
}

fn payload_int(map: &HashMap<String, Value>, key: &str) -> i64 {
    match map.get(key).and_then(|v| v.kind.as_ref()) {
        Some(Kind::IntegerValue(i)) => *i,
        _ => 0,
    }
}

fn hit_from_payload(map: &HashMap<String, Value>, score: f32) -> Option<VectorHit> {
    let chunk_id = Uuid::parse_str(&payload_str(map, "chunk_id")).ok()?;
    let document_id = Uuid::parse_str(&payload_str(map, "document_id")).ok()?;
    Some(VectorHit {
        chunk_id,
        document_id,
        ordinal: payload_int(map, "ordinal") as usize,
        text: payload_str(map, "text"),
        document_title: payload_str(map, "document_title"),
        document_source: payload_str(map, "document_source"),
        score,
    })
}

#[async_trait]
impl VectorStore for QdrantVectorStore {
    async fn ensure_collection(&self) -> Result<()> {
        let client = self.client()?;
        let exists = self
            .timed(client.collection_exists(&self.collection))
            .await?
            .map_err(|e| LatticeError::Vector(format!("Collection check failed: {e}")))?;
        if exists {
            return Ok(());
        }

        self.timed(
            client.create_collection(
                CreateCollectionBuilder::new(&self.collection)
                    .vectors_config(VectorParamsBuilder::new(self.dim as u64, Distance::Cosine)),
            ),
        )
        .await?
        .map_err(|e| LatticeError::Vector(format!("Failed to create collection: {e}")))?;

        tracing::info!(collection = %self.collection, dim = self.dim, "Created Qdrant collection");
        Ok(())
    }

    async fn upsert(&self, points: Vec<ChunkPoint>) -> Result<()> {
        if points.is_empty() {
            return Ok(());
        }
        for point in &points {
            if point.embedding.len() != self.dim {
                return Err(LatticeError::Vector(format!(
                    "Embedding for chunk {} has {} dimensions, expected {}",
                    point.chunk_id,
                    point.embedding.len(),
                    self.dim
                )));
            }
        }

        let count = points.len();
        let structs: Vec<PointStruct> = points
            .iter()
            .map(|p| {
                PointStruct::new(
                    p.chunk_id.to_string(),
                    p.embedding.clone(),
                    point_payload(p),
                )
            })
            .collect();

        self.timed(
            self.client()?
                .upsert_points(UpsertPointsBuilder::new(&self.collection, structs)),
        )
        .await?
        .map_err(|e| LatticeError::Vector(format!("Upsert failed: {e}")))?;

        tracing::debug!(collection = %self.collection, count, "Upserted chunk points");
        Ok(())
    }

    async fn search(&self, vector: Vec<f32>, limit: usize) -> Result<Vec<VectorHit>> {
        if vector.len() != self.dim {
            return Err(LatticeError::Vector(format!(
                "Query vector has {} dimensions, expected {}",
                vector.len(),
                self.dim
            )));
        }

        let response = self
            .timed(
                self.client()?.search_points(
                    SearchPointsBuilder::new(&self.collection, vector, limit as u64)
                        .with_payload(true),
                ),
            )
            .await?
            .map_err(|e| LatticeError::Vector(format!("Vector search failed: {e}")))?;

        let hits: Vec<VectorHit> = response
            .result
            .into_iter()
            .filter_map(|scored| hit_from_payload(&scored.payload, scored.score))
            .collect();

        tracing::debug!(collection = %self.collection, results = hits.len(), "Vector search completed");
        Ok(hits)
    }

    async fn ping(&self) -> bool {
        let Ok(client) = self.client() else {
            return false;
        };
        self.timed(client.health_check())
            .await
            .map(|r| r.is_ok())
            .unwrap_or(false)
    }
}
