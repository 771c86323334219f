use std::sync::Arc;

use lattice_core::VectorStore;

use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

mod error;
mod handlers;
mod routes;
mod state;

use state::AppState;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive("lattice=info".parse().unwrap()),
        )
        .init();

    let config = lattice_core::AppConfig::from_env();
    let host = config.server_host.clone();
    let port = config.server_port;

    let graph = Arc::new(lattice_graph::Neo4jGraph::new(&config).await);
    if graph.is_connected() {
        if let Err(e) = graph.ensure_constraints().await {
            tracing::warn!(error = %e, "Failed to ensure graph constraints");
        }
    }

    let vectors = Arc::new(lattice_vector::QdrantVectorStore::new(&config));
    if vectors.is_connected() {
        if let Err(e) = vectors.ensure_collection().await {
            tracing::warn!(error = %e, "Failed to ensure vector collection");
        }
    }

    let staging = Arc::new(
        lattice_staging::FileStagingStore::new(&config.data_dir)
            .expect("Failed to create staging data directory"),
    );
    let embedder = Arc::new(lattice_ingest::OpenAiEmbedder::new(&config));
    let extractor = Arc::new(lattice_ingest::LlmEntityExtractor::new(&config));

    let graph: Arc<dyn lattice_core::GraphStore> = graph;
    let vectors: Arc<dyn lattice_core::VectorStore> = vectors;
    let embedder: Arc<dyn lattice_core::Embedder> = embedder;

    let pipeline = Arc::new(lattice_ingest::IngestPipeline::new(
        embedder.clone(),
        extractor,
        vectors.clone(),
        staging.clone(),
    ));
    let agent = Arc::new(
        lattice_agent::HybridAgent::new(
            graph.clone(),
            vectors.clone(),
            embedder.clone(),
            &config,
        )
        .expect("Failed to build chat agent"),
    );

    let state = AppState {
        config,
        graph,
        vectors,
        staging,
        pipeline,
        agent,
    };

    let app = routes::create_router()
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let addr = format!("{host}:{port}");
    tracing::info!("Lattice server listening on {addr}");

    let listener = tokio::net::TcpListener::bind(&addr).await.unwrap();
    axum::serve(listener, app).await.unwrap();
}
