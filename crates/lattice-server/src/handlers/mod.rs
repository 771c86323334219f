pub mod chat;
pub mod graph;
pub mod health;
pub mod ingest;
pub mod staging;
