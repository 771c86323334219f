pub mod store;

pub use store::Neo4jGraph;
