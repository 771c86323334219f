pub mod agent;
pub mod tools;

pub use agent::HybridAgent;
pub use tools::{classify_intent, RetrievalTools, ToolOutcome};
