use serde::{Deserialize, Serialize};

use crate::retrieval::Subgraph;

/// Events produced by the chat agent, in emission order: zero or more
/// `Content` deltas, exactly one `GraphData`, then `Done` — or a single
/// `Error` ending the stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AgentEvent {
    Content { text: String },
    GraphData { subgraph: Subgraph },
    Done,
    Error { message: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryIntent {
    EntityLookup,
    RelationshipLookup,
    OpenEnded,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_serialize_with_type_tag() {
        let json = serde_json::to_value(AgentEvent::Content {
            text: "hello".into(),
        })
        .unwrap();
        assert_eq!(json["type"], "content");
        assert_eq!(json["text"], "hello");

        let json = serde_json::to_value(AgentEvent::Done).unwrap();
        assert_eq!(json["type"], "done");
    }
}
