use std::sync::Arc;

use lattice_core::{
    Embedder, FactRecord, GraphStore, QueryIntent, Result, RetrievalMethod, RetrievedFact,
    Subgraph, VectorStore,
};

/// What one tool call contributes: facts for the LLM context plus nodes and
/// edges for the visualization payload.
#[derive(Debug, Default)]
pub struct ToolOutcome {
    pub facts: Vec<RetrievedFact>,
    pub subgraph: Subgraph,
}

impl ToolOutcome {
    pub fn absorb(&mut self, other: ToolOutcome) {
        self.facts.extend(other.facts);
        self.subgraph.merge(other.subgraph);
    }
}

// ── Intent classification ──────────────────────────────────────────────────

/// Names the user put in double quotes, in order of appearance.
pub fn extract_quoted_names(message: &str) -> Vec<String> {
    let mut names = Vec::new();
    let mut rest = message;
    while let Some(start) = rest.find('"') {
        let after = &rest[start + 1..];
        let Some(end) = after.find('"') else { break };
        let name = after[..end].trim();
        if !name.is_empty() {
            names.push(name.to_string());
        }
        rest = &after[end + 1..];
    }
    names
}

const RELATIONSHIP_MARKERS: &[&str] = &[
    "relation between",
    "relationship between",
    "connection",
    "connected to",
    "works at",
    "works for",
];

const ENTITY_MARKERS: &[&str] = &["who is", "what is", "tell me about"];

/// Relationship markers win over entity markers: "what is the relation
/// between X and Y" is a relationship question.
pub fn classify_intent(message: &str) -> (QueryIntent, Vec<String>) {
    let lower = message.to_lowercase();
    let mut names = extract_quoted_names(message);

    if RELATIONSHIP_MARKERS.iter().any(|m| lower.contains(m)) {
        if names.is_empty() {
            names = names_from_between_clause(message);
        }
        return (QueryIntent::RelationshipLookup, names);
    }

    if !names.is_empty() || ENTITY_MARKERS.iter().any(|m| lower.contains(m)) {
        if names.is_empty() {
            if let Some(name) = name_after_marker(message) {
                names.push(name);
            }
        }
        return (QueryIntent::EntityLookup, names);
    }

    (QueryIntent::OpenEnded, names)
}

/// "... between X and Y" without quotes.
fn names_from_between_clause(message: &str) -> Vec<String> {
    let lower = message.to_lowercase();
    let Some(idx) = lower.find("between ") else {
        return Vec::new();
    };
    let clause = &message[idx + "between ".len()..];
    let clause = clause.trim_end_matches(['?', '.', '!']);
    let lower_clause = clause.to_lowercase();
    let Some(and_idx) = lower_clause.find(" and ") else {
        return Vec::new();
    };
    let first = clause[..and_idx].trim();
    let second = clause[and_idx + " and ".len()..].trim();
    let mut names = Vec::new();
    if !first.is_empty() {
        names.push(first.to_string());
    }
    if !second.is_empty() {
        names.push(second.to_string());
    }
    names
}

fn name_after_marker(message: &str) -> Option<String> {
    let lower = message.to_lowercase();
    for marker in ENTITY_MARKERS {
        if let Some(idx) = lower.find(marker) {
            let rest = message[idx + marker.len()..]
                .trim()
                .trim_end_matches(['?', '.', '!'])
                .trim();
            if !rest.is_empty() {
                return Some(rest.to_string());
            }
        }
    }
    None
}

// ── Retrieval tools ────────────────────────────────────────────────────────

pub struct RetrievalTools {
    graph: Arc<dyn GraphStore>,
    vectors: Arc<dyn VectorStore>,
    embedder: Arc<dyn Embedder>,
}

fn fact_outcome(records: Vec<FactRecord>, method: RetrievalMethod) -> ToolOutcome {
    let mut outcome = ToolOutcome::default();
    for record in records {
        outcome.facts.push(RetrievedFact {
            fact: record.fact_text.clone(),
            uuid: record.edge.id.clone(),
            valid_at: record.valid_at,
            source_node: Some(record.source_name),
            target_node: Some(record.target_name),
            score: record.score,
            method,
        });
        for node in record.nodes {
            outcome.subgraph.add_node(node);
        }
        outcome.subgraph.add_edge(record.edge);
    }
    outcome
}

impl RetrievalTools {
    pub fn new(
        graph: Arc<dyn GraphStore>,
        vectors: Arc<dyn VectorStore>,
        embedder: Arc<dyn Embedder>,
    ) -> Self {
        Self {
            graph,
            vectors,
            embedder,
        }
    }

    pub async fn graph_search(&self, query: &str, limit: usize) -> Result<ToolOutcome> {
        let records = self.graph.search_facts(query, limit).await?;
        Ok(fact_outcome(records, RetrievalMethod::GraphSearch))
    }

    pub async fn vector_search(&self, query: &str, limit: usize) -> Result<ToolOutcome> {
        let vector = self.embedder.embed(query).await?;
        let hits = self.vectors.search(vector, limit).await?;
        let mut outcome = ToolOutcome::default();
        for hit in hits {
            let fact = if hit.document_title.is_empty() {
                hit.text
            } else {
                format!("[{}] {}", hit.document_title, hit.text)
            };
            outcome.facts.push(RetrievedFact {
                fact,
                uuid: hit.chunk_id.to_string(),
                valid_at: None,
                source_node: None,
                target_node: None,
                score: Some(hit.score as f64),
                method: RetrievalMethod::VectorSearch,
            });
        }
        Ok(outcome)
    }

    pub async fn entity_search(&self, name: &str, limit: usize) -> Result<ToolOutcome> {
        let records = self.graph.search_entities(name, limit).await?;
        let mut outcome = ToolOutcome::default();
        for record in records {
            let fact = if record.summary.is_empty() {
                format!("{} ({})", record.name, record.labels.join(", "))
            } else {
                format!("{}: {}", record.name, record.summary)
            };
            outcome.facts.push(RetrievedFact {
                fact,
                uuid: record.id.clone(),
                valid_at: None,
                source_node: Some(record.name.clone()),
                target_node: None,
                score: None,
                method: RetrievalMethod::EntitySearch,
            });
            outcome.subgraph.add_node(record.into_payload());
        }
        Ok(outcome)
    }

    /// Edges around `name`. When `reaching` is set, only paths that touch
    /// the other named entity are kept.
    pub async fn entity_relationships(
        &self,
        name: &str,
        hops: u8,
        reaching: Option<&str>,
    ) -> Result<ToolOutcome> {
        let neighborhood = self.graph.entity_relationships(name, hops).await?;
        let mut records = neighborhood.facts;
        if let Some(other) = reaching {
            let other_lower = other.to_lowercase();
            records = restrict_to_target(records, &other_lower, &neighborhood.center.name);
        }
        let mut outcome = ToolOutcome::default();
        outcome
            .subgraph
            .add_node(neighborhood.center.into_payload());
        outcome.absorb(fact_outcome(records, RetrievalMethod::EntityRelationships));
        Ok(outcome)
    }
}

/// Keep edges on paths that reach the other entity: edges touching it
/// directly, plus edges sharing an intermediate node with one that does.
fn restrict_to_target(
    records: Vec<FactRecord>,
    target_lower: &str,
    center_name: &str,
) -> Vec<FactRecord> {
    let touches = |record: &FactRecord| {
        record.source_name.to_lowercase().contains(target_lower)
            || record.target_name.to_lowercase().contains(target_lower)
    };

    let mut kept_node_ids: std::collections::HashSet<String> = std::collections::HashSet::new();
    for record in records.iter().filter(|r| touches(r)) {
        kept_node_ids.insert(record.edge.start_node_id.clone());
        kept_node_ids.insert(record.edge.end_node_id.clone());
    }
    if kept_node_ids.is_empty() {
        return Vec::new();
    }

    let center_lower = center_name.to_lowercase();
    records
        .into_iter()
        .filter(|record| {
            touches(record)
                || ((record.source_name.to_lowercase().contains(&center_lower)
                    || record.target_name.to_lowercase().contains(&center_lower))
                    && (kept_node_ids.contains(&record.edge.start_node_id)
                        || kept_node_ids.contains(&record.edge.end_node_id)))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use lattice_core::{
        ChunkPoint, ExtractedEntity, GraphEdgePayload, GraphNodePayload, GraphQuery, LatticeError,
        Neighborhood, NodeRecord, TypedEdge, VectorHit,
    };
    use uuid::Uuid;

    #[test]
    fn quoted_names_extracted_in_order() {
        let names = extract_quoted_names(r#"relation between "John Smith" and "Sequoia Capital""#);
        assert_eq!(names, vec!["John Smith", "Sequoia Capital"]);
    }

    #[test]
    fn who_is_classifies_as_entity_lookup() {
        let (intent, names) = classify_intent(r#"who is "John Smith"?"#);
        assert_eq!(intent, QueryIntent::EntityLookup);
        assert_eq!(names, vec!["John Smith"]);
    }

    #[test]
    fn who_is_without_quotes_takes_trailing_words() {
        let (intent, names) = classify_intent("who is John Smith?");
        assert_eq!(intent, QueryIntent::EntityLookup);
        assert_eq!(names, vec!["John Smith"]);
    }

    #[test]
    fn relation_between_wins_over_what_is() {
        let (intent, names) =
            classify_intent(r#"what is the relation between "John Smith" and "Sequoia Capital"?"#);
        assert_eq!(intent, QueryIntent::RelationshipLookup);
        assert_eq!(names, vec!["John Smith", "Sequoia Capital"]);
    }

    #[test]
    fn between_clause_parsed_without_quotes() {
        let (intent, names) =
            classify_intent("what is the connection between John Smith and TechCorp?");
        assert_eq!(intent, QueryIntent::RelationshipLookup);
        assert_eq!(names, vec!["John Smith", "TechCorp"]);
    }

    #[test]
    fn plain_question_is_open_ended() {
        let (intent, names) = classify_intent("summarize recent investments in fintech");
        assert_eq!(intent, QueryIntent::OpenEnded);
        assert!(names.is_empty());
    }

    fn record(id: &str, src: &str, src_id: &str, tgt: &str, tgt_id: &str) -> FactRecord {
        FactRecord {
            edge: GraphEdgePayload {
                id: id.into(),
                start_node_id: src_id.into(),
                end_node_id: tgt_id.into(),
                edge_type: "LEADERSHIP".into(),
                properties: serde_json::json!({}),
            },
            fact_text: format!("{src} and {tgt}"),
            source_name: src.into(),
            target_name: tgt.into(),
            valid_at: None,
            score: None,
            nodes: vec![
                GraphNodePayload {
                    id: src_id.into(),
                    labels: vec![],
                    properties: serde_json::json!({}),
                },
                GraphNodePayload {
                    id: tgt_id.into(),
                    labels: vec![],
                    properties: serde_json::json!({}),
                },
            ],
        }
    }

    #[test]
    fn restriction_keeps_two_hop_path_through_intermediate() {
        // John -L-> TechCorp <-I- Sequoia, plus an unrelated edge.
        let records = vec![
            record("e1", "John Smith", "n1", "TechCorp Inc.", "n2"),
            record("e2", "Sequoia Capital", "n3", "TechCorp Inc.", "n2"),
            record("e3", "John Smith", "n1", "Acme Corp", "n4"),
        ];
        let kept = restrict_to_target(records, "sequoia capital", "John Smith");
        let ids: Vec<&str> = kept.iter().map(|r| r.edge.id.as_str()).collect();
        assert_eq!(ids, vec!["e1", "e2"]);
    }

    #[test]
    fn restriction_with_no_reaching_path_drops_everything() {
        let records = vec![record("e1", "John Smith", "n1", "TechCorp Inc.", "n2")];
        let kept = restrict_to_target(records, "sequoia capital", "John Smith");
        assert!(kept.is_empty());
    }

    #[test]
    fn fact_outcome_carries_nodes_and_edges() {
        let outcome = fact_outcome(
            vec![record("e1", "John Smith", "n1", "TechCorp Inc.", "n2")],
            RetrievalMethod::GraphSearch,
        );
        assert_eq!(outcome.facts.len(), 1);
        assert_eq!(outcome.subgraph.nodes.len(), 2);
        assert_eq!(outcome.subgraph.edges.len(), 1);
        assert_eq!(outcome.facts[0].method, RetrievalMethod::GraphSearch);
    }

    struct NullGraph;

    #[async_trait]
    impl GraphStore for NullGraph {
        async fn merge_entity(&self, _: &ExtractedEntity) -> Result<()> {
            Ok(())
        }
        async fn merge_edge(&self, _: &TypedEdge) -> Result<()> {
            Ok(())
        }
        async fn search_facts(&self, _: &str, _: usize) -> Result<Vec<FactRecord>> {
            Ok(Vec::new())
        }
        async fn search_entities(&self, _: &str, _: usize) -> Result<Vec<NodeRecord>> {
            Ok(Vec::new())
        }
        async fn entity_relationships(&self, name: &str, _: u8) -> Result<Neighborhood> {
            Err(LatticeError::NotFound(name.to_string()))
        }
        async fn execute_cypher(&self, _: &GraphQuery) -> Result<serde_json::Value> {
            Ok(serde_json::Value::Null)
        }
        async fn node_count(&self) -> Result<u64> {
            Ok(0)
        }
        async fn edge_count(&self) -> Result<u64> {
            Ok(0)
        }
        async fn ping(&self) -> bool {
            true
        }
    }

    struct StubEmbedder;

    #[async_trait]
    impl Embedder for StubEmbedder {
        async fn embed(&self, _: &str) -> Result<Vec<f32>> {
            Ok(vec![0.0; 3])
        }
        async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            Ok(texts.iter().map(|_| vec![0.0; 3]).collect())
        }
        fn dim(&self) -> usize {
            3
        }
    }

    struct StubVectors;

    #[async_trait]
    impl VectorStore for StubVectors {
        async fn ensure_collection(&self) -> Result<()> {
            Ok(())
        }
        async fn upsert(&self, _: Vec<ChunkPoint>) -> Result<()> {
            Ok(())
        }
        async fn search(&self, _: Vec<f32>, _: usize) -> Result<Vec<VectorHit>> {
            Ok(vec![VectorHit {
                chunk_id: Uuid::new_v4(),
                document_id: Uuid::new_v4(),
                ordinal: 0,
                text: "John Smith founded TechCorp in 2020.".into(),
                document_title: "Quarterly brief".into(),
                document_source: "upload".into(),
                score: 0.87,
            }])
        }
        async fn ping(&self) -> bool {
            true
        }
    }

    #[tokio::test]
    async fn vector_hits_carry_their_source_document() {
        let tools = RetrievalTools::new(
            Arc::new(NullGraph),
            Arc::new(StubVectors),
            Arc::new(StubEmbedder),
        );
        let outcome = tools.vector_search("techcorp founding", 5).await.unwrap();
        assert_eq!(outcome.facts.len(), 1);
        assert_eq!(
            outcome.facts[0].fact,
            "[Quarterly brief] John Smith founded TechCorp in 2020."
        );
        assert_eq!(outcome.facts[0].method, RetrievalMethod::VectorSearch);
    }
}
