use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use neo4rs::{query, Graph, Node, Relation};
use uuid::Uuid;

use lattice_core::{
    edge_kind_for_position, normalize_name, AppConfig, CompanyEntity, CypherResult, EdgeKind,
    EntityKind, ExtractedEntity, FactRecord, GraphEdgePayload, GraphNodePayload, GraphQuery,
    GraphStore, LatticeError, Neighborhood, NodeRecord, PersonEntity, Result, TypedEdge,
};

pub struct Neo4jGraph {
    graph: Option<Graph>,
    timeout: Duration,
}

impl Neo4jGraph {
    pub async fn new(config: &AppConfig) -> Self {
        let timeout = Duration::from_secs(config.graph_timeout_secs);
        match Graph::new(&config.neo4j_uri, &config.neo4j_user, &config.neo4j_password).await {
            Ok(graph) => {
                tracing::info!(uri = %config.neo4j_uri, "Connected to Neo4j");
                Self {
                    graph: Some(graph),
                    timeout,
                }
            }
            Err(e) => {
                tracing::warn!(uri = %config.neo4j_uri, error = %e, "Failed to connect to Neo4j, running in degraded mode");
                Self {
                    graph: None,
                    timeout,
                }
            }
        }
    }

    fn graph(&self) -> Result<&Graph> {
        self.graph
            .as_ref()
            .ok_or_else(|| LatticeError::Graph("Neo4j not connected".into()))
    }

    pub fn is_connected(&self) -> bool {
        self.graph.is_some()
    }

    /// Wrap any graph operation with the configured timeout.
    async fn timed<T, F: Future<Output = T>>(&self, op: F) -> Result<T> {
        tokio::time::timeout(self.timeout, op).await.map_err(|_| {
            tracing::warn!("Neo4j operation timed out after {:?}", self.timeout);
            LatticeError::Graph(format!("Neo4j operation timed out after {:?}", self.timeout))
        })
    }

    /// Uniqueness constraints on the merge keys. Call once at startup.
    pub async fn ensure_constraints(&self) -> Result<()> {
        let graph = self.graph()?;
        for label in ["Person", "Company"] {
            let cypher = format!(
                "CREATE CONSTRAINT {}_name_key IF NOT EXISTS \
                 FOR (n:{label}) REQUIRE n.name_key IS UNIQUE",
                label.to_lowercase()
            );
            self.timed(graph.run(query(&cypher)))
                .await?
                .map_err(|e| LatticeError::Graph(format!("Failed to create constraint: {e}")))?;
        }
        Ok(())
    }
}

// ── Attribute plumbing ─────────────────────────────────────────────────────

/// Kind-specific attributes flattened to (property, value) pairs. Values are
/// stored as plain node properties so MERGE can union them attribute by
/// attribute.
enum AttrValue {
    Str(String),
    Int(i64),
}

fn person_attrs(p: &PersonEntity) -> Vec<(&'static str, AttrValue)> {
    let mut attrs = Vec::new();
    if let Some(v) = &p.position {
        attrs.push(("position", AttrValue::Str(v.clone())));
    }
    if let Some(v) = &p.company {
        attrs.push(("company", AttrValue::Str(v.clone())));
    }
    if let Some(v) = &p.department {
        attrs.push(("department", AttrValue::Str(v.clone())));
    }
    if let Some(v) = &p.start_date {
        attrs.push(("start_date", AttrValue::Str(v.clone())));
    }
    if let Some(v) = &p.nationality {
        attrs.push(("nationality", AttrValue::Str(v.clone())));
    }
    if !p.skills.is_empty() {
        attrs.push((
            "skills",
            AttrValue::Str(serde_json::to_string(&p.skills).unwrap_or_default()),
        ));
    }
    attrs
}

fn company_attrs(c: &CompanyEntity) -> Vec<(&'static str, AttrValue)> {
    let mut attrs = Vec::new();
    if let Some(v) = &c.industry {
        attrs.push(("industry", AttrValue::Str(v.clone())));
    }
    if let Some(v) = c.founded_year {
        attrs.push(("founded_year", AttrValue::Int(v)));
    }
    if let Some(v) = &c.headquarters {
        attrs.push(("headquarters", AttrValue::Str(v.clone())));
    }
    if let Some(v) = c.employee_count {
        attrs.push(("employee_count", AttrValue::Int(v)));
    }
    if let Some(v) = &c.website {
        attrs.push(("website", AttrValue::Str(v.clone())));
    }
    attrs
}

/// Build the MERGE statement for an entity. Attribute union: incoming
/// non-null values fill nulls, existing values are preserved.
fn entity_merge_cypher(label: &str, attrs: &[(&'static str, AttrValue)]) -> String {
    let mut set_clauses = vec![
        "n.name = CASE WHEN n.placeholder THEN $name ELSE coalesce(n.name, $name) END".to_string(),
        "n.placeholder = false".to_string(),
        "n.summary = CASE WHEN coalesce(n.summary, '') = '' THEN $summary ELSE n.summary END"
            .to_string(),
        "n.source_chunk_ids = coalesce(n.source_chunk_ids, $source_chunk_ids)".to_string(),
        "n.updated_at = $now".to_string(),
    ];
    for (prop, _) in attrs {
        set_clauses.push(format!("n.{prop} = coalesce(n.{prop}, ${prop})"));
    }
    format!(
        "MERGE (n:{label} {{name_key: $name_key}}) \
         ON CREATE SET n.uuid = $uuid, n.created_at = $now, n.placeholder = true \
         SET {}",
        set_clauses.join(", ")
    )
}

fn string_list_prop(node: &Node, key: &str) -> Vec<String> {
    let raw: String = node.get(key).unwrap_or_default();
    serde_json::from_str(&raw).unwrap_or_default()
}

fn node_to_record(node: &Node) -> Result<NodeRecord> {
    let uuid: String = node
        .get("uuid")
        .map_err(|e| LatticeError::Graph(format!("Missing uuid on node: {e}")))?;
    let name: String = node
        .get("name")
        .map_err(|e| LatticeError::Graph(format!("Missing name on node: {e}")))?;
    let labels: Vec<String> = node.labels().iter().map(|l| l.to_string()).collect();
    let summary: String = node.get("summary").unwrap_or_default();

    let mut props = serde_json::Map::new();
    props.insert("name".into(), name.clone().into());
    if !summary.is_empty() {
        props.insert("summary".into(), summary.clone().into());
    }
    let placeholder: bool = node.get("placeholder").unwrap_or(false);
    if placeholder {
        props.insert("placeholder".into(), true.into());
    }
    if labels.iter().any(|l| l == "Person") {
        for key in ["position", "company", "department", "start_date", "nationality"] {
            if let Ok(v) = node.get::<String>(key) {
                props.insert(key.into(), v.into());
            }
        }
        let skills = string_list_prop(node, "skills");
        if !skills.is_empty() {
            props.insert("skills".into(), serde_json::json!(skills));
        }
    }
    if labels.iter().any(|l| l == "Company") {
        for key in ["industry", "headquarters", "website"] {
            if let Ok(v) = node.get::<String>(key) {
                props.insert(key.into(), v.into());
            }
        }
        for key in ["founded_year", "employee_count"] {
            if let Ok(v) = node.get::<i64>(key) {
                props.insert(key.into(), v.into());
            }
        }
    }

    Ok(NodeRecord {
        id: uuid,
        name,
        labels,
        summary,
        properties: serde_json::Value::Object(props),
    })
}

/// Build a FactRecord out of an edge's property map and its two endpoint
/// records. Accepts the map shape `properties(r)` returns.
fn fact_from_props(
    rel_type: &str,
    props: &serde_json::Value,
    source: &NodeRecord,
    target: &NodeRecord,
    score: Option<f64>,
) -> FactRecord {
    let get_str = |key: &str| props.get(key).and_then(|v| v.as_str()).map(str::to_string);
    let uuid = get_str("uuid").unwrap_or_else(|| {
        // Synthesize a stable id when an edge predates uuid backfill.
        format!("{}:{}:{}", rel_type, source.id, target.id)
    });
    let fact_text = get_str("fact_text")
        .unwrap_or_else(|| format!("{} {} {}", source.name, rel_type.to_lowercase(), target.name));
    let valid_at = get_str("valid_at")
        .and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
        .map(|dt| dt.with_timezone(&Utc));

    let mut edge_props = serde_json::Map::new();
    edge_props.insert("fact_text".into(), fact_text.clone().into());
    if let Some(c) = props.get("confidence").and_then(|v| v.as_f64()) {
        edge_props.insert("confidence".into(), c.into());
    }
    if let Some(v) = get_str("valid_at") {
        edge_props.insert("valid_at".into(), v.into());
    }
    if let Some(v) = get_str("invalid_at") {
        edge_props.insert("invalid_at".into(), v.into());
    }
    if let Some(attrs) = get_str("attributes")
        .and_then(|raw| serde_json::from_str::<serde_json::Value>(&raw).ok())
    {
        edge_props.insert("attributes".into(), attrs);
    }

    FactRecord {
        edge: GraphEdgePayload {
            id: uuid,
            start_node_id: source.id.clone(),
            end_node_id: target.id.clone(),
            edge_type: rel_type.to_string(),
            properties: serde_json::Value::Object(edge_props),
        },
        fact_text,
        source_name: source.name.clone(),
        target_name: target.name.clone(),
        valid_at,
        score,
        nodes: vec![source.clone().into_payload(), target.clone().into_payload()],
    }
}

fn apply_params(mut q: neo4rs::Query, params: &serde_json::Value) -> neo4rs::Query {
    if let Some(obj) = params.as_object() {
        for (key, value) in obj {
            q = match value {
                serde_json::Value::String(s) => q.param(&key[..], s.clone()),
                serde_json::Value::Number(n) => {
                    if let Some(i) = n.as_i64() {
                        q.param(&key[..], i)
                    } else if let Some(f) = n.as_f64() {
                        q.param(&key[..], f)
                    } else {
                        q.param(&key[..], n.to_string())
                    }
                }
                serde_json::Value::Bool(b) => q.param(&key[..], *b),
                serde_json::Value::Null => q.param(&key[..], ""),
                _ => q.param(&key[..], value.to_string()),
            };
        }
    }
    q
}

fn bolt_node_payload(node: &Node) -> GraphNodePayload {
    let mut props = serde_json::Map::new();
    for key in node.keys() {
        if let Ok(value) = node.get::<serde_json::Value>(key) {
            props.insert(key.to_string(), value);
        }
    }
    GraphNodePayload {
        id: node.id().to_string(),
        labels: node.labels().iter().map(|l| l.to_string()).collect(),
        properties: serde_json::Value::Object(props),
    }
}

fn bolt_relation_payload(rel: &Relation) -> GraphEdgePayload {
    let mut props = serde_json::Map::new();
    for key in rel.keys() {
        if let Ok(value) = rel.get::<serde_json::Value>(key) {
            props.insert(key.to_string(), value);
        }
    }
    GraphEdgePayload {
        id: rel.id().to_string(),
        start_node_id: rel.start_node_id().to_string(),
        end_node_id: rel.end_node_id().to_string(),
        edge_type: rel.typ().to_string(),
        properties: serde_json::Value::Object(props),
    }
}

/// Fraction of query terms present in the fact text.
fn lexical_score(fact_text: &str, terms: &[String]) -> f64 {
    if terms.is_empty() {
        return 0.0;
    }
    let lower = fact_text.to_lowercase();
    let hits = terms.iter().filter(|t| lower.contains(t.as_str())).count();
    hits as f64 / terms.len() as f64
}

#[async_trait]
impl GraphStore for Neo4jGraph {
    async fn merge_entity(&self, entity: &ExtractedEntity) -> Result<()> {
        let (label, summary, chunk_ids, attrs) = match entity {
            ExtractedEntity::Person(p) => (
                EntityKind::Person.label(),
                p.summary.clone(),
                &p.source_chunk_ids,
                person_attrs(p),
            ),
            ExtractedEntity::Company(c) => (
                EntityKind::Company.label(),
                c.summary.clone(),
                &c.source_chunk_ids,
                company_attrs(c),
            ),
        };

        let cypher = entity_merge_cypher(label, &attrs);
        let mut q = query(&cypher)
            .param("name_key", normalize_name(entity.name()))
            .param("name", entity.name().to_string())
            .param("uuid", Uuid::new_v4().to_string())
            .param("summary", summary)
            .param(
                "source_chunk_ids",
                serde_json::to_string(chunk_ids).unwrap_or_default(),
            )
            .param("now", Utc::now().to_rfc3339());
        for (prop, value) in attrs {
            q = match value {
                AttrValue::Str(s) => q.param(prop, s),
                AttrValue::Int(i) => q.param(prop, i),
            };
        }

        self.timed(self.graph()?.run(q))
            .await?
            .map_err(|e| {
                LatticeError::Commit(format!("Failed to merge entity {}: {e}", entity.name()))
            })?;

        tracing::debug!(name = %entity.name(), label, "Merged entity");
        Ok(())
    }

    async fn merge_edge(&self, edge: &TypedEdge) -> Result<()> {
        if !edge.endpoints_valid() {
            return Err(LatticeError::Validation(format!(
                "{:?} edge may not connect {:?} -> {:?}",
                edge.kind, edge.source_kind, edge.target_kind
            )));
        }

        let (_, src_key, tgt_key, _) = edge.merge_key();
        // The merge key may have reordered undirected person partnerships;
        // keep names aligned with the keys.
        let (src_name, tgt_name) = if normalize_name(&edge.source_name) == src_key {
            (edge.source_name.clone(), edge.target_name.clone())
        } else {
            (edge.target_name.clone(), edge.source_name.clone())
        };
        let valid_key = edge
            .valid_at
            .map(|dt| dt.to_rfc3339())
            .unwrap_or_default();

        let cypher = format!(
            "MERGE (a:{src_label} {{name_key: $src_key}}) \
               ON CREATE SET a.uuid = $src_uuid, a.name = $src_name, \
                 a.placeholder = true, a.created_at = $now \
             MERGE (b:{tgt_label} {{name_key: $tgt_key}}) \
               ON CREATE SET b.uuid = $tgt_uuid, b.name = $tgt_name, \
                 b.placeholder = true, b.created_at = $now \
             MERGE (a)-[r:{rel_type} {{valid_key: $valid_key}}]->(b) \
               ON CREATE SET r.uuid = $uuid, r.created_at = $now \
             SET r.fact_text = $fact_text, \
                 r.confidence = $confidence, \
                 r.attributes = $attributes, \
                 r.source_chunk_ids = $source_chunk_ids, \
                 r.valid_at = CASE WHEN $valid_at <> '' THEN $valid_at ELSE r.valid_at END, \
                 r.invalid_at = CASE WHEN $invalid_at <> '' THEN $invalid_at ELSE r.invalid_at END",
            src_label = edge.source_kind.label(),
            tgt_label = edge.target_kind.label(),
            rel_type = edge.kind.neo4j_type(),
        );

        let q = query(&cypher)
            .param("src_key", src_key)
            .param("tgt_key", tgt_key)
            .param("src_name", src_name)
            .param("tgt_name", tgt_name)
            .param("src_uuid", Uuid::new_v4().to_string())
            .param("tgt_uuid", Uuid::new_v4().to_string())
            .param("uuid", Uuid::new_v4().to_string())
            .param("valid_key", valid_key)
            .param("fact_text", edge.fact_text.clone())
            .param("confidence", edge.confidence)
            .param(
                "attributes",
                serde_json::to_string(&edge.attributes).unwrap_or_default(),
            )
            .param(
                "source_chunk_ids",
                serde_json::to_string(&edge.source_chunk_ids).unwrap_or_default(),
            )
            .param(
                "valid_at",
                edge.valid_at.map(|d| d.to_rfc3339()).unwrap_or_default(),
            )
            .param(
                "invalid_at",
                edge.invalid_at.map(|d| d.to_rfc3339()).unwrap_or_default(),
            )
            .param("now", Utc::now().to_rfc3339());

        self.timed(self.graph()?.run(q))
            .await?
            .map_err(|e| {
                LatticeError::Commit(format!(
                    "Failed to merge {:?} edge {} -> {}: {e}",
                    edge.kind, edge.source_name, edge.target_name
                ))
            })?;

        tracing::debug!(
            kind = ?edge.kind,
            source = %edge.source_name,
            target = %edge.target_name,
            "Merged edge"
        );
        Ok(())
    }

    async fn search_facts(&self, query_str: &str, limit: usize) -> Result<Vec<FactRecord>> {
        let terms: Vec<String> = query_str
            .to_lowercase()
            .split_whitespace()
            .filter(|t| t.len() > 2)
            .map(str::to_string)
            .collect();
        if terms.is_empty() {
            return Ok(Vec::new());
        }

        let cypher = "MATCH (a)-[r]->(b) \
             WHERE r.fact_text IS NOT NULL \
               AND any(term IN $terms WHERE toLower(r.fact_text) CONTAINS term) \
             RETURN a, b, type(r) AS rel_type, properties(r) AS props \
             LIMIT $limit";
        let q = query(cypher)
            .param("terms", terms.clone())
            .param("limit", (limit * 4) as i64);

        let mut stream = self
            .timed(self.graph()?.execute(q))
            .await?
            .map_err(|e| LatticeError::Graph(format!("Fact search failed: {e}")))?;

        let mut facts = Vec::new();
        while let Ok(Some(row)) = stream.next().await {
            let (Ok(a), Ok(b)) = (row.get::<Node>("a"), row.get::<Node>("b")) else {
                continue;
            };
            let (Ok(source), Ok(target)) = (node_to_record(&a), node_to_record(&b)) else {
                continue;
            };
            let rel_type: String = row.get("rel_type").unwrap_or_default();
            let props: serde_json::Value = row.get("props").unwrap_or(serde_json::Value::Null);
            let fact_text = props
                .get("fact_text")
                .and_then(|v| v.as_str())
                .unwrap_or_default();
            let score = lexical_score(fact_text, &terms);
            facts.push(fact_from_props(&rel_type, &props, &source, &target, Some(score)));
        }

        facts.sort_by(|x, y| {
            y.score
                .partial_cmp(&x.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        facts.truncate(limit);

        tracing::debug!(query = query_str, results = facts.len(), "Fact search completed");
        Ok(facts)
    }

    async fn search_entities(&self, name: &str, limit: usize) -> Result<Vec<NodeRecord>> {
        let cypher = "MATCH (n) \
             WHERE (n:Person OR n:Company) \
               AND toLower(n.name) CONTAINS toLower($name) \
             RETURN n \
             ORDER BY CASE WHEN n.name_key = $name_key THEN 0 ELSE 1 END, n.name \
             LIMIT $limit";
        let q = query(cypher)
            .param("name", name.to_string())
            .param("name_key", normalize_name(name))
            .param("limit", limit as i64);

        let mut stream = self
            .timed(self.graph()?.execute(q))
            .await?
            .map_err(|e| LatticeError::Graph(format!("Entity search failed: {e}")))?;

        let mut records = Vec::new();
        while let Ok(Some(row)) = stream.next().await {
            let node: Node = match row.get("n") {
                Ok(n) => n,
                Err(e) => {
                    tracing::warn!(error = %e, "Failed to deserialize node");
                    continue;
                }
            };
            match node_to_record(&node) {
                Ok(record) => records.push(record),
                Err(e) => tracing::warn!(error = %e, "Skipping malformed entity node"),
            }
        }
        Ok(records)
    }

    async fn entity_relationships(&self, name: &str, hops: u8) -> Result<Neighborhood> {
        let hops = hops.clamp(1, 2);
        let center = self
            .search_entities(name, 1)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| LatticeError::NotFound(format!("entity '{name}'")))?;

        let cypher = format!(
            "MATCH (n {{uuid: $uuid}})-[rels*1..{hops}]-(m) \
             RETURN DISTINCT m, \
                    [rel IN rels | type(rel)] AS rel_types, \
                    [rel IN rels | properties(rel)] AS rel_props, \
                    [rel IN rels | startNode(rel).uuid] AS rel_sources, \
                    [rel IN rels | endNode(rel).uuid] AS rel_targets \
             LIMIT 200"
        );
        let q = query(&cypher).param("uuid", center.id.clone());

        let mut stream = self
            .timed(self.graph()?.execute(q))
            .await?
            .map_err(|e| LatticeError::Graph(format!("Neighbor expansion failed: {e}")))?;

        let mut nodes_by_uuid = std::collections::HashMap::new();
        nodes_by_uuid.insert(center.id.clone(), center.clone());
        let mut pending: Vec<(String, serde_json::Value, String, String)> = Vec::new();

        while let Ok(Some(row)) = stream.next().await {
            let neighbor: Node = match row.get("m") {
                Ok(n) => n,
                Err(e) => {
                    tracing::warn!(error = %e, "Failed to parse neighbor node");
                    continue;
                }
            };
            match node_to_record(&neighbor) {
                Ok(record) => {
                    nodes_by_uuid.entry(record.id.clone()).or_insert(record);
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Skipping malformed neighbor node");
                    continue;
                }
            }

            let rel_types: Vec<String> = row.get("rel_types").unwrap_or_default();
            let rel_props: Vec<serde_json::Value> = row.get("rel_props").unwrap_or_default();
            let rel_sources: Vec<String> = row.get("rel_sources").unwrap_or_default();
            let rel_targets: Vec<String> = row.get("rel_targets").unwrap_or_default();

            for i in 0..rel_types.len() {
                let (Some(src), Some(tgt)) = (rel_sources.get(i), rel_targets.get(i)) else {
                    continue;
                };
                pending.push((
                    rel_types[i].clone(),
                    rel_props.get(i).cloned().unwrap_or(serde_json::Value::Null),
                    src.clone(),
                    tgt.clone(),
                ));
            }
        }

        let mut facts: Vec<FactRecord> = Vec::new();
        let mut seen_edges = std::collections::HashSet::new();
        for (rel_type, props, src_uuid, tgt_uuid) in pending {
            // Endpoints not returned as `m` in any row (interior nodes of a
            // two-hop path) are skipped rather than fabricated.
            let (Some(source), Some(target)) =
                (nodes_by_uuid.get(&src_uuid), nodes_by_uuid.get(&tgt_uuid))
            else {
                continue;
            };
            let fact = fact_from_props(&rel_type, &props, source, target, None);
            if seen_edges.insert(fact.edge.id.clone()) {
                facts.push(fact);
            }
        }

        // Property-based fallback: a Person whose `company` attribute names
        // an existing Company implies an employment or leadership edge even
        // when no explicit edge was committed.
        self.synthesize_property_edges(&center, &mut facts, &mut seen_edges)
            .await?;

        tracing::debug!(
            entity = %center.name,
            hops,
            facts = facts.len(),
            "Expanded entity relationships"
        );
        Ok(Neighborhood { center, facts })
    }

    async fn execute_cypher(&self, graph_query: &GraphQuery) -> Result<serde_json::Value> {
        let q = apply_params(query(&graph_query.cypher), &graph_query.params);

        let mut stream = self
            .timed(self.graph()?.execute(q))
            .await?
            .map_err(|e| LatticeError::Graph(format!("Cypher execution failed: {e}")))?;

        let mut rows = Vec::new();
        while let Ok(Some(row)) = stream.next().await {
            let row_json: serde_json::Value = row
                .to()
                .unwrap_or(serde_json::Value::Object(Default::default()));
            rows.push(row_json);
        }

        tracing::debug!(cypher = %graph_query.cypher, rows = rows.len(), "Executed raw Cypher query");
        Ok(serde_json::Value::Array(rows))
    }

    async fn query_graph(&self, graph_query: &GraphQuery) -> Result<CypherResult> {
        let q = apply_params(query(&graph_query.cypher), &graph_query.params);

        let mut stream = self
            .timed(self.graph()?.execute(q))
            .await?
            .map_err(|e| LatticeError::Graph(format!("Cypher execution failed: {e}")))?;

        let mut result = CypherResult::default();
        let mut rows = Vec::new();
        let mut seen_nodes = std::collections::HashSet::new();
        let mut seen_edges = std::collections::HashSet::new();

        while let Ok(Some(row)) = stream.next().await {
            let row_json: serde_json::Value = row
                .to()
                .unwrap_or(serde_json::Value::Object(Default::default()));

            // Columns holding nodes or relationships feed the payload;
            // internal ids keep endpoints consistent within one response.
            if let Some(obj) = row_json.as_object() {
                for key in obj.keys() {
                    if let Ok(node) = row.get::<Node>(key.as_str()) {
                        let payload = bolt_node_payload(&node);
                        if seen_nodes.insert(payload.id.clone()) {
                            result.nodes.push(payload);
                        }
                    } else if let Ok(rel) = row.get::<Relation>(key.as_str()) {
                        let payload = bolt_relation_payload(&rel);
                        if seen_edges.insert(payload.id.clone()) {
                            result.relationships.push(payload);
                        }
                    }
                }
            }
            rows.push(row_json);
        }

        result.rows = serde_json::Value::Array(rows);
        tracing::debug!(
            cypher = %graph_query.cypher,
            nodes = result.nodes.len(),
            relationships = result.relationships.len(),
            "Executed graph query"
        );
        Ok(result)
    }

    async fn node_count(&self) -> Result<u64> {
        self.count("MATCH (n) WHERE n:Person OR n:Company RETURN count(n) AS cnt")
            .await
    }

    async fn edge_count(&self) -> Result<u64> {
        self.count("MATCH ()-[r]->() RETURN count(r) AS cnt").await
    }

    async fn ping(&self) -> bool {
        let Ok(graph) = self.graph() else {
            return false;
        };
        self.timed(graph.run(query("RETURN 1")))
            .await
            .map(|r| r.is_ok())
            .unwrap_or(false)
    }
}

impl Neo4jGraph {
    async fn count(&self, cypher: &str) -> Result<u64> {
        let mut stream = self
            .timed(self.graph()?.execute(query(cypher)))
            .await?
            .map_err(|e| LatticeError::Graph(format!("Count query failed: {e}")))?;
        match stream.next().await {
            Ok(Some(row)) => {
                let count: i64 = row
                    .get("cnt")
                    .map_err(|e| LatticeError::Graph(format!("Failed to read count: {e}")))?;
                Ok(count as u64)
            }
            Ok(None) => Ok(0),
            Err(e) => Err(LatticeError::Graph(format!("Count query error: {e}"))),
        }
    }

    /// Employment/Leadership edges implied by a Person's `company` property.
    /// The kind follows the position title; the edge id is derived from the
    /// endpoints so repeated queries deduplicate.
    async fn synthesize_property_edges(
        &self,
        center: &NodeRecord,
        facts: &mut Vec<FactRecord>,
        seen_edges: &mut std::collections::HashSet<String>,
    ) -> Result<()> {
        let mut pairs: Vec<(NodeRecord, NodeRecord)> = Vec::new();

        if center.labels.iter().any(|l| l == "Person") {
            if let Some(company) = center.properties.get("company").and_then(|v| v.as_str()) {
                let companies = self.lookup_companies_by_key(&normalize_name(company)).await?;
                for company_node in companies {
                    pairs.push((center.clone(), company_node));
                }
            }
        } else if center.labels.iter().any(|l| l == "Company") {
            let people = self.lookup_people_by_company(&center.name).await?;
            for person in people {
                pairs.push((person, center.clone()));
            }
        }

        for (person, company) in pairs {
            let position = person
                .properties
                .get("position")
                .and_then(|v| v.as_str())
                .unwrap_or_default();
            let kind = if position.is_empty() {
                EdgeKind::Employment
            } else {
                edge_kind_for_position(position)
            };
            let edge_id = format!("prop:{}:{}:{}", kind.neo4j_type(), person.id, company.id);
            if !seen_edges.insert(edge_id.clone()) {
                continue;
            }
            let fact_text = if kind == EdgeKind::Leadership {
                format!("{} leads {} as {}", person.name, company.name, position)
            } else {
                format!("{} works at {}", person.name, company.name)
            };
            facts.push(FactRecord {
                edge: GraphEdgePayload {
                    id: edge_id,
                    start_node_id: person.id.clone(),
                    end_node_id: company.id.clone(),
                    edge_type: kind.neo4j_type().to_string(),
                    properties: serde_json::json!({
                        "fact_text": fact_text.clone(),
                        "inferred_from": "company_property",
                    }),
                },
                fact_text,
                source_name: person.name.clone(),
                target_name: company.name.clone(),
                valid_at: None,
                score: None,
                nodes: vec![person.into_payload(), company.into_payload()],
            });
        }
        Ok(())
    }

    async fn lookup_companies_by_key(&self, name_key: &str) -> Result<Vec<NodeRecord>> {
        let q = query("MATCH (c:Company {name_key: $key}) RETURN c AS n LIMIT 5")
            .param("key", name_key.to_string());
        self.collect_nodes(q).await
    }

    async fn lookup_people_by_company(&self, company_name: &str) -> Result<Vec<NodeRecord>> {
        let q = query(
            "MATCH (p:Person) \
             WHERE p.company IS NOT NULL AND toLower(p.company) = toLower($name) \
             RETURN p AS n LIMIT 25",
        )
        .param("name", company_name.to_string());
        self.collect_nodes(q).await
    }

    async fn collect_nodes(&self, q: neo4rs::Query) -> Result<Vec<NodeRecord>> {
        let mut stream = self
            .timed(self.graph()?.execute(q))
            .await?
            .map_err(|e| LatticeError::Graph(format!("Node lookup failed: {e}")))?;
        let mut out = Vec::new();
        while let Ok(Some(row)) = stream.next().await {
            if let Ok(node) = row.get::<Node>("n") {
                if let Ok(record) = node_to_record(&node) {
                    out.push(record);
                }
            }
        }
        Ok(out)
    }
}
