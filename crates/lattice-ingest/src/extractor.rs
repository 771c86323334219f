//! LLM-based typed entity and relationship extraction using the Anthropic
//! Messages API.
//!
//! Each chunk is extracted independently (one repair retry on schema
//! failure), then results are merged across the session by normalized name.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use lattice_core::{
    normalize_name, AppConfig, Chunk, ChunkExtractionError, CompanyEntity, EdgeKind,
    EntityExtractor, EntityKind, ExtractedEntity, ExtractionConfig, ExtractionOutput,
    LatticeError, PersonEntity, Result, ScoredEntity, TypedEdge,
};

const ANTHROPIC_API_URL: &str = "https://api.anthropic.com/v1/messages";
const MODEL: &str = "claude-haiku-4-5-20251001";
const MAX_TOKENS: u32 = 4096;

pub struct LlmEntityExtractor {
    client: reqwest::Client,
    api_key: String,
    model: String,
}

// ── Anthropic Messages API request/response types ──────────────────────────

#[derive(Debug, Serialize)]
struct AnthropicRequest {
    model: String,
    max_tokens: u32,
    system: String,
    messages: Vec<Message>,
}

#[derive(Debug, Serialize)]
struct Message {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    block_type: String,
    text: Option<String>,
}

// ── Intermediate JSON schema for LLM output parsing ────────────────────────

#[derive(Debug, Deserialize)]
struct LlmOutput {
    #[serde(default)]
    entities: Vec<LlmEntity>,
    #[serde(default)]
    relationships: Vec<LlmRelationship>,
}

#[derive(Debug, Deserialize)]
struct LlmEntity {
    kind: String,
    name: String,
    // Person attributes
    #[serde(default)]
    position: Option<String>,
    #[serde(default)]
    company: Option<String>,
    #[serde(default)]
    department: Option<String>,
    #[serde(default)]
    start_date: Option<String>,
    #[serde(default)]
    nationality: Option<String>,
    #[serde(default)]
    skills: Vec<String>,
    // Company attributes
    #[serde(default)]
    industry: Option<String>,
    #[serde(default)]
    founded_year: Option<i64>,
    #[serde(default)]
    headquarters: Option<String>,
    #[serde(default)]
    employee_count: Option<i64>,
    #[serde(default)]
    website: Option<String>,
    #[serde(default)]
    summary: String,
    #[serde(default = "default_confidence")]
    confidence: f64,
}

#[derive(Debug, Deserialize)]
struct LlmRelationship {
    kind: String,
    source: String,
    target: String,
    #[serde(default)]
    attributes: serde_json::Value,
    #[serde(default)]
    fact: String,
    #[serde(default)]
    valid_at: Option<String>,
    #[serde(default)]
    invalid_at: Option<String>,
    #[serde(default = "default_confidence")]
    confidence: f64,
}

fn default_confidence() -> f64 {
    1.0
}

fn parse_temporal(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
}

// ── Implementation ─────────────────────────────────────────────────────────

impl LlmEntityExtractor {
    pub fn new(config: &AppConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(config.llm_timeout_secs))
            .build()
            .unwrap_or_default();
        Self {
            client,
            api_key: config.anthropic_api_key.clone(),
            model: MODEL.to_string(),
        }
    }

    fn build_system_prompt(config: &ExtractionConfig) -> String {
        let mut kinds = Vec::new();
        if config.enable_person {
            kinds.push(
                r#"  "person": { "name": string (required), "position"?, "company"?, "department"?, "start_date"?, "nationality"?: string, "skills"?: [string], "summary": string }"#,
            );
        }
        if config.enable_company {
            kinds.push(
                r#"  "company": { "name": string (required), "industry"?, "headquarters"?, "website"?: string, "founded_year"?, "employee_count"?: integer, "summary": string }"#,
            );
        }

        let relationships = if config.enable_relationships {
            r#"
Relationship kinds and the endpoint kinds they may connect:
  employment:   person -> company
  leadership:   person -> company (executive roles)
  investment:   company -> company
  partnership:  company -> company, or person -> person
  ownership:    company -> company

"relationships": [
  {
    "kind": "employment | leadership | investment | partnership | ownership",
    "source": "Source Entity Name",
    "target": "Target Entity Name",
    "attributes": { kind-specific key-value pairs, e.g. {"position": "CEO"} or {"amount": "$50M", "investment_type": "Series A"} },
    "fact": "one short sentence stating the relationship",
    "valid_at": "ISO date the relationship became true, if stated",
    "confidence": 0.0 to 1.0,
    "source_chunks": [chunk ordinals]
  }
]"#
        } else {
            r#""relationships": []"#
        };

        format!(
            r#"You are an entity and relationship extraction system for a knowledge graph over business documents.

Extract entities of these kinds, with their typed attributes:
{}

Return ONLY valid JSON (no markdown fences, no commentary) matching:

{{
  "entities": [
    {{ "kind": "person" | "company", ...attributes above..., "confidence": 0.0 to 1.0 }}
  ],
  {}
}}

Rules:
- Entity names in relationships MUST exactly match an entity in the entities list.
- Respect the endpoint kinds for each relationship kind; never emit others.
- Only extract what the text clearly supports; use confidence to express doubt.
- If nothing can be extracted, return {{"entities": [], "relationships": []}}.
- Output ONLY the JSON object. No additional text."#,
            kinds.join("\n"),
            relationships
        )
    }

    fn build_user_prompt(chunk: &Chunk) -> String {
        format!("[chunk {}]\n{}", chunk.ordinal, chunk.text)
    }

    async fn call_anthropic(&self, system: String, user: String) -> Result<String> {
        let request = AnthropicRequest {
            model: self.model.clone(),
            max_tokens: MAX_TOKENS,
            system,
            messages: vec![Message {
                role: "user".to_string(),
                content: user,
            }],
        };

        let response = self
            .client
            .post(ANTHROPIC_API_URL)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", "2023-06-01")
            .header("content-type", "application/json")
            .json(&request)
            .send()
            .await
            .map_err(|e| LatticeError::provider("anthropic", format!("HTTP request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<failed to read body>".to_string());
            return Err(LatticeError::provider(
                "anthropic",
                format!("status {status}: {body}"),
            ));
        }

        let api_response: AnthropicResponse = response
            .json()
            .await
            .map_err(|e| LatticeError::provider("anthropic", format!("malformed response: {e}")))?;

        api_response
            .content
            .iter()
            .find_map(|block| {
                if block.block_type == "text" {
                    block.text.clone()
                } else {
                    None
                }
            })
            .ok_or_else(|| LatticeError::provider("anthropic", "no text content block in response"))
    }

    /// Strip markdown code fences the model sometimes adds despite
    /// instructions, then parse and validate.
    fn parse_chunk_output(
        raw: &str,
        ordinal: usize,
        config: &ExtractionConfig,
    ) -> Result<(Vec<ScoredEntity>, Vec<TypedEdge>)> {
        let cleaned = raw.trim();
        let cleaned = if cleaned.starts_with("```") {
            // Fall through to the JSON parser (and its Extraction error)
            // when the fenced text holds no well-ordered brace pair.
            match (cleaned.find('{'), cleaned.rfind('}')) {
                (Some(start), Some(end)) if start < end => &cleaned[start..=end],
                _ => cleaned,
            }
        } else {
            cleaned
        };

        let output: LlmOutput = serde_json::from_str(cleaned)
            .map_err(|e| LatticeError::Extraction(format!("invalid extraction JSON: {e}")))?;

        let mut entities: Vec<ScoredEntity> = Vec::new();
        let mut kinds_by_name: HashMap<String, EntityKind> = HashMap::new();

        for item in output.entities {
            if item.name.trim().is_empty() {
                return Err(LatticeError::Extraction(
                    "entity with empty name".to_string(),
                ));
            }
            let entity = match item.kind.to_lowercase().as_str() {
                "person" if config.enable_person => ExtractedEntity::Person(PersonEntity {
                    name: item.name.clone(),
                    position: item.position,
                    company: item.company,
                    department: item.department,
                    start_date: item.start_date,
                    nationality: item.nationality,
                    skills: item.skills,
                    summary: item.summary,
                    source_chunk_ids: vec![ordinal],
                }),
                "company" if config.enable_company => ExtractedEntity::Company(CompanyEntity {
                    name: item.name.clone(),
                    industry: item.industry,
                    founded_year: item.founded_year,
                    headquarters: item.headquarters,
                    employee_count: item.employee_count,
                    website: item.website,
                    summary: item.summary,
                    source_chunk_ids: vec![ordinal],
                }),
                other => {
                    tracing::warn!(kind = other, name = %item.name, "Skipping entity of unknown or disabled kind");
                    continue;
                }
            };
            let confidence = item.confidence.clamp(0.0, 1.0);
            let key = normalize_name(&item.name);

            // Duplicate names within one chunk merge to a single entity.
            if let Some(existing) = entities
                .iter_mut()
                .find(|s| normalize_name(s.entity.name()) == key && s.entity.entity_kind() == entity.entity_kind())
            {
                existing.entity.absorb(&entity);
                existing.confidence = existing.confidence.max(confidence);
                existing.low_confidence = existing.confidence < config.min_confidence;
            } else {
                kinds_by_name.insert(key, entity.entity_kind());
                entities.push(ScoredEntity {
                    low_confidence: confidence < config.min_confidence,
                    entity,
                    confidence,
                });
            }
        }

        let mut relationships = Vec::new();
        if config.enable_relationships {
            for rel in output.relationships {
                let Some(kind) = EdgeKind::parse(&rel.kind) else {
                    tracing::warn!(kind = %rel.kind, "Skipping relationship of unknown kind");
                    continue;
                };
                let source_kind = kinds_by_name.get(&normalize_name(&rel.source)).copied();
                let target_kind = kinds_by_name.get(&normalize_name(&rel.target)).copied();
                let (Some(source_kind), Some(target_kind)) = (source_kind, target_kind) else {
                    tracing::warn!(
                        source = %rel.source,
                        target = %rel.target,
                        "Skipping relationship: referenced entity not found"
                    );
                    continue;
                };
                if !kind.permits(source_kind, target_kind) {
                    tracing::warn!(
                        ?kind,
                        ?source_kind,
                        ?target_kind,
                        "Skipping relationship violating the endpoint map"
                    );
                    continue;
                }
                let fact_text = if rel.fact.trim().is_empty() {
                    format!("{} {} {}", rel.source, rel.kind.to_lowercase(), rel.target)
                } else {
                    rel.fact.clone()
                };
                relationships.push(TypedEdge {
                    kind,
                    source_name: rel.source,
                    source_kind,
                    target_name: rel.target,
                    target_kind,
                    attributes: if rel.attributes.is_null() {
                        serde_json::Value::Object(serde_json::Map::new())
                    } else {
                        rel.attributes
                    },
                    confidence: rel.confidence.clamp(0.0, 1.0),
                    valid_at: rel.valid_at.as_deref().and_then(parse_temporal),
                    invalid_at: rel.invalid_at.as_deref().and_then(parse_temporal),
                    fact_text,
                    source_chunk_ids: vec![ordinal],
                });
            }
        }

        Ok((entities, relationships))
    }

    /// Extract one chunk, retrying once with a repair prompt when the model
    /// output fails schema validation.
    async fn extract_chunk(
        &self,
        chunk: &Chunk,
        config: &ExtractionConfig,
    ) -> Result<(Vec<ScoredEntity>, Vec<TypedEdge>)> {
        let system = Self::build_system_prompt(config);
        let user = Self::build_user_prompt(chunk);

        let raw = self.call_anthropic(system.clone(), user.clone()).await?;
        match Self::parse_chunk_output(&raw, chunk.ordinal, config) {
            Ok(parsed) => Ok(parsed),
            Err(first_err) => {
                tracing::warn!(
                    ordinal = chunk.ordinal,
                    error = %first_err,
                    "Extraction output failed validation, sending repair prompt"
                );
                let repair = format!(
                    "{user}\n\nYour previous output was rejected: {first_err}\n\
                     Previous output:\n{raw}\n\n\
                     Return the corrected JSON object only."
                );
                let raw = self.call_anthropic(system, repair).await?;
                Self::parse_chunk_output(&raw, chunk.ordinal, config)
            }
        }
    }

    /// Merge per-chunk results across the session: entities by normalized
    /// name (chunk provenance unioned), relationships by merge key.
    fn merge_session(
        per_chunk: Vec<(Vec<ScoredEntity>, Vec<TypedEdge>)>,
        errors: Vec<ChunkExtractionError>,
        config: &ExtractionConfig,
    ) -> ExtractionOutput {
        let mut entities: Vec<ScoredEntity> = Vec::new();
        let mut relationships: Vec<TypedEdge> = Vec::new();

        for (chunk_entities, chunk_rels) in per_chunk {
            for scored in chunk_entities {
                let key = normalize_name(scored.entity.name());
                let kind = scored.entity.entity_kind();
                if let Some(existing) = entities
                    .iter_mut()
                    .find(|s| s.entity.entity_kind() == kind && normalize_name(s.entity.name()) == key)
                {
                    existing.entity.absorb(&scored.entity);
                    existing.confidence = existing.confidence.max(scored.confidence);
                    existing.low_confidence = existing.confidence < config.min_confidence;
                } else {
                    entities.push(scored);
                }
            }
            for edge in chunk_rels {
                if let Some(existing) =
                    relationships.iter_mut().find(|e| e.merge_key() == edge.merge_key())
                {
                    existing.confidence = existing.confidence.max(edge.confidence);
                    for id in &edge.source_chunk_ids {
                        if !existing.source_chunk_ids.contains(id) {
                            existing.source_chunk_ids.push(*id);
                        }
                    }
                    existing.source_chunk_ids.sort_unstable();
                } else {
                    relationships.push(edge);
                }
            }
        }

        ExtractionOutput {
            entities,
            relationships,
            errors,
        }
    }
}

#[async_trait]
impl EntityExtractor for LlmEntityExtractor {
    async fn extract(&self, chunks: &[Chunk], config: &ExtractionConfig)
        -> Result<ExtractionOutput> {
        tracing::info!(chunks = chunks.len(), "Starting entity extraction");

        let mut results: Vec<(usize, (Vec<ScoredEntity>, Vec<TypedEdge>))> = Vec::new();
        let mut errors = Vec::new();

        // Sequential per-chunk calls keep merge order deterministic.
        for chunk in chunks {
            match self.extract_chunk(chunk, config).await {
                Ok(parsed) => results.push((chunk.ordinal, parsed)),
                Err(e @ LatticeError::Extraction(_)) => {
                    tracing::error!(ordinal = chunk.ordinal, error = %e, "Chunk failed extraction twice");
                    errors.push(ChunkExtractionError {
                        ordinal: chunk.ordinal,
                        message: e.to_string(),
                    });
                }
                // Provider failures abort the whole run; they are not a
                // schema problem a later chunk would escape.
                Err(e) => return Err(e),
            }
        }

        results.sort_by_key(|(ordinal, _)| *ordinal);
        let output = Self::merge_session(
            results.into_iter().map(|(_, r)| r).collect(),
            errors,
            config,
        );

        tracing::info!(
            entities = output.entities.len(),
            relationships = output.relationships.len(),
            errors = output.errors.len(),
            "Extraction complete"
        );
        Ok(output)
    }
}
