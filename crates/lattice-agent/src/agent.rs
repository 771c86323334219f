use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use uuid::Uuid;

use lattice_core::{
    AgentEvent, AppConfig, Embedder, GraphStore, LatticeError, QueryIntent, Result, RetrievedFact,
    VectorStore,
};

use crate::tools::{classify_intent, RetrievalTools, ToolOutcome};

// ---------------------------------------------------------------------------
// Anthropic Messages API types (streaming)
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct AnthropicRequest {
    model: String,
    max_tokens: u32,
    messages: Vec<Message>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    stream: bool,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
struct Message {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct StreamEvent {
    #[serde(rename = "type")]
    event_type: String,
    #[serde(default)]
    delta: Option<StreamDelta>,
    #[serde(default)]
    error: Option<StreamError>,
}

#[derive(Debug, Deserialize)]
struct StreamDelta {
    #[serde(rename = "type", default)]
    delta_type: String,
    #[serde(default)]
    text: String,
}

#[derive(Debug, Deserialize)]
struct StreamError {
    #[serde(default)]
    message: String,
}

const ANTHROPIC_API_URL: &str = "https://api.anthropic.com/v1/messages";
const MODEL: &str = "claude-sonnet-4-5-20250929";
const MAX_TOKENS: u32 = 2048;
const TOP_K: usize = 10;
const TOOL_LIMIT: usize = 8;

// ---------------------------------------------------------------------------
// HybridAgent
// ---------------------------------------------------------------------------

pub struct HybridAgent {
    client: Client,
    api_key: String,
    tools: RetrievalTools,
}

impl HybridAgent {
    pub fn new(
        graph: Arc<dyn GraphStore>,
        vectors: Arc<dyn VectorStore>,
        embedder: Arc<dyn Embedder>,
        config: &AppConfig,
    ) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.llm_timeout_secs.max(60)))
            .build()
            .map_err(|e| LatticeError::Config(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            api_key: config.anthropic_api_key.clone(),
            tools: RetrievalTools::new(graph, vectors, embedder),
        })
    }

    /// Answer a chat message as a stream of events: zero or more `Content`
    /// deltas, one `GraphData`, then `Done`. Dropping the receiver cancels
    /// the producer at its next send.
    pub fn chat(self: Arc<Self>, session_id: Option<Uuid>, message: String) -> mpsc::Receiver<AgentEvent> {
        let (tx, rx) = mpsc::channel(32);
        let agent = self;
        tokio::spawn(async move {
            if let Err(e) = agent.run_chat(session_id, &message, &tx).await {
                tracing::warn!(error = %e, "agent chat failed");
                let _ = tx
                    .send(AgentEvent::Error {
                        message: friendly_error(&e),
                    })
                    .await;
            }
        });
        rx
    }

    async fn run_chat(
        &self,
        session_id: Option<Uuid>,
        message: &str,
        tx: &mpsc::Sender<AgentEvent>,
    ) -> Result<()> {
        let (intent, names) = classify_intent(message);
        tracing::info!(
            session_id = ?session_id,
            intent = ?intent,
            names = ?names,
            "classified chat query"
        );

        let outcome = self.gather(intent, &names, message).await;
        let subgraph = outcome.subgraph;
        let facts = top_facts(outcome.facts, TOP_K);

        self.stream_answer(message, &facts, tx).await?;

        if tx
            .send(AgentEvent::GraphData { subgraph })
            .await
            .is_err()
        {
            return Ok(());
        }
        let _ = tx.send(AgentEvent::Done).await;
        Ok(())
    }

    /// Run the tools for the classified intent. A failed tool call is a
    /// soft failure: its results are simply missing from context.
    async fn gather(&self, intent: QueryIntent, names: &[String], message: &str) -> ToolOutcome {
        let mut outcome = ToolOutcome::default();

        match intent {
            QueryIntent::EntityLookup => {
                for name in names {
                    self.soft(&mut outcome, self.tools.entity_search(name, TOOL_LIMIT).await)
                        .await;
                    self.soft(
                        &mut outcome,
                        self.tools.entity_relationships(name, 1, None).await,
                    )
                    .await;
                }
                if names.is_empty() {
                    self.soft(
                        &mut outcome,
                        self.tools.graph_search(message, TOOL_LIMIT).await,
                    )
                    .await;
                }
            }
            QueryIntent::RelationshipLookup => {
                for name in names {
                    self.soft(&mut outcome, self.tools.entity_search(name, 3).await)
                        .await;
                }
                if names.len() >= 2 {
                    self.soft(
                        &mut outcome,
                        self.tools
                            .entity_relationships(&names[0], 2, Some(&names[1]))
                            .await,
                    )
                    .await;
                } else if let Some(name) = names.first() {
                    self.soft(
                        &mut outcome,
                        self.tools.entity_relationships(name, 2, None).await,
                    )
                    .await;
                } else {
                    self.soft(
                        &mut outcome,
                        self.tools.graph_search(message, TOOL_LIMIT).await,
                    )
                    .await;
                }
            }
            QueryIntent::OpenEnded => {
                self.soft(
                    &mut outcome,
                    self.tools.vector_search(message, TOOL_LIMIT).await,
                )
                .await;
                self.soft(
                    &mut outcome,
                    self.tools.graph_search(message, TOOL_LIMIT).await,
                )
                .await;
            }
        }

        outcome
    }

    async fn soft(&self, outcome: &mut ToolOutcome, result: Result<ToolOutcome>) {
        match result {
            Ok(contribution) => outcome.absorb(contribution),
            Err(e) => tracing::warn!(error = %e, "retrieval tool failed, omitting from context"),
        }
    }

    /// Stream the textual answer. Content deltas are forwarded as they
    /// arrive; a closed channel stops the stream.
    async fn stream_answer(
        &self,
        message: &str,
        facts: &[RetrievedFact],
        tx: &mpsc::Sender<AgentEvent>,
    ) -> Result<()> {
        if self.api_key.is_empty() {
            return Err(LatticeError::Config(
                "ANTHROPIC_API_KEY is not configured".into(),
            ));
        }

        let request = AnthropicRequest {
            model: MODEL.to_string(),
            max_tokens: MAX_TOKENS,
            messages: vec![Message {
                role: "user".to_string(),
                content: message.to_string(),
            }],
            system: Some(build_system_prompt(facts)),
            stream: true,
        };

        let resp = self
            .client
            .post(ANTHROPIC_API_URL)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", "2023-06-01")
            .header("content-type", "application/json")
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                LatticeError::provider("anthropic", format!("HTTP request failed: {e}"))
            })?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".into());
            return Err(LatticeError::provider(
                "anthropic",
                format!("API returned {status}: {body}"),
            ));
        }

        let mut stream = resp.bytes_stream();
        let mut buffer = String::new();

        while let Some(chunk) = stream.next().await {
            let bytes = chunk.map_err(|e| {
                LatticeError::provider("anthropic", format!("stream read failed: {e}"))
            })?;
            buffer.push_str(&String::from_utf8_lossy(&bytes));

            while let Some(line_end) = buffer.find('\n') {
                let line = buffer[..line_end].trim().to_string();
                buffer.drain(..line_end + 1);

                let Some(data) = line.strip_prefix("data:") else {
                    continue;
                };
                let data = data.trim();
                if data.is_empty() {
                    continue;
                }

                match parse_stream_event(data) {
                    Ok(Some(text)) => {
                        if tx.send(AgentEvent::Content { text }).await.is_err() {
                            tracing::debug!("chat receiver dropped, cancelling stream");
                            return Ok(());
                        }
                    }
                    Ok(None) => {}
                    Err(e) => return Err(e),
                }
            }
        }

        Ok(())
    }
}

/// One `data:` payload from the event stream. Returns text to forward,
/// `None` for bookkeeping events.
fn parse_stream_event(data: &str) -> Result<Option<String>> {
    let event: StreamEvent = match serde_json::from_str(data) {
        Ok(e) => e,
        Err(_) => return Ok(None),
    };
    match event.event_type.as_str() {
        "content_block_delta" => {
            let text = event
                .delta
                .filter(|d| d.delta_type == "text_delta")
                .map(|d| d.text)
                .unwrap_or_default();
            if text.is_empty() {
                Ok(None)
            } else {
                Ok(Some(text))
            }
        }
        "error" => {
            let message = event
                .error
                .map(|e| e.message)
                .unwrap_or_else(|| "unknown stream error".into());
            Err(LatticeError::provider("anthropic", message))
        }
        _ => Ok(None),
    }
}

fn build_system_prompt(facts: &[RetrievedFact]) -> String {
    let mut prompt = String::from(
        "You are an analyst answering questions about a knowledge graph of \
         people and companies built from ingested documents. Answer using \
         only the retrieved facts below. If the facts do not cover the \
         question, say so plainly. Be concise.\n\nRetrieved facts:\n",
    );
    if facts.is_empty() {
        prompt.push_str("(none)\n");
    }
    for (i, fact) in facts.iter().enumerate() {
        prompt.push_str(&format!("{}. {}", i + 1, fact.fact));
        if let Some(valid_at) = fact.valid_at {
            prompt.push_str(&format!(" (since {})", valid_at.format("%Y-%m-%d")));
        }
        prompt.push('\n');
    }
    prompt
}

/// Merge facts from all tools, best score first, unscored facts keeping
/// their arrival order after the scored ones.
fn top_facts(mut facts: Vec<RetrievedFact>, k: usize) -> Vec<RetrievedFact> {
    let mut seen = std::collections::HashSet::new();
    facts.retain(|f| seen.insert(f.uuid.clone()));
    facts.sort_by(|a, b| {
        b.score
            .unwrap_or(f64::NEG_INFINITY)
            .partial_cmp(&a.score.unwrap_or(f64::NEG_INFINITY))
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    facts.truncate(k);
    facts
}

fn friendly_error(e: &LatticeError) -> String {
    match e {
        LatticeError::Config(_) => "The chat service is not configured with a language model API key.".to_string(),
        LatticeError::Provider { .. } | LatticeError::Http(_) => {
            "The language model request failed. Please try again.".to_string()
        }
        _ => "Something went wrong while answering. Please try again.".to_string(),
    }
}
