//! Section research task: evidence gathering followed by structured synthesis
//! for a single topic.
//!
//! A task never fails past its own boundary. Every outcome, including total
//! backend failure, is expressed as a [`SectionResult`] with a status.

use super::catalog::ResearchTopic;
use super::confidence::{SectionSignals, section_confidence};
use super::findings::extract_json_object;
use super::sources::{OriginType, Source};
use crate::backend::{BackendRequest, RequestKind};
use crate::config::ResearchConfig;
use crate::resilience::ResilientInvoker;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use tracing::{debug, warn};

const EVIDENCE_SYSTEM_PROMPT: &str = "You are a due-diligence research analyst. Report only \
     verifiable facts, name your sources, and say explicitly when information is unavailable.";

const SYNTHESIS_SYSTEM_PROMPT: &str = "You turn research notes into structured JSON. \
     Use null for unknown values and never invent facts that are not in the evidence.";

/// Terminal state of a section.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SectionStatus {
    Success,
    /// Completed with reduced quality: missing evidence or unstructured synthesis.
    Degraded,
    Failed,
}

impl std::fmt::Display for SectionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SectionStatus::Success => write!(f, "success"),
            SectionStatus::Degraded => write!(f, "degraded"),
            SectionStatus::Failed => write!(f, "failed"),
        }
    }
}

/// The outcome of researching one topic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SectionResult {
    pub topic_id: String,
    pub status: SectionStatus,
    /// Topic-specific structured findings. Empty object when failed.
    pub findings: Value,
    pub sources: Vec<Source>,
    /// 0-100.
    pub confidence: u8,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    /// Why the section failed or degraded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SectionResult {
    /// A failed section with empty findings and zero confidence.
    pub fn failed(
        topic_id: impl Into<String>,
        reason: impl Into<String>,
        started_at: DateTime<Utc>,
    ) -> Self {
        Self {
            topic_id: topic_id.into(),
            status: SectionStatus::Failed,
            findings: Value::Object(Map::new()),
            sources: Vec::new(),
            confidence: 0,
            started_at,
            completed_at: Utc::now(),
            error: Some(reason.into()),
        }
    }

    pub fn is_failed(&self) -> bool {
        self.status == SectionStatus::Failed
    }

    pub fn duration_ms(&self) -> i64 {
        (self.completed_at - self.started_at).num_milliseconds().max(0)
    }
}

/// Research one topic for one entity.
#[async_trait]
pub trait SectionResearch: Send + Sync {
    async fn research(&self, topic: &ResearchTopic, entity: &str) -> SectionResult;
}

/// What phase 1 produced.
#[derive(Debug, Default)]
struct Evidence {
    text: String,
    sources: Vec<Source>,
    /// Set when the primary evidence query failed.
    primary_failure: Option<String>,
}

/// Production section researcher over a [`ResilientInvoker`].
#[derive(Debug, Clone)]
pub struct SectionResearcher {
    invoker: ResilientInvoker,
    settings: ResearchConfig,
}

impl SectionResearcher {
    pub fn new(invoker: ResilientInvoker, settings: ResearchConfig) -> Self {
        Self { invoker, settings }
    }

    /// Phase 1: the evidence query and the directed searches, run concurrently.
    async fn gather_evidence(&self, topic: &ResearchTopic, entity: &str) -> Evidence {
        let mut queries = vec![(
            OriginType::EvidenceGathering,
            RequestKind::Evidence,
            topic.evidence_prompt(entity),
        )];
        queries.extend(
            topic
                .search_prompts(entity)
                .into_iter()
                .map(|q| (OriginType::DirectedSearch, RequestKind::Search, q)),
        );

        let calls = queries.iter().map(|(_, kind, prompt)| {
            let request = BackendRequest::new(*kind, prompt.clone())
                .with_system(EVIDENCE_SYSTEM_PROMPT)
                .with_max_tokens(self.settings.evidence_max_tokens)
                .with_temperature(self.settings.temperature);
            async move { self.invoker.invoke(&request).await }
        });
        let outcomes = futures::future::join_all(calls).await;

        let mut evidence = Evidence::default();
        for ((origin, _, prompt), outcome) in queries.iter().zip(outcomes) {
            match outcome {
                Ok(response) => {
                    if !response.text.trim().is_empty() {
                        let heading = match origin {
                            OriginType::EvidenceGathering => "Overview".to_string(),
                            OriginType::DirectedSearch => format!("Search: {prompt}"),
                        };
                        evidence.text.push_str(&format!("### {heading}\n\n"));
                        evidence.text.push_str(response.text.trim());
                        evidence.text.push_str("\n\n");
                    }
                    evidence.sources.extend(
                        response
                            .citations
                            .iter()
                            .map(|c| Source::from_citation(c, *origin)),
                    );
                }
                Err(e) => {
                    warn!(topic = %topic.id, origin = ?origin, error = %e, "Evidence query failed");
                    if *origin == OriginType::EvidenceGathering {
                        evidence.primary_failure = Some(e.to_string());
                    }
                }
            }
        }
        evidence
    }
}

#[async_trait]
impl SectionResearch for SectionResearcher {
    async fn research(&self, topic: &ResearchTopic, entity: &str) -> SectionResult {
        let started_at = Utc::now();
        debug!(topic = %topic.id, entity = %entity, "Gathering evidence");

        let evidence = self.gather_evidence(topic, entity).await;
        let mut degraded_reason = evidence
            .primary_failure
            .as_ref()
            .map(|e| format!("evidence gathering failed: {e}"));

        debug!(
            topic = %topic.id,
            evidence_chars = evidence.text.len(),
            sources = evidence.sources.len(),
            "Synthesizing findings"
        );
        let request = BackendRequest::new(
            RequestKind::Synthesis,
            topic.synthesis_prompt(entity, &evidence.text),
        )
        .with_system(SYNTHESIS_SYSTEM_PROMPT)
        .with_max_tokens(self.settings.synthesis_max_tokens)
        .with_temperature(self.settings.temperature);

        let synthesis = match self.invoker.invoke(&request).await {
            Ok(response) => response,
            Err(e) => {
                warn!(topic = %topic.id, error = %e, "Synthesis failed");
                return SectionResult::failed(&topic.id, e.to_string(), started_at);
            }
        };

        let findings = match extract_json_object(&synthesis.text) {
            Some(map) => Value::Object(map),
            None => {
                degraded_reason.get_or_insert_with(|| "synthesis was not structured JSON".into());
                json!({ "summary": synthesis.text.trim() })
            }
        };

        let confidence = section_confidence(&SectionSignals {
            source_count: evidence.sources.len(),
            evidence_chars: evidence.text.len(),
            findings: &findings,
            synthesis_chars: synthesis.text.len(),
        });

        let status = if degraded_reason.is_some() {
            SectionStatus::Degraded
        } else {
            SectionStatus::Success
        };

        SectionResult {
            topic_id: topic.id.clone(),
            status,
            findings,
            sources: evidence.sources,
            confidence,
            started_at,
            completed_at: Utc::now(),
            error: degraded_reason,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{BackendResponse, Citation, MockBackend};
    use crate::error::BackendError;
    use crate::resilience::BackoffPolicy;
    use std::sync::Arc;

    fn topic() -> ResearchTopic {
        ResearchTopic::new(
            "overview",
            "Overview",
            "Describe {entity}",
            "Return JSON with industry.",
        )
        .with_search("{entity} headquarters")
    }

    fn researcher(backend: Arc<MockBackend>) -> SectionResearcher {
        SectionResearcher::new(
            ResilientInvoker::new(vec![backend], BackoffPolicy::default()),
            ResearchConfig::default(),
        )
    }

    fn auth_error() -> BackendError {
        BackendError::AuthFailed {
            backend: "mock".into(),
        }
    }

    #[tokio::test]
    async fn test_successful_section() {
        let backend = Arc::new(
            MockBackend::new("mock")
                .respond_to(
                    RequestKind::Evidence,
                    Ok(BackendResponse::text("Acme makes anvils.").with_citations(vec![
                        Citation::new("https://a.example"),
                        Citation::new("https://b.example"),
                    ])),
                )
                .respond_to(
                    RequestKind::Search,
                    Ok(BackendResponse::text("HQ in Phoenix.")
                        .with_citations(vec![Citation::new("https://c.example")])),
                )
                .respond_to(
                    RequestKind::Synthesis,
                    Ok(BackendResponse::text(
                        r#"{"industry": "Manufacturing", "headquarters": "Phoenix"}"#,
                    )),
                ),
        );

        let result = researcher(backend.clone()).research(&topic(), "Acme Corp").await;
        assert_eq!(result.status, SectionStatus::Success);
        assert_eq!(result.topic_id, "overview");
        assert_eq!(result.findings["industry"], "Manufacturing");
        assert_eq!(result.sources.len(), 3);
        assert_eq!(result.sources[0].origin, OriginType::EvidenceGathering);
        assert_eq!(result.sources[2].origin, OriginType::DirectedSearch);
        assert!(result.confidence > 0);
        assert!(result.error.is_none());

        let requests = backend.requests();
        assert_eq!(requests.len(), 3);
        assert!(requests[0].prompt.contains("Acme Corp"));
        let synthesis = requests.last().unwrap();
        assert_eq!(synthesis.kind, RequestKind::Synthesis);
        assert!(synthesis.prompt.contains("Acme makes anvils."));
        assert!(synthesis.prompt.contains("HQ in Phoenix."));
    }

    #[tokio::test]
    async fn test_evidence_failure_degrades_synthesis() {
        let backend = Arc::new(
            MockBackend::new("mock")
                .respond_to(RequestKind::Evidence, Err(auth_error()))
                .respond_to(RequestKind::Search, Err(auth_error()))
                .respond_to(
                    RequestKind::Synthesis,
                    Ok(BackendResponse::text(r#"{"industry": "Manufacturing"}"#)),
                ),
        );

        let result = researcher(backend.clone()).research(&topic(), "Acme Corp").await;
        assert_eq!(result.status, SectionStatus::Degraded);
        assert!(result.sources.is_empty());
        assert_eq!(result.findings["industry"], "Manufacturing");
        assert!(result.error.as_deref().unwrap().contains("evidence gathering failed"));

        let synthesis = backend.requests().pop().unwrap();
        assert!(synthesis.prompt.contains("No external evidence"));
    }

    #[tokio::test]
    async fn test_synthesis_failure_fails_section() {
        let backend = Arc::new(
            MockBackend::with_response("mock", "evidence")
                .respond_to(RequestKind::Synthesis, Err(auth_error())),
        );

        let result = researcher(backend).research(&topic(), "Acme Corp").await;
        assert_eq!(result.status, SectionStatus::Failed);
        assert_eq!(result.confidence, 0);
        assert_eq!(result.findings, json!({}));
        assert!(result.sources.is_empty());
        assert!(result.error.is_some());
    }

    #[tokio::test]
    async fn test_unstructured_synthesis_is_kept_as_summary() {
        let backend = Arc::new(
            MockBackend::with_response("mock", "evidence").respond_to(
                RequestKind::Synthesis,
                Ok(BackendResponse::text("Acme is a small anvil maker.")),
            ),
        );

        let result = researcher(backend).research(&topic(), "Acme Corp").await;
        assert_eq!(result.status, SectionStatus::Degraded);
        assert_eq!(result.findings, json!({"summary": "Acme is a small anvil maker."}));
    }

    #[test]
    fn test_failed_constructor() {
        let started = Utc::now();
        let result = SectionResult::failed("funding", "cancelled", started);
        assert!(result.is_failed());
        assert_eq!(result.error.as_deref(), Some("cancelled"));
        assert!(result.duration_ms() >= 0);
    }
}
