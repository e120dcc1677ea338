//! Integration tests for research runs and discrepancy analysis.
//!
//! These exercise the full pipeline end-to-end using MockBackend and scripted
//! section researchers: fan-out, fallback, aggregation, analysis, assessment.

use async_trait::async_trait;
use chrono::Utc;
use diligence_core::backend::{BackendResponse, Citation, MockBackend, RequestKind};
use diligence_core::config::{DiligenceConfig, OrchestratorConfig};
use diligence_core::discrepancy::{DiscrepancyAnalyzer, FactSet, Severity};
use diligence_core::error::BackendError;
use diligence_core::research::sources::{OriginType, RelevanceTier, Source};
use diligence_core::research::{
    AggregateResult, ParallelOrchestrator, ResearchTopic, SectionResearch, SectionResearcher,
    SectionResult, SectionStatus, TopicCatalog,
};
use diligence_core::resilience::{BackoffPolicy, ResilientInvoker};
use diligence_core::{DiligenceEngine, DiligenceRequest, ResearchBackend};
use indexmap::IndexMap;
use pretty_assertions::assert_eq;
use serde_json::{Value, json};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Researcher that succeeds with fixed findings unless told to fail a topic.
struct Scripted {
    findings: HashMap<String, (Value, u8, Vec<Source>)>,
}

impl Scripted {
    fn new() -> Self {
        Self {
            findings: HashMap::new(),
        }
    }

    fn succeed(mut self, id: &str, findings: Value, confidence: u8, sources: Vec<Source>) -> Self {
        self.findings
            .insert(id.to_string(), (findings, confidence, sources));
        self
    }
}

#[async_trait]
impl SectionResearch for Scripted {
    async fn research(&self, topic: &ResearchTopic, _entity: &str) -> SectionResult {
        let started_at = Utc::now();
        match self.findings.get(&topic.id) {
            Some((findings, confidence, sources)) => SectionResult {
                topic_id: topic.id.clone(),
                status: SectionStatus::Success,
                findings: findings.clone(),
                sources: sources.clone(),
                confidence: *confidence,
                started_at,
                completed_at: Utc::now(),
                error: None,
            },
            None => SectionResult::failed(&topic.id, "all backends unavailable", started_at),
        }
    }
}

fn catalog(ids: &[&str]) -> TopicCatalog {
    TopicCatalog::new(
        ids.iter()
            .map(|id| ResearchTopic::new(*id, *id, "Research {entity}", "Return JSON."))
            .collect(),
    )
    .unwrap()
}

fn source(url: &str) -> Source {
    Source::new(url, OriginType::EvidenceGathering, RelevanceTier::High)
}

fn aggregate(sections: &[(&str, Value)]) -> AggregateResult {
    let now = Utc::now();
    let sections: IndexMap<String, SectionResult> = sections
        .iter()
        .map(|(id, findings)| {
            (
                id.to_string(),
                SectionResult {
                    topic_id: id.to_string(),
                    status: SectionStatus::Success,
                    findings: findings.clone(),
                    sources: Vec::new(),
                    confidence: 70,
                    started_at: now,
                    completed_at: now,
                    error: None,
                },
            )
        })
        .collect();
    AggregateResult::assemble("Acme Corp", now, Duration::ZERO, sections, None)
}

#[tokio::test]
async fn test_two_topic_scenario_with_one_failure() {
    let researcher = Scripted::new().succeed(
        "overview",
        json!({"industry": "Manufacturing"}),
        80,
        vec![
            source("https://a.example"),
            source("https://b.example"),
            source("https://c.example"),
        ],
    );
    let orchestrator = ParallelOrchestrator::new(Arc::new(researcher), OrchestratorConfig::default());

    let result = orchestrator
        .run_all(
            "Acme Corp",
            &catalog(&["overview", "funding"]),
            CancellationToken::new(),
        )
        .await
        .unwrap();

    assert_eq!(result.sections.len(), 2);
    assert_eq!(result.section("overview").unwrap().status, SectionStatus::Success);
    assert_eq!(result.section("funding").unwrap().status, SectionStatus::Failed);
    assert_eq!(result.overall_confidence, 80.0);
    assert_eq!(result.sources.len(), 3);
    assert_eq!(
        result.warning.unwrap().failed_topics,
        vec!["funding".to_string()]
    );
}

#[tokio::test]
async fn test_partial_failure_keeps_every_other_section() {
    let ids = ["a", "b", "c", "d", "e"];
    let mut researcher = Scripted::new();
    for id in ids.iter().filter(|id| **id != "c") {
        researcher = researcher.succeed(id, json!({"ok": true}), 60, Vec::new());
    }
    let orchestrator = ParallelOrchestrator::new(Arc::new(researcher), OrchestratorConfig::default());

    let result = orchestrator
        .run_all("Acme Corp", &catalog(&ids), CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(result.sections.keys().collect::<Vec<_>>(), ids.to_vec());
    for id in ids {
        let expected = if id == "c" {
            SectionStatus::Failed
        } else {
            SectionStatus::Success
        };
        assert_eq!(result.section(id).unwrap().status, expected, "{id}");
    }
    assert_eq!(result.completed_count, 4);
    assert_eq!(result.failed_count, 1);
}

#[tokio::test(start_paused = true)]
async fn test_end_to_end_with_backend_fallback() {
    let primary = Arc::new(MockBackend::failing(
        "primary",
        BackendError::Overloaded {
            message: "at capacity".into(),
        },
    ));
    let secondary = Arc::new(
        MockBackend::new("secondary")
            .respond_to(
                RequestKind::Evidence,
                Ok(BackendResponse::text("Acme Corp was incorporated in 2021.")
                    .with_citations(vec![Citation::new("https://registry.example/acme")])),
            )
            .respond_to(
                RequestKind::Search,
                Ok(BackendResponse::text("Coverage of Acme Corp.")
                    .with_citations(vec![Citation::new("https://news.example/acme")])),
            )
            .respond_to(
                RequestKind::Synthesis,
                Ok(BackendResponse::text(
                    r#"{"founded_date": "2021-01-01", "status": "Active", "industry": "Manufacturing"}"#,
                )),
            ),
    );

    let policy = BackoffPolicy {
        max_attempts: 2,
        base_delay: Duration::from_millis(100),
        multiplier: 2.0,
        max_delay: Duration::from_secs(1),
    };
    let backends: Vec<Arc<dyn ResearchBackend>> = vec![primary.clone(), secondary.clone()];
    let invoker = ResilientInvoker::new(backends, policy);

    let mut config = DiligenceConfig::default();
    config.research.topics = Some(vec![
        "company_overview".to_string(),
        "corporate_registry".to_string(),
    ]);
    let researcher = SectionResearcher::new(invoker, config.research.clone());
    let engine = DiligenceEngine::with_researcher(Arc::new(researcher), &config).unwrap();

    let facts = FactSet::from_value(json!({
        "company_info": {"foundedYear": 2015, "industry": "Manufacturing"},
        "scores": {"overall": 90}
    }));
    let outcome = engine
        .run(
            DiligenceRequest::new("Acme Corp").with_facts(facts),
            CancellationToken::new(),
        )
        .await
        .unwrap();

    let research = &outcome.research;
    assert_eq!(research.completed_count, 2);
    assert!(research
        .sections
        .values()
        .all(|s| s.status == SectionStatus::Success));
    assert_eq!(research.sources.len(), 2);
    assert_eq!(research.sources[0].url, "https://registry.example/acme");
    assert_eq!(research.sources[0].relevance, RelevanceTier::High);

    // primary took two attempts for every call before handing over
    assert_eq!(primary.call_count(), 2 * secondary.call_count());

    let analysis = outcome.analysis.unwrap();
    assert_eq!(analysis.discrepancies.len(), 1);
    assert_eq!(analysis.discrepancies[0].field, "founding_date");
    assert!(analysis.red_flags.is_empty());

    let assessment = outcome.assessment.unwrap();
    assert_eq!(assessment.base_score, 90.0);
    assert_eq!(assessment.adjusted_score, 90.0 - 75.0 * 0.5);
}

#[test]
fn test_founding_year_scenario() {
    let report = DiscrepancyAnalyzer::new().analyze(
        &FactSet::from_value(json!({"foundedYear": 2015})),
        &aggregate(&[("company_overview", json!({"founded_date": "2021-01-01"}))]),
    );
    assert_eq!(report.discrepancies.len(), 1);
    let d = &report.discrepancies[0];
    assert_eq!(
        (d.category.as_str(), d.field.as_str(), d.severity),
        ("company_info", "founding_date", Severity::High)
    );
}

#[test]
fn test_zero_discrepancy_scenario() {
    let report = DiscrepancyAnalyzer::new().analyze(
        &FactSet::from_value(json!({"company_info": {"industry": "Manufacturing"}})),
        &aggregate(&[("company_overview", json!({"industry": "Manufacturing"}))]),
    );
    assert!(report.discrepancies.is_empty());
    assert_eq!(report.discrepancy_score, 0);
    assert_eq!(report.confidence.document_reliability, 100);
    assert!(
        report
            .summary
            .to_lowercase()
            .contains("no significant discrepancies")
    );
}

#[test]
fn test_mixed_severity_scenario() {
    let report = DiscrepancyAnalyzer::new().analyze(
        &FactSet::from_value(json!({
            "company_info": {"founded_year": 2012, "industry": "Healthcare"},
            "financials": {"revenue": "$10M"}
        })),
        &aggregate(&[
            (
                "company_overview",
                json!({"founded_date": "2018-04-01", "industry": "Enterprise software"}),
            ),
            ("financials", json!({"revenue": "$3M"})),
        ]),
    );

    let severities: Vec<Severity> = report.discrepancies.iter().map(|d| d.severity).collect();
    assert_eq!(
        severities,
        vec![Severity::Critical, Severity::High, Severity::Low]
    );
    assert_eq!(report.discrepancy_score, 67);
    assert_eq!(report.weighted_severity, 8);
    assert_eq!(report.confidence.document_reliability, 60);
    assert_eq!(report.red_flags.len(), 1);
}
