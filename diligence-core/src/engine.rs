//! End-to-end diligence run: research, discrepancy analysis, assessment.

use crate::assessment::{OverallAssessment, synthesize};
use crate::backend::create_backends;
use crate::config::DiligenceConfig;
use crate::discrepancy::{DiscrepancyAnalyzer, DiscrepancyReport, FactSet};
use crate::error::Result;
use crate::research::{
    AggregateResult, ParallelOrchestrator, ResearchCallback, SectionResearch, SectionResearcher,
    TopicCatalog,
};
use crate::resilience::ResilientInvoker;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Input to a diligence run.
#[derive(Debug, Clone, Default)]
pub struct DiligenceRequest {
    pub entity: String,
    /// Document-derived facts. Without them only research runs.
    pub facts: Option<FactSet>,
    /// Overrides the engine's catalog for this run.
    pub catalog: Option<TopicCatalog>,
}

impl DiligenceRequest {
    pub fn new(entity: impl Into<String>) -> Self {
        Self {
            entity: entity.into(),
            ..Self::default()
        }
    }

    pub fn with_facts(mut self, facts: FactSet) -> Self {
        self.facts = Some(facts);
        self
    }

    pub fn with_catalog(mut self, catalog: TopicCatalog) -> Self {
        self.catalog = Some(catalog);
        self
    }
}

/// Everything a diligence run produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiligenceOutcome {
    pub research: AggregateResult,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub analysis: Option<DiscrepancyReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assessment: Option<OverallAssessment>,
}

pub struct DiligenceEngine {
    orchestrator: ParallelOrchestrator,
    catalog: TopicCatalog,
    analyzer: DiscrepancyAnalyzer,
}

impl DiligenceEngine {
    /// Build the production pipeline: configured backends behind a resilient
    /// invoker, one [`SectionResearcher`] shared by every task.
    pub fn from_config(config: &DiligenceConfig) -> Result<Self> {
        let backends = create_backends(&config.backends)?;
        let invoker = ResilientInvoker::from_config(backends, &config.resilience);
        info!(backends = ?invoker.backend_names(), "Backends initialized");
        let researcher = SectionResearcher::new(invoker, config.research.clone());
        Self::with_researcher(Arc::new(researcher), config)
    }

    /// Build around a custom section researcher.
    pub fn with_researcher(
        researcher: Arc<dyn SectionResearch>,
        config: &DiligenceConfig,
    ) -> Result<Self> {
        let builtin = TopicCatalog::builtin();
        let catalog = match &config.research.topics {
            Some(ids) => builtin.filtered(ids)?,
            None => builtin,
        };
        Ok(Self {
            orchestrator: ParallelOrchestrator::new(researcher, config.orchestrator.clone()),
            catalog,
            analyzer: DiscrepancyAnalyzer::new(),
        })
    }

    pub fn with_callback(mut self, callback: Arc<dyn ResearchCallback>) -> Self {
        self.orchestrator = self.orchestrator.with_callback(callback);
        self
    }

    pub fn catalog(&self) -> &TopicCatalog {
        &self.catalog
    }

    /// Research the entity, then compare against the fact set when one is given.
    pub async fn run(
        &self,
        request: DiligenceRequest,
        cancel: CancellationToken,
    ) -> Result<DiligenceOutcome> {
        let catalog = request.catalog.as_ref().unwrap_or(&self.catalog);
        let research = self
            .orchestrator
            .run_all(&request.entity, catalog, cancel)
            .await?;

        let Some(facts) = request.facts else {
            return Ok(DiligenceOutcome {
                research,
                analysis: None,
                assessment: None,
            });
        };

        let analysis = self.analyzer.analyze(&facts, &research);
        let assessment = synthesize(
            facts.base_score(),
            analysis.discrepancy_score,
            &analysis.red_flags,
        );
        info!(
            entity = %research.entity,
            adjusted_score = assessment.adjusted_score,
            risk = %assessment.risk_level,
            recommendation = %assessment.recommendation,
            "Assessment complete"
        );

        Ok(DiligenceOutcome {
            research,
            analysis: Some(analysis),
            assessment: Some(assessment),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assessment::{Recommendation, RiskLevel};
    use crate::error::{DiligenceError, InputError};
    use crate::research::{ResearchTopic, SectionResult, SectionStatus};
    use async_trait::async_trait;
    use chrono::Utc;
    use serde_json::{Value, json};
    use std::collections::HashMap;

    /// Returns canned findings per topic, failing topics it has nothing for.
    struct Canned(HashMap<&'static str, Value>);

    #[async_trait]
    impl SectionResearch for Canned {
        async fn research(&self, topic: &ResearchTopic, _entity: &str) -> SectionResult {
            let started_at = Utc::now();
            match self.0.get(topic.id.as_str()) {
                Some(findings) => SectionResult {
                    topic_id: topic.id.clone(),
                    status: SectionStatus::Success,
                    findings: findings.clone(),
                    sources: Vec::new(),
                    confidence: 75,
                    started_at,
                    completed_at: Utc::now(),
                    error: None,
                },
                None => SectionResult::failed(&topic.id, "no data", started_at),
            }
        }
    }

    fn engine(findings: &[(&'static str, Value)]) -> DiligenceEngine {
        let mut config = DiligenceConfig::default();
        config.research.topics = Some(
            findings.iter().map(|(id, _)| id.to_string()).collect(),
        );
        DiligenceEngine::with_researcher(
            Arc::new(Canned(findings.iter().cloned().collect())),
            &config,
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_research_only_without_facts() {
        let engine = engine(&[("company_overview", json!({"industry": "Fintech"}))]);
        let outcome = engine
            .run(DiligenceRequest::new("Acme Corp"), CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(outcome.research.sections.len(), 1);
        assert!(outcome.analysis.is_none());
        assert!(outcome.assessment.is_none());
    }

    #[tokio::test]
    async fn test_full_run_with_facts() {
        let engine = engine(&[
            ("company_overview", json!({"founded_date": "2021-01-01"})),
            ("corporate_registry", json!({"status": "Active"})),
        ]);
        let facts = FactSet::from_value(json!({
            "company_info": {"foundedYear": 2015},
            "scores": {"overall": 80}
        }));
        let outcome = engine
            .run(
                DiligenceRequest::new("Acme Corp").with_facts(facts),
                CancellationToken::new(),
            )
            .await
            .unwrap();

        let analysis = outcome.analysis.unwrap();
        assert_eq!(analysis.discrepancies.len(), 1);
        // one high discrepancy: 3/4 -> 75
        assert_eq!(analysis.discrepancy_score, 75);

        let assessment = outcome.assessment.unwrap();
        assert_eq!(assessment.base_score, 80.0);
        assert_eq!(assessment.adjusted_score, 42.5);
        assert_eq!(assessment.risk_level, RiskLevel::High);
        assert_eq!(assessment.recommendation, Recommendation::Pass);
    }

    #[tokio::test]
    async fn test_request_catalog_overrides_engine_catalog() {
        let engine = engine(&[("company_overview", json!({}))]);
        let catalog = TopicCatalog::new(vec![ResearchTopic::new(
            "custom",
            "Custom",
            "Tell me about {entity}",
            "Summarize",
        )])
        .unwrap();
        let outcome = engine
            .run(
                DiligenceRequest::new("Acme Corp").with_catalog(catalog),
                CancellationToken::new(),
            )
            .await
            .unwrap();
        assert_eq!(
            outcome.research.sections.keys().collect::<Vec<_>>(),
            vec!["custom"]
        );
        assert_eq!(outcome.research.failed_count, 1);
    }

    #[tokio::test]
    async fn test_empty_entity_rejected() {
        let engine = engine(&[("company_overview", json!({}))]);
        let err = engine
            .run(DiligenceRequest::new("  "), CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            DiligenceError::Input(InputError::EmptyEntityName)
        ));
    }

    #[test]
    fn test_unknown_configured_topic_rejected() {
        let mut config = DiligenceConfig::default();
        config.research.topics = Some(vec!["nope".into()]);
        let result = DiligenceEngine::with_researcher(Arc::new(Canned(HashMap::new())), &config);
        assert!(matches!(
            result,
            Err(DiligenceError::Input(InputError::UnknownTopic { .. }))
        ));
    }

    #[test]
    fn test_from_config_without_backends_fails() {
        let mut config = DiligenceConfig::default();
        config.backends.clear();
        assert!(matches!(
            DiligenceEngine::from_config(&config),
            Err(DiligenceError::Config(_))
        ));
    }
}
