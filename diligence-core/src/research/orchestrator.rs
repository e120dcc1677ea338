//! Parallel section orchestrator.
//!
//! Fans out one task per catalog topic, waits for all of them (bounded by a
//! per-task and a global timeout, and by external cancellation), and folds the
//! results into an [`AggregateResult`] keyed in catalog order.

use super::catalog::TopicCatalog;
use super::findings::decode;
use super::section::{SectionResearch, SectionResult, SectionStatus};
use super::sources::{Source, merge};
use crate::config::OrchestratorConfig;
use crate::error::{DiligenceError, InputError, OrchestrationError};
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

/// Progress notifications for a research run.
pub trait ResearchCallback: Send + Sync {
    /// Called when a section's task is launched.
    fn on_section_started(&self, _topic_id: &str) {}
    /// Called as each section reaches a terminal state, in completion order.
    fn on_section_complete(&self, _result: &SectionResult, _completed: usize, _total: usize) {}
}

/// No-op callback.
pub struct NoOpResearchCallback;

impl ResearchCallback for NoOpResearchCallback {}

/// Why a run stopped before every task finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Interruption {
    Cancelled,
    TimedOut,
}

impl Interruption {
    fn reason(self) -> &'static str {
        match self {
            Interruption::Cancelled => "cancelled",
            Interruption::TimedOut => "timed out",
        }
    }
}

/// Not an error: the run completed but some sections failed or degraded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartialResultWarning {
    pub failed_topics: Vec<String>,
    pub degraded_topics: Vec<String>,
}

impl std::fmt::Display for PartialResultWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} section(s) failed, {} degraded",
            self.failed_topics.len(),
            self.degraded_topics.len()
        )?;
        if !self.failed_topics.is_empty() {
            write!(f, "; failed: {}", self.failed_topics.join(", "))?;
        }
        Ok(())
    }
}

/// Everything a research run produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregateResult {
    pub run_id: Uuid,
    pub entity: String,
    pub started_at: DateTime<Utc>,
    /// Wall-clock time from launch to the last task reaching a terminal state.
    pub duration_ms: u64,
    /// One entry per catalog topic, in catalog order.
    pub sections: IndexMap<String, SectionResult>,
    /// Deduplicated sources, most relevant first.
    pub sources: Vec<Source>,
    pub overall_confidence: f64,
    /// Sections with status Success or Degraded.
    pub completed_count: usize,
    pub failed_count: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interruption: Option<Interruption>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub warning: Option<PartialResultWarning>,
}

impl AggregateResult {
    /// Fold section results (already in catalog order) into an aggregate.
    pub fn assemble(
        entity: impl Into<String>,
        started_at: DateTime<Utc>,
        duration: Duration,
        sections: IndexMap<String, SectionResult>,
        interruption: Option<Interruption>,
    ) -> Self {
        let (sources, overall_confidence) = merge(sections.values());

        let failed_topics: Vec<String> = sections
            .values()
            .filter(|s| s.status == SectionStatus::Failed)
            .map(|s| s.topic_id.clone())
            .collect();
        let degraded_topics: Vec<String> = sections
            .values()
            .filter(|s| s.status == SectionStatus::Degraded)
            .map(|s| s.topic_id.clone())
            .collect();

        let warning = (!failed_topics.is_empty() || !degraded_topics.is_empty()).then(|| {
            PartialResultWarning {
                failed_topics: failed_topics.clone(),
                degraded_topics,
            }
        });

        Self {
            run_id: Uuid::new_v4(),
            entity: entity.into(),
            started_at,
            duration_ms: duration.as_millis() as u64,
            completed_count: sections.len() - failed_topics.len(),
            failed_count: failed_topics.len(),
            sections,
            sources,
            overall_confidence,
            interruption,
            warning,
        }
    }

    pub fn section(&self, topic_id: &str) -> Option<&SectionResult> {
        self.sections.get(topic_id)
    }

    /// Decode a non-failed section's findings into a typed view.
    pub fn findings_as<T: DeserializeOwned>(&self, topic_id: &str) -> Option<T> {
        self.sections
            .get(topic_id)
            .filter(|s| !s.is_failed())
            .and_then(|s| decode(&s.findings))
    }
}

/// Runs every catalog topic concurrently through a [`SectionResearch`] implementation.
pub struct ParallelOrchestrator {
    researcher: Arc<dyn SectionResearch>,
    config: OrchestratorConfig,
    callback: Arc<dyn ResearchCallback>,
}

impl ParallelOrchestrator {
    pub fn new(researcher: Arc<dyn SectionResearch>, config: OrchestratorConfig) -> Self {
        Self {
            researcher,
            config,
            callback: Arc::new(NoOpResearchCallback),
        }
    }

    pub fn with_callback(mut self, callback: Arc<dyn ResearchCallback>) -> Self {
        self.callback = callback;
        self
    }

    /// Research every topic in `catalog` for `entity`.
    ///
    /// Waits for all tasks. Cancellation or the global timeout stop the wait;
    /// unfinished topics are then recorded as failed. Returns an error only for
    /// invalid input, or when the run was interrupted before any section finished.
    pub async fn run_all(
        &self,
        entity: &str,
        catalog: &TopicCatalog,
        cancel: CancellationToken,
    ) -> Result<AggregateResult, DiligenceError> {
        let entity = entity.trim();
        if entity.is_empty() {
            return Err(InputError::EmptyEntityName.into());
        }
        catalog.validate()?;

        let started_at = Utc::now();
        let start = tokio::time::Instant::now();
        let total = catalog.len();
        let task_timeout = self.config.task_timeout();

        info!(
            entity = %entity,
            topics = total,
            task_timeout_secs = self.config.task_timeout_secs,
            global_timeout_secs = self.config.global_timeout_secs,
            "Starting parallel research"
        );

        let mut tasks = JoinSet::new();
        for topic in catalog.iter() {
            self.callback.on_section_started(&topic.id);
            let researcher = Arc::clone(&self.researcher);
            let topic = topic.clone();
            let entity = entity.to_string();
            tasks.spawn(async move {
                let task_started = Utc::now();
                match tokio::time::timeout(task_timeout, researcher.research(&topic, &entity)).await
                {
                    Ok(result) => result,
                    Err(_) => {
                        warn!(topic = %topic.id, timeout_secs = task_timeout.as_secs(), "Section timed out");
                        SectionResult::failed(
                            &topic.id,
                            format!("timed out after {}s", task_timeout.as_secs()),
                            task_started,
                        )
                    }
                }
            });
        }

        let deadline = tokio::time::sleep(self.config.global_timeout());
        tokio::pin!(deadline);

        let mut finished: HashMap<String, SectionResult> = HashMap::with_capacity(total);
        let mut interruption = None;

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    interruption = Some(Interruption::Cancelled);
                    break;
                }
                _ = &mut deadline => {
                    interruption = Some(Interruption::TimedOut);
                    break;
                }
                joined = tasks.join_next() => match joined {
                    None => break,
                    Some(Ok(result)) => {
                        info!(
                            topic = %result.topic_id,
                            status = %result.status,
                            confidence = result.confidence,
                            duration_ms = result.duration_ms(),
                            "Section complete"
                        );
                        self.callback.on_section_complete(&result, finished.len() + 1, total);
                        finished.insert(result.topic_id.clone(), result);
                    }
                    Some(Err(e)) => {
                        warn!(error = %e, "Section task aborted");
                    }
                },
            }
        }

        if let Some(reason) = interruption {
            tasks.abort_all();
            warn!(
                reason = reason.reason(),
                finished = finished.len(),
                total,
                "Research interrupted"
            );
            if finished.is_empty() {
                return Err(match reason {
                    Interruption::Cancelled => OrchestrationError::Cancelled,
                    Interruption::TimedOut => OrchestrationError::TimedOut {
                        timeout_secs: self.config.global_timeout_secs,
                    },
                }
                .into());
            }
        }

        let missing_reason = interruption.map(Interruption::reason).unwrap_or("task aborted");
        let sections: IndexMap<String, SectionResult> = catalog
            .iter()
            .map(|topic| {
                let result = finished.remove(&topic.id).unwrap_or_else(|| {
                    SectionResult::failed(&topic.id, missing_reason, started_at)
                });
                (topic.id.clone(), result)
            })
            .collect();

        let aggregate =
            AggregateResult::assemble(entity, started_at, start.elapsed(), sections, interruption);

        info!(
            entity = %entity,
            completed = aggregate.completed_count,
            failed = aggregate.failed_count,
            sources = aggregate.sources.len(),
            confidence = aggregate.overall_confidence,
            duration_ms = aggregate.duration_ms,
            "Research complete"
        );

        Ok(aggregate)
    }
}
