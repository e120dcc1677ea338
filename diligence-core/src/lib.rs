//! # Diligence Core
//!
//! Core library for Diligence, a due-diligence research engine.
//! Researches an entity across a catalog of topics in parallel through
//! resilient, fallback-aware backends, aggregates and scores the findings,
//! and compares them against document-derived facts to surface discrepancies,
//! red flags and an overall assessment.

pub mod assessment;
pub mod backend;
pub mod config;
pub mod discrepancy;
pub mod engine;
pub mod error;
pub mod report;
pub mod research;
pub mod resilience;

// Re-export commonly used types at the crate root.
pub use assessment::{OverallAssessment, Recommendation, RiskLevel, synthesize};
pub use backend::{
    BackendRequest, BackendResponse, Citation, MockBackend, RequestKind, ResearchBackend,
};
pub use config::{DiligenceConfig, load_config};
pub use discrepancy::{
    ConfidenceAssessment, Discrepancy, DiscrepancyAnalyzer, DiscrepancyReport, FactAssertion,
    FactSet, RedFlag, RedFlagSeverity, Severity,
};
pub use engine::{DiligenceEngine, DiligenceOutcome, DiligenceRequest};
pub use error::{DiligenceError, Result};
pub use report::render_markdown;
pub use research::{
    AggregateResult, ParallelOrchestrator, ResearchCallback, ResearchTopic, SectionResearch,
    SectionResult, SectionStatus, Source, TopicCatalog,
};
pub use resilience::{BackoffPolicy, ResilientInvoker};
