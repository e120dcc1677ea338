//! Multi-section entity research.
//!
//! A run fans out one [`SectionResearch`] task per catalog topic; each task
//! gathers evidence and synthesizes structured findings through the resilient
//! invocation layer. Results are folded into an [`AggregateResult`] with
//! deduplicated sources and an overall confidence.

pub mod catalog;
pub mod confidence;
pub mod findings;
pub mod orchestrator;
pub mod section;
pub mod sources;

pub use catalog::{ResearchTopic, TopicCatalog};
pub use confidence::{NEUTRAL_CONFIDENCE, overall_confidence, section_confidence};
pub use orchestrator::{
    AggregateResult, Interruption, NoOpResearchCallback, ParallelOrchestrator,
    PartialResultWarning, ResearchCallback,
};
pub use section::{SectionResearch, SectionResearcher, SectionResult, SectionStatus};
pub use sources::{OriginType, RelevanceTier, Source, dedup_sources, merge};
