//! Markdown rendering of a diligence outcome.

use crate::discrepancy::{DiscrepancyReport, RedFlagSeverity};
use crate::engine::DiligenceOutcome;
use crate::research::{AggregateResult, SectionStatus};
use std::fmt::Write;

const MAX_LISTED_SOURCES: usize = 25;

pub fn render_markdown(outcome: &DiligenceOutcome) -> String {
    let mut out = String::new();
    let research = &outcome.research;

    let _ = writeln!(out, "# Due Diligence: {}\n", research.entity);
    let _ = writeln!(
        out,
        "Run `{}` started {} and took {:.1}s. {} of {} sections completed; overall research confidence {:.0}/100.\n",
        research.run_id,
        research.started_at.format("%Y-%m-%d %H:%M:%S UTC"),
        research.duration_ms as f64 / 1000.0,
        research.completed_count,
        research.sections.len(),
        research.overall_confidence,
    );
    if let Some(interruption) = research.interruption {
        let _ = writeln!(out, "> Run interrupted ({interruption:?}); results are partial.\n");
    }
    if let Some(warning) = &research.warning {
        let _ = writeln!(out, "> {warning}\n");
    }

    if let Some(assessment) = &outcome.assessment {
        let _ = writeln!(out, "## Assessment\n");
        let _ = writeln!(out, "| | |\n|---|---|");
        let _ = writeln!(out, "| Base score | {:.1} |", assessment.base_score);
        let _ = writeln!(out, "| Discrepancy score | {} |", assessment.discrepancy_score);
        let _ = writeln!(out, "| Adjusted score | {:.1} |", assessment.adjusted_score);
        let _ = writeln!(out, "| Risk level | {} |", assessment.risk_level);
        let _ = writeln!(out, "| Recommendation | **{}** |\n", assessment.recommendation);
    }

    if let Some(analysis) = &outcome.analysis {
        render_analysis(&mut out, analysis);
    }

    render_sections(&mut out, research);
    render_sources(&mut out, research);
    out
}

fn render_analysis(out: &mut String, analysis: &DiscrepancyReport) {
    let _ = writeln!(out, "## Discrepancies\n\n{}\n", analysis.summary);
    if !analysis.discrepancies.is_empty() {
        let _ = writeln!(out, "| Severity | Field | Documents | Research |\n|---|---|---|---|");
        for d in &analysis.discrepancies {
            let _ = writeln!(
                out,
                "| {} | {}.{} | {} | {} |",
                d.severity,
                d.category,
                d.field,
                escape_cell(&d.document_value),
                escape_cell(&d.research_value)
            );
        }
        out.push('\n');
    }

    if !analysis.red_flags.is_empty() {
        let _ = writeln!(out, "## Red Flags\n");
        for flag in &analysis.red_flags {
            let marker = match flag.severity {
                RedFlagSeverity::Critical => "CRITICAL",
                RedFlagSeverity::Warning => "WARNING",
            };
            let _ = writeln!(out, "- **{marker}** {}", flag.title);
            for line in &flag.evidence {
                let _ = writeln!(out, "  - {line}");
            }
            let _ = writeln!(out, "  - Recommendation: {}", flag.recommendation);
        }
        out.push('\n');
    }

    let confidence = &analysis.confidence;
    let _ = writeln!(
        out,
        "## Confidence\n\nOverall {}/100 (documents {}, research {}).\n",
        confidence.overall_confidence,
        confidence.document_reliability,
        confidence.research_reliability
    );
    for factor in &confidence.factors {
        let _ = writeln!(
            out,
            "- {}: {:.0} ({:?}, weight {})",
            factor.name, factor.score, factor.impact, factor.weight
        );
    }
    out.push('\n');
}

fn render_sections(out: &mut String, research: &AggregateResult) {
    let _ = writeln!(out, "## Sections\n");
    for section in research.sections.values() {
        let _ = writeln!(
            out,
            "### {} ({}, confidence {})\n",
            section.topic_id, section.status, section.confidence
        );
        if let Some(error) = &section.error {
            let _ = writeln!(out, "_{error}_\n");
        }
        if section.status != SectionStatus::Failed {
            let body = serde_json::to_string_pretty(&section.findings).unwrap_or_default();
            let _ = writeln!(out, "```json\n{body}\n```\n");
        }
    }
}

fn render_sources(out: &mut String, research: &AggregateResult) {
    if research.sources.is_empty() {
        return;
    }
    let _ = writeln!(out, "## Sources\n");
    for source in research.sources.iter().take(MAX_LISTED_SOURCES) {
        match &source.title {
            Some(title) => {
                let _ = writeln!(out, "- [{title}]({}) ({})", source.url, source.relevance);
            }
            None => {
                let _ = writeln!(out, "- <{}> ({})", source.url, source.relevance);
            }
        }
    }
    if research.sources.len() > MAX_LISTED_SOURCES {
        let _ = writeln!(
            out,
            "- ... and {} more",
            research.sources.len() - MAX_LISTED_SOURCES
        );
    }
}

fn escape_cell(text: &str) -> String {
    text.replace('|', "\\|").replace('\n', " ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assessment::synthesize;
    use crate::discrepancy::{DiscrepancyAnalyzer, FactSet};
    use crate::research::sources::{OriginType, RelevanceTier, Source};
    use crate::research::SectionResult;
    use chrono::Utc;
    use indexmap::IndexMap;
    use serde_json::json;
    use std::time::Duration;

    fn research() -> AggregateResult {
        let now = Utc::now();
        let mut sections = IndexMap::new();
        sections.insert(
            "company_overview".to_string(),
            SectionResult {
                topic_id: "company_overview".into(),
                status: SectionStatus::Success,
                findings: json!({"founded_date": "2021-01-01", "industry": "Fintech"}),
                sources: vec![
                    Source::new(
                        "https://acme.example/about",
                        OriginType::EvidenceGathering,
                        RelevanceTier::High,
                    )
                    .with_title("About Acme"),
                ],
                confidence: 80,
                started_at: now,
                completed_at: now,
                error: None,
            },
        );
        sections.insert(
            "funding_history".to_string(),
            SectionResult::failed("funding_history", "service unavailable", now),
        );
        AggregateResult::assemble("Acme Corp", now, Duration::from_millis(1500), sections, None)
    }

    #[test]
    fn test_render_research_only() {
        let outcome = DiligenceOutcome {
            research: research(),
            analysis: None,
            assessment: None,
        };
        let md = render_markdown(&outcome);
        assert!(md.starts_with("# Due Diligence: Acme Corp"));
        assert!(md.contains("1 of 2 sections completed"));
        assert!(md.contains("### funding_history (failed, confidence 0)"));
        assert!(md.contains("_service unavailable_"));
        assert!(md.contains("[About Acme](https://acme.example/about) (high)"));
        assert!(!md.contains("## Assessment"));
    }

    #[test]
    fn test_render_with_analysis() {
        let research = research();
        let facts = FactSet::from_value(json!({"company_info": {"foundedYear": 2015}}));
        let analysis = DiscrepancyAnalyzer::new().analyze(&facts, &research);
        let assessment = synthesize(facts.base_score(), analysis.discrepancy_score, &analysis.red_flags);
        let md = render_markdown(&DiligenceOutcome {
            research,
            analysis: Some(analysis),
            assessment: Some(assessment),
        });
        assert!(md.contains("## Assessment"));
        assert!(md.contains("| high | company_info.founding_date | 2015 | 2021-01-01 |"));
        assert!(md.contains("## Confidence"));
    }

    #[test]
    fn test_escape_cell() {
        assert_eq!(escape_cell("a|b\nc"), "a\\|b c");
    }
}
