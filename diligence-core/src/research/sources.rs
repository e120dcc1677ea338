//! Source tracking, aggregation and deduplication.

use super::section::SectionResult;
use crate::backend::Citation;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// How a source was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OriginType {
    /// Cited by the web-grounded evidence query.
    EvidenceGathering,
    /// Returned by a directed keyword search.
    DirectedSearch,
}

/// Relevance of a source to its topic. Ordered low to high.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RelevanceTier {
    Low,
    Medium,
    High,
}

impl std::fmt::Display for RelevanceTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RelevanceTier::Low => write!(f, "low"),
            RelevanceTier::Medium => write!(f, "medium"),
            RelevanceTier::High => write!(f, "high"),
        }
    }
}

/// A citable source backing a section's findings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Source {
    pub url: String,
    #[serde(default)]
    pub title: Option<String>,
    pub origin: OriginType,
    pub relevance: RelevanceTier,
}

impl Source {
    pub fn new(url: impl Into<String>, origin: OriginType, relevance: RelevanceTier) -> Self {
        Self {
            url: url.into(),
            title: None,
            origin,
            relevance,
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    /// Convert a backend citation. Unranked citations get the origin's default tier:
    /// grounded evidence citations rank above keyword search hits.
    pub fn from_citation(citation: &Citation, origin: OriginType) -> Self {
        let relevance = citation.relevance.unwrap_or(match origin {
            OriginType::EvidenceGathering => RelevanceTier::High,
            OriginType::DirectedSearch => RelevanceTier::Medium,
        });
        Self {
            url: citation.url.trim().to_string(),
            title: citation.title.clone(),
            origin,
            relevance,
        }
    }
}

/// Deduplicate sources by URL.
///
/// The first occurrence of a URL is kept; a later occurrence replaces its
/// relevance (and fills a missing title) only when strictly more relevant.
/// The result is stably sorted by relevance, most relevant first, so
/// merging an already merged list returns it unchanged.
pub fn dedup_sources<'a>(sources: impl IntoIterator<Item = &'a Source>) -> Vec<Source> {
    let mut by_url: IndexMap<&str, Source> = IndexMap::new();

    for source in sources {
        let key = source.url.trim();
        if key.is_empty() {
            continue;
        }
        match by_url.get_mut(key) {
            Some(existing) => {
                if source.relevance > existing.relevance {
                    existing.relevance = source.relevance;
                    if existing.title.is_none() {
                        existing.title = source.title.clone();
                    }
                }
            }
            None => {
                let mut kept = source.clone();
                kept.url = key.to_string();
                by_url.insert(key, kept);
            }
        }
    }

    let mut merged: Vec<Source> = by_url.into_values().collect();
    merged.sort_by(|a, b| b.relevance.cmp(&a.relevance));
    merged
}

/// Merge all section sources (in the order given, which callers keep as
/// catalog order) and compute the overall confidence.
pub fn merge<'a>(sections: impl IntoIterator<Item = &'a SectionResult>) -> (Vec<Source>, f64) {
    let sections: Vec<&SectionResult> = sections.into_iter().collect();
    let sources = dedup_sources(sections.iter().flat_map(|s| s.sources.iter()));
    let confidence = super::confidence::overall_confidence(sections.iter().map(|s| s.confidence));
    (sources, confidence)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn src(url: &str, relevance: RelevanceTier) -> Source {
        Source::new(url, OriginType::DirectedSearch, relevance)
    }

    #[test]
    fn test_dedup_first_seen_wins_on_equal_relevance() {
        let a = src("https://a.example", RelevanceTier::Medium).with_title("first");
        let b = src("https://a.example", RelevanceTier::Medium).with_title("second");
        let merged = dedup_sources([&a, &b]);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].title.as_deref(), Some("first"));
    }

    #[test]
    fn test_dedup_upgrades_to_higher_relevance() {
        let low = src("https://a.example", RelevanceTier::Low);
        let high = src("https://a.example", RelevanceTier::High).with_title("better");
        let merged = dedup_sources([&low, &high]);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].relevance, RelevanceTier::High);
        assert_eq!(merged[0].title.as_deref(), Some("better"));
        assert_eq!(merged[0].origin, OriginType::DirectedSearch);
    }

    #[test]
    fn test_dedup_never_downgrades() {
        let high = src("https://a.example", RelevanceTier::High);
        let low = src("https://a.example", RelevanceTier::Low);
        let merged = dedup_sources([&high, &low]);
        assert_eq!(merged[0].relevance, RelevanceTier::High);
    }

    #[test]
    fn test_dedup_sorted_by_relevance_and_stable() {
        let sources = vec![
            src("https://1.example", RelevanceTier::Low),
            src("https://2.example", RelevanceTier::High),
            src("https://3.example", RelevanceTier::Low),
            src("https://4.example", RelevanceTier::High),
        ];
        let merged = dedup_sources(&sources);
        let urls: Vec<&str> = merged.iter().map(|s| s.url.as_str()).collect();
        assert_eq!(
            urls,
            vec![
                "https://2.example",
                "https://4.example",
                "https://1.example",
                "https://3.example"
            ]
        );
    }

    #[test]
    fn test_dedup_is_idempotent() {
        let sources = vec![
            src("https://a.example", RelevanceTier::Low),
            src("https://b.example", RelevanceTier::Medium),
            src("https://a.example", RelevanceTier::High),
        ];
        let once = dedup_sources(&sources);
        let twice = dedup_sources(&once);
        assert_eq!(once, twice);
    }

    #[test]
    fn test_dedup_skips_blank_urls_and_trims() {
        let sources = vec![
            src("  ", RelevanceTier::High),
            src(" https://a.example ", RelevanceTier::Low),
            src("https://a.example", RelevanceTier::Low),
        ];
        let merged = dedup_sources(&sources);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].url, "https://a.example");
    }

    #[test]
    fn test_from_citation_default_tiers() {
        let citation = Citation::new("https://a.example");
        assert_eq!(
            Source::from_citation(&citation, OriginType::EvidenceGathering).relevance,
            RelevanceTier::High
        );
        assert_eq!(
            Source::from_citation(&citation, OriginType::DirectedSearch).relevance,
            RelevanceTier::Medium
        );
        let ranked = citation.with_relevance(RelevanceTier::Low);
        assert_eq!(
            Source::from_citation(&ranked, OriginType::EvidenceGathering).relevance,
            RelevanceTier::Low
        );
    }
}
