//! Confidence heuristics for sections and the aggregate result.
//!
//! Confidence is a 0-100 estimate of how much a result can be trusted. It is a
//! heuristic over evidence volume and synthesis completeness, not a probability.

use serde_json::Value;

/// Neutral overall confidence when no section produced a non-zero score.
pub const NEUTRAL_CONFIDENCE: f64 = 50.0;

const POINTS_PER_SOURCE: usize = 8;
const MAX_SOURCE_POINTS: usize = 40;
const EVIDENCE_CHARS_PER_POINT: usize = 500;
const MAX_EVIDENCE_POINTS: usize = 20;
const POINTS_PER_FIELD: usize = 5;
const MAX_FIELD_POINTS: usize = 25;

/// Synthesis length thresholds (chars) and their bonus, largest first.
const LENGTH_BONUS: &[(usize, usize)] = &[(2000, 15), (800, 10), (200, 5)];

/// What a section produced, as seen by the scorer.
#[derive(Debug, Clone, Copy)]
pub struct SectionSignals<'a> {
    pub source_count: usize,
    pub evidence_chars: usize,
    pub findings: &'a Value,
    pub synthesis_chars: usize,
}

/// Score one section.
///
/// Source count and evidence volume each contribute a capped base score;
/// populated findings fields and synthesis length add a completeness bonus.
pub fn section_confidence(signals: &SectionSignals<'_>) -> u8 {
    let sources = (signals.source_count * POINTS_PER_SOURCE).min(MAX_SOURCE_POINTS);
    let evidence = (signals.evidence_chars / EVIDENCE_CHARS_PER_POINT).min(MAX_EVIDENCE_POINTS);
    let fields = (populated_fields(signals.findings) * POINTS_PER_FIELD).min(MAX_FIELD_POINTS);
    let length = LENGTH_BONUS
        .iter()
        .find(|(threshold, _)| signals.synthesis_chars >= *threshold)
        .map(|(_, bonus)| *bonus)
        .unwrap_or(0);

    (sources + evidence + fields + length).min(100) as u8
}

/// Count top-level findings fields that carry a value.
pub fn populated_fields(findings: &Value) -> usize {
    match findings {
        Value::Object(map) => map.values().filter(|v| is_populated(v)).count(),
        _ => 0,
    }
}

fn is_populated(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::String(s) => !s.trim().is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
        Value::Bool(_) | Value::Number(_) => true,
    }
}

/// Mean of the non-zero section confidences, or [`NEUTRAL_CONFIDENCE`] if there are none.
///
/// Zero-confidence sections are excluded from the mean rather than counted as zero.
pub fn overall_confidence(confidences: impl IntoIterator<Item = u8>) -> f64 {
    let (sum, count) = confidences
        .into_iter()
        .filter(|c| *c > 0)
        .fold((0u64, 0u64), |(sum, count), c| (sum + u64::from(c), count + 1));
    if count == 0 {
        NEUTRAL_CONFIDENCE
    } else {
        sum as f64 / count as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_empty_section_scores_zero() {
        let findings = json!({});
        let signals = SectionSignals {
            source_count: 0,
            evidence_chars: 0,
            findings: &findings,
            synthesis_chars: 0,
        };
        assert_eq!(section_confidence(&signals), 0);
    }

    #[test]
    fn test_contributions_are_capped() {
        let findings = json!({
            "a": 1, "b": "x", "c": [1], "d": {"k": 1}, "e": true, "f": 2, "g": 3
        });
        let signals = SectionSignals {
            source_count: 50,
            evidence_chars: 1_000_000,
            findings: &findings,
            synthesis_chars: 10_000,
        };
        assert_eq!(section_confidence(&signals), 100);
    }

    #[test]
    fn test_typical_section() {
        let findings = json!({
            "legal_name": "Acme Corp",
            "industry": "Manufacturing",
            "headquarters": null,
            "products": [],
            "description": "Makes anvils"
        });
        let signals = SectionSignals {
            source_count: 3,
            evidence_chars: 2600,
            findings: &findings,
            synthesis_chars: 900,
        };
        // 24 sources + 5 evidence + 15 fields + 10 length
        assert_eq!(section_confidence(&signals), 54);
    }

    #[test]
    fn test_overall_excludes_zero() {
        assert_eq!(overall_confidence([80, 0]), 80.0);
        assert_eq!(overall_confidence([60, 80, 0, 0]), 70.0);
    }

    #[test]
    fn test_overall_neutral_default() {
        assert_eq!(overall_confidence([0, 0, 0]), NEUTRAL_CONFIDENCE);
        assert_eq!(overall_confidence(Vec::new()), NEUTRAL_CONFIDENCE);
    }
}
