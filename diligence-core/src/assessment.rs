//! Overall assessment: adjusted score, risk level and recommendation.

use crate::discrepancy::{RedFlag, RedFlagSeverity};
use serde::{Deserialize, Serialize};

/// Each discrepancy-score point removes this much from the base score.
pub const DISCREPANCY_PENALTY: f64 = 0.5;
const HIGH_RISK_DISCREPANCY_SCORE: u8 = 70;
const MEDIUM_RISK_DISCREPANCY_SCORE: u8 = 40;
const MAX_RED_FLAGS_BEFORE_PASS: usize = 2;

const STRONG_BUY_THRESHOLD: f64 = 85.0;
const BUY_THRESHOLD: f64 = 70.0;
const HOLD_THRESHOLD: f64 = 55.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl std::fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RiskLevel::Low => write!(f, "low"),
            RiskLevel::Medium => write!(f, "medium"),
            RiskLevel::High => write!(f, "high"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Recommendation {
    StrongBuy,
    Buy,
    Hold,
    Pass,
}

impl std::fmt::Display for Recommendation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Recommendation::StrongBuy => write!(f, "strong buy"),
            Recommendation::Buy => write!(f, "buy"),
            Recommendation::Hold => write!(f, "hold"),
            Recommendation::Pass => write!(f, "pass"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OverallAssessment {
    pub base_score: f64,
    pub discrepancy_score: u8,
    pub adjusted_score: f64,
    pub risk_level: RiskLevel,
    pub recommendation: Recommendation,
}

/// Combine the document base score with the discrepancy score and red flags.
pub fn synthesize(base_score: f64, discrepancy_score: u8, red_flags: &[RedFlag]) -> OverallAssessment {
    let adjusted_score = (base_score - f64::from(discrepancy_score) * DISCREPANCY_PENALTY).max(0.0);
    let critical_flag = red_flags
        .iter()
        .any(|f| f.severity == RedFlagSeverity::Critical);

    let risk_level = if critical_flag || discrepancy_score > HIGH_RISK_DISCREPANCY_SCORE {
        RiskLevel::High
    } else if discrepancy_score > MEDIUM_RISK_DISCREPANCY_SCORE
        || red_flags.len() > MAX_RED_FLAGS_BEFORE_PASS
    {
        RiskLevel::Medium
    } else {
        RiskLevel::Low
    };

    let recommendation = if red_flags.len() > MAX_RED_FLAGS_BEFORE_PASS {
        Recommendation::Pass
    } else if adjusted_score >= STRONG_BUY_THRESHOLD {
        Recommendation::StrongBuy
    } else if adjusted_score >= BUY_THRESHOLD {
        Recommendation::Buy
    } else if adjusted_score >= HOLD_THRESHOLD {
        Recommendation::Hold
    } else {
        Recommendation::Pass
    };

    OverallAssessment {
        base_score,
        discrepancy_score,
        adjusted_score,
        risk_level,
        recommendation,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flag(severity: RedFlagSeverity) -> RedFlag {
        RedFlag {
            flag_type: "test".into(),
            severity,
            title: "t".into(),
            evidence: Vec::new(),
            recommendation: String::new(),
        }
    }

    #[test]
    fn test_adjusted_score() {
        let a = synthesize(80.0, 20, &[]);
        assert_eq!(a.adjusted_score, 70.0);
        assert_eq!(a.recommendation, Recommendation::Buy);
        assert_eq!(a.risk_level, RiskLevel::Low);

        assert_eq!(synthesize(10.0, 100, &[]).adjusted_score, 0.0);
    }

    #[test]
    fn test_recommendation_thresholds() {
        assert_eq!(synthesize(90.0, 0, &[]).recommendation, Recommendation::StrongBuy);
        assert_eq!(synthesize(85.0, 0, &[]).recommendation, Recommendation::StrongBuy);
        assert_eq!(synthesize(60.0, 0, &[]).recommendation, Recommendation::Hold);
        assert_eq!(synthesize(54.9, 0, &[]).recommendation, Recommendation::Pass);
    }

    #[test]
    fn test_risk_levels() {
        assert_eq!(synthesize(80.0, 71, &[]).risk_level, RiskLevel::High);
        assert_eq!(synthesize(80.0, 70, &[]).risk_level, RiskLevel::Medium);
        assert_eq!(synthesize(80.0, 40, &[]).risk_level, RiskLevel::Low);
        assert_eq!(
            synthesize(95.0, 0, &[flag(RedFlagSeverity::Critical)]).risk_level,
            RiskLevel::High
        );
    }

    #[test]
    fn test_many_red_flags_force_pass() {
        let flags = vec![flag(RedFlagSeverity::Warning); 3];
        let a = synthesize(95.0, 0, &flags);
        assert_eq!(a.recommendation, Recommendation::Pass);
        assert_eq!(a.risk_level, RiskLevel::Medium);

        let two = vec![flag(RedFlagSeverity::Warning); 2];
        assert_eq!(synthesize(95.0, 0, &two).recommendation, Recommendation::StrongBuy);
    }
}
