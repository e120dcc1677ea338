//! Discrepancy analysis between document-derived facts and independent research.
//!
//! Comparisons are rule based. Each rule names the field, where to find it on
//! both sides, how to compare it, and the severity of a mismatch. The scoring
//! constants below are product calibration and are kept fixed.

pub mod compare;
pub mod facts;

use crate::research::AggregateResult;
use crate::research::findings::{
    CompanyOverview, Financials, FundingHistory, LeadershipTeam, LegalStanding, NewsCoverage,
    RegistryRecord, RiskProfile, scalar_text,
};
use compare::{date_of, dates_differ, quantity_difference, quantity_of, text_similarity};
use indexmap::IndexSet;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

pub use facts::{FactAssertion, FactSet};

/// Free-text fields below this word-set overlap are a discrepancy.
pub const TEXT_SIMILARITY_THRESHOLD: f64 = 0.3;
/// Dates further apart than this are a discrepancy.
pub const MAX_DATE_GAP_DAYS: i64 = 365;
/// A document score at or above this contradicted by negative evidence is a discrepancy.
pub const HIGH_SCORE_THRESHOLD: f64 = 70.0;

/// Confidence factor weights. Renormalized over the factors actually present.
pub const EVIDENCE_AVAILABILITY_WEIGHT: f64 = 0.3;
pub const MEDIA_COVERAGE_WEIGHT: f64 = 0.2;
pub const REGISTRY_VERIFICATION_WEIGHT: f64 = 0.2;
pub const FOUNDER_VERIFICATION_WEIGHT: f64 = 0.15;
pub const DOCUMENT_CONSISTENCY_WEIGHT: f64 = 0.15;

const POSITIVE_FACTOR_THRESHOLD: f64 = 70.0;
const NEUTRAL_FACTOR_THRESHOLD: f64 = 40.0;
const POINTS_PER_ARTICLE: f64 = 10.0;

// Topic ids of the built-in catalog the analyzer reads from.
const OVERVIEW_TOPIC: &str = "company_overview";
const REGISTRY_TOPIC: &str = "corporate_registry";
const FUNDING_TOPIC: &str = "funding_history";
const FINANCIALS_TOPIC: &str = "financials";
const LEADERSHIP_TOPIC: &str = "leadership_team";
const LEGAL_TOPIC: &str = "legal_regulatory";
const NEWS_TOPIC: &str = "news_sentiment";
const RISK_TOPIC: &str = "risk_assessment";

const GOOD_REGISTRY_STATUSES: &[&str] = &["active", "good standing", "current"];
const ADVERSE_REGISTRY_STATUSES: &[&str] = &["inactive", "not in good standing", "non-current"];
const TERMINAL_REGISTRY_STATUSES: &[&str] = &[
    "dissolved",
    "liquidation",
    "struck off",
    "struck-off",
    "revoked",
    "bankrupt",
    "insolvent",
];

/// Severity of a discrepancy. Ordered low to critical.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    /// Scoring weight: critical 4, high 3, medium 2, low 1.
    pub fn weight(self) -> u32 {
        match self {
            Severity::Low => 1,
            Severity::Medium => 2,
            Severity::High => 3,
            Severity::Critical => 4,
        }
    }

    /// Points deducted from document reliability.
    pub fn reliability_deduction(self) -> u32 {
        match self {
            Severity::Low => 0,
            Severity::Medium => 5,
            Severity::High => 15,
            Severity::Critical => 25,
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Severity::Low => write!(f, "low"),
            Severity::Medium => write!(f, "medium"),
            Severity::High => write!(f, "high"),
            Severity::Critical => write!(f, "critical"),
        }
    }
}

/// A mismatch between a document claim and research.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Discrepancy {
    pub category: String,
    pub field: String,
    pub document_value: String,
    pub research_value: String,
    pub severity: Severity,
    pub description: String,
    pub impact: String,
    pub recommendation: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RedFlagSeverity {
    Warning,
    Critical,
}

/// An issue that needs explicit attention regardless of the aggregate score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RedFlag {
    #[serde(rename = "type")]
    pub flag_type: String,
    pub severity: RedFlagSeverity,
    pub title: String,
    pub evidence: Vec<String>,
    pub recommendation: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FactorImpact {
    Positive,
    Neutral,
    Negative,
}

impl FactorImpact {
    fn from_score(score: f64) -> Self {
        if score >= POSITIVE_FACTOR_THRESHOLD {
            FactorImpact::Positive
        } else if score >= NEUTRAL_FACTOR_THRESHOLD {
            FactorImpact::Neutral
        } else {
            FactorImpact::Negative
        }
    }
}

/// One input to the overall confidence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfidenceFactor {
    pub name: String,
    /// Fixed design weight, before renormalization.
    pub weight: f64,
    /// 0-100.
    pub score: f64,
    pub impact: FactorImpact,
}

impl ConfidenceFactor {
    fn new(name: &str, weight: f64, score: f64) -> Self {
        let score = score.clamp(0.0, 100.0);
        Self {
            name: name.to_string(),
            weight,
            score,
            impact: FactorImpact::from_score(score),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfidenceAssessment {
    pub document_reliability: u8,
    pub research_reliability: u8,
    pub overall_confidence: u8,
    pub factors: Vec<ConfidenceFactor>,
}

/// Output of [`DiscrepancyAnalyzer::analyze`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscrepancyReport {
    /// Most severe first.
    pub discrepancies: Vec<Discrepancy>,
    pub red_flags: Vec<RedFlag>,
    pub confidence: ConfidenceAssessment,
    /// Normalized severity, 0-100.
    pub discrepancy_score: u8,
    /// Raw sum of severity weights.
    pub weighted_severity: u32,
    pub summary: String,
}

impl DiscrepancyReport {
    pub fn count(&self, severity: Severity) -> usize {
        self.discrepancies
            .iter()
            .filter(|d| d.severity == severity)
            .count()
    }

    pub fn has_critical_red_flag(&self) -> bool {
        self.red_flags
            .iter()
            .any(|f| f.severity == RedFlagSeverity::Critical)
    }
}

/// Sum of severity weights.
pub fn weighted_severity(severities: impl IntoIterator<Item = Severity>) -> u32 {
    severities.into_iter().map(Severity::weight).sum()
}

/// Weighted severity normalized against the maximum weight for that many
/// discrepancies, as a rounded percentage. Zero when there are none.
pub fn discrepancy_score(severities: impl IntoIterator<Item = Severity>) -> u8 {
    let (sum, count) = severities
        .into_iter()
        .fold((0u32, 0u32), |(sum, count), s| (sum + s.weight(), count + 1));
    if count == 0 {
        return 0;
    }
    let max = f64::from(count * Severity::Critical.weight());
    (f64::from(sum) / max * 100.0).round() as u8
}

/// 100 minus per-severity deductions, floored at 0.
pub fn document_reliability(severities: impl IntoIterator<Item = Severity>) -> u8 {
    let deductions: u32 = severities
        .into_iter()
        .map(Severity::reliability_deduction)
        .sum();
    100u32.saturating_sub(deductions) as u8
}

/// How a field is compared.
#[derive(Debug, Clone, Copy)]
enum Comparison {
    Date,
    Text,
    /// Relative difference threshold, plus an optional threshold escalating to critical.
    Amount {
        threshold: f64,
        critical_above: Option<f64>,
    },
}

/// A comparable field.
struct FieldRule {
    category: &'static str,
    field: &'static str,
    label: &'static str,
    doc_categories: &'static [&'static str],
    doc_fields: &'static [&'static str],
    comparison: Comparison,
    severity: Severity,
    impact: &'static str,
    recommendation: &'static str,
}

const COMPANY_CATEGORIES: &[&str] = &["company_info", "company", "overview", "company_overview"];
const FINANCIAL_CATEGORIES: &[&str] = &["financials", "financial", "metrics"];
const FUNDING_CATEGORIES: &[&str] = &["funding", "financials", "metrics"];
const TEAM_CATEGORIES: &[&str] = &["team", "leadership", "company_info"];

const FOUNDING_DATE: FieldRule = FieldRule {
    category: "company_info",
    field: "founding_date",
    label: "founding date",
    doc_categories: COMPANY_CATEGORIES,
    doc_fields: &[
        "founding_date",
        "founded_date",
        "founded_year",
        "year_founded",
        "founded",
        "incorporation_date",
    ],
    comparison: Comparison::Date,
    severity: Severity::High,
    impact: "Company history as presented may not match independent records.",
    recommendation: "Obtain the certificate of incorporation and reconcile the company timeline.",
};

const INDUSTRY: FieldRule = FieldRule {
    category: "company_info",
    field: "industry",
    label: "industry",
    doc_categories: COMPANY_CATEGORIES,
    doc_fields: &["industry", "sector", "vertical"],
    comparison: Comparison::Text,
    severity: Severity::Low,
    impact: "Market positioning may be described differently than third parties see it.",
    recommendation: "Confirm how the company classifies itself versus public listings.",
};

const HEADQUARTERS: FieldRule = FieldRule {
    category: "company_info",
    field: "headquarters",
    label: "headquarters",
    doc_categories: COMPANY_CATEGORIES,
    doc_fields: &["headquarters", "hq", "headquarters_location", "location"],
    comparison: Comparison::Text,
    severity: Severity::Medium,
    impact: "Jurisdiction and operating location may differ from what was represented.",
    recommendation: "Verify the registered and operating addresses.",
};

const EMPLOYEE_COUNT: FieldRule = FieldRule {
    category: "company_info",
    field: "employee_count",
    label: "employee count",
    doc_categories: &["company_info", "company", "metrics", "team"],
    doc_fields: &["employee_count", "employees", "headcount", "team_size"],
    comparison: Comparison::Amount {
        threshold: 0.5,
        critical_above: None,
    },
    severity: Severity::Medium,
    impact: "Operating scale may be overstated or understated.",
    recommendation: "Request payroll or HR records to confirm headcount.",
};

const REVENUE: FieldRule = FieldRule {
    category: "financials",
    field: "revenue",
    label: "revenue",
    doc_categories: FINANCIAL_CATEGORIES,
    doc_fields: &["revenue", "annual_revenue", "arr", "total_revenue"],
    comparison: Comparison::Amount {
        threshold: 0.25,
        critical_above: Some(1.0),
    },
    severity: Severity::High,
    impact: "Valuation and growth assumptions depend directly on revenue.",
    recommendation: "Request audited financial statements and bank records.",
};

const TOTAL_RAISED: FieldRule = FieldRule {
    category: "funding",
    field: "total_raised",
    label: "total funding raised",
    doc_categories: FUNDING_CATEGORIES,
    doc_fields: &["total_raised", "total_funding", "funding_raised", "amount_raised"],
    comparison: Comparison::Amount {
        threshold: 0.25,
        critical_above: Some(1.0),
    },
    severity: Severity::High,
    impact: "Capitalization and investor history may be misrepresented.",
    recommendation: "Review the cap table and closing documents for each round.",
};

const VALUATION: FieldRule = FieldRule {
    category: "funding",
    field: "last_valuation",
    label: "last valuation",
    doc_categories: FUNDING_CATEGORIES,
    doc_fields: &["last_valuation", "valuation", "post_money_valuation"],
    comparison: Comparison::Amount {
        threshold: 0.5,
        critical_above: None,
    },
    severity: Severity::Medium,
    impact: "Entry price expectations may rest on an unsupported valuation.",
    recommendation: "Ask for the latest priced-round term sheet.",
};

const FOUNDERS: FieldRule = FieldRule {
    category: "team",
    field: "founders",
    label: "founders",
    doc_categories: TEAM_CATEGORIES,
    doc_fields: &["founders", "founder", "founder_names", "founding_team"],
    comparison: Comparison::Text,
    severity: Severity::High,
    impact: "The people credited with building the company may not be who is claimed.",
    recommendation: "Verify founder identities and roles through registry filings and references.",
};

/// Typed research views the analyzer consumes. Missing or undecodable
/// sections are `None`.
#[derive(Debug, Default)]
struct ResearchView {
    overview: Option<CompanyOverview>,
    registry: Option<RegistryRecord>,
    funding: Option<FundingHistory>,
    financials: Option<Financials>,
    leadership: Option<LeadershipTeam>,
    legal: Option<LegalStanding>,
    news: Option<NewsCoverage>,
    risk: Option<RiskProfile>,
}

impl ResearchView {
    fn from_research(research: &AggregateResult) -> Self {
        Self {
            overview: research.findings_as(OVERVIEW_TOPIC),
            registry: research.findings_as(REGISTRY_TOPIC),
            funding: research.findings_as(FUNDING_TOPIC),
            financials: research.findings_as(FINANCIALS_TOPIC),
            leadership: research.findings_as(LEADERSHIP_TOPIC),
            legal: research.findings_as(LEGAL_TOPIC),
            news: research.findings_as(NEWS_TOPIC),
            risk: research.findings_as(RISK_TOPIC),
        }
    }

    /// Research-side value for a rule.
    fn value_for(&self, rule: &FieldRule) -> Option<String> {
        let overview = self.overview.as_ref();
        match rule.field {
            "founding_date" => overview.and_then(|o| o.founded_date.clone()).or_else(|| {
                self.registry
                    .as_ref()
                    .and_then(|r| r.incorporation_date.clone())
            }),
            "industry" => overview.and_then(|o| o.industry.clone()),
            "headquarters" => overview.and_then(|o| o.headquarters.clone()),
            "employee_count" => overview.and_then(|o| o.employee_count.clone()),
            "revenue" => self.financials.as_ref().and_then(|f| f.revenue.clone()),
            "total_raised" => self.funding.as_ref().and_then(|f| f.total_raised.clone()),
            "last_valuation" => self.funding.as_ref().and_then(|f| f.last_valuation.clone()),
            "founders" => self
                .leadership
                .as_ref()
                .map(|l| l.founder_names().join(", "))
                .filter(|names| !names.is_empty()),
            _ => None,
        }
    }

    fn unverified_founders(&self) -> Vec<String> {
        self.leadership
            .as_ref()
            .map(|l| {
                l.founders
                    .iter()
                    .filter(|p| p.verified == Some(false))
                    .map(|p| p.name.clone())
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// Render a document value as text: scalars, lists of names, or named objects.
fn value_text(value: &Value) -> Option<String> {
    match value {
        Value::Array(items) => {
            let parts: Vec<String> = items.iter().filter_map(value_text).collect();
            (!parts.is_empty()).then(|| parts.join(", "))
        }
        Value::Object(map) => map.get("name").and_then(scalar_text),
        other => scalar_text(other),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RegistryStanding {
    Good,
    Adverse,
    Terminal,
}

fn registry_standing(status: &str) -> RegistryStanding {
    let status = status.to_lowercase();
    if TERMINAL_REGISTRY_STATUSES.iter().any(|s| status.contains(s)) {
        RegistryStanding::Terminal
    } else if ADVERSE_REGISTRY_STATUSES.iter().any(|s| status.contains(s)) {
        RegistryStanding::Adverse
    } else if GOOD_REGISTRY_STATUSES.iter().any(|s| status.contains(s)) {
        RegistryStanding::Good
    } else {
        RegistryStanding::Adverse
    }
}

/// Compares document-derived facts against research findings.
#[derive(Debug, Clone)]
pub struct DiscrepancyAnalyzer {
    text_similarity_threshold: f64,
    max_date_gap_days: i64,
}

impl DiscrepancyAnalyzer {
    pub fn new() -> Self {
        Self {
            text_similarity_threshold: TEXT_SIMILARITY_THRESHOLD,
            max_date_gap_days: MAX_DATE_GAP_DAYS,
        }
    }

    pub fn analyze(&self, facts: &FactSet, research: &AggregateResult) -> DiscrepancyReport {
        let view = ResearchView::from_research(research);

        let mut discrepancies: Vec<Discrepancy> = [
            &FOUNDING_DATE,
            &INDUSTRY,
            &HEADQUARTERS,
            &EMPLOYEE_COUNT,
            &REVENUE,
            &TOTAL_RAISED,
            &VALUATION,
            &FOUNDERS,
        ]
        .into_iter()
        .filter_map(|rule| self.check_field(rule, facts, &view))
        .collect();
        discrepancies.extend(self.check_scores(facts, &view));
        discrepancies.sort_by(|a, b| b.severity.cmp(&a.severity));

        let red_flags = self.red_flags(&discrepancies, &view);
        let severities = || discrepancies.iter().map(|d| d.severity);
        let score = discrepancy_score(severities());
        let weighted = weighted_severity(severities());
        let confidence = self.assess_confidence(research, &view, document_reliability(severities()));
        let summary = summarize(&discrepancies, &red_flags, score);

        info!(
            entity = %research.entity,
            discrepancies = discrepancies.len(),
            red_flags = red_flags.len(),
            discrepancy_score = score,
            confidence = confidence.overall_confidence,
            "Discrepancy analysis complete"
        );

        DiscrepancyReport {
            discrepancies,
            red_flags,
            confidence,
            discrepancy_score: score,
            weighted_severity: weighted,
            summary,
        }
    }

    fn check_field(
        &self,
        rule: &FieldRule,
        facts: &FactSet,
        view: &ResearchView,
    ) -> Option<Discrepancy> {
        let doc_raw = facts.find(rule.doc_categories, rule.doc_fields)?;
        let doc_text = value_text(doc_raw)?;
        let research_text = view.value_for(rule)?;

        let severity = match rule.comparison {
            Comparison::Date => {
                let doc_date = date_of(doc_raw)?;
                let research_date = compare::parse_date(&research_text)?;
                dates_differ(doc_date, research_date, self.max_date_gap_days)
                    .then_some(rule.severity)?
            }
            Comparison::Text => {
                let similarity = text_similarity(&doc_text, &research_text);
                debug!(field = rule.field, similarity, "Compared text field");
                (similarity < self.text_similarity_threshold).then_some(rule.severity)?
            }
            Comparison::Amount {
                threshold,
                critical_above,
            } => {
                let doc_amount = quantity_of(doc_raw)?;
                let research_amount = compare::parse_quantity(&research_text)?;
                let diff = quantity_difference(doc_amount, research_amount);
                debug!(field = rule.field, relative_difference = diff, "Compared amount field");
                if critical_above.is_some_and(|limit| diff > limit) {
                    Severity::Critical
                } else if diff > threshold {
                    rule.severity
                } else {
                    return None;
                }
            }
        };

        Some(Discrepancy {
            category: rule.category.to_string(),
            field: rule.field.to_string(),
            description: format!(
                "Documents state {} as '{doc_text}' but independent research found '{research_text}'.",
                rule.label
            ),
            document_value: doc_text,
            research_value: research_text,
            severity,
            impact: rule.impact.to_string(),
            recommendation: rule.recommendation.to_string(),
        })
    }

    /// High document scores contradicted by negative research evidence.
    fn check_scores(&self, facts: &FactSet, view: &ResearchView) -> Vec<Discrepancy> {
        facts
            .scores()
            .into_iter()
            .filter(|(_, score)| *score >= HIGH_SCORE_THRESHOLD)
            .filter_map(|(key, score)| {
                let evidence = negative_evidence(&key, view);
                if evidence.is_empty() {
                    return None;
                }
                Some(Discrepancy {
                    category: "scores".to_string(),
                    field: key.clone(),
                    document_value: format!("{score}"),
                    research_value: evidence.join("; "),
                    severity: Severity::High,
                    description: format!(
                        "Documents score '{key}' at {score} but research shows negative evidence."
                    ),
                    impact: "The document assessment may be overly optimistic.".to_string(),
                    recommendation: "Re-examine the basis for this score against the negative findings."
                        .to_string(),
                })
            })
            .collect()
    }

    fn red_flags(&self, discrepancies: &[Discrepancy], view: &ResearchView) -> Vec<RedFlag> {
        let mut flags: Vec<RedFlag> = discrepancies
            .iter()
            .filter(|d| d.severity == Severity::Critical)
            .map(|d| RedFlag {
                flag_type: "discrepancy".to_string(),
                severity: RedFlagSeverity::Critical,
                title: format!("Critical discrepancy in {}.{}", d.category, d.field),
                evidence: vec![
                    d.description.clone(),
                    format!("Documents: {}", d.document_value),
                    format!("Research: {}", d.research_value),
                ],
                recommendation: d.recommendation.clone(),
            })
            .collect();

        if let Some(status) = view.registry.as_ref().and_then(|r| r.status.as_deref()) {
            let standing = registry_standing(status);
            if standing != RegistryStanding::Good {
                flags.push(RedFlag {
                    flag_type: "registry_status".to_string(),
                    severity: if standing == RegistryStanding::Terminal {
                        RedFlagSeverity::Critical
                    } else {
                        RedFlagSeverity::Warning
                    },
                    title: format!("Registry status is '{status}'"),
                    evidence: vec![format!(
                        "Corporate registry reports status '{status}', not active or in good standing."
                    )],
                    recommendation: "Obtain a current certificate of good standing before proceeding."
                        .to_string(),
                });
            }
        }

        if let Some(legal) = &view.legal {
            let evidence: Vec<String> = legal
                .litigation
                .iter()
                .chain(legal.regulatory_actions.iter())
                .cloned()
                .collect();
            if !evidence.is_empty() {
                flags.push(RedFlag {
                    flag_type: "litigation".to_string(),
                    severity: RedFlagSeverity::Warning,
                    title: "Litigation or regulatory actions found".to_string(),
                    evidence,
                    recommendation: "Have counsel review open matters and potential liabilities."
                        .to_string(),
                });
            }
        }

        let unverified = view.unverified_founders();
        if !unverified.is_empty() {
            flags.push(RedFlag {
                flag_type: "unverified_founders".to_string(),
                severity: RedFlagSeverity::Warning,
                title: "Founder roles could not be verified".to_string(),
                evidence: unverified,
                recommendation: "Run background checks and confirm founder roles with references."
                    .to_string(),
            });
        }

        flags
    }

    fn assess_confidence(
        &self,
        research: &AggregateResult,
        view: &ResearchView,
        document_reliability: u8,
    ) -> ConfidenceAssessment {
        let total = research.sections.len();
        let completion = if total == 0 {
            0.0
        } else {
            research.completed_count as f64 / total as f64
        };

        let mut factors = vec![ConfidenceFactor::new(
            "evidence_availability",
            EVIDENCE_AVAILABILITY_WEIGHT,
            completion * 100.0,
        )];

        if let Some(news) = &view.news {
            factors.push(ConfidenceFactor::new(
                "media_coverage",
                MEDIA_COVERAGE_WEIGHT,
                news.coverage_volume() as f64 * POINTS_PER_ARTICLE,
            ));
        }

        if let Some(registry) = &view.registry {
            let score = match registry.status.as_deref().map(registry_standing) {
                Some(RegistryStanding::Good) => Some(100.0),
                Some(RegistryStanding::Adverse) => Some(30.0),
                Some(RegistryStanding::Terminal) => Some(0.0),
                None => registry.registration_number.as_ref().map(|_| 60.0),
            };
            if let Some(score) = score {
                factors.push(ConfidenceFactor::new(
                    "registry_verification",
                    REGISTRY_VERIFICATION_WEIGHT,
                    score,
                ));
            }
        }

        if let Some(leadership) = &view.leadership
            && !leadership.founders.is_empty()
        {
            let credit: f64 = leadership
                .founders
                .iter()
                .map(|p| match p.verified {
                    Some(true) => 1.0,
                    Some(false) => 0.0,
                    None => 0.5,
                })
                .sum();
            factors.push(ConfidenceFactor::new(
                "founder_verification",
                FOUNDER_VERIFICATION_WEIGHT,
                credit / leadership.founders.len() as f64 * 100.0,
            ));
        }

        factors.push(ConfidenceFactor::new(
            "document_consistency",
            DOCUMENT_CONSISTENCY_WEIGHT,
            f64::from(document_reliability),
        ));

        ConfidenceAssessment {
            document_reliability,
            research_reliability: (research.overall_confidence * completion)
                .round()
                .clamp(0.0, 100.0) as u8,
            overall_confidence: weighted_confidence(&factors),
            factors,
        }
    }
}

impl Default for DiscrepancyAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

/// Weighted mean of factor scores, renormalized over the factors given.
pub fn weighted_confidence(factors: &[ConfidenceFactor]) -> u8 {
    let total_weight: f64 = factors.iter().map(|f| f.weight).sum();
    if total_weight <= 0.0 {
        return 0;
    }
    let weighted: f64 = factors.iter().map(|f| f.weight * f.score).sum();
    (weighted / total_weight).round().clamp(0.0, 100.0) as u8
}

/// Research evidence contradicting a high document score, by score name.
fn negative_evidence(score_key: &str, view: &ResearchView) -> Vec<String> {
    let key = score_key.to_lowercase();
    let mentions = |words: &[&str]| words.iter().any(|w| key.contains(w));
    let mut evidence = Vec::new();

    let news_negative = || {
        view.news
            .as_ref()
            .filter(|n| n.is_negative())
            .map(|n| {
                let mut lines = vec![format!(
                    "news sentiment: {}",
                    n.sentiment.as_deref().unwrap_or("negative")
                )];
                lines.extend(n.negative_signals.iter().take(3).cloned());
                lines
            })
            .unwrap_or_default()
    };
    let risk_elevated = || {
        view.risk
            .as_ref()
            .filter(|r| r.is_elevated())
            .map(|r| {
                let mut lines = vec![format!(
                    "risk level: {}",
                    r.risk_level.as_deref().unwrap_or("high")
                )];
                lines.extend(r.negative_signals.iter().take(3).cloned());
                lines
            })
            .unwrap_or_default()
    };

    if mentions(&["reputation", "sentiment", "media", "brand", "press"]) {
        evidence.extend(news_negative());
    }
    if mentions(&["risk", "legal", "compliance", "regulatory", "governance"]) {
        evidence.extend(risk_elevated());
        if let Some(legal) = &view.legal {
            evidence.extend(legal.litigation.iter().take(3).map(|l| format!("litigation: {l}")));
        }
    }
    if mentions(&["overall", "investment"]) {
        evidence.extend(risk_elevated());
        evidence.extend(news_negative());
    }
    if mentions(&["financial", "revenue", "profitab"])
        && let Some(profitability) = view.financials.as_ref().and_then(|f| f.profitability.as_deref())
    {
        let lower = profitability.to_lowercase();
        if ["loss", "unprofitable", "negative"].iter().any(|w| lower.contains(w)) {
            evidence.push(format!("profitability: {profitability}"));
        }
    }
    if mentions(&["team", "leadership", "founder"]) {
        evidence.extend(
            view.unverified_founders()
                .into_iter()
                .map(|name| format!("unverified founder: {name}")),
        );
    }

    evidence
        .into_iter()
        .collect::<IndexSet<_>>()
        .into_iter()
        .collect()
}

fn summarize(discrepancies: &[Discrepancy], red_flags: &[RedFlag], score: u8) -> String {
    let mut summary = if discrepancies.is_empty() {
        "No significant discrepancies were found between the documents and independent research."
            .to_string()
    } else {
        let count = |s: Severity| discrepancies.iter().filter(|d| d.severity == s).count();
        format!(
            "Found {} discrepancies ({} critical, {} high, {} medium, {} low) with a discrepancy score of {score}/100.",
            discrepancies.len(),
            count(Severity::Critical),
            count(Severity::High),
            count(Severity::Medium),
            count(Severity::Low),
        )
    };

    if !red_flags.is_empty() {
        let critical = red_flags
            .iter()
            .filter(|f| f.severity == RedFlagSeverity::Critical)
            .count();
        summary.push_str(&format!(
            " {} red flag(s) raised, {critical} critical.",
            red_flags.len()
        ));
    }
    summary
}
