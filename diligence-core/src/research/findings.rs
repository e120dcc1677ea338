//! Structured findings: JSON extraction from synthesis output and typed,
//! lenient per-topic decoders.
//!
//! The orchestrator treats findings as an opaque `serde_json::Value`. Only
//! consumers (the discrepancy analyzer, the report) decode them, and a
//! decode failure means "no data" for that consumer.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};
use serde_json::{Map, Value};

/// Parse a JSON object out of model output.
///
/// Accepts bare JSON, JSON inside a markdown code fence, or JSON preceded and
/// followed by prose. Returns `None` unless an object is found.
pub fn extract_json_object(text: &str) -> Option<Map<String, Value>> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return None;
    }

    if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(trimmed) {
        return Some(map);
    }

    if let Some(fenced) = fenced_block(trimmed)
        && let Ok(Value::Object(map)) = serde_json::from_str::<Value>(fenced)
    {
        return Some(map);
    }

    let start = trimmed.find('{')?;
    let end = trimmed.rfind('}')?;
    if end <= start {
        return None;
    }
    match serde_json::from_str::<Value>(&trimmed[start..=end]) {
        Ok(Value::Object(map)) => Some(map),
        _ => None,
    }
}

fn fenced_block(text: &str) -> Option<&str> {
    let open = text.find("```")?;
    let after_open = &text[open + 3..];
    // skip an optional language tag on the fence line
    let body_start = after_open.find('\n').map(|i| i + 1).unwrap_or(0);
    let body = &after_open[body_start..];
    let close = body.find("```")?;
    Some(body[..close].trim())
}

/// Decode a section's findings into a typed view. Returns `None` when the
/// findings are not an object or do not fit the shape.
pub fn decode<T: DeserializeOwned>(findings: &Value) -> Option<T> {
    if !findings.is_object() {
        return None;
    }
    serde_json::from_value(findings.clone()).ok()
}

/// Render a JSON scalar as text. Objects and arrays are not scalars.
pub fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => {
            let s = s.trim();
            (!s.is_empty() && !s.eq_ignore_ascii_case("null") && !s.eq_ignore_ascii_case("unknown"))
                .then(|| s.to_string())
        }
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn lenient_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.as_ref().and_then(scalar_text))
}

/// Accept a list of strings, a list of objects (using their name/title/description),
/// or a single string.
fn lenient_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::Array(items)) => items.iter().filter_map(item_text).collect(),
        Some(other) => item_text(&other).into_iter().collect(),
        None => Vec::new(),
    })
}

fn item_text(value: &Value) -> Option<String> {
    match value {
        Value::Object(map) => ["name", "title", "description", "summary"]
            .iter()
            .find_map(|k| map.get(*k).and_then(scalar_text)),
        other => scalar_text(other),
    }
}

fn lenient_bool<'de, D>(deserializer: D) -> Result<Option<bool>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::Bool(b)) => Some(b),
        Some(Value::String(s)) => match s.trim().to_lowercase().as_str() {
            "true" | "yes" | "verified" | "confirmed" => Some(true),
            "false" | "no" | "unverified" | "unconfirmed" => Some(false),
            _ => None,
        },
        _ => None,
    })
}

/// `company_overview`
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct CompanyOverview {
    #[serde(deserialize_with = "lenient_string", alias = "name")]
    pub legal_name: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    pub description: Option<String>,
    #[serde(deserialize_with = "lenient_string", alias = "sector")]
    pub industry: Option<String>,
    #[serde(deserialize_with = "lenient_string", alias = "location")]
    pub headquarters: Option<String>,
    #[serde(
        deserialize_with = "lenient_string",
        alias = "founded",
        alias = "founding_date",
        alias = "founded_year",
        alias = "year_founded"
    )]
    pub founded_date: Option<String>,
    #[serde(deserialize_with = "lenient_string", alias = "employees", alias = "headcount")]
    pub employee_count: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    pub website: Option<String>,
}

/// `corporate_registry`
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct RegistryRecord {
    #[serde(deserialize_with = "lenient_string")]
    pub registered_name: Option<String>,
    #[serde(deserialize_with = "lenient_string", alias = "company_number")]
    pub registration_number: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    pub jurisdiction: Option<String>,
    #[serde(
        deserialize_with = "lenient_string",
        alias = "registry_status",
        alias = "company_status"
    )]
    pub status: Option<String>,
    #[serde(deserialize_with = "lenient_string", alias = "incorporated")]
    pub incorporation_date: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    pub registered_address: Option<String>,
    #[serde(deserialize_with = "lenient_list")]
    pub officers: Vec<String>,
}

/// `funding_history`
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct FundingHistory {
    #[serde(deserialize_with = "lenient_string", alias = "total_funding")]
    pub total_raised: Option<String>,
    #[serde(deserialize_with = "lenient_string", alias = "valuation")]
    pub last_valuation: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    pub last_round: Option<String>,
    pub rounds: Vec<FundingRound>,
    #[serde(deserialize_with = "lenient_list")]
    pub investors: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct FundingRound {
    #[serde(deserialize_with = "lenient_string")]
    pub date: Option<String>,
    #[serde(deserialize_with = "lenient_string", alias = "type", alias = "round")]
    pub round_type: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    pub amount: Option<String>,
    #[serde(deserialize_with = "lenient_list")]
    pub investors: Vec<String>,
}

/// `financials`
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct Financials {
    #[serde(deserialize_with = "lenient_string", alias = "annual_revenue", alias = "arr")]
    pub revenue: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    pub revenue_year: Option<String>,
    #[serde(deserialize_with = "lenient_string", alias = "growth_rate")]
    pub revenue_growth: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    pub profitability: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    pub burn_rate: Option<String>,
}

/// One person on the leadership team. Accepts a bare name or an object.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Person {
    pub name: String,
    pub role: Option<String>,
    pub verified: Option<bool>,
}

#[derive(Default, Deserialize)]
#[serde(default)]
struct PersonFields {
    #[serde(deserialize_with = "lenient_string", alias = "full_name")]
    name: Option<String>,
    #[serde(deserialize_with = "lenient_string", alias = "title", alias = "position")]
    role: Option<String>,
    #[serde(deserialize_with = "lenient_bool")]
    verified: Option<bool>,
}

impl<'de> Deserialize<'de> for Person {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        match value {
            Value::String(name) => Ok(Person {
                name: name.trim().to_string(),
                ..Default::default()
            }),
            Value::Object(_) => {
                let fields: PersonFields =
                    serde_json::from_value(value).map_err(serde::de::Error::custom)?;
                Ok(Person {
                    name: fields.name.unwrap_or_default(),
                    role: fields.role,
                    verified: fields.verified,
                })
            }
            _ => Err(serde::de::Error::custom("expected a name or a person object")),
        }
    }
}

fn people<'de, D>(deserializer: D) -> Result<Vec<Person>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    let items = match value {
        Some(Value::Array(items)) => items,
        Some(single @ (Value::String(_) | Value::Object(_))) => vec![single],
        _ => Vec::new(),
    };
    Ok(items
        .into_iter()
        .filter_map(|v| serde_json::from_value::<Person>(v).ok())
        .filter(|p| !p.name.is_empty())
        .collect())
}

/// `leadership_team`
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct LeadershipTeam {
    #[serde(deserialize_with = "people")]
    pub founders: Vec<Person>,
    #[serde(deserialize_with = "people", alias = "leadership")]
    pub executives: Vec<Person>,
    #[serde(deserialize_with = "people", alias = "board_members")]
    pub board: Vec<Person>,
}

impl LeadershipTeam {
    pub fn founder_names(&self) -> Vec<&str> {
        self.founders.iter().map(|p| p.name.as_str()).collect()
    }
}

/// `news_sentiment`
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct NewsCoverage {
    #[serde(deserialize_with = "lenient_string", alias = "overall_sentiment")]
    pub sentiment: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    pub article_count: Option<String>,
    #[serde(deserialize_with = "lenient_list")]
    pub positive_signals: Vec<String>,
    #[serde(deserialize_with = "lenient_list")]
    pub negative_signals: Vec<String>,
    #[serde(deserialize_with = "lenient_list", alias = "headlines")]
    pub recent_headlines: Vec<String>,
}

impl NewsCoverage {
    /// Article volume: the reported count, else the number of headlines listed.
    pub fn coverage_volume(&self) -> usize {
        self.article_count
            .as_deref()
            .and_then(|c| {
                c.chars()
                    .filter(|ch| ch.is_ascii_digit())
                    .collect::<String>()
                    .parse::<usize>()
                    .ok()
            })
            .unwrap_or(self.recent_headlines.len())
    }

    pub fn is_negative(&self) -> bool {
        self.sentiment
            .as_deref()
            .is_some_and(|s| s.to_lowercase().contains("negative"))
    }
}

/// `risk_assessment`
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct RiskProfile {
    #[serde(deserialize_with = "lenient_string", alias = "overall_risk")]
    pub risk_level: Option<String>,
    #[serde(deserialize_with = "lenient_list", alias = "risks")]
    pub key_risks: Vec<String>,
    #[serde(deserialize_with = "lenient_list", alias = "red_flags")]
    pub negative_signals: Vec<String>,
    #[serde(deserialize_with = "lenient_list")]
    pub mitigations: Vec<String>,
}

impl RiskProfile {
    pub fn is_elevated(&self) -> bool {
        self.risk_level.as_deref().is_some_and(|level| {
            let level = level.to_lowercase();
            level.contains("high") || level.contains("critical") || level.contains("severe")
        })
    }
}

/// `legal_regulatory`
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct LegalStanding {
    #[serde(deserialize_with = "lenient_list", alias = "lawsuits")]
    pub litigation: Vec<String>,
    #[serde(deserialize_with = "lenient_list", alias = "regulatory_issues")]
    pub regulatory_actions: Vec<String>,
    #[serde(deserialize_with = "lenient_string")]
    pub compliance_status: Option<String>,
}
