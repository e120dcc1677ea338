//! Document-derived fact set.
//!
//! Facts arrive as an arbitrary JSON object, typically grouped by category:
//! `{"company_info": {"foundedYear": 2015}, "scores": {"overall": 78}}`.
//! Field lookup is key-shape insensitive (`foundedYear`, `founded_year` and
//! `Founded Year` are the same field).

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Category holding numeric quality scores.
pub const SCORES_CATEGORY: &str = "scores";

/// Base score used when the fact set carries no scores.
pub const DEFAULT_BASE_SCORE: f64 = 50.0;

/// A single document-derived claim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FactAssertion {
    pub category: String,
    pub field: String,
    pub value: Value,
}

impl FactAssertion {
    pub fn new(category: impl Into<String>, field: impl Into<String>, value: Value) -> Self {
        Self {
            category: category.into(),
            field: field.into(),
            value,
        }
    }
}

/// Read-only view over document-derived facts.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FactSet {
    facts: Map<String, Value>,
}

fn normalize_key(key: &str) -> String {
    key.chars()
        .filter(|c| c.is_alphanumeric())
        .flat_map(char::to_lowercase)
        .collect()
}

fn is_present(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::String(s) => !s.trim().is_empty(),
        _ => true,
    }
}

fn field_in<'a>(object: &'a Map<String, Value>, fields: &[&str]) -> Option<&'a Value> {
    let wanted: Vec<String> = fields.iter().map(|f| normalize_key(f)).collect();
    // honour alias order: earlier aliases win
    wanted.iter().find_map(|w| {
        object
            .iter()
            .find(|(k, v)| normalize_key(k) == *w && is_present(v))
            .map(|(_, v)| v)
    })
}

impl FactSet {
    pub fn new(facts: Map<String, Value>) -> Self {
        Self { facts }
    }

    /// Build from a JSON value. Non-objects yield an empty set.
    pub fn from_value(value: Value) -> Self {
        match value {
            Value::Object(facts) => Self { facts },
            _ => Self::default(),
        }
    }

    /// Build from individual assertions, grouping by category.
    pub fn from_assertions(assertions: impl IntoIterator<Item = FactAssertion>) -> Self {
        let mut facts = Map::new();
        for assertion in assertions {
            let category = facts
                .entry(assertion.category)
                .or_insert_with(|| Value::Object(Map::new()));
            if let Value::Object(fields) = category {
                fields.insert(assertion.field, assertion.value);
            }
        }
        Self { facts }
    }

    /// Flatten into assertions. Top-level scalars get an empty category.
    pub fn assertions(&self) -> Vec<FactAssertion> {
        let mut out = Vec::new();
        for (key, value) in &self.facts {
            match value {
                Value::Object(fields) => out.extend(
                    fields
                        .iter()
                        .map(|(f, v)| FactAssertion::new(key.clone(), f.clone(), v.clone())),
                ),
                other => out.push(FactAssertion::new("", key.clone(), other.clone())),
            }
        }
        out
    }

    pub fn is_empty(&self) -> bool {
        self.facts.is_empty()
    }

    /// Find a field by alias.
    ///
    /// Looks in the preferred categories first, then at the top level, then in
    /// any other category.
    pub fn find(&self, categories: &[&str], fields: &[&str]) -> Option<&Value> {
        let wanted: Vec<String> = categories.iter().map(|c| normalize_key(c)).collect();
        for category in &wanted {
            let found = self
                .facts
                .iter()
                .filter(|(k, _)| normalize_key(k) == *category)
                .filter_map(|(_, v)| v.as_object())
                .find_map(|object| field_in(object, fields));
            if found.is_some() {
                return found;
            }
        }

        if let Some(value) = field_in(&self.facts, fields)
            && !value.is_object()
        {
            return Some(value);
        }

        self.facts
            .values()
            .filter_map(|v| v.as_object())
            .find_map(|object| field_in(object, fields))
    }

    /// Numeric entries of the `scores` category.
    pub fn scores(&self) -> Vec<(String, f64)> {
        self.facts
            .iter()
            .find(|(k, _)| normalize_key(k) == SCORES_CATEGORY)
            .and_then(|(_, v)| v.as_object())
            .map(|scores| {
                scores
                    .iter()
                    .filter_map(|(k, v)| super::compare::amount_of(v).map(|n| (k.clone(), n)))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Base quality score: `scores.overall`, else the mean of all numeric
    /// scores, else [`DEFAULT_BASE_SCORE`]. Clamped to 0-100.
    pub fn base_score(&self) -> f64 {
        let scores = self.scores();
        let score = scores
            .iter()
            .find(|(k, _)| normalize_key(k) == "overall")
            .map(|(_, v)| *v)
            .or_else(|| {
                (!scores.is_empty())
                    .then(|| scores.iter().map(|(_, v)| v).sum::<f64>() / scores.len() as f64)
            })
            .unwrap_or(DEFAULT_BASE_SCORE);
        score.clamp(0.0, 100.0)
    }
}
