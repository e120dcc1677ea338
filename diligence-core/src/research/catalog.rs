//! Topic catalog: the fixed set of research sections run for every entity.

use crate::error::InputError;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Placeholder substituted with the entity name in every template.
const ENTITY_PLACEHOLDER: &str = "{entity}";

/// One research section: what to ask, and what shape to synthesize.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResearchTopic {
    pub id: String,
    pub title: String,
    /// Web-grounded evidence query.
    pub evidence_query: String,
    /// Additional directed keyword searches.
    #[serde(default)]
    pub search_queries: Vec<String>,
    /// Structured-output instruction naming the JSON fields to return.
    pub synthesis_instruction: String,
}

impl ResearchTopic {
    pub fn new(
        id: impl Into<String>,
        title: impl Into<String>,
        evidence_query: impl Into<String>,
        synthesis_instruction: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            evidence_query: evidence_query.into(),
            search_queries: Vec::new(),
            synthesis_instruction: synthesis_instruction.into(),
        }
    }

    pub fn with_search(mut self, query: impl Into<String>) -> Self {
        self.search_queries.push(query.into());
        self
    }

    pub fn evidence_prompt(&self, entity: &str) -> String {
        self.evidence_query.replace(ENTITY_PLACEHOLDER, entity)
    }

    pub fn search_prompts(&self, entity: &str) -> Vec<String> {
        self.search_queries
            .iter()
            .map(|q| q.replace(ENTITY_PLACEHOLDER, entity))
            .collect()
    }

    /// Build the synthesis prompt. Empty evidence yields a prompt that asks
    /// the backend to work from what it already knows.
    pub fn synthesis_prompt(&self, entity: &str, evidence: &str) -> String {
        let instruction = self.synthesis_instruction.replace(ENTITY_PLACEHOLDER, entity);
        let mut prompt = format!("Research topic: {} for {entity}\n\n", self.title);
        if evidence.trim().is_empty() {
            prompt.push_str(
                "No external evidence could be gathered. Use only well-established \
                 public knowledge and leave fields null when unsure.\n\n",
            );
        } else {
            prompt.push_str("## Evidence\n\n");
            prompt.push_str(evidence.trim());
            prompt.push_str("\n\n");
        }
        prompt.push_str("## Instructions\n\n");
        prompt.push_str(&instruction);
        prompt.push_str("\n\nRespond with a single JSON object and nothing else.");
        prompt
    }
}

/// An ordered, validated set of topics. Order drives output order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopicCatalog {
    topics: Vec<ResearchTopic>,
}

impl TopicCatalog {
    /// Create a catalog, rejecting empty catalogs and empty or duplicate ids.
    pub fn new(topics: Vec<ResearchTopic>) -> Result<Self, InputError> {
        let catalog = Self { topics };
        catalog.validate()?;
        Ok(catalog)
    }

    pub fn validate(&self) -> Result<(), InputError> {
        if self.topics.is_empty() {
            return Err(InputError::EmptyCatalog);
        }
        let mut seen = HashSet::new();
        for topic in &self.topics {
            if topic.id.trim().is_empty() {
                return Err(InputError::EmptyTopicId);
            }
            if !seen.insert(topic.id.as_str()) {
                return Err(InputError::DuplicateTopic {
                    id: topic.id.clone(),
                });
            }
        }
        Ok(())
    }

    /// Narrow this catalog to `ids`, keeping catalog order.
    pub fn filtered<S: AsRef<str>>(&self, ids: &[S]) -> Result<Self, InputError> {
        for id in ids {
            if self.get(id.as_ref()).is_none() {
                return Err(InputError::UnknownTopic {
                    id: id.as_ref().to_string(),
                });
            }
        }
        let wanted: HashSet<&str> = ids.iter().map(|s| s.as_ref()).collect();
        Self::new(
            self.topics
                .iter()
                .filter(|t| wanted.contains(t.id.as_str()))
                .cloned()
                .collect(),
        )
    }

    pub fn get(&self, id: &str) -> Option<&ResearchTopic> {
        self.topics.iter().find(|t| t.id == id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ResearchTopic> {
        self.topics.iter()
    }

    pub fn ids(&self) -> Vec<&str> {
        self.topics.iter().map(|t| t.id.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.topics.len()
    }

    pub fn is_empty(&self) -> bool {
        self.topics.is_empty()
    }

    /// The built-in due-diligence catalog.
    pub fn builtin() -> Self {
        Self {
            topics: builtin_topics(),
        }
    }
}

impl Default for TopicCatalog {
    fn default() -> Self {
        Self::builtin()
    }
}

fn builtin_topics() -> Vec<ResearchTopic> {
    vec![
        ResearchTopic::new(
            "company_overview",
            "Company Overview",
            "Give a factual overview of the company {entity}: legal name, what it does, \
             industry, headquarters location, founding date, and approximate headcount. \
             Cite your sources.",
            "Return JSON with fields: legal_name, description, industry, headquarters, \
             founded_date (ISO date or year), employee_count, website, business_model.",
        )
        .with_search("{entity} company profile founded headquarters"),
        ResearchTopic::new(
            "corporate_registry",
            "Corporate Registry",
            "Find official company registry records for {entity} (e.g. Companies House, \
             state Secretary of State filings, OpenCorporates): registered name, number, \
             jurisdiction, status, incorporation date and officers.",
            "Return JSON with fields: registered_name, registration_number, jurisdiction, \
             status, incorporation_date, registered_address, officers (list of names).",
        )
        .with_search("{entity} company registration number incorporation"),
        ResearchTopic::new(
            "funding_history",
            "Funding History",
            "Summarize every known funding round for {entity}: date, round type, amount, \
             lead and participating investors, and the latest reported valuation.",
            "Return JSON with fields: total_raised, last_valuation, last_round, \
             rounds (list of {date, round_type, amount, investors}), investors.",
        )
        .with_search("{entity} raises funding round Series")
        .with_search("{entity} valuation investors"),
        ResearchTopic::new(
            "financials",
            "Financials",
            "What is publicly known about the financial performance of {entity}: revenue, \
             growth, profitability, margins and burn rate?",
            "Return JSON with fields: revenue, revenue_year, revenue_growth, profitability, \
             gross_margin, burn_rate, notes.",
        )
        .with_search("{entity} annual revenue ARR"),
        ResearchTopic::new(
            "leadership_team",
            "Leadership Team",
            "Who founded {entity} and who leads it today? Include founders, C-level \
             executives and board members with their backgrounds.",
            "Return JSON with fields: founders, executives, board. Each entry is \
             {name, role, background, verified} where verified is true only when an \
             independent source confirms the person's role.",
        )
        .with_search("{entity} founder CEO"),
        ResearchTopic::new(
            "products_technology",
            "Products & Technology",
            "Describe the products, services and core technology of {entity}.",
            "Return JSON with fields: products (list), technology_stack (list), \
             differentiators (list), stage.",
        ),
        ResearchTopic::new(
            "market_analysis",
            "Market Analysis",
            "Describe the market {entity} operates in: size, growth, segments and trends.",
            "Return JSON with fields: market_size, growth_rate, segments (list), \
             trends (list), position.",
        ),
        ResearchTopic::new(
            "competitors",
            "Competitive Landscape",
            "Who are the main competitors of {entity} and how does it compare?",
            "Return JSON with fields: competitors (list of {name, description}), \
             advantages (list), disadvantages (list).",
        )
        .with_search("{entity} competitors alternatives"),
        ResearchTopic::new(
            "customers_traction",
            "Customers & Traction",
            "What evidence exists of customers, partnerships and commercial traction \
             for {entity}?",
            "Return JSON with fields: notable_customers (list), partnerships (list), \
             traction_metrics (list), customer_count.",
        ),
        ResearchTopic::new(
            "legal_regulatory",
            "Legal & Regulatory",
            "Find any lawsuits, regulatory actions, fines, sanctions or compliance issues \
             involving {entity}.",
            "Return JSON with fields: litigation (list), regulatory_actions (list), \
             compliance_status, licenses (list).",
        )
        .with_search("{entity} lawsuit")
        .with_search("{entity} regulator fine investigation"),
        ResearchTopic::new(
            "intellectual_property",
            "Intellectual Property",
            "What patents, trademarks or other intellectual property does {entity} hold?",
            "Return JSON with fields: patents (list), trademarks (list), ip_notes.",
        ),
        ResearchTopic::new(
            "news_sentiment",
            "News & Sentiment",
            "Summarize recent press coverage of {entity} and its overall tone.",
            "Return JSON with fields: sentiment (positive, neutral, negative or mixed), \
             article_count, positive_signals (list), negative_signals (list), \
             recent_headlines (list).",
        )
        .with_search("{entity} news"),
        ResearchTopic::new(
            "risk_assessment",
            "Risk Assessment",
            "Assess the key business, financial, legal and reputational risks of {entity}.",
            "Return JSON with fields: risk_level (low, medium, high or critical), \
             key_risks (list), negative_signals (list), mitigations (list).",
        ),
    ]
}
