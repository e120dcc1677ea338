//! Research backend abstraction.
//!
//! A backend performs one external research request: a web-grounded evidence
//! query, a keyword search, or a structured synthesis. Backends are strategies
//! behind one trait; the resilient invocation layer iterates an ordered list
//! of them.
//!
//! Use `create_backends()` to instantiate backends from configuration.

pub mod openai_compat;

use crate::config::{BackendConfig, BackendKind};
use crate::error::{BackendError, ConfigError};
use crate::research::sources::RelevanceTier;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

pub use openai_compat::OpenAiCompatibleBackend;

/// What a request is for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestKind {
    /// Open-ended, web-grounded evidence gathering.
    Evidence,
    /// A directed keyword search.
    Search,
    /// Structured synthesis of previously gathered evidence.
    Synthesis,
}

/// A single request to a research backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendRequest {
    pub kind: RequestKind,
    /// Optional system instruction.
    pub system: Option<String>,
    pub prompt: String,
    pub max_tokens: Option<usize>,
    pub temperature: f32,
    /// Ask the backend to ground its answer in live web results.
    pub web_search: bool,
}

impl BackendRequest {
    pub fn new(kind: RequestKind, prompt: impl Into<String>) -> Self {
        Self {
            kind,
            system: None,
            prompt: prompt.into(),
            max_tokens: None,
            temperature: 0.2,
            web_search: matches!(kind, RequestKind::Evidence | RequestKind::Search),
        }
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: usize) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }
}

/// A citable reference returned alongside a backend response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Citation {
    pub url: String,
    #[serde(default)]
    pub title: Option<String>,
    /// Backend-assigned relevance, when the backend ranks its results.
    #[serde(default)]
    pub relevance: Option<RelevanceTier>,
}

impl Citation {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            title: None,
            relevance: None,
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_relevance(mut self, relevance: RelevanceTier) -> Self {
        self.relevance = Some(relevance);
        self
    }
}

/// Token usage reported by a backend.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input_tokens: usize,
    pub output_tokens: usize,
}

/// The response to a backend request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BackendResponse {
    pub text: String,
    pub citations: Vec<Citation>,
    pub model: String,
    pub usage: TokenUsage,
}

impl BackendResponse {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Default::default()
        }
    }

    pub fn with_citations(mut self, citations: Vec<Citation>) -> Self {
        self.citations = citations;
        self
    }
}

/// Trait for research backends.
#[async_trait]
pub trait ResearchBackend: Send + Sync {
    /// Name used in logs and errors.
    fn name(&self) -> &str;

    /// Perform one request. Implementations must not retry internally.
    async fn invoke(&self, request: BackendRequest) -> Result<BackendResponse, BackendError>;
}

/// A scripted backend for tests and dry runs.
///
/// Queued outcomes are returned in FIFO order. Once the queue is empty, a
/// per-kind outcome (if set for the request's kind) or the fallback outcome is
/// returned for every further call; otherwise a default text response is produced.
pub struct MockBackend {
    name: String,
    outcomes: std::sync::Mutex<VecDeque<Result<BackendResponse, BackendError>>>,
    by_kind: HashMap<RequestKind, Result<BackendResponse, BackendError>>,
    fallback: Option<Result<BackendResponse, BackendError>>,
    calls: AtomicUsize,
    requests: std::sync::Mutex<Vec<BackendRequest>>,
}

impl MockBackend {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            outcomes: std::sync::Mutex::new(VecDeque::new()),
            by_kind: HashMap::new(),
            fallback: None,
            calls: AtomicUsize::new(0),
            requests: std::sync::Mutex::new(Vec::new()),
        }
    }

    /// A backend that answers every call with the given text.
    pub fn with_response(name: impl Into<String>, text: &str) -> Self {
        Self::new(name).always(Ok(BackendResponse::text(text)))
    }

    /// A backend that fails every call with the given error.
    pub fn failing(name: impl Into<String>, error: BackendError) -> Self {
        Self::new(name).always(Err(error))
    }

    /// Set the outcome returned once the queue is drained.
    pub fn always(mut self, outcome: Result<BackendResponse, BackendError>) -> Self {
        self.fallback = Some(outcome);
        self
    }

    /// Set the outcome returned for every request of `kind` once the queue is drained.
    pub fn respond_to(
        mut self,
        kind: RequestKind,
        outcome: Result<BackendResponse, BackendError>,
    ) -> Self {
        self.by_kind.insert(kind, outcome);
        self
    }

    /// Queue an outcome to be returned by the next call.
    pub fn queue(&self, outcome: Result<BackendResponse, BackendError>) {
        if let Ok(mut outcomes) = self.outcomes.lock() {
            outcomes.push_back(outcome);
        }
    }

    /// Number of calls received so far.
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Requests received so far, in call order.
    pub fn requests(&self) -> Vec<BackendRequest> {
        self.requests
            .lock()
            .map(|r| r.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl ResearchBackend for MockBackend {
    fn name(&self) -> &str {
        &self.name
    }

    async fn invoke(&self, request: BackendRequest) -> Result<BackendResponse, BackendError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let kind = request.kind;
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(request);
        }

        let queued = self
            .outcomes
            .lock()
            .ok()
            .and_then(|mut outcomes| outcomes.pop_front());

        match queued {
            Some(outcome) => outcome,
            None => match self.by_kind.get(&kind).or(self.fallback.as_ref()) {
                Some(outcome) => outcome.clone(),
                None => Ok(BackendResponse::text("No queued mock response available.")),
            },
        }
    }
}

/// Create a single backend from its configuration.
fn create_single_backend(config: &BackendConfig) -> Result<Arc<dyn ResearchBackend>, ConfigError> {
    match config.kind {
        BackendKind::OpenaiCompatible => Ok(Arc::new(OpenAiCompatibleBackend::new(config)?)),
    }
}

/// Create the ordered backend list from configuration.
///
/// Backends that fail to initialize (typically a missing API key) are skipped
/// with a warning. Returns an error only if no backend could be created.
pub fn create_backends(
    configs: &[BackendConfig],
) -> Result<Vec<Arc<dyn ResearchBackend>>, ConfigError> {
    let mut backends = Vec::with_capacity(configs.len());
    let mut first_error = None;

    for config in configs {
        match create_single_backend(config) {
            Ok(backend) => backends.push(backend),
            Err(e) => {
                tracing::warn!(
                    backend = %config.name,
                    kind = %config.kind,
                    error = %e,
                    "Skipping backend that failed to initialize"
                );
                first_error.get_or_insert(e);
            }
        }
    }

    if backends.is_empty() {
        return Err(first_error.unwrap_or_else(|| ConfigError::Invalid {
            message: "no backends configured".to_string(),
        }));
    }

    Ok(backends)
}
