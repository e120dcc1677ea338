//! OpenAI-compatible research backend.
//!
//! Works against any endpoint that follows the OpenAI chat completions API,
//! including search-grounded services (Perplexity and similar) that attach
//! citations to the completion.

use super::{BackendRequest, BackendResponse, Citation, RequestKind, ResearchBackend, TokenUsage};
use crate::config::BackendConfig;
use crate::error::{BackendError, ConfigError};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{Value, json};
use std::collections::HashSet;
use std::time::Duration;
use tracing::debug;

/// Default retry hint when a 429 carries no parseable delay.
const DEFAULT_RETRY_AFTER_SECS: u64 = 5;

/// OpenAI-compatible research backend.
pub struct OpenAiCompatibleBackend {
    name: String,
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
    web_search: bool,
}

impl OpenAiCompatibleBackend {
    /// Create a backend from configuration.
    ///
    /// Reads the API key from the environment variable named in
    /// `config.api_key_env`. Local endpoints (localhost) do not need a key.
    pub fn new(config: &BackendConfig) -> Result<Self, ConfigError> {
        let is_local = config
            .base_url
            .as_ref()
            .map(|u| u.contains("localhost") || u.contains("127.0.0.1"))
            .unwrap_or(false);

        let api_key = std::env::var(&config.api_key_env)
            .ok()
            .filter(|k| !k.trim().is_empty())
            .or_else(|| {
                if is_local {
                    debug!("No API key set for local backend; using dummy bearer token");
                    Some("local".to_string())
                } else {
                    None
                }
            })
            .ok_or_else(|| ConfigError::EnvVarMissing {
                var: config.api_key_env.clone(),
            })?;

        Self::new_with_key(config, api_key)
    }

    /// Create a backend with an explicitly provided API key.
    pub fn new_with_key(config: &BackendConfig, api_key: String) -> Result<Self, ConfigError> {
        let base_url = config
            .base_url
            .clone()
            .unwrap_or_else(|| "https://api.openai.com/v1".to_string());

        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs.max(1)))
            .build()
            .map_err(|e| ConfigError::Invalid {
                message: format!("failed to build HTTP client for '{}': {e}", config.name),
            })?;

        Ok(Self {
            name: config.name.clone(),
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            model: config.model.clone(),
            web_search: config.web_search,
        })
    }

    fn request_body(&self, request: &BackendRequest) -> Value {
        let mut messages = Vec::with_capacity(2);
        if let Some(system) = &request.system {
            messages.push(json!({ "role": "system", "content": system }));
        }
        messages.push(json!({ "role": "user", "content": request.prompt }));

        let mut body = json!({
            "model": self.model,
            "messages": messages,
            "temperature": request.temperature,
            "stream": false,
        });

        if let Some(max_tokens) = request.max_tokens {
            body["max_tokens"] = json!(max_tokens);
        }
        if request.kind == RequestKind::Synthesis {
            body["response_format"] = json!({ "type": "json_object" });
        }
        if self.web_search && request.web_search {
            body["web_search_options"] = json!({ "search_context_size": "medium" });
        }

        body
    }

    /// Map an HTTP error status to a classified backend error.
    fn map_http_error(&self, status: reqwest::StatusCode, body: &str) -> BackendError {
        let message = error_message(body);
        match status.as_u16() {
            401 | 403 => {
                debug!(backend = %self.name, body = %body, "Authentication failed");
                BackendError::AuthFailed {
                    backend: self.name.clone(),
                }
            }
            429 => BackendError::RateLimited {
                retry_after_secs: parse_retry_after(&message).unwrap_or(DEFAULT_RETRY_AFTER_SECS),
            },
            503 => BackendError::Unavailable { message },
            504 => BackendError::GatewayTimeout { message },
            529 => BackendError::Overloaded { message },
            code => BackendError::Rejected {
                status: code,
                message,
            },
        }
    }

    fn map_transport_error(e: reqwest::Error) -> BackendError {
        if e.is_timeout() {
            BackendError::GatewayTimeout {
                message: format!("request timed out: {e}"),
            }
        } else if e.is_connect() {
            BackendError::Unavailable {
                message: format!("connection failed: {e}"),
            }
        } else {
            BackendError::Request {
                message: format!("Request failed: {e}"),
            }
        }
    }

    fn parse_response(body: &Value, model: &str) -> Result<BackendResponse, BackendError> {
        let message = body
            .get("choices")
            .and_then(|c| c.get(0))
            .and_then(|c| c.get("message"))
            .ok_or_else(|| BackendError::ResponseParse {
                message: "No message in response".to_string(),
            })?;

        let text = message
            .get("content")
            .and_then(|c| c.as_str())
            .unwrap_or_default()
            .to_string();

        let usage = body
            .get("usage")
            .map(|u| TokenUsage {
                input_tokens: u.get("prompt_tokens").and_then(|v| v.as_u64()).unwrap_or(0)
                    as usize,
                output_tokens: u
                    .get("completion_tokens")
                    .and_then(|v| v.as_u64())
                    .unwrap_or(0) as usize,
            })
            .unwrap_or_default();

        Ok(BackendResponse {
            text,
            citations: extract_citations(body, message),
            model: body
                .get("model")
                .and_then(|m| m.as_str())
                .unwrap_or(model)
                .to_string(),
            usage,
        })
    }
}

/// Pull the human-readable message out of an error body, falling back to the raw body.
fn error_message(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| {
            v.get("error")?
                .get("message")?
                .as_str()
                .map(|s| s.to_string())
        })
        .unwrap_or_else(|| body.chars().take(500).collect())
}

/// Extract a delay from messages like "Rate limit reached ... try again in 12s".
fn parse_retry_after(message: &str) -> Option<u64> {
    let tail = message.rsplit("in ").next()?;
    let digits: String = tail
        .trim_start()
        .chars()
        .take_while(|c| c.is_ascii_digit())
        .collect();
    digits.parse::<u64>().ok()
}

/// Collect citations from the shapes search-grounded backends return.
///
/// Handles a top-level `citations` array of URLs, a `search_results` array of
/// objects, and `url_citation` annotations on the message. Duplicate URLs are
/// dropped, keeping the first.
fn extract_citations(body: &Value, message: &Value) -> Vec<Citation> {
    let mut seen = HashSet::new();
    let mut citations = Vec::new();
    let mut push = |citation: Citation| {
        if !citation.url.is_empty() && seen.insert(citation.url.clone()) {
            citations.push(citation);
        }
    };

    if let Some(results) = body.get("search_results").and_then(|v| v.as_array()) {
        for result in results {
            if let Some(url) = result.get("url").and_then(|u| u.as_str()) {
                let mut citation = Citation::new(url);
                if let Some(title) = result.get("title").and_then(|t| t.as_str()) {
                    citation = citation.with_title(title);
                }
                push(citation);
            }
        }
    }

    if let Some(urls) = body.get("citations").and_then(|v| v.as_array()) {
        for url in urls.iter().filter_map(|u| u.as_str()) {
            push(Citation::new(url));
        }
    }

    if let Some(annotations) = message.get("annotations").and_then(|v| v.as_array()) {
        for annotation in annotations {
            if let Some(cite) = annotation.get("url_citation")
                && let Some(url) = cite.get("url").and_then(|u| u.as_str())
            {
                let mut citation = Citation::new(url);
                if let Some(title) = cite.get("title").and_then(|t| t.as_str()) {
                    citation = citation.with_title(title);
                }
                push(citation);
            }
        }
    }

    citations
}

#[async_trait]
impl ResearchBackend for OpenAiCompatibleBackend {
    fn name(&self) -> &str {
        &self.name
    }

    async fn invoke(&self, request: BackendRequest) -> Result<BackendResponse, BackendError> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = self.request_body(&request);

        debug!(
            backend = %self.name,
            url = %url,
            model = %self.model,
            kind = ?request.kind,
            "Sending research request"
        );

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(Self::map_transport_error)?;

        let status = response.status();
        let response_body = response.text().await.map_err(Self::map_transport_error)?;

        if !status.is_success() {
            return Err(self.map_http_error(status, &response_body));
        }

        let json: Value =
            serde_json::from_str(&response_body).map_err(|e| BackendError::ResponseParse {
                message: format!("Invalid JSON: {e}"),
            })?;

        Self::parse_response(&json, &self.model)
    }
}
