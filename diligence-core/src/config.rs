//! Configuration system for Diligence.
//!
//! Uses `figment` for layered configuration: defaults -> config file -> environment -> overrides.
//! Configuration is loaded from `~/.config/diligence/config.toml` and/or
//! `.diligence/config.toml` in the workspace directory.

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::error::ConfigError;
use crate::research::catalog::TopicCatalog;

/// Top-level configuration for a Diligence run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DiligenceConfig {
    /// Research backends, most preferred first.
    pub backends: Vec<BackendConfig>,
    pub resilience: ResilienceConfig,
    pub orchestrator: OrchestratorConfig,
    pub research: ResearchConfig,
}

impl Default for DiligenceConfig {
    fn default() -> Self {
        Self {
            backends: vec![BackendConfig::default()],
            resilience: ResilienceConfig::default(),
            orchestrator: OrchestratorConfig::default(),
            research: ResearchConfig::default(),
        }
    }
}

/// Kind of wire protocol a backend speaks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    /// Any endpoint following the OpenAI chat completions format.
    #[default]
    OpenaiCompatible,
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BackendKind::OpenaiCompatible => write!(f, "openai_compatible"),
        }
    }
}

/// Configuration for one research backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    /// Display name used in logs and errors.
    pub name: String,
    pub kind: BackendKind,
    /// Model identifier sent with each request.
    pub model: String,
    /// Environment variable name containing the API key.
    pub api_key_env: String,
    /// Optional base URL override for the API endpoint.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    /// Per-request HTTP timeout.
    pub request_timeout_secs: u64,
    /// Whether the backend performs web-grounded search on evidence requests.
    pub web_search: bool,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            name: "primary".to_string(),
            kind: BackendKind::OpenaiCompatible,
            model: "gpt-4o".to_string(),
            api_key_env: "OPENAI_API_KEY".to_string(),
            base_url: None,
            request_timeout_secs: 30,
            web_search: false,
        }
    }
}

/// Retry, backoff, and concurrency settings for the resilient invocation layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ResilienceConfig {
    /// Attempts per backend, including the first call.
    pub max_attempts: u32,
    /// Delay before the first retry.
    pub base_delay_ms: u64,
    pub backoff_multiplier: f64,
    /// Upper bound for any single retry delay.
    pub max_delay_ms: u64,
    /// Maximum simultaneous backend calls across all tasks (0 = unlimited).
    pub max_concurrent_calls: usize,
}

impl Default for ResilienceConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 1000,
            backoff_multiplier: 2.0,
            max_delay_ms: 10_000,
            max_concurrent_calls: 0,
        }
    }
}

impl ResilienceConfig {
    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }

    /// Worst-case wall time of one resilient call across `backends`.
    ///
    /// Each backend may use every attempt up to its request timeout, with a
    /// capped backoff sleep between attempts. Saturates instead of overflowing.
    pub fn worst_case_call_budget(&self, backends: &[BackendConfig]) -> Duration {
        let attempts = self.max_attempts.max(1);
        let sleeps = self.max_delay().saturating_mul(attempts - 1);
        backends.iter().fold(Duration::ZERO, |total, backend| {
            let requests = Duration::from_secs(backend.request_timeout_secs).saturating_mul(attempts);
            total.saturating_add(requests).saturating_add(sleeps)
        })
    }
}

/// Timeouts for the parallel section orchestrator.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    /// Upper bound on one section's total research time.
    pub task_timeout_secs: u64,
    /// Upper bound on the whole fan-out; overrides task timeouts.
    pub global_timeout_secs: u64,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            task_timeout_secs: 300,
            global_timeout_secs: 600,
        }
    }
}

impl OrchestratorConfig {
    pub fn task_timeout(&self) -> Duration {
        Duration::from_secs(self.task_timeout_secs)
    }

    pub fn global_timeout(&self) -> Duration {
        Duration::from_secs(self.global_timeout_secs)
    }
}

/// Request shaping for section research.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ResearchConfig {
    pub evidence_max_tokens: usize,
    pub synthesis_max_tokens: usize,
    pub temperature: f32,
    /// Restrict the built-in catalog to these topic ids.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub topics: Option<Vec<String>>,
}

impl Default for ResearchConfig {
    fn default() -> Self {
        Self {
            evidence_max_tokens: 2048,
            synthesis_max_tokens: 2048,
            temperature: 0.2,
            topics: None,
        }
    }
}

impl DiligenceConfig {
    /// Validate this config and return any warnings.
    ///
    /// Returns an empty Vec if the config is valid. Problems are reported as
    /// human-readable messages rather than errors.
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        if self.backends.is_empty() {
            warnings.push("no backends configured; every section will fail".to_string());
        }
        if self.resilience.max_attempts == 0 {
            warnings.push("resilience.max_attempts is 0; treated as 1".to_string());
        }
        if self.resilience.base_delay_ms > self.resilience.max_delay_ms {
            warnings.push(format!(
                "resilience.base_delay_ms ({}) exceeds max_delay_ms ({})",
                self.resilience.base_delay_ms, self.resilience.max_delay_ms
            ));
        }
        if self.orchestrator.global_timeout_secs < self.orchestrator.task_timeout_secs {
            warnings.push(format!(
                "orchestrator.global_timeout_secs ({}) is below task_timeout_secs ({}); \
                 the global timeout wins",
                self.orchestrator.global_timeout_secs, self.orchestrator.task_timeout_secs
            ));
        }

        let budget = self.worst_case_section_budget();
        if budget > self.orchestrator.task_timeout() {
            warnings.push(format!(
                "worst-case section budget ({}s) exceeds orchestrator.task_timeout_secs ({}s)",
                budget.as_secs(),
                self.orchestrator.task_timeout_secs
            ));
        }

        if let Some(ref topics) = self.research.topics {
            let catalog = TopicCatalog::builtin();
            for id in topics {
                if catalog.get(id).is_none() {
                    warnings.push(format!("research.topics contains unknown topic '{id}'"));
                }
            }
        }

        warnings
    }

    /// Worst-case wall time of one section: two resilient calls, one per phase.
    pub fn worst_case_section_budget(&self) -> Duration {
        self.resilience
            .worst_case_call_budget(&self.backends)
            .saturating_mul(2)
    }
}

/// Load configuration from layered sources.
///
/// Priority (highest to lowest):
/// 1. Explicit overrides (passed as argument)
/// 2. Environment variables (prefixed with `DILIGENCE_`)
/// 3. Workspace-local config (`.diligence/config.toml`)
/// 4. User config (`~/.config/diligence/config.toml`)
/// 5. Built-in defaults
pub fn load_config(
    workspace: Option<&Path>,
    overrides: Option<&DiligenceConfig>,
) -> Result<DiligenceConfig, ConfigError> {
    let mut figment = Figment::from(Serialized::defaults(DiligenceConfig::default()));

    if let Some(config_dir) = directories::ProjectDirs::from("dev", "diligence", "diligence") {
        let user_config = config_dir.config_dir().join("config.toml");
        if user_config.exists() {
            figment = figment.merge(Toml::file(&user_config));
        }
    }

    if let Some(ws) = workspace {
        let ws_config = ws.join(".diligence").join("config.toml");
        if ws_config.exists() {
            figment = figment.merge(Toml::file(&ws_config));
        }
    }

    // DILIGENCE_RESILIENCE__MAX_ATTEMPTS, DILIGENCE_ORCHESTRATOR__TASK_TIMEOUT_SECS, etc.
    figment = figment.merge(Env::prefixed("DILIGENCE_").split("__"));

    if let Some(overrides) = overrides {
        figment = figment.merge(Serialized::defaults(overrides));
    }

    figment.extract().map_err(|e| ConfigError::Parse {
        message: e.to_string(),
    })
}

/// Check whether any Diligence configuration file exists (user-level or workspace-level).
pub fn config_exists(workspace: Option<&Path>) -> bool {
    if let Some(config_dir) = directories::ProjectDirs::from("dev", "diligence", "diligence")
        && config_dir.config_dir().join("config.toml").exists()
    {
        return true;
    }

    if let Some(ws) = workspace
        && ws.join(".diligence").join("config.toml").exists()
    {
        return true;
    }

    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = DiligenceConfig::default();
        assert_eq!(config.backends.len(), 1);
        assert_eq!(config.backends[0].kind, BackendKind::OpenaiCompatible);
        assert_eq!(config.resilience.max_attempts, 3);
        assert_eq!(config.resilience.base_delay_ms, 1000);
        assert_eq!(config.resilience.max_delay_ms, 10_000);
        assert!((config.resilience.backoff_multiplier - 2.0).abs() < f64::EPSILON);
        assert_eq!(config.resilience.max_concurrent_calls, 0);
    }

    #[test]
    fn test_default_config_has_no_warnings() {
        let config = DiligenceConfig::default();
        assert!(config.validate().is_empty(), "{:?}", config.validate());
    }

    #[test]
    fn test_config_serialization_roundtrip() {
        let config = DiligenceConfig::default();
        let toml_str = toml::to_string(&config).unwrap();
        let deserialized: DiligenceConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(deserialized.backends[0].model, config.backends[0].model);
        assert_eq!(
            deserialized.orchestrator.task_timeout_secs,
            config.orchestrator.task_timeout_secs
        );
    }

    #[test]
    fn test_partial_toml_fills_defaults() {
        let config: DiligenceConfig = toml::from_str(
            r#"
            [resilience]
            max_attempts = 5
            "#,
        )
        .unwrap();
        assert_eq!(config.resilience.max_attempts, 5);
        assert_eq!(config.resilience.max_delay_ms, 10_000);
        assert_eq!(config.backends.len(), 1);
    }

    #[test]
    fn test_worst_case_call_budget() {
        let resilience = ResilienceConfig::default();
        let backends = vec![BackendConfig::default(), BackendConfig::default()];
        // per backend: three 30s requests and two 10s sleeps
        assert_eq!(
            resilience.worst_case_call_budget(&backends),
            Duration::from_secs(220)
        );
        assert_eq!(resilience.worst_case_call_budget(&[]), Duration::ZERO);
    }

    #[test]
    fn test_section_budget_counts_both_phases() {
        let config = DiligenceConfig::default();
        assert_eq!(config.worst_case_section_budget(), Duration::from_secs(220));
        assert!(config.worst_case_section_budget() <= config.orchestrator.task_timeout());
    }

    #[test]
    fn test_budget_saturates_on_absurd_attempts() {
        let mut config = DiligenceConfig::default();
        config.resilience.max_attempts = u32::MAX;
        config.resilience.max_delay_ms = u64::MAX;
        config.backends[0].request_timeout_secs = u64::MAX;
        assert_eq!(config.worst_case_section_budget(), Duration::MAX);
        assert!(config.validate().iter().any(|w| w.contains("section budget")));
    }

    #[test]
    fn test_validate_counts_request_timeouts() {
        let mut config = DiligenceConfig::default();
        config.backends[0].request_timeout_secs = 120;
        // 2 phases x (3 x 120s + 2 x 10s) = 760s
        assert_eq!(config.worst_case_section_budget(), Duration::from_secs(760));
        assert!(config.validate().iter().any(|w| w.contains("section budget")));
    }

    #[test]
    fn test_validate_flags_global_below_task_timeout() {
        let mut config = DiligenceConfig::default();
        config.orchestrator.global_timeout_secs = 10;
        config.orchestrator.task_timeout_secs = 60;
        let warnings = config.validate();
        assert!(warnings.iter().any(|w| w.contains("global timeout wins")));
    }

    #[test]
    fn test_validate_flags_retry_budget_over_task_timeout() {
        let mut config = DiligenceConfig::default();
        config.orchestrator.task_timeout_secs = 5;
        let warnings = config.validate();
        assert!(warnings.iter().any(|w| w.contains("section budget")));
    }

    #[test]
    fn test_validate_flags_unknown_topic() {
        let mut config = DiligenceConfig::default();
        config.research.topics = Some(vec!["astrology".into()]);
        let warnings = config.validate();
        assert!(warnings.iter().any(|w| w.contains("astrology")));
    }

    #[test]
    fn test_load_config_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_config(Some(dir.path()), None).unwrap();
        assert_eq!(config.resilience.max_attempts, 3);
    }

    #[test]
    fn test_load_config_from_workspace_file() {
        let dir = tempfile::tempdir().unwrap();
        let cfg_dir = dir.path().join(".diligence");
        std::fs::create_dir_all(&cfg_dir).unwrap();
        std::fs::write(
            cfg_dir.join("config.toml"),
            r#"
            [orchestrator]
            task_timeout_secs = 42

            [[backends]]
            name = "perplexity"
            model = "sonar-pro"
            api_key_env = "PPLX_API_KEY"
            base_url = "https://api.perplexity.ai"
            web_search = true
            "#,
        )
        .unwrap();

        let config = load_config(Some(dir.path()), None).unwrap();
        assert_eq!(config.orchestrator.task_timeout_secs, 42);
        assert_eq!(config.backends.len(), 1);
        assert_eq!(config.backends[0].name, "perplexity");
        assert!(config.backends[0].web_search);
        assert!(config_exists(Some(dir.path())));
    }

    #[test]
    fn test_load_config_overrides_win() {
        let dir = tempfile::tempdir().unwrap();
        let mut overrides = DiligenceConfig::default();
        overrides.resilience.max_concurrent_calls = 4;
        let config = load_config(Some(dir.path()), Some(&overrides)).unwrap();
        assert_eq!(config.resilience.max_concurrent_calls, 4);
    }

    #[test]
    fn test_load_config_rejects_unknown_backend_kind() {
        let dir = tempfile::tempdir().unwrap();
        let cfg_dir = dir.path().join(".diligence");
        std::fs::create_dir_all(&cfg_dir).unwrap();
        std::fs::write(
            cfg_dir.join("config.toml"),
            r#"
            [[backends]]
            name = "pigeon"
            kind = "carrier_pigeon"
            "#,
        )
        .unwrap();

        let err = load_config(Some(dir.path()), None).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
        assert!(err.to_string().contains("carrier_pigeon"), "{err}");
    }
}
