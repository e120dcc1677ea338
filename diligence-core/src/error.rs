//! Error types for the Diligence core.
//!
//! Uses `thiserror` for public API error types. Backend failures are split into
//! per-call errors (`BackendError`), the outcome of a resilient invocation
//! (`InvocationError`), and run-level failures (`OrchestrationError`).

/// Top-level error type for the Diligence core library.
#[derive(Debug, thiserror::Error)]
pub enum DiligenceError {
    #[error("Input error: {0}")]
    Input(#[from] InputError),

    #[error("{0}")]
    Invocation(#[from] InvocationError),

    #[error("Orchestration error: {0}")]
    Orchestration(#[from] OrchestrationError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

/// Input rejected before any research work begins.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InputError {
    #[error("Entity name must not be empty")]
    EmptyEntityName,

    #[error("Topic catalog must contain at least one topic")]
    EmptyCatalog,

    #[error("Topic id must not be empty")]
    EmptyTopicId,

    #[error("Duplicate topic id in catalog: {id}")]
    DuplicateTopic { id: String },

    #[error("Unknown topic: {id}")]
    UnknownTopic { id: String },
}

/// Failure of a single call against a single backend.
#[derive(Debug, Clone, thiserror::Error)]
pub enum BackendError {
    #[error("Rate limited by backend, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Backend overloaded: {message}")]
    Overloaded { message: String },

    #[error("Backend unavailable: {message}")]
    Unavailable { message: String },

    #[error("Gateway timeout: {message}")]
    GatewayTimeout { message: String },

    #[error("Authentication failed for backend {backend}")]
    AuthFailed { backend: String },

    #[error("Request rejected (HTTP {status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("Response parse error: {message}")]
    ResponseParse { message: String },

    #[error("Request failed: {message}")]
    Request { message: String },

    #[error("Call cancelled")]
    Cancelled,
}

/// Message fragments that mark an otherwise opaque failure as transient.
const TRANSIENT_SIGNATURES: &[&str] = &[
    "rate limit",
    "rate_limit",
    "too many requests",
    "429",
    "overloaded",
    "529",
    "service unavailable",
    "503",
    "gateway timeout",
    "504",
];

impl BackendError {
    /// Whether this failure belongs to a transient class and may be retried.
    ///
    /// Typed transient variants are always retryable. `Request` failures carry
    /// only a message, so they are retryable when the message matches one of
    /// the known transient signatures. Everything else is terminal.
    pub fn is_retryable(&self) -> bool {
        match self {
            BackendError::RateLimited { .. }
            | BackendError::Overloaded { .. }
            | BackendError::Unavailable { .. }
            | BackendError::GatewayTimeout { .. } => true,
            BackendError::Request { message } => matches_transient_signature(message),
            BackendError::AuthFailed { .. }
            | BackendError::Rejected { .. }
            | BackendError::ResponseParse { .. }
            | BackendError::Cancelled => false,
        }
    }

    /// Server-provided retry hint, if any.
    pub fn retry_after_secs(&self) -> Option<u64> {
        match self {
            BackendError::RateLimited { retry_after_secs } => Some(*retry_after_secs),
            _ => None,
        }
    }
}

/// Check a free-form error message against the transient signatures.
pub fn matches_transient_signature(message: &str) -> bool {
    let lower = message.to_lowercase();
    TRANSIENT_SIGNATURES.iter().any(|sig| lower.contains(sig))
}

/// Outcome of a resilient invocation that did not produce a value.
#[derive(Debug, Clone, thiserror::Error)]
pub enum InvocationError {
    /// A non-retryable failure; remaining backends were not tried.
    #[error("Backend '{backend}' failed: {source}")]
    Terminal {
        backend: String,
        #[source]
        source: BackendError,
    },

    /// Every backend exhausted its retry budget on transient failures.
    ///
    /// The display text is deliberately generic so callers can surface it
    /// without leaking transport detail.
    #[error("Service temporarily unavailable")]
    ServiceUnavailable {
        backends_tried: usize,
        attempts: usize,
        last_error: Option<BackendError>,
    },

    #[error("No research backends configured")]
    NoBackends,
}

impl InvocationError {
    /// Whether the invocation ended because all backends were exhausted.
    pub fn is_service_unavailable(&self) -> bool {
        matches!(self, InvocationError::ServiceUnavailable { .. })
    }
}

/// Run-level failures: nothing usable could be produced.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum OrchestrationError {
    #[error("Research run was cancelled before any section completed")]
    Cancelled,

    #[error("Research run timed out after {timeout_secs}s before any section completed")]
    TimedOut { timeout_secs: u64 },
}

/// Errors from the configuration system.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {message}")]
    Invalid { message: String },

    #[error("Environment variable not set: {var}")]
    EnvVarMissing { var: String },

    /// A config file or environment override could not be read into
    /// [`DiligenceConfig`](crate::config::DiligenceConfig), including unknown
    /// backend kinds.
    #[error("Configuration parse error: {message}")]
    Parse { message: String },
}

/// A type alias for results using the top-level `DiligenceError`.
pub type Result<T> = std::result::Result<T, DiligenceError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_input() {
        let err = DiligenceError::Input(InputError::EmptyEntityName);
        assert_eq!(err.to_string(), "Input error: Entity name must not be empty");
    }

    #[test]
    fn test_error_display_duplicate_topic() {
        let err = InputError::DuplicateTopic {
            id: "funding".into(),
        };
        assert_eq!(err.to_string(), "Duplicate topic id in catalog: funding");
    }

    #[test]
    fn test_service_unavailable_is_generic() {
        let err = DiligenceError::Invocation(InvocationError::ServiceUnavailable {
            backends_tried: 2,
            attempts: 6,
            last_error: Some(BackendError::Unavailable {
                message: "upstream connect error 10.0.0.7:443".into(),
            }),
        });
        assert_eq!(err.to_string(), "Service temporarily unavailable");
    }

    #[test]
    fn test_transient_variants_are_retryable() {
        assert!(BackendError::RateLimited { retry_after_secs: 5 }.is_retryable());
        assert!(
            BackendError::Overloaded {
                message: "busy".into()
            }
            .is_retryable()
        );
        assert!(
            BackendError::Unavailable {
                message: "down".into()
            }
            .is_retryable()
        );
        assert!(
            BackendError::GatewayTimeout {
                message: "slow".into()
            }
            .is_retryable()
        );
    }

    #[test]
    fn test_terminal_variants_are_not_retryable() {
        assert!(
            !BackendError::AuthFailed {
                backend: "primary".into()
            }
            .is_retryable()
        );
        assert!(
            !BackendError::Rejected {
                status: 400,
                message: "bad request".into()
            }
            .is_retryable()
        );
        assert!(
            !BackendError::ResponseParse {
                message: "not json".into()
            }
            .is_retryable()
        );
        assert!(!BackendError::Cancelled.is_retryable());
    }

    #[test]
    fn test_request_message_signature_classification() {
        assert!(
            BackendError::Request {
                message: "Upstream returned 503 Service Unavailable".into()
            }
            .is_retryable()
        );
        assert!(
            BackendError::Request {
                message: "model is Overloaded, try later".into()
            }
            .is_retryable()
        );
        assert!(
            !BackendError::Request {
                message: "invalid header value".into()
            }
            .is_retryable()
        );
    }

    #[test]
    fn test_retry_after_hint() {
        assert_eq!(
            BackendError::RateLimited {
                retry_after_secs: 7
            }
            .retry_after_secs(),
            Some(7)
        );
        assert_eq!(
            BackendError::Overloaded {
                message: "x".into()
            }
            .retry_after_secs(),
            None
        );
    }

    #[test]
    fn test_orchestration_error_display() {
        let err = OrchestrationError::TimedOut { timeout_secs: 30 };
        assert_eq!(
            err.to_string(),
            "Research run timed out after 30s before any section completed"
        );
    }

    #[test]
    fn test_config_error_wraps_into_top_level() {
        let err: DiligenceError = ConfigError::Parse {
            message: "bad kind".into(),
        }
        .into();
        assert_eq!(
            err.to_string(),
            "Configuration error: Configuration parse error: bad kind"
        );
    }
}
