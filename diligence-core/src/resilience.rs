//! Resilient invocation: retry with exponential backoff plus ordered backend fallback.
//!
//! Every external research call goes through [`ResilientInvoker`]. Each call
//! owns its retry state; the only thing shared between concurrent callers is
//! the optional concurrency limiter.

use crate::backend::{BackendRequest, BackendResponse, ResearchBackend};
use crate::config::ResilienceConfig;
use crate::error::{BackendError, InvocationError};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tracing::{debug, warn};

/// Exponential backoff schedule for one backend.
#[derive(Debug, Clone, PartialEq)]
pub struct BackoffPolicy {
    /// Attempts per backend including the first call. Never less than 1.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub multiplier: f64,
    pub max_delay: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self::from_config(&ResilienceConfig::default())
    }
}

impl BackoffPolicy {
    pub fn from_config(config: &ResilienceConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            base_delay: config.base_delay(),
            multiplier: config.backoff_multiplier,
            max_delay: config.max_delay(),
        }
    }

    /// `min(max_delay, base_delay * multiplier^attempt)`, with `attempt` counted from 0.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let base_ms = self.base_delay.as_millis() as f64;
        let raw = base_ms * self.multiplier.powi(attempt.min(i32::MAX as u32) as i32);
        let max_ms = self.max_delay.as_millis() as f64;
        let capped = if raw.is_finite() { raw.min(max_ms) } else { max_ms };
        Duration::from_millis(capped.max(0.0) as u64)
    }

    /// Delay before the retry that follows a failed `attempt`.
    ///
    /// A server retry hint lengthens the delay but never past `max_delay`.
    pub fn delay_after(&self, attempt: u32, error: &BackendError) -> Duration {
        let computed = self.delay_for(attempt);
        match error.retry_after_secs() {
            Some(secs) => computed.max(Duration::from_secs(secs)).min(self.max_delay),
            None => computed,
        }
    }
}

/// Why a retried operation against a single backend gave up.
#[derive(Debug, Clone)]
pub struct RetryFailure {
    pub error: BackendError,
    /// Calls made, including the first.
    pub attempts: u32,
    /// `true` when every attempt failed transiently; `false` on a terminal error.
    pub exhausted: bool,
}

/// Run `operation` under the backoff policy.
///
/// Retryable errors are retried until `max_attempts` is reached. A terminal
/// error returns immediately without consuming further attempts. There is no
/// sleep after the final attempt.
pub async fn with_retry<F, Fut, T>(policy: &BackoffPolicy, operation: F) -> Result<T, RetryFailure>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T, BackendError>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 0;
    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(e) => {
                let attempts = attempt + 1;
                if !e.is_retryable() {
                    return Err(RetryFailure {
                        error: e,
                        attempts,
                        exhausted: false,
                    });
                }
                if attempts >= max_attempts {
                    return Err(RetryFailure {
                        error: e,
                        attempts,
                        exhausted: true,
                    });
                }

                let delay = policy.delay_after(attempt, &e);
                warn!(
                    attempt = attempts,
                    max = max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "Retrying after transient error"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}

/// Wraps an ordered list of backends with retry, fallback and an optional
/// concurrency cap.
#[derive(Clone)]
pub struct ResilientInvoker {
    backends: Vec<Arc<dyn ResearchBackend>>,
    policy: BackoffPolicy,
    limiter: Option<Arc<Semaphore>>,
}

impl std::fmt::Debug for ResilientInvoker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResilientInvoker")
            .field("backends", &self.backend_names())
            .field("policy", &self.policy)
            .field("limited", &self.limiter.is_some())
            .finish()
    }
}

impl ResilientInvoker {
    /// Create an invoker over `backends`, most preferred first.
    pub fn new(backends: Vec<Arc<dyn ResearchBackend>>, policy: BackoffPolicy) -> Self {
        Self {
            backends,
            policy,
            limiter: None,
        }
    }

    /// Build an invoker from the resilience section of the configuration.
    ///
    /// A non-zero `max_concurrent_calls` installs a semaphore shared by every
    /// clone of this invoker.
    pub fn from_config(backends: Vec<Arc<dyn ResearchBackend>>, config: &ResilienceConfig) -> Self {
        let invoker = Self::new(backends, BackoffPolicy::from_config(config));
        if config.max_concurrent_calls > 0 {
            invoker.with_concurrency_limit(config.max_concurrent_calls)
        } else {
            invoker
        }
    }

    /// Cap simultaneous backend calls across all clones of this invoker.
    pub fn with_concurrency_limit(mut self, permits: usize) -> Self {
        self.limiter = Some(Arc::new(Semaphore::new(permits.max(1))));
        self
    }

    pub fn policy(&self) -> &BackoffPolicy {
        &self.policy
    }

    pub fn backend_names(&self) -> Vec<&str> {
        self.backends.iter().map(|b| b.name()).collect()
    }

    /// Send one request through the backend chain.
    pub async fn invoke(&self, request: &BackendRequest) -> Result<BackendResponse, InvocationError> {
        self.invoke_with(|backend| {
            let request = request.clone();
            async move { backend.invoke(request).await }
        })
        .await
    }

    /// Run `operation` against each backend in order until one succeeds.
    ///
    /// A backend that exhausts its attempts on transient errors hands over to
    /// the next one with a fresh attempt counter. A terminal error stops the
    /// whole call, regardless of remaining backends.
    pub async fn invoke_with<F, Fut, T>(&self, operation: F) -> Result<T, InvocationError>
    where
        F: Fn(Arc<dyn ResearchBackend>) -> Fut,
        Fut: Future<Output = Result<T, BackendError>>,
    {
        if self.backends.is_empty() {
            return Err(InvocationError::NoBackends);
        }

        let mut total_attempts = 0usize;
        let mut last_error = None;

        for (index, backend) in self.backends.iter().enumerate() {
            let attempt_once = || {
                let call = operation(Arc::clone(backend));
                let limiter = self.limiter.clone();
                async move {
                    let _permit = match limiter {
                        Some(semaphore) => Some(
                            semaphore
                                .acquire_owned()
                                .await
                                .map_err(|_| BackendError::Cancelled)?,
                        ),
                        None => None,
                    };
                    call.await
                }
            };

            match with_retry(&self.policy, attempt_once).await {
                Ok(value) => {
                    if index > 0 {
                        debug!(backend = backend.name(), "Fallback backend succeeded");
                    }
                    return Ok(value);
                }
                Err(failure) if failure.exhausted => {
                    total_attempts += failure.attempts as usize;
                    warn!(
                        backend = backend.name(),
                        attempts = failure.attempts,
                        error = %failure.error,
                        remaining = self.backends.len() - index - 1,
                        "Backend exhausted retries, trying next"
                    );
                    last_error = Some(failure.error);
                }
                Err(failure) => {
                    warn!(
                        backend = backend.name(),
                        error = %failure.error,
                        "Terminal backend error, aborting call"
                    );
                    return Err(InvocationError::Terminal {
                        backend: backend.name().to_string(),
                        source: failure.error,
                    });
                }
            }
        }

        Err(InvocationError::ServiceUnavailable {
            backends_tried: self.backends.len(),
            attempts: total_attempts,
            last_error,
        })
    }
}
