//! Structured-completion call: send the prompt pair, get JSON-shaped text.
//!
//! [`StructuredCompletion`] is the seam between the pipeline and the remote
//! model. [`LlmCompletion`] implements it over any edgequake-llm
//! [`LLMProvider`]; [`LlmCompletion::from_config`] wires an
//! [`OpenAICompatibleProvider`] at the configured endpoint (Groq by
//! default) and every call asks for `response_format: json_object` with a
//! low temperature and an output-size ceiling.
//!
//! ## Retry Strategy
//!
//! [`complete_with_retry`] retries only transient failures (network, timeout,
//! 429, 5xx) with exponential backoff, `retry_backoff_ms * 2^(attempt-1)`,
//! stretched to a server-supplied `Retry-After` when that is longer. A
//! `Retry-After` beyond `api_timeout_secs` is not waited out: the call fails
//! with the rate-limit error instead. Authentication rejection and other 4xx
//! errors return immediately.

use crate::config::{ExtractionConfig, API_KEY_ENV};
use crate::error::{Doc2JsonError, RemoteError};
use crate::prompts::PromptPair;
use async_trait::async_trait;
use edgequake_llm::{
    ChatMessage, CompletionOptions, ConfigProviderType, LLMProvider, LlmError,
    OpenAICompatibleProvider, ProviderConfig,
};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::sleep;
use tracing::{debug, warn};

/// A remote capability that turns a prompt pair into response text.
#[async_trait]
pub trait StructuredCompletion: Send + Sync {
    /// Issue one request. Implementations must not retry internally.
    async fn complete(&self, prompt: &PromptPair) -> Result<String, RemoteError>;
}

/// Status code embedded in provider error messages, e.g. `groq API 429: ...`
/// or `groq API error 503: ...`.
static RE_API_STATUS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\bAPI (?:error )?(\d{3})\b").expect("valid regex"));

/// Build JSON-mode completion options from the config.
fn build_options(config: &ExtractionConfig) -> CompletionOptions {
    CompletionOptions {
        temperature: Some(config.temperature),
        max_tokens: Some(config.max_tokens),
        response_format: Some("json_object".into()),
        ..Default::default()
    }
}

/// Map a non-success HTTP status to a [`RemoteError`].
fn classify_status(status: u16, detail: String) -> RemoteError {
    match status {
        401 | 403 => RemoteError::Auth { status, detail },
        429 => RemoteError::RateLimited {
            retry_after_secs: None,
        },
        500..=599 => RemoteError::Upstream { status, detail },
        _ => RemoteError::Api { status, detail },
    }
}

/// Translate a provider error into the transport-neutral [`RemoteError`].
fn map_llm_error(err: LlmError, timeout_secs: u64) -> RemoteError {
    match err {
        LlmError::NetworkError(msg) => RemoteError::Network(msg),
        LlmError::Timeout => RemoteError::Timeout { secs: timeout_secs },
        LlmError::RateLimited(_) => RemoteError::RateLimited {
            retry_after_secs: None,
        },
        LlmError::AuthError(detail) => RemoteError::Auth {
            status: 401,
            detail,
        },
        LlmError::ApiError(msg) => {
            let status = RE_API_STATUS
                .captures(&msg)
                .and_then(|c| c[1].parse::<u16>().ok());
            match status {
                Some(status) => classify_status(status, msg),
                // No status: the body arrived but could not be used.
                None => RemoteError::InvalidResponse(msg),
            }
        }
        LlmError::SerializationError(e) => RemoteError::InvalidResponse(e.to_string()),
        LlmError::ProviderError(detail) | LlmError::Unknown(detail) => RemoteError::Upstream {
            status: 502,
            detail,
        },
        other => RemoteError::Api {
            status: 400,
            detail: other.to_string(),
        },
    }
}

// ── Provider-backed client ───────────────────────────────────────────────

/// JSON-mode chat completion over an edgequake-llm provider.
pub struct LlmCompletion {
    provider: Arc<dyn LLMProvider>,
    options: CompletionOptions,
    timeout_secs: u64,
}

impl LlmCompletion {
    /// Wrap an existing provider.
    pub fn new(provider: Arc<dyn LLMProvider>, config: &ExtractionConfig) -> Self {
        Self {
            provider,
            options: build_options(config),
            timeout_secs: config.api_timeout_secs,
        }
    }

    /// Build an OpenAI-compatible provider for `config.base_url`.
    pub fn from_config(config: &ExtractionConfig) -> Result<Self, Doc2JsonError> {
        let provider = OpenAICompatibleProvider::from_config(provider_config(config))
            .map_err(|e| Doc2JsonError::InvalidConfig(format!("LLM provider: {e}")))?;
        debug!(
            "LLM provider ready: {} / {}",
            provider.name(),
            provider.model()
        );
        Ok(Self::new(Arc::new(provider), config))
    }
}

impl std::fmt::Debug for LlmCompletion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmCompletion")
            .field("provider", &self.provider.name())
            .field("model", &self.provider.model())
            .field("options", &self.options)
            .finish()
    }
}

/// Provider settings for the configured endpoint.
///
/// The provider resolves its key from an environment variable. When the
/// configured key came from [`API_KEY_ENV`] that variable is named;
/// otherwise the key travels as a default `Authorization` header.
fn provider_config(config: &ExtractionConfig) -> ProviderConfig {
    let key_from_env = std::env::var(API_KEY_ENV)
        .map(|v| v == config.api_key)
        .unwrap_or(false);

    let mut headers = HashMap::new();
    let api_key_env = if key_from_env {
        Some(API_KEY_ENV.to_string())
    } else {
        headers.insert(
            "Authorization".to_string(),
            format!("Bearer {}", config.api_key),
        );
        None
    };

    ProviderConfig {
        name: "groq".to_string(),
        display_name: "Groq".to_string(),
        provider_type: ConfigProviderType::OpenAICompatible,
        api_key_env,
        base_url: Some(config.base_url.clone()),
        default_llm_model: Some(config.model.clone()),
        headers,
        timeout_seconds: config.api_timeout_secs,
        ..Default::default()
    }
}

#[async_trait]
impl StructuredCompletion for LlmCompletion {
    async fn complete(&self, prompt: &PromptPair) -> Result<String, RemoteError> {
        let messages = vec![
            ChatMessage::system(prompt.system.as_str()),
            ChatMessage::user(prompt.user.as_str()),
        ];

        let response = self
            .provider
            .chat(&messages, Some(&self.options))
            .await
            .map_err(|e| map_llm_error(e, self.timeout_secs))?;

        debug!(
            "{} input tokens, {} output tokens",
            response.prompt_tokens, response.completion_tokens
        );

        if response.content.trim().is_empty() {
            return Err(RemoteError::InvalidResponse("empty completion".into()));
        }
        Ok(response.content)
    }
}

// ── Retry driver ─────────────────────────────────────────────────────────

/// Call `client`, retrying transient failures per the config.
pub async fn complete_with_retry(
    client: &dyn StructuredCompletion,
    prompt: &PromptPair,
    config: &ExtractionConfig,
) -> Result<String, Doc2JsonError> {
    let start = Instant::now();
    let mut attempt: u32 = 0;

    loop {
        let err = match client.complete(prompt).await {
            Ok(text) => {
                debug!(
                    "Completion received: {} chars after {} attempt(s), {:?}",
                    text.len(),
                    attempt + 1,
                    start.elapsed()
                );
                return Ok(text);
            }
            Err(e) => e,
        };

        let retry_after = err.retry_after_secs();
        let retryable = err.is_transient()
            && attempt < config.max_retries
            && retry_after.map_or(true, |s| s <= config.api_timeout_secs);

        if !retryable {
            warn!(
                "Completion failed permanently after {} attempt(s): {}",
                attempt + 1,
                err
            );
            return Err(Doc2JsonError::RemoteService {
                source: err,
                attempts: attempt + 1,
            });
        }

        attempt += 1;
        let backoff_ms = config
            .retry_backoff_ms
            .saturating_mul(2u64.saturating_pow(attempt - 1));
        let wait_ms = retry_after
            .map(|s| s.saturating_mul(1000).max(backoff_ms))
            .unwrap_or(backoff_ms);
        warn!(
            "Completion attempt {} failed: {}; retry {}/{} after {}ms",
            attempt, err, attempt, config.max_retries, wait_ms
        );
        sleep(Duration::from_millis(wait_ms)).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prompts::build_prompts;
    use edgequake_llm::MockProvider;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;
    use tokio_test::{assert_err, assert_ok};

    fn config(retries: u32) -> ExtractionConfig {
        ExtractionConfig::builder()
            .api_key("k")
            .max_retries(retries)
            .retry_backoff_ms(1)
            .build()
            .unwrap()
    }

    /// Replays a fixed sequence of outcomes.
    struct Scripted {
        outcomes: Mutex<Vec<Result<String, RemoteError>>>,
        calls: AtomicU32,
    }

    impl Scripted {
        fn new(mut outcomes: Vec<Result<String, RemoteError>>) -> Self {
            outcomes.reverse();
            Self {
                outcomes: Mutex::new(outcomes),
                calls: AtomicU32::new(0),
            }
        }
    }

    #[async_trait]
    impl StructuredCompletion for Scripted {
        async fn complete(&self, _prompt: &PromptPair) -> Result<String, RemoteError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.outcomes
                .lock()
                .unwrap()
                .pop()
                .unwrap_or_else(|| Err(RemoteError::Network("script exhausted".into())))
        }
    }

    #[test]
    fn build_options_requests_json_mode() {
        let opts = build_options(&config(0));
        assert_eq!(opts.temperature, Some(0.2));
        assert_eq!(opts.max_tokens, Some(4096));
        assert_eq!(opts.response_format.as_deref(), Some("json_object"));
    }

    #[test]
    fn provider_config_targets_configured_endpoint() {
        let c = ExtractionConfig::builder()
            .api_key("doc2json-unit-key")
            .base_url("http://localhost:8080/v1")
            .model("mixtral-8x7b")
            .api_timeout_secs(7)
            .build()
            .unwrap();
        let pc = provider_config(&c);
        assert_eq!(pc.provider_type, ConfigProviderType::OpenAICompatible);
        assert_eq!(pc.base_url.as_deref(), Some("http://localhost:8080/v1"));
        assert_eq!(pc.default_llm_model.as_deref(), Some("mixtral-8x7b"));
        assert_eq!(pc.timeout_seconds, 7);
        assert_eq!(pc.api_key_env, None);
        assert_eq!(
            pc.headers.get("Authorization").map(String::as_str),
            Some("Bearer doc2json-unit-key")
        );
    }

    #[test]
    fn provider_errors_are_classified() {
        assert!(matches!(
            map_llm_error(LlmError::ApiError("groq API 401: Invalid API Key".into()), 60),
            RemoteError::Auth { status: 401, .. }
        ));
        assert!(matches!(
            map_llm_error(LlmError::ApiError("groq API error 503: <html>".into()), 60),
            RemoteError::Upstream { status: 503, .. }
        ));
        assert!(matches!(
            map_llm_error(LlmError::ApiError("groq API 429: slow down".into()), 60),
            RemoteError::RateLimited { .. }
        ));
        assert!(matches!(
            map_llm_error(LlmError::ApiError("groq API 400: bad model".into()), 60),
            RemoteError::Api { status: 400, .. }
        ));
        assert!(matches!(
            map_llm_error(LlmError::ApiError("No choices in response".into()), 60),
            RemoteError::InvalidResponse(_)
        ));
        assert!(matches!(
            map_llm_error(LlmError::NetworkError("refused".into()), 60),
            RemoteError::Network(_)
        ));
        assert!(matches!(
            map_llm_error(LlmError::Timeout, 60),
            RemoteError::Timeout { secs: 60 }
        ));
        assert!(matches!(
            map_llm_error(LlmError::AuthError("nope".into()), 60),
            RemoteError::Auth { .. }
        ));
        assert!(matches!(
            map_llm_error(LlmError::ModelNotFound("x".into()), 60),
            RemoteError::Api { .. }
        ));
    }

    #[tokio::test]
    async fn provider_reply_content_is_returned() {
        let mock = MockProvider::new();
        mock.add_response(r#"{"invoices":[]}"#).await;
        let client = LlmCompletion::new(Arc::new(mock), &config(0));

        let out = assert_ok!(client.complete(&build_prompts("x")).await);
        assert_eq!(out, r#"{"invoices":[]}"#);
    }

    #[tokio::test]
    async fn empty_provider_reply_is_invalid_response() {
        let mock = MockProvider::new();
        mock.add_response("   ").await;
        let client = LlmCompletion::new(Arc::new(mock), &config(0));

        let err = assert_err!(client.complete(&build_prompts("x")).await);
        assert!(matches!(err, RemoteError::InvalidResponse(_)));
    }

    #[tokio::test]
    async fn retries_transient_then_succeeds() {
        let client = Scripted::new(vec![
            Err(RemoteError::Network("reset".into())),
            Err(RemoteError::Upstream {
                status: 503,
                detail: String::new(),
            }),
            Ok("{}".into()),
        ]);
        let out = assert_ok!(complete_with_retry(&client, &build_prompts("x"), &config(3)).await);
        assert_eq!(out, "{}");
        assert_eq!(client.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn auth_failure_is_not_retried() {
        let client = Scripted::new(vec![Err(RemoteError::Auth {
            status: 401,
            detail: "invalid key".into(),
        })]);
        let err = complete_with_retry(&client, &build_prompts("x"), &config(3))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            Doc2JsonError::RemoteService {
                source: RemoteError::Auth { .. },
                attempts: 1
            }
        ));
        assert_eq!(client.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn gives_up_after_max_retries() {
        let client = Scripted::new(vec![
            Err(RemoteError::Timeout { secs: 1 }),
            Err(RemoteError::Timeout { secs: 1 }),
            Err(RemoteError::Timeout { secs: 1 }),
        ]);
        let err = assert_err!(complete_with_retry(&client, &build_prompts("x"), &config(2)).await);
        assert!(matches!(
            err,
            Doc2JsonError::RemoteService { attempts: 3, .. }
        ));
        assert_eq!(client.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn retry_after_beyond_timeout_is_not_waited_out() {
        let client = Scripted::new(vec![
            Err(RemoteError::RateLimited {
                retry_after_secs: Some(86_400),
            }),
            Ok("{}".into()),
        ]);
        let started = Instant::now();
        let err = assert_err!(complete_with_retry(&client, &build_prompts("x"), &config(3)).await);
        assert!(matches!(
            err,
            Doc2JsonError::RemoteService {
                source: RemoteError::RateLimited { .. },
                attempts: 1
            }
        ));
        assert_eq!(client.calls.load(Ordering::SeqCst), 1);
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn short_retry_after_is_honoured() {
        let client = Scripted::new(vec![
            Err(RemoteError::RateLimited {
                retry_after_secs: Some(0),
            }),
            Ok("{}".into()),
        ]);
        assert_ok!(complete_with_retry(&client, &build_prompts("x"), &config(1)).await);
        assert_eq!(client.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn unreachable_endpoint_is_network_error() {
        let c = ExtractionConfig::builder()
            .api_key("k")
            .base_url("http://127.0.0.1:9")
            .api_timeout_secs(2)
            .build()
            .unwrap();
        let client = LlmCompletion::from_config(&c).unwrap();
        let err = client.complete(&build_prompts("x")).await.unwrap_err();
        assert!(err.is_transient(), "got: {err:?}");
    }
}
