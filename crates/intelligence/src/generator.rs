//! Generative-model boundary
//!
//! `generate(prompt) -> text`, with a caller-imposed token budget. As with
//! encoders, the engine only calls generators through `GuardedGenerator`.

use crate::guard::{run_guarded, GuardError};
use crate::llm_client::{call_chat_completions, retry_once, LlmClientError};
use ctse_core::{CallContext, CtseError, ModelConfig};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur during generation
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GenerationError {
    /// Model failed, is unreachable, or is not configured
    #[error("generation unavailable: {0}")]
    Unavailable(String),
    /// Model did not answer in time
    #[error("generation timed out after {0:?}")]
    Timeout(Duration),
    /// Caller cancelled the request
    #[error("generation cancelled")]
    Cancelled,
}

impl From<GenerationError> for CtseError {
    fn from(e: GenerationError) -> Self {
        match e {
            GenerationError::Unavailable(msg) => CtseError::GenerationUnavailable(msg),
            GenerationError::Timeout(d) => CtseError::GenerationTimeout(d),
            GenerationError::Cancelled => CtseError::Cancelled,
        }
    }
}

/// One generation request
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    /// Instructions
    pub system: String,
    /// User content
    pub prompt: String,
    /// Maximum response tokens
    pub max_tokens: u32,
    /// Sampling temperature
    pub temperature: f32,
}

impl GenerationRequest {
    /// Deterministic (temperature 0) request
    pub fn new(system: impl Into<String>, prompt: impl Into<String>, max_tokens: u32) -> Self {
        GenerationRequest {
            system: system.into(),
            prompt: prompt.into(),
            max_tokens,
            temperature: 0.0,
        }
    }

    /// Override the sampling temperature
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }
}

/// Text generator.
///
/// The trait is object-safe for use as `Arc<dyn Generator>`.
pub trait Generator: Send + Sync {
    /// Produce text for `request`. Implementations should respect `ctx` where they can.
    fn generate(&self, request: &GenerationRequest, ctx: &CallContext) -> Result<String, GenerationError>;

    /// Name for logs
    fn name(&self) -> &str;
}

/// Deadline- and cancellation-enforcing wrapper around a generator
#[derive(Clone)]
pub struct GuardedGenerator {
    inner: Arc<dyn Generator>,
}

impl std::fmt::Debug for GuardedGenerator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GuardedGenerator")
            .field("inner", &self.inner.name())
            .finish()
    }
}

impl GuardedGenerator {
    /// Wrap `inner`
    pub fn new(inner: Arc<dyn Generator>) -> Self {
        GuardedGenerator { inner }
    }
}

impl Generator for GuardedGenerator {
    fn generate(&self, request: &GenerationRequest, ctx: &CallContext) -> Result<String, GenerationError> {
        let inner = Arc::clone(&self.inner);
        let owned = request.clone();
        let call_ctx = ctx.clone();
        run_guarded(ctx, "generate", move || inner.generate(&owned, &call_ctx)).map_err(|e| match e {
            GuardError::TimedOut(waited) => GenerationError::Timeout(waited),
            GuardError::Cancelled => GenerationError::Cancelled,
            GuardError::Crashed(msg) => GenerationError::Unavailable(msg),
        })?
    }

    fn name(&self) -> &str {
        self.inner.name()
    }
}

/// Generator that calls an OpenAI-compatible chat completions endpoint.
#[derive(Debug, Clone)]
pub struct ApiGenerator {
    url: String,
    model: String,
    api_key: Option<String>,
    timeout: Duration,
}

impl ApiGenerator {
    /// Create a generator for `config`.
    ///
    /// The `/chat/completions` path is appended to the endpoint.
    pub fn new(config: &ModelConfig, timeout_ms: u64) -> Self {
        let base = config.endpoint.trim_end_matches('/');
        ApiGenerator {
            url: format!("{}/chat/completions", base),
            model: config.model.clone(),
            api_key: config.api_key.clone(),
            timeout: Duration::from_millis(timeout_ms),
        }
    }

    fn request_body(&self, request: &GenerationRequest) -> serde_json::Value {
        serde_json::json!({
            "model": self.model,
            "messages": [
                {"role": "system", "content": request.system},
                {"role": "user", "content": request.prompt}
            ],
            "temperature": request.temperature,
            "max_tokens": request.max_tokens,
        })
    }
}

impl Generator for ApiGenerator {
    fn generate(&self, request: &GenerationRequest, ctx: &CallContext) -> Result<String, GenerationError> {
        let timeout = ctx
            .remaining()
            .map_or(self.timeout, |left| left.min(self.timeout));
        let body = self.request_body(request);
        retry_once(
            "generate",
            || call_chat_completions(&self.url, self.api_key.as_deref(), timeout, &body),
            |text| {
                let text = text.trim();
                (!text.is_empty()).then(|| text.to_string())
            },
        )
        .map_err(|e| match e {
            LlmClientError::Timeout => GenerationError::Timeout(timeout),
            other => GenerationError::Unavailable(other.to_string()),
        })
    }

    fn name(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct EchoGenerator {
        delay: Duration,
    }

    impl Generator for EchoGenerator {
        fn generate(&self, request: &GenerationRequest, _ctx: &CallContext) -> Result<String, GenerationError> {
            std::thread::sleep(self.delay);
            Ok(request.prompt.clone())
        }
        fn name(&self) -> &str {
            "echo"
        }
    }

    #[test]
    fn test_guarded_generator_passes_through() {
        let gen = GuardedGenerator::new(Arc::new(EchoGenerator { delay: Duration::ZERO }));
        let req = GenerationRequest::new("sys", "hello", 16);
        assert_eq!(gen.generate(&req, &CallContext::unbounded()).unwrap(), "hello");
    }

    #[test]
    fn test_guarded_generator_times_out() {
        let gen = GuardedGenerator::new(Arc::new(EchoGenerator {
            delay: Duration::from_millis(500),
        }));
        let req = GenerationRequest::new("sys", "hello", 16);
        let ctx = CallContext::with_timeout(Duration::from_millis(20));
        assert!(matches!(gen.generate(&req, &ctx), Err(GenerationError::Timeout(_))));
    }

    #[test]
    fn test_api_generator_request_body() {
        let config = ModelConfig {
            endpoint: "http://localhost:11434/v1/".to_string(),
            model: "qwen3:1.7b".to_string(),
            api_key: Some("key".to_string()),
        };
        let gen = ApiGenerator::new(&config, 5000);
        assert_eq!(gen.url, "http://localhost:11434/v1/chat/completions");
        let body = gen.request_body(&GenerationRequest::new("sys", "user", 64).with_temperature(0.1));
        assert_eq!(body["model"], "qwen3:1.7b");
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][1]["content"], "user");
        assert_eq!(body["max_tokens"], 64);
    }

    #[test]
    fn test_error_conversion() {
        assert!(matches!(
            CtseError::from(GenerationError::Timeout(Duration::from_secs(1))),
            CtseError::GenerationTimeout(_)
        ));
        assert!(matches!(
            CtseError::from(GenerationError::Unavailable("down".into())),
            CtseError::GenerationUnavailable(_)
        ));
    }
}
