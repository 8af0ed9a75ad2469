//! Encoder backed by an OpenAI-compatible `/embeddings` endpoint

use super::{EncodeError, Encoder};
use crate::llm_client::{call_embeddings, LlmClientError};
use ctse_core::{CallContext, ModelConfig};
use std::time::Duration;

/// Remote embedding encoder.
///
/// Works with Ollama, vLLM, llama.cpp server, OpenAI, and other compatible providers.
#[derive(Debug, Clone)]
pub struct ApiEncoder {
    url: String,
    model: String,
    api_key: Option<String>,
    dimension: usize,
    timeout: Duration,
}

impl ApiEncoder {
    /// Create an encoder for `config`, expecting `dimension`-sized vectors.
    ///
    /// The `/embeddings` path is appended to the endpoint.
    pub fn new(config: &ModelConfig, dimension: usize, timeout_ms: u64) -> Self {
        let base = config.endpoint.trim_end_matches('/');
        ApiEncoder {
            url: format!("{}/embeddings", base),
            model: config.model.clone(),
            api_key: config.api_key.clone(),
            dimension,
            timeout: Duration::from_millis(timeout_ms),
        }
    }

    fn request_body(&self, text: &str) -> serde_json::Value {
        serde_json::json!({
            "model": self.model,
            "input": text,
        })
    }
}

impl Encoder for ApiEncoder {
    fn encode(&self, text: &str, ctx: &CallContext) -> Result<Vec<f32>, EncodeError> {
        let timeout = ctx
            .remaining()
            .map_or(self.timeout, |left| left.min(self.timeout));
        if timeout.is_zero() {
            return Err(EncodeError::Timeout(Duration::ZERO));
        }
        call_embeddings(&self.url, self.api_key.as_deref(), timeout, &self.request_body(text))
            .map_err(|e| match e {
                LlmClientError::Timeout => EncodeError::Timeout(timeout),
                LlmClientError::Parse(msg) => EncodeError::InvalidOutput(msg),
                other => EncodeError::Unavailable(other.to_string()),
            })
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn name(&self) -> &str {
        &self.model
    }
}
