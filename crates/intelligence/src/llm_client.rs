//! Shared HTTP client for OpenAI-compatible endpoints
//!
//! Provides the error type, the chat-completions and embeddings calls, and
//! the single-retry helper used by the API-backed encoder and generator.

use std::time::Duration;
use thiserror::Error;

// ============================================================================
// Error Type
// ============================================================================

/// Errors that can occur when calling an external model endpoint
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LlmClientError {
    /// HTTP request failed (network unreachable, connection refused, etc.)
    #[error("network error: {0}")]
    Network(String),
    /// Failed to parse model response
    #[error("parse error: {0}")]
    Parse(String),
    /// Model request timed out
    #[error("model request timed out")]
    Timeout,
    /// The `api` cargo feature is not enabled
    #[error("feature '{0}' not enabled")]
    FeatureDisabled(&'static str),
}

// ============================================================================
// HTTP Calls
// ============================================================================

/// POST `body` as JSON and decode the JSON answer.
#[cfg(feature = "api")]
fn post_json(
    url: &str,
    api_key: Option<&str>,
    timeout: Duration,
    body: &serde_json::Value,
) -> Result<serde_json::Value, LlmClientError> {
    let agent = ureq::Agent::new_with_config(
        ureq::Agent::config_builder()
            .timeout_global(Some(timeout))
            .build(),
    );
    let mut request = agent.post(url).header("Content-Type", "application/json");
    if let Some(key) = api_key {
        request = request.header("Authorization", &format!("Bearer {}", key));
    }

    let payload = body.to_string();
    let mut response = request
        .send(payload.as_bytes())
        .map_err(|e| match e {
            ureq::Error::Timeout(_) => LlmClientError::Timeout,
            other => LlmClientError::Network(other.to_string()),
        })?;
    let text = response
        .body_mut()
        .read_to_string()
        .map_err(|e| LlmClientError::Network(format!("cannot read response body: {}", e)))?;
    serde_json::from_str(&text).map_err(|e| {
        LlmClientError::Parse(format!("response is not JSON ({}): {}", e, clip(&text)))
    })
}

#[cfg(not(feature = "api"))]
fn post_json(
    _url: &str,
    _api_key: Option<&str>,
    _timeout: Duration,
    _body: &serde_json::Value,
) -> Result<serde_json::Value, LlmClientError> {
    Err(LlmClientError::FeatureDisabled("api"))
}

/// `choices[0].message.content` of a `/chat/completions` call
pub fn call_chat_completions(
    url: &str,
    api_key: Option<&str>,
    timeout: Duration,
    body: &serde_json::Value,
) -> Result<String, LlmClientError> {
    extract_chat_content(&post_json(url, api_key, timeout, body)?)
}

/// `data[0].embedding` of an `/embeddings` call
pub fn call_embeddings(
    url: &str,
    api_key: Option<&str>,
    timeout: Duration,
    body: &serde_json::Value,
) -> Result<Vec<f32>, LlmClientError> {
    extract_embedding(&post_json(url, api_key, timeout, body)?)
}

fn extract_chat_content(json: &serde_json::Value) -> Result<String, LlmClientError> {
    json.get("choices")
        .and_then(|c| c.get(0))
        .and_then(|c| c.get("message"))
        .and_then(|m| m.get("content"))
        .and_then(|c| c.as_str())
        .map(str::to_string)
        .ok_or_else(|| LlmClientError::Parse(format!("unexpected response format: {}", clip(&json.to_string()))))
}

fn extract_embedding(json: &serde_json::Value) -> Result<Vec<f32>, LlmClientError> {
    let values = json
        .get("data")
        .and_then(|d| d.get(0))
        .and_then(|d| d.get("embedding"))
        .and_then(|e| e.as_array())
        .ok_or_else(|| LlmClientError::Parse(format!("unexpected response format: {}", clip(&json.to_string()))))?;
    values
        .iter()
        .map(|v| {
            v.as_f64()
                .map(|f| f as f32)
                .ok_or_else(|| LlmClientError::Parse("embedding holds a non-number".to_string()))
        })
        .collect()
}

fn clip(text: &str) -> String {
    text.chars().take(200).collect()
}

// ============================================================================
// Retry
// ============================================================================

/// Run `call` at most twice, keeping the first answer `accept` takes.
///
/// A failed call or a rejected answer earns one retry. Timeouts and a
/// disabled feature are returned at once; the second rejection becomes a
/// `Parse` error.
pub fn retry_once<T>(
    operation: &str,
    call: impl Fn() -> Result<String, LlmClientError>,
    accept: impl Fn(&str) -> Option<T>,
) -> Result<T, LlmClientError> {
    let mut last = LlmClientError::Parse(format!("{}: model returned nothing usable", operation));
    for attempt in 1..=2 {
        match call() {
            Ok(text) => match accept(&text) {
                Some(value) => return Ok(value),
                None => {
                    last = LlmClientError::Parse(format!("{}: model returned nothing usable", operation));
                }
            },
            Err(e @ (LlmClientError::Timeout | LlmClientError::FeatureDisabled(_))) => return Err(e),
            Err(e) => last = e,
        }
        tracing::warn!(
            target: "ctse::llm_client",
            op = operation,
            attempt,
            error = %last,
            "Model call produced no answer"
        );
    }
    Err(last)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn test_extract_chat_content() {
        let json = serde_json::json!({
            "choices": [{"message": {"role": "assistant", "content": "1: 8"}}]
        });
        assert_eq!(extract_chat_content(&json).unwrap(), "1: 8");
        assert!(matches!(
            extract_chat_content(&serde_json::json!({"error": "x"})),
            Err(LlmClientError::Parse(_))
        ));
    }

    #[test]
    fn test_extract_embedding() {
        let json = serde_json::json!({"data": [{"embedding": [0.5, -1, 2.25]}]});
        assert_eq!(extract_embedding(&json).unwrap(), vec![0.5, -1.0, 2.25]);
        let bad = serde_json::json!({"data": [{"embedding": [0.5, "x"]}]});
        assert!(extract_embedding(&bad).is_err());
    }

    #[cfg(not(feature = "api"))]
    #[test]
    fn test_calls_without_feature() {
        let err = call_chat_completions("http://localhost/v1", None, Duration::from_secs(1), &serde_json::json!({}))
            .unwrap_err();
        assert_eq!(err, LlmClientError::FeatureDisabled("api"));
    }

    fn non_empty(text: &str) -> Option<String> {
        (!text.is_empty()).then(|| text.to_string())
    }

    #[test]
    fn test_retry_once_recovers_after_failure() {
        let calls = Cell::new(0);
        let result = retry_once(
            "test",
            || {
                calls.set(calls.get() + 1);
                if calls.get() == 1 {
                    Err(LlmClientError::Network("refused".into()))
                } else {
                    Ok("ok".to_string())
                }
            },
            non_empty,
        );
        assert_eq!(result.unwrap(), "ok");
        assert_eq!(calls.get(), 2);
    }

    #[test]
    fn test_retry_once_gives_up_on_empty() {
        let calls = Cell::new(0);
        let result = retry_once(
            "test",
            || {
                calls.set(calls.get() + 1);
                Ok(String::new())
            },
            non_empty,
        );
        assert!(matches!(result, Err(LlmClientError::Parse(_))));
        assert_eq!(calls.get(), 2);
    }

    #[test]
    fn test_timeout_is_not_retried() {
        let calls = Cell::new(0);
        let result = retry_once(
            "test",
            || {
                calls.set(calls.get() + 1);
                Err(LlmClientError::Timeout)
            },
            non_empty,
        );
        assert_eq!(result, Err(LlmClientError::Timeout));
        assert_eq!(calls.get(), 1);
    }
}
