//! Completion service seam and its Ollama implementation.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use tenderwatch_shared::{CompletionConfig, CompletionError, Result, RetryPolicy, TenderError};

/// Text generation backend consulted by the decision engine.
#[async_trait]
pub trait CompletionService: Send + Sync {
    /// Send a prompt and return the raw model output, which should be one JSON object.
    async fn complete(&self, prompt: &str) -> std::result::Result<String, CompletionError>;

    /// Model name recorded in decision metadata.
    fn model(&self) -> &str;
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    format: &'static str,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    response: String,
}

/// Ollama `/api/generate` client.
pub struct OllamaClient {
    client: Client,
    endpoint: String,
    model: String,
    timeout_secs: u64,
    retry: RetryPolicy,
}

impl OllamaClient {
    pub fn new(config: &CompletionConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| TenderError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            endpoint: format!("{}/api/generate", config.base_url.trim_end_matches('/')),
            model: config.model.clone(),
            timeout_secs: config.timeout_secs,
            retry: config.retry_policy(),
        })
    }

    async fn generate_once(&self, prompt: &str) -> std::result::Result<String, CompletionError> {
        let request = GenerateRequest {
            model: &self.model,
            prompt,
            stream: false,
            format: "json",
        };

        let response = self
            .client
            .post(&self.endpoint)
            .json(&request)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CompletionError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: GenerateResponse = response.json().await.map_err(|e| self.transport_error(e))?;
        Ok(parsed.response)
    }

    fn transport_error(&self, err: reqwest::Error) -> CompletionError {
        if err.is_timeout() {
            CompletionError::Timeout(self.timeout_secs)
        } else {
            CompletionError::Transport(err.to_string())
        }
    }
}

#[async_trait]
impl CompletionService for OllamaClient {
    #[instrument(skip_all, fields(model = %self.model, prompt_chars = prompt.chars().count()))]
    async fn complete(&self, prompt: &str) -> std::result::Result<String, CompletionError> {
        let output = self
            .retry
            .run("completion", CompletionError::is_retryable, |_| self.generate_once(prompt))
            .await?;
        debug!(response_chars = output.chars().count(), "completion received");
        Ok(output)
    }

    fn model(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config(server: &MockServer) -> CompletionConfig {
        CompletionConfig {
            base_url: server.uri(),
            model: "qwen2.5:0.5b".into(),
            timeout_secs: 1,
            max_attempts: 2,
            backoff_ms: 0,
            ..CompletionConfig::default()
        }
    }

    #[tokio::test]
    async fn requests_single_json_object() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/generate"))
            .and(body_partial_json(serde_json::json!({
                "model": "qwen2.5:0.5b",
                "stream": false,
                "format": "json",
            })))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"response": "{\"fit_label\":\"SKIP\"}"})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let client = OllamaClient::new(&config(&server)).unwrap();
        let output = client.complete("prompt").await.unwrap();
        assert_eq!(output, "{\"fit_label\":\"SKIP\"}");
        assert_eq!(client.model(), "qwen2.5:0.5b");
    }

    #[tokio::test]
    async fn server_errors_are_retried() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/generate"))
            .respond_with(ResponseTemplate::new(503).set_body_string("loading model"))
            .expect(2)
            .mount(&server)
            .await;

        let err = OllamaClient::new(&config(&server))
            .unwrap()
            .complete("prompt")
            .await
            .unwrap_err();
        assert!(matches!(err, CompletionError::Status { status: 503, .. }));
    }

    #[tokio::test]
    async fn client_errors_are_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/generate"))
            .respond_with(ResponseTemplate::new(404).set_body_string("model not found"))
            .expect(1)
            .mount(&server)
            .await;

        let err = OllamaClient::new(&config(&server))
            .unwrap()
            .complete("prompt")
            .await
            .unwrap_err();
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn slow_response_is_timeout() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/generate"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"response": "{}"}))
                    .set_delay(Duration::from_millis(1500)),
            )
            .mount(&server)
            .await;

        let mut config = config(&server);
        config.max_attempts = 1;
        let err = OllamaClient::new(&config).unwrap().complete("prompt").await.unwrap_err();
        assert!(matches!(err, CompletionError::Timeout(1)));
    }
}
