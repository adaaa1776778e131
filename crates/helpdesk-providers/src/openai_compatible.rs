//! OpenAI-compatible chat completions client.

use crate::LlmClient;
use crate::classify::{LlmError, LlmErrorKind, classify_failure};
use async_trait::async_trait;
use helpdesk_core::config::LlmConfig;
use helpdesk_core::error::{HelpdeskError, Result};
use helpdesk_core::types::Message;
use serde_json::{Value, json};
use std::time::Duration;

pub struct OpenAiCompatibleClient {
    base_url: String,
    api_key: String,
    model: String,
    temperature: f32,
    max_tokens: u32,
    client: reqwest::Client,
}

impl OpenAiCompatibleClient {
    pub fn new(config: &LlmConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs.max(1)))
            .build()
            .map_err(|e| HelpdeskError::Provider(format!("HTTP client init failed: {e}")))?;
        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            client,
        })
    }

    /// Local servers (Ollama, llama.cpp) run without a key.
    fn apply_auth(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        if self.api_key.is_empty() {
            req
        } else {
            req.bearer_auth(&self.api_key)
        }
    }
}

#[async_trait]
impl LlmClient for OpenAiCompatibleClient {
    fn name(&self) -> &str {
        &self.model
    }

    async fn chat(&self, messages: &[Message]) -> std::result::Result<String, LlmError> {
        let body = json!({
            "model": self.model,
            "temperature": self.temperature,
            "max_tokens": self.max_tokens,
            "messages": messages,
        });

        let url = format!("{}/chat/completions", self.base_url);
        let req = self.apply_auth(self.client.post(&url).json(&body));
        let resp = req.send().await.map_err(|e| {
            let err = LlmError::from_transport(&e);
            tracing::warn!("⚠️ LLM request to {url} failed ({}): {e}", err.kind);
            err
        })?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            let kind = classify_failure(status.as_u16(), &text);
            tracing::warn!("⚠️ LLM API error {status} ({kind}): {text}");
            return Err(LlmError::new(kind, format!("{status}: {text}")));
        }

        let json: Value = resp
            .json()
            .await
            .map_err(|e| LlmError::from_transport(&e))?;
        let content = json["choices"]
            .get(0)
            .and_then(|c| c["message"]["content"].as_str())
            .map(str::trim)
            .ok_or_else(|| LlmError::new(LlmErrorKind::Other, "No choices in response"))?;
        if content.is_empty() {
            return Err(LlmError::new(LlmErrorKind::Other, "Empty completion"));
        }

        if let Some(total) = json["usage"]["total_tokens"].as_u64() {
            tracing::debug!("🧠 {} answered using {total} tokens", self.model);
        }
        Ok(content.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config(server: &MockServer) -> LlmConfig {
        LlmConfig {
            base_url: format!("{}/v1/", server.uri()),
            api_key: "sk-test".into(),
            model: "test-model".into(),
            timeout_secs: 1,
            ..LlmConfig::default()
        }
    }

    fn completion(text: &str) -> Value {
        json!({
            "choices": [{ "message": { "role": "assistant", "content": text }, "finish_reason": "stop" }],
            "usage": { "prompt_tokens": 10, "completion_tokens": 5, "total_tokens": 15 }
        })
    }

    async fn failing_with(status: u16, body: &str) -> LlmErrorKind {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(status).set_body_string(body))
            .mount(&server)
            .await;
        let client = OpenAiCompatibleClient::new(&config(&server)).unwrap();
        client.chat(&[Message::user("hi")]).await.unwrap_err().kind
    }

    #[tokio::test]
    async fn test_chat_success() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(header("authorization", "Bearer sk-test"))
            .and(body_partial_json(json!({
                "model": "test-model",
                "messages": [{ "role": "system", "content": "be nice" }, { "role": "user", "content": "hi" }]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(completion("  Hello there!  ")))
            .expect(1)
            .mount(&server)
            .await;

        let client = OpenAiCompatibleClient::new(&config(&server)).unwrap();
        let reply = client
            .chat(&[Message::system("be nice"), Message::user("hi")])
            .await
            .unwrap();
        assert_eq!(reply, "Hello there!");
    }

    #[tokio::test]
    async fn test_typed_failures() {
        assert_eq!(failing_with(401, r#"{"error":"Incorrect API key"}"#).await, LlmErrorKind::Auth);
        assert_eq!(
            failing_with(429, r#"{"error":{"code":"insufficient_quota"}}"#).await,
            LlmErrorKind::Billing
        );
        assert_eq!(failing_with(429, "slow down").await, LlmErrorKind::RateLimit);
        assert_eq!(failing_with(503, "").await, LlmErrorKind::Unavailable);
    }

    #[tokio::test]
    async fn test_empty_choices() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "choices": [] })))
            .mount(&server)
            .await;
        let client = OpenAiCompatibleClient::new(&config(&server)).unwrap();
        let err = client.chat(&[Message::user("hi")]).await.unwrap_err();
        assert_eq!(err.kind, LlmErrorKind::Other);
    }

    #[tokio::test]
    async fn test_timeout() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(completion("late"))
                    .set_delay(Duration::from_secs(3)),
            )
            .mount(&server)
            .await;
        let client = OpenAiCompatibleClient::new(&config(&server)).unwrap();
        let err = client.chat(&[Message::user("hi")]).await.unwrap_err();
        assert_eq!(err.kind, LlmErrorKind::Timeout);
    }
}
