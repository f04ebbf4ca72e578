use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use tracing::debug;

use crate::client::{ChatMessage, InferenceClient, InferenceError, InferenceResponse};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Inference over an OpenAI-compatible `/chat/completions` endpoint
/// (Ollama, llama.cpp, or a hosted provider). The whole request is wrapped
/// in a hard deadline; a timed-out call is reported as failed and the
/// caller's fallback policy applies.
pub struct HttpInference {
    client: reqwest::Client,
    base_url: String,
    model: String,
    api_key: Option<String>,
    timeout: Duration,
}

impl HttpInference {
    pub fn new(base_url: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
            model: model.into(),
            api_key: None,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }

    async fn send(&self, messages: &[ChatMessage]) -> Result<InferenceResponse, InferenceError> {
        let body = request_body(&self.model, messages);

        let mut request = self.client.post(self.endpoint()).json(&body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| InferenceError::Transport(e.to_string()))?;

        if !response.status().is_success() {
            return Err(InferenceError::Status(response.status().as_u16()));
        }

        response
            .json::<InferenceResponse>()
            .await
            .map_err(|e| InferenceError::BadResponse(e.to_string()))
    }
}

fn request_body(model: &str, messages: &[ChatMessage]) -> serde_json::Value {
    json!({
        "model": model,
        "messages": messages,
        "stream": false,
    })
}

#[async_trait]
impl InferenceClient for HttpInference {
    async fn request_inference(
        &self,
        messages: &[ChatMessage],
    ) -> Result<InferenceResponse, InferenceError> {
        debug!(model = %self.model, messages = messages.len(), "requesting inference");
        match tokio::time::timeout(self.timeout, self.send(messages)).await {
            Ok(result) => result,
            Err(_) => Err(InferenceError::Timeout),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_body_carries_model_and_messages() {
        let messages = [ChatMessage::system("s"), ChatMessage::user("u")];
        let body = request_body("llama3.2", &messages);
        assert_eq!(body["model"], "llama3.2");
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][1]["content"], "u");
        assert_eq!(body["stream"], false);
    }

    #[test]
    fn endpoint_normalizes_trailing_slash() {
        let a = HttpInference::new("http://localhost:11434/v1/", "m");
        let b = HttpInference::new("http://localhost:11434/v1", "m");
        assert_eq!(a.endpoint(), "http://localhost:11434/v1/chat/completions");
        assert_eq!(b.endpoint(), a.endpoint());
    }

    #[test]
    fn completion_payload_deserializes() {
        let payload = r#"{
            "id": "chatcmpl-1",
            "choices": [
                { "index": 0, "message": { "role": "assistant", "content": "{\"headers\": \"a,b,c\"}" }, "finish_reason": "stop" }
            ],
            "usage": { "total_tokens": 42 }
        }"#;
        let response: InferenceResponse = serde_json::from_str(payload).unwrap();
        assert_eq!(response.first_content(), Some("{\"headers\": \"a,b,c\"}"));
    }
}
