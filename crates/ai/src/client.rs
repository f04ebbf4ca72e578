use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum InferenceError {
    #[error("Inference request timed out")]
    Timeout,
    #[error("Inference transport error: {0}")]
    Transport(String),
    #[error("Inference endpoint returned status {0}")]
    Status(u16),
    #[error("Malformed inference response: {0}")]
    BadResponse(String),
}

/// One role/content pair of a chat exchange.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

/// The completion shape shared by OpenAI-compatible endpoints. Only the
/// first choice's content is ever consumed, and always as untrusted text.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InferenceResponse {
    pub choices: Vec<Choice>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Choice {
    pub message: ChoiceMessage,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChoiceMessage {
    pub content: String,
}

impl InferenceResponse {
    pub fn from_content(content: impl Into<String>) -> Self {
        InferenceResponse {
            choices: vec![Choice {
                message: ChoiceMessage {
                    content: content.into(),
                },
            }],
        }
    }

    pub fn first_content(&self) -> Option<&str> {
        self.choices.first().map(|c| c.message.content.as_str())
    }
}

/// Abstraction over the language-model collaborator. One attempt per call;
/// retry policy, if any, belongs to the caller.
#[async_trait]
pub trait InferenceClient: Send + Sync {
    async fn request_inference(
        &self,
        messages: &[ChatMessage],
    ) -> Result<InferenceResponse, InferenceError>;
}

// A shared client behind an Arc is itself a client, so the parser and the
// categorizer can hold the same connection.
#[async_trait]
impl<T: InferenceClient + ?Sized> InferenceClient for std::sync::Arc<T> {
    async fn request_inference(
        &self,
        messages: &[ChatMessage],
    ) -> Result<InferenceResponse, InferenceError> {
        (**self).request_inference(messages).await
    }
}

// ── Mock client (always available, used for tests) ────────────────────────────

/// Replays a scripted queue of responses and records every request, letting the
/// parser and categorizer be tested without a model. An exhausted queue is a
/// transport error so an unexpected extra call fails the test loudly.
pub struct MockInference {
    script: Mutex<VecDeque<Result<InferenceResponse, InferenceError>>>,
    received: Mutex<Vec<Vec<ChatMessage>>>,
    calls: AtomicUsize,
}

impl MockInference {
    pub fn new() -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            received: Mutex::new(Vec::new()),
            calls: AtomicUsize::new(0),
        }
    }

    /// A mock that answers each call, in order, with the given contents.
    pub fn replying<I, S>(contents: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mock = Self::new();
        for content in contents {
            mock.enqueue_content(content);
        }
        mock
    }

    /// A mock whose next call fails with the given error.
    pub fn failing(error: InferenceError) -> Self {
        let mock = Self::new();
        mock.enqueue_error(error);
        mock
    }

    pub fn enqueue_content(&self, content: impl Into<String>) {
        self.script
            .lock()
            .unwrap()
            .push_back(Ok(InferenceResponse::from_content(content)));
    }

    pub fn enqueue_error(&self, error: InferenceError) {
        self.script.lock().unwrap().push_back(Err(error));
    }

    /// Number of inference calls made so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// The message batches received, in call order.
    pub fn received(&self) -> Vec<Vec<ChatMessage>> {
        self.received.lock().unwrap().clone()
    }
}

impl Default for MockInference {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl InferenceClient for MockInference {
    async fn request_inference(
        &self,
        messages: &[ChatMessage],
    ) -> Result<InferenceResponse, InferenceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.received.lock().unwrap().push(messages.to_vec());
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(InferenceError::Transport("mock: no scripted response".into())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn mock_replays_script_in_order() {
        let mock = MockInference::replying(["first", "second"]);
        let r1 = mock.request_inference(&[ChatMessage::user("a")]).await.unwrap();
        let r2 = mock.request_inference(&[ChatMessage::user("b")]).await.unwrap();
        assert_eq!(r1.first_content(), Some("first"));
        assert_eq!(r2.first_content(), Some("second"));
        assert_eq!(mock.calls(), 2);
    }

    #[tokio::test]
    async fn mock_records_received_messages() {
        let mock = MockInference::replying(["ok"]);
        let messages = [ChatMessage::system("s"), ChatMessage::user("u")];
        mock.request_inference(&messages).await.unwrap();
        let received = mock.received();
        assert_eq!(received.len(), 1);
        assert_eq!(received[0][0].role, "system");
        assert_eq!(received[0][1].content, "u");
    }

    #[tokio::test]
    async fn exhausted_mock_errors() {
        let mock = MockInference::new();
        let result = mock.request_inference(&[ChatMessage::user("x")]).await;
        assert!(matches!(result, Err(InferenceError::Transport(_))));
    }

    #[test]
    fn first_content_on_empty_choices() {
        let response = InferenceResponse { choices: vec![] };
        assert_eq!(response.first_content(), None);
    }
}
