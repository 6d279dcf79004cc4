//! LLM capability seam
//!
//! The process plane treats the LLM SDK as a pure capability:
//! `invoke(prompt, config, session_id, cancel)` yielding a stream of
//! [`LlmEvent`] frames. The runtime shim consumes that stream; nothing
//! else in the crate knows what is behind it. [`MockLlmClient`] backs the
//! `USE_MOCK_AI` mode with deterministic responses.

use crate::error::Result;
use crate::types::AgentConfig;
use async_trait::async_trait;
use futures::stream::Stream;
use std::pin::Pin;
use std::time::Duration;
use tokio::sync::watch;
use uuid::Uuid;

/// One frame from the LLM event stream
#[derive(Debug, Clone, PartialEq)]
pub enum LlmEvent {
    /// Echo of user input
    User {
        content: String,
        session_id: Option<String>,
    },
    /// Assistant output; `tokens` present when the frame carries usage
    Assistant {
        content: String,
        session_id: Option<String>,
        tokens: Option<u32>,
    },
    /// System/tool frame, forwarded with the meta flag
    Meta {
        content: String,
        session_id: Option<String>,
    },
    /// Terminal frame of the invocation
    Result {
        is_error: bool,
        content: String,
        session_id: Option<String>,
    },
    /// Stream-level error
    Error {
        message: String,
        aborted: bool,
    },
}

impl LlmEvent {
    /// Session handle carried by this frame, if any
    pub fn session_id(&self) -> Option<&str> {
        match self {
            LlmEvent::User { session_id, .. }
            | LlmEvent::Assistant { session_id, .. }
            | LlmEvent::Meta { session_id, .. }
            | LlmEvent::Result { session_id, .. } => session_id.as_deref(),
            LlmEvent::Error { .. } => None,
        }
    }
}

/// Boxed stream of LLM frames
pub type LlmEventStream = Pin<Box<dyn Stream<Item = LlmEvent> + Send>>;

/// The LLM SDK as the shim sees it
///
/// `cancel` flips to true when the caller aborts; implementations should
/// stop producing frames promptly after that.
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn invoke(
        &self,
        prompt: &str,
        config: &AgentConfig,
        session_id: Option<&str>,
        cancel: watch::Receiver<bool>,
    ) -> Result<LlmEventStream>;
}

/// Deterministic client for mock mode (`USE_MOCK_AI`)
#[derive(Debug, Clone, Default)]
pub struct MockLlmClient {
    delay: Option<Duration>,
}

impl MockLlmClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add artificial latency before the response frame
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay)
            .filter(|d| !d.is_zero());
        self
    }
}

#[async_trait]
impl LlmClient for MockLlmClient {
    async fn invoke(
        &self,
        prompt: &str,
        config: &AgentConfig,
        session_id: Option<&str>,
        _cancel: watch::Receiver<bool>,
    ) -> Result<LlmEventStream> {
        let session = session_id
            .map(str::to_string)
            .unwrap_or_else(|| format!("mock-{}", Uuid::new_v4()));
        let response = format!("[{}] {}", config.role, prompt);
        let delay = self.delay;

        let stream = async_stream::stream! {
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            yield LlmEvent::Assistant {
                content: response.clone(),
                session_id: Some(session.clone()),
                tokens: Some(response.len() as u32),
            };
            yield LlmEvent::Result {
                is_error: false,
                content: response.clone(),
                session_id: Some(session.clone()),
            };
        };
        Ok(Box::pin(stream))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    #[tokio::test]
    async fn test_mock_client_is_deterministic() {
        let client = MockLlmClient::new();
        let config = AgentConfig::for_role("developer");
        let (_tx, rx) = watch::channel(false);

        let mut stream = client.invoke("say hello", &config, Some("sess-1"), rx).await.unwrap();
        let first = stream.next().await.unwrap();

        match first {
            LlmEvent::Assistant { content, session_id, tokens } => {
                assert_eq!(content, "[developer] say hello");
                assert_eq!(session_id.as_deref(), Some("sess-1"));
                assert!(tokens.is_some());
            }
            other => panic!("expected assistant frame, got {other:?}"),
        }

        let last = stream.next().await.unwrap();
        assert!(matches!(last, LlmEvent::Result { is_error: false, .. }));
        assert!(stream.next().await.is_none());
    }

    #[tokio::test]
    async fn test_mock_client_mints_session_when_none_given() {
        let client = MockLlmClient::new();
        let config = AgentConfig::for_role("developer");
        let (_tx, rx) = watch::channel(false);

        let mut stream = client.invoke("hi", &config, None, rx).await.unwrap();
        let frame = stream.next().await.unwrap();
        assert!(frame.session_id().unwrap().starts_with("mock-"));
    }
}
