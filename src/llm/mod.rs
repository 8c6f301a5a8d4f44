//! Model backends.
//!
//! A [`ModelClient`] turns a system prompt plus history into a stream of
//! text fragments. The HTTP implementation speaks the OpenAI-compatible
//! chat completions API and the Anthropic messages API.

use crate::config::{Config, Provider};
use crate::conversation::Message;
use async_trait::async_trait;
use futures::stream::BoxStream;
use reqwest::Client;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

pub mod anthropic;
pub mod error;
pub mod openai;
pub mod sse;

pub use error::{extract_error_message, ModelError, ModelErrorKind};

/// Incremental model output. Ends without an error once cancelled.
pub type TextStream = BoxStream<'static, Result<String, ModelError>>;

/// Where and as whom to call the model.
#[derive(Debug, Clone, PartialEq)]
pub struct Endpoint {
    pub provider: Provider,
    pub base_url: String,
    pub api_key: String,
    pub model: String,
}

impl Endpoint {
    pub fn from_config(config: &Config) -> Self {
        Self {
            provider: config.provider,
            base_url: config.api_base_url.clone(),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Limits {
    pub max_output_tokens: Option<u32>,
}

impl Limits {
    /// Anthropic requires an explicit cap; other providers use their own.
    pub fn for_provider(provider: Provider) -> Self {
        match provider {
            Provider::Anthropic => Self {
                max_output_tokens: Some(anthropic::DEFAULT_MAX_TOKENS),
            },
            Provider::OpenAi => Self::default(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub endpoint: Endpoint,
    pub system_prompt: String,
    pub messages: Vec<Message>,
    pub limits: Limits,
}

#[async_trait]
pub trait ModelClient: Send + Sync {
    /// Issue the request and return its output stream. Every call is a new
    /// request; the stream cannot be replayed.
    async fn stream(
        &self,
        request: GenerationRequest,
        cancel: CancellationToken,
    ) -> Result<TextStream, ModelError>;
}

/// Model client backed by `reqwest`, dispatching on the configured provider.
#[derive(Debug, Clone)]
pub struct HttpModelClient {
    client: Client,
}

impl HttpModelClient {
    pub fn new() -> Self {
        Self {
            client: Client::builder()
                .connect_timeout(Duration::from_secs(30))
                .build()
                .unwrap_or_else(|_| Client::new()),
        }
    }
}

impl Default for HttpModelClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ModelClient for HttpModelClient {
    async fn stream(
        &self,
        request: GenerationRequest,
        cancel: CancellationToken,
    ) -> Result<TextStream, ModelError> {
        if request.messages.is_empty() {
            return Err(ModelError::invalid_request("history is empty"));
        }
        match request.endpoint.provider {
            Provider::OpenAi => openai::stream(&self.client, &request, cancel).await,
            Provider::Anthropic => anthropic::stream(&self.client, &request, cancel).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_limits_per_provider() {
        assert_eq!(
            Limits::for_provider(Provider::Anthropic).max_output_tokens,
            Some(8192)
        );
        assert_eq!(Limits::for_provider(Provider::OpenAi).max_output_tokens, None);
    }

    #[tokio::test]
    async fn test_empty_history_rejected() {
        let client = HttpModelClient::new();
        let request = GenerationRequest {
            endpoint: Endpoint::from_config(&Config::default()),
            system_prompt: String::new(),
            messages: Vec::new(),
            limits: Limits::default(),
        };
        let err = client
            .stream(request, CancellationToken::new())
            .await
            .err()
            .expect("empty history must fail");
        assert_eq!(err.kind, ModelErrorKind::InvalidRequest);
    }
}
