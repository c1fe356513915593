//! OpenAI-compatible streaming generation backend.
//!
//! Talks to any `/chat/completions` endpoint that supports `stream: true`
//! and function tools (OpenAI, Ollama, vLLM, LM Studio, ...).

mod client;
pub mod sse;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use docent_core::config::GenerationConfig;
use docent_core::types::ChatMessage;

use crate::backend::{GenerationBackend, GenerationStream};
use crate::error::ChatError;
use crate::tools::ToolDeclaration;

use self::client::OpenAiStream;
use self::sse::{WireMessage, WireTool};

/// Connection settings shared by every stream of one backend.
#[derive(Debug)]
pub(crate) struct Settings {
    pub http: reqwest::Client,
    pub url: String,
    pub model: String,
    pub api_key: Option<String>,
    pub temperature: f32,
    pub idle_timeout: Duration,
    pub max_tool_rounds: u32,
}

/// Generation backend for OpenAI-compatible chat-completion servers.
#[derive(Debug, Clone)]
pub struct OpenAiBackend {
    settings: Arc<Settings>,
}

impl OpenAiBackend {
    pub fn new(config: &GenerationConfig) -> Result<Self, ChatError> {
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .build()
            .map_err(|e| ChatError::BackendUnavailable(format!("HTTP client: {}", e)))?;

        Ok(Self {
            settings: Arc::new(Settings {
                http,
                url: format!("{}/chat/completions", config.endpoint.trim_end_matches('/')),
                model: config.model.clone(),
                api_key: config.api_key(),
                temperature: config.temperature,
                idle_timeout: Duration::from_secs(config.idle_timeout_secs),
                max_tool_rounds: config.max_tool_rounds,
            }),
        })
    }

    /// Full URL of the completions endpoint.
    pub fn url(&self) -> &str {
        &self.settings.url
    }
}

#[async_trait]
impl GenerationBackend for OpenAiBackend {
    async fn open_stream(
        &self,
        transcript: Vec<ChatMessage>,
        tools: Vec<ToolDeclaration>,
        cancel: CancellationToken,
    ) -> Result<Box<dyn GenerationStream>, ChatError> {
        let messages = transcript.iter().map(WireMessage::from_chat).collect();
        let tools = tools.iter().map(WireTool::from).collect();
        let mut stream = OpenAiStream::new(self.settings.clone(), messages, tools, cancel);
        stream.start_round().await?;
        Ok(Box::new(stream))
    }

    fn name(&self) -> &str {
        &self.settings.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_joins_endpoint() {
        let config = GenerationConfig {
            endpoint: "http://localhost:11434/v1/".to_string(),
            ..Default::default()
        };
        let backend = OpenAiBackend::new(&config).unwrap();
        assert_eq!(backend.url(), "http://localhost:11434/v1/chat/completions");
        assert_eq!(backend.name(), config.model);
    }
}
