//! Optional LLM summary for outbound messages.

use async_trait::async_trait;
use log::{debug, warn};
use reqwest::Client;
use reqwest::header::{AUTHORIZATION, HeaderValue};
use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};
use crate::models::SummarizerConfig;
use crate::utils::http::create_client_with_timeout;

/// Produces a short text from structured context.
///
/// Summaries are decoration: implementations never fail, they fall back to
/// a placeholder.
#[async_trait]
pub trait Summarizer: Send + Sync {
    async fn summarize(&self, context: &str) -> String;
}

/// OpenAI-compatible chat completions client (DeepSeek by default).
pub struct ChatSummarizer {
    client: Client,
    config: SummarizerConfig,
}

impl ChatSummarizer {
    pub fn new(config: &SummarizerConfig, user_agent: &str) -> Result<Self> {
        Ok(Self {
            client: create_client_with_timeout(user_agent, config.timeout_secs)?,
            config: config.clone(),
        })
    }

    async fn request(&self, context: &str) -> Result<String> {
        let auth = HeaderValue::from_str(&format!("Bearer {}", self.config.api_key.trim()))
            .map_err(|e| AppError::config(format!("invalid LLM API key: {e}")))?;
        let body = ChatRequest {
            model: &self.config.model,
            temperature: self.config.temperature,
            max_tokens: self.config.max_tokens,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: &self.config.system_prompt,
                },
                ChatMessage {
                    role: "user",
                    content: context,
                },
            ],
        };

        let resp = self
            .client
            .post(&self.config.endpoint)
            .header(AUTHORIZATION, auth)
            .json(&body)
            .send()
            .await?
            .error_for_status()?;

        let parsed: ChatResponse = resp.json().await?;
        Ok(parsed
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .unwrap_or_default())
    }
}

#[async_trait]
impl Summarizer for ChatSummarizer {
    async fn summarize(&self, context: &str) -> String {
        if self.config.api_key.trim().is_empty() {
            warn!("Summarizer enabled without an API key");
            return self.config.placeholder.clone();
        }

        match self.request(context).await {
            Ok(text) if !text.trim().is_empty() => {
                debug!("Summary: {} chars", text.chars().count());
                text.trim().to_string()
            }
            Ok(_) => {
                warn!("Summarizer returned an empty answer");
                self.config.placeholder.clone()
            }
            Err(e) => {
                warn!("Summarizer failed: {}", e);
                self.config.placeholder.clone()
            }
        }
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    temperature: f32,
    max_tokens: u32,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: AssistantMessage,
}

#[derive(Debug, Deserialize)]
struct AssistantMessage {
    content: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn summarizer(server: &MockServer, api_key: &str) -> ChatSummarizer {
        let config = SummarizerConfig {
            enabled: true,
            endpoint: format!("{}/v1/chat/completions", server.uri()),
            api_key: api_key.into(),
            placeholder: "n/a".into(),
            ..SummarizerConfig::default()
        };
        ChatSummarizer::new(&config, "pushwatch-test").unwrap()
    }

    #[tokio::test]
    async fn test_summarize() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(header("authorization", "Bearer sk-test"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "choices": [{"message": {"role": "assistant", "content": " 两部新番更新 "}}]
            })))
            .mount(&server)
            .await;

        assert_eq!(summarizer(&server, "sk-test").summarize("A; B").await, "两部新番更新");
    }

    #[tokio::test]
    async fn test_failure_falls_back_to_placeholder() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        assert_eq!(summarizer(&server, "sk-test").summarize("A").await, "n/a");
    }

    #[tokio::test]
    async fn test_missing_key_skips_request() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        assert_eq!(summarizer(&server, " ").summarize("A").await, "n/a");
    }
}
