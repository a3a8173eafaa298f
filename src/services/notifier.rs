//! Push delivery.

use async_trait::async_trait;
use log::{info, warn};
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::models::{Message, NotifierConfig};
use crate::utils::http::create_client_with_timeout;

/// Outcome of one delivery attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotifyResult {
    Success,
    Failure(String),
}

impl NotifyResult {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }
}

/// Delivers a message to subscribers.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, message: &Message) -> NotifyResult;
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PushRequest<'a> {
    app_token: &'a str,
    content: &'a str,
    content_type: u8,
    topic_ids: &'a [u64],
    #[serde(skip_serializing_if = "Option::is_none")]
    summary: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct PushResponse {
    code: i64,
    #[serde(default)]
    msg: String,
}

/// WxPusher topic push.
///
/// Delivery counts as successful only when the endpoint answers 2xx and
/// its JSON `code` equals the configured success code.
pub struct WxPusherNotifier {
    client: Client,
    config: NotifierConfig,
}

impl WxPusherNotifier {
    pub fn new(config: &NotifierConfig, user_agent: &str) -> Result<Self> {
        Ok(Self {
            client: create_client_with_timeout(user_agent, config.timeout_secs)?,
            config: config.clone(),
        })
    }

    async fn send(&self, message: &Message) -> std::result::Result<(), String> {
        let body = PushRequest {
            app_token: &self.config.app_token,
            content: &message.content,
            content_type: self.config.content_type,
            topic_ids: &self.config.topic_ids,
            summary: message.summary.as_deref(),
        };

        let response = self
            .client
            .post(&self.config.endpoint)
            .json(&body)
            .send()
            .await
            .map_err(|e| format!("request failed: {e}"))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .unwrap_or_else(|_| "<body unavailable>".to_string());
        if !status.is_success() {
            return Err(format!("HTTP {status}: {text}"));
        }

        let parsed: PushResponse =
            serde_json::from_str(&text).map_err(|e| format!("unreadable response: {e}"))?;
        if parsed.code != self.config.success_code {
            return Err(format!("code {}: {}", parsed.code, parsed.msg));
        }
        Ok(())
    }
}

#[async_trait]
impl Notifier for WxPusherNotifier {
    async fn notify(&self, message: &Message) -> NotifyResult {
        match self.send(message).await {
            Ok(()) => {
                info!(
                    "Pushed {} record(s) to {} topic(s) [{}]",
                    message.record_count,
                    self.config.topic_ids.len(),
                    &message.idempotence_key[..message.idempotence_key.len().min(12)]
                );
                NotifyResult::Success
            }
            Err(reason) => {
                warn!("Push failed: {}", reason);
                NotifyResult::Failure(reason)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn message() -> Message {
        Message {
            summary: Some("2 updates".into()),
            content: "- A 5\n- B 2\n".into(),
            idempotence_key: crate::models::fingerprint(["A||5", "B||2"]),
            record_count: 2,
        }
    }

    fn notifier(server: &MockServer) -> WxPusherNotifier {
        let config = NotifierConfig {
            endpoint: format!("{}/api/send/message", server.uri()),
            app_token: "AT_test".into(),
            topic_ids: vec![42],
            ..NotifierConfig::default()
        };
        WxPusherNotifier::new(&config, "pushwatch-test").unwrap()
    }

    #[tokio::test]
    async fn test_success() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/send/message"))
            .and(body_partial_json(serde_json::json!({
                "appToken": "AT_test",
                "contentType": 3,
                "topicIds": [42],
                "summary": "2 updates"
            })))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"code": 1000, "msg": "处理成功"})),
            )
            .expect(1)
            .mount(&server)
            .await;

        assert_eq!(notifier(&server).notify(&message()).await, NotifyResult::Success);
    }

    #[tokio::test]
    async fn test_application_error_code() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"code": 1001, "msg": "appToken error"})),
            )
            .mount(&server)
            .await;

        let result = notifier(&server).notify(&message()).await;
        assert_eq!(result, NotifyResult::Failure("code 1001: appToken error".into()));
    }

    #[tokio::test]
    async fn test_http_error_and_garbage() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(502))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
            .mount(&server)
            .await;

        let n = notifier(&server);
        assert!(!n.notify(&message()).await.is_success());
        assert!(!n.notify(&message()).await.is_success());
    }
}
