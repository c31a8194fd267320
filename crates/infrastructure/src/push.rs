//! 推送通知网关适配器

use application::{NotificationDispatcher, NotificationError};
use async_trait::async_trait;
use config::PushConfig;
use serde::Serialize;
use tracing::{debug, info};

#[derive(Debug, Serialize)]
struct PushRequest<'a> {
    to: &'a str,
    notification: PushNotification<'a>,
}

#[derive(Debug, Serialize)]
struct PushNotification<'a> {
    title: &'a str,
    body: &'a str,
}

/// 通过 HTTP 推送网关发送设备通知
#[derive(Clone)]
pub struct HttpPushDispatcher {
    client: reqwest::Client,
    endpoint: String,
    server_key: Option<String>,
}

impl HttpPushDispatcher {
    pub fn new(
        endpoint: impl Into<String>,
        server_key: Option<String>,
        timeout: std::time::Duration,
    ) -> Result<Self, NotificationError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| NotificationError::Transport(err.to_string()))?;

        Ok(Self {
            client,
            endpoint: endpoint.into(),
            server_key,
        })
    }

    pub fn from_config(config: &PushConfig) -> Result<Self, NotificationError> {
        let endpoint = config
            .endpoint
            .clone()
            .ok_or_else(|| NotificationError::Rejected("push endpoint is not configured".into()))?;
        Self::new(endpoint, config.server_key.clone(), config.timeout())
    }
}

#[async_trait]
impl NotificationDispatcher for HttpPushDispatcher {
    async fn send_to_token(
        &self,
        token: &str,
        title: &str,
        body: &str,
    ) -> Result<(), NotificationError> {
        let mut request = self.client.post(&self.endpoint).json(&PushRequest {
            to: token,
            notification: PushNotification { title, body },
        });
        if let Some(key) = &self.server_key {
            request = request.header(reqwest::header::AUTHORIZATION, format!("key={key}"));
        }

        let response = request
            .send()
            .await
            .map_err(|err| NotificationError::Transport(err.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(NotificationError::Rejected(format!("{status}: {detail}")));
        }

        debug!(status = %status, "push notification accepted");
        Ok(())
    }
}

/// 未启用推送网关时使用：只记录日志
#[derive(Debug, Default, Clone)]
pub struct LoggingNotificationDispatcher;

#[async_trait]
impl NotificationDispatcher for LoggingNotificationDispatcher {
    async fn send_to_token(
        &self,
        token: &str,
        title: &str,
        body: &str,
    ) -> Result<(), NotificationError> {
        let preview: String = body.chars().take(32).collect();
        info!(token_len = token.len(), title, body = %preview, "推送网关未启用，跳过发送");
        Ok(())
    }
}
