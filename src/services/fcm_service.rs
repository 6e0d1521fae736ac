// src/services/fcm_service.rs

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};

use crate::errors::{AppError, Result};

const FCM_SEND_URL: &str = "https://fcm.googleapis.com/fcm/send";

pub const CLICK_ACTION: &str = "FLUTTER_NOTIFICATION_CLICK";

#[async_trait]
pub trait PushNotifier: Send + Sync {
    async fn send_to_device(
        &self,
        token: &str,
        title: &str,
        body: &str,
        data: Value,
        click_action: &str,
    ) -> Result<()>;
}

pub struct FCMService {
    server_key: String,
    client: Client,
}

impl FCMService {
    pub fn new(server_key: String) -> Self {
        Self {
            server_key,
            client: Client::new(),
        }
    }
}

#[async_trait]
impl PushNotifier for FCMService {
    async fn send_to_device(
        &self,
        token: &str,
        title: &str,
        body: &str,
        data: Value,
        click_action: &str,
    ) -> Result<()> {
        let message = json!({
            "to": token,
            "priority": "high",
            "notification": {
                "title": title,
                "body": body,
                "sound": "default",
                "click_action": click_action,
            },
            "data": data,
        });

        let response = self
            .client
            .post(FCM_SEND_URL)
            .header("Authorization", format!("key={}", self.server_key))
            .json(&message)
            .send()
            .await
            .map_err(|e| AppError::gateway(format!("FCM request failed: {}", e), true))?;

        if response.status().is_success() {
            tracing::info!("✅ Push sent: {}", title);
            Ok(())
        } else {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            Err(AppError::gateway(
                format!("FCM returned {}: {}", status, error_text),
                status.is_server_error(),
            ))
        }
    }
}

/// Used when no FCM key is configured.
pub struct DisabledPush;

#[async_trait]
impl PushNotifier for DisabledPush {
    async fn send_to_device(
        &self,
        _token: &str,
        title: &str,
        _body: &str,
        _data: Value,
        _click_action: &str,
    ) -> Result<()> {
        tracing::debug!("Push disabled, dropping notification: {}", title);
        Ok(())
    }
}
