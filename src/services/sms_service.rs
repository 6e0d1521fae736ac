use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;

use crate::config::AppConfig;
use crate::errors::{AppError, Result};

const AFRICASTALKING_URL: &str = "https://api.africastalking.com/version1/messaging";

/// Text and email delivery for customer-facing messages.
#[async_trait]
pub trait MessageDispatcher: Send + Sync {
    async fn send_sms(&self, phone: &str, message: &str) -> Result<()>;
    async fn send_email(&self, to: &str, subject: &str, body: &str) -> Result<()>;
}

#[derive(Clone)]
pub struct SMSService {
    api_key: String,
    username: String,
    from: String,
    mail_api_url: String,
    mail_api_key: String,
    mail_from: String,
    client: Client,
}

impl SMSService {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            api_key: config.sms_api_key.clone(),
            username: config.sms_username.clone(),
            from: config.sms_from.clone(),
            mail_api_url: config.mail_api_url.clone(),
            mail_api_key: config.mail_api_key.clone(),
            mail_from: config.mail_from.clone(),
            client: Client::new(),
        }
    }
}

#[async_trait]
impl MessageDispatcher for SMSService {
    async fn send_sms(&self, phone: &str, message: &str) -> Result<()> {
        if self.api_key.is_empty() {
            tracing::debug!("SMS not configured, skipping message to {}", phone);
            return Ok(());
        }

        let response = self
            .client
            .post(AFRICASTALKING_URL)
            .header("apiKey", &self.api_key)
            .header("Accept", "application/json")
            .form(&[
                ("username", self.username.as_str()),
                ("to", phone),
                ("message", message),
                ("from", self.from.as_str()),
            ])
            .send()
            .await
            .map_err(|e| AppError::gateway(format!("SMS API error: {}", e), true))?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(AppError::gateway(
                format!("SMS sending failed with status: {}", response.status()),
                response.status().is_server_error(),
            ))
        }
    }

    async fn send_email(&self, to: &str, subject: &str, body: &str) -> Result<()> {
        if self.mail_api_url.is_empty() {
            tracing::debug!("Mail API not configured, skipping email to {}", to);
            return Ok(());
        }

        let response = self
            .client
            .post(&self.mail_api_url)
            .bearer_auth(&self.mail_api_key)
            .json(&json!({
                "from": self.mail_from,
                "to": to,
                "subject": subject,
                "text": body,
            }))
            .send()
            .await
            .map_err(|e| AppError::gateway(format!("Mail API error: {}", e), true))?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(AppError::gateway(
                format!("Email sending failed with status: {}", response.status()),
                response.status().is_server_error(),
            ))
        }
    }
}
