// config.rs
use std::env;
use std::time::Duration;

use crate::errors::{AppError, Result};

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub database_name: String,
    pub paystack_secret_key: String,
    pub paystack_base_url: String,
    pub paystack_callback_url: String,
    pub gateway_timeout: Duration,
    pub reconciliation_interval: Duration,
    pub reconciliation_threshold: Duration,
    pub reconciliation_batch_size: i64,
    pub fcm_server_key: String,
    pub sms_api_key: String,
    pub sms_username: String,
    pub sms_from: String,
    pub mail_api_url: String,
    pub mail_api_key: String,
    pub mail_from: String,
    pub jwt_secret: String,
    pub host: String,
    pub port: u16,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the config from any key lookup so it can be exercised without
    /// touching the process environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |key: &str| {
            lookup(key)
                .filter(|v| !v.trim().is_empty())
                .ok_or_else(|| AppError::configuration(format!("{} must be set", key)))
        };
        let optional = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());
        let seconds = |key: &str, default: u64| -> Result<Duration> {
            match lookup(key) {
                Some(raw) => raw
                    .trim()
                    .parse::<u64>()
                    .map(Duration::from_secs)
                    .map_err(|_| AppError::configuration(format!("{} must be a number of seconds", key))),
                None => Ok(Duration::from_secs(default)),
            }
        };

        let port = optional("PORT", "3000")
            .parse::<u16>()
            .map_err(|_| AppError::configuration("PORT must be a number"))?;

        let reconciliation_batch_size = optional("RECONCILIATION_BATCH_SIZE", "100")
            .parse::<i64>()
            .map_err(|_| AppError::configuration("RECONCILIATION_BATCH_SIZE must be a number"))?;

        Ok(AppConfig {
            database_url: required("DATABASE_URL")?,
            database_name: optional("DATABASE_NAME", "aquaflow"),
            paystack_secret_key: required("PAYSTACK_SECRET_KEY")?,
            paystack_base_url: optional("PAYSTACK_BASE_URL", "https://api.paystack.co"),
            paystack_callback_url: required("PAYSTACK_CALLBACK_URL")?,
            gateway_timeout: seconds("GATEWAY_TIMEOUT_SECS", 60)?,
            reconciliation_interval: seconds("RECONCILIATION_INTERVAL_SECS", 60)?,
            reconciliation_threshold: seconds("RECONCILIATION_THRESHOLD_SECS", 300)?,
            reconciliation_batch_size,
            fcm_server_key: optional("FCM_SERVER_KEY", ""),
            sms_api_key: optional("SMS_API_KEY", ""),
            sms_username: optional("SMS_USERNAME", "sandbox"),
            sms_from: optional("SMS_FROM", "Aquaflow"),
            mail_api_url: optional("MAIL_API_URL", ""),
            mail_api_key: optional("MAIL_API_KEY", ""),
            mail_from: optional("MAIL_FROM", "no-reply@aquaflow.app"),
            jwt_secret: required("JWT_SECRET")?,
            host: optional("HOST", "0.0.0.0"),
            port,
        })
    }

    pub fn push_enabled(&self) -> bool {
        !self.fcm_server_key.is_empty()
    }

    pub fn email_enabled(&self) -> bool {
        !self.mail_api_url.is_empty()
    }

    pub fn get_config_info(&self) -> serde_json::Value {
        serde_json::json!({
            "database_name": self.database_name,
            "paystack_base_url": self.paystack_base_url,
            "paystack_secret_key_set": !self.paystack_secret_key.is_empty(),
            "callback_url": self.paystack_callback_url,
            "gateway_timeout_secs": self.gateway_timeout.as_secs(),
            "reconciliation_interval_secs": self.reconciliation_interval.as_secs(),
            "reconciliation_threshold_secs": self.reconciliation_threshold.as_secs(),
            "push_enabled": self.push_enabled(),
            "email_enabled": self.email_enabled(),
            "port": self.port,
            "host": self.host,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn base() -> HashMap<&'static str, &'static str> {
        HashMap::from([
            ("DATABASE_URL", "mongodb://localhost:27017"),
            ("PAYSTACK_SECRET_KEY", "sk_test_123"),
            ("PAYSTACK_CALLBACK_URL", "https://aquaflow.app/paid"),
            ("JWT_SECRET", "secret"),
        ])
    }

    #[test]
    fn defaults_fill_optional_keys() {
        let vars = base();
        let cfg = AppConfig::from_lookup(|k| vars.get(k).map(|v| v.to_string())).unwrap();

        assert_eq!(cfg.database_name, "aquaflow");
        assert_eq!(cfg.gateway_timeout, Duration::from_secs(60));
        assert_eq!(cfg.reconciliation_threshold, Duration::from_secs(300));
        assert_eq!(cfg.port, 3000);
        assert!(!cfg.push_enabled());
        assert!(!cfg.email_enabled());
    }

    #[test]
    fn missing_required_key_is_a_configuration_error() {
        let mut vars = base();
        vars.remove("PAYSTACK_SECRET_KEY");
        let err = AppConfig::from_lookup(|k| vars.get(k).map(|v| v.to_string())).unwrap_err();

        assert!(matches!(err, AppError::Configuration(msg) if msg.contains("PAYSTACK_SECRET_KEY")));
    }

    #[test]
    fn malformed_duration_is_rejected() {
        let mut vars = base();
        vars.insert("RECONCILIATION_INTERVAL_SECS", "soon");
        let err = AppConfig::from_lookup(|k| vars.get(k).map(|v| v.to_string())).unwrap_err();

        assert!(matches!(err, AppError::Configuration(_)));
    }
}
