use bson::oid::ObjectId;
use chrono::Utc;
use serde_json::Value;
use tracing::info;

use crate::errors::{AppError, Result};
use crate::models::payment_method::PaymentMethod;
use crate::models::transaction::PaymentChannel;
use crate::store::PaymentMethodStoreRef;

/// What a successful charge tells us about the instrument that paid.
#[derive(Debug, Clone)]
pub struct InstrumentDetails {
    pub user_id: String,
    pub provider: String,
    pub channel: PaymentChannel,
    pub scheme: Option<String>,
    pub unique_id: String,
    pub authorization_code: Option<String>,
    pub raw_data: Value,
}

impl InstrumentDetails {
    fn display_name(&self) -> String {
        let label = match (&self.scheme, self.channel) {
            (Some(scheme), _) => scheme.to_uppercase(),
            (None, PaymentChannel::MobileMoney) => "Mobile Money".to_string(),
            (None, PaymentChannel::Card) => "Card".to_string(),
        };
        format!("{} {}", label, self.unique_id)
    }
}

/// Stores reusable instruments, deduplicated per user on `unique_id`.
#[derive(Clone)]
pub struct PaymentMethodVault {
    store: PaymentMethodStoreRef,
}

impl PaymentMethodVault {
    pub fn new(store: PaymentMethodStoreRef) -> Self {
        Self { store }
    }

    /// Returns the stored method for `(user_id, unique_id)`, creating it on
    /// first sight. Never creates a duplicate.
    pub async fn create_or_get(&self, details: InstrumentDetails) -> Result<PaymentMethod> {
        if details.unique_id.trim().is_empty() {
            return Err(AppError::invalid_data("payment method has no unique identifier"));
        }

        if let Some(existing) = self
            .store
            .find_by_fingerprint(&details.user_id, &details.unique_id)
            .await?
        {
            return Ok(existing);
        }

        let method = PaymentMethod {
            id: ObjectId::new(),
            display_name: details.display_name(),
            user_id: details.user_id,
            provider: details.provider,
            channel: details.channel,
            scheme: details.scheme,
            unique_id: details.unique_id,
            authorization_code: details.authorization_code,
            raw_data: details.raw_data,
            created_at: Utc::now(),
        };

        let stored = self.store.insert_if_absent(&method).await?;
        if stored.id == method.id {
            info!("💳 Saved payment method {} for user {}", stored.display_name, stored.user_id);
        }
        Ok(stored)
    }

    pub async fn get(&self, id: &str) -> Result<PaymentMethod> {
        let object_id = ObjectId::parse_str(id)
            .map_err(|_| AppError::invalid_data(format!("Invalid payment method id: {}", id)))?;
        self.store
            .find_by_id(&object_id)
            .await?
            .ok_or_else(|| AppError::not_found(format!("Payment method {} not found", id)))
    }
}
