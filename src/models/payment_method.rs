use bson::oid::ObjectId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::transaction::PaymentChannel;

/// A reusable payment instrument, unique per `(user_id, unique_id)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentMethod {
    #[serde(rename = "_id")]
    pub id: ObjectId,
    pub user_id: String,
    pub provider: String,
    pub channel: PaymentChannel,
    pub scheme: Option<String>,
    /// Phone number for mobile money, `bin******last4` for cards.
    pub unique_id: String,
    pub authorization_code: Option<String>,
    pub display_name: String,
    pub raw_data: serde_json::Value,
    #[serde(with = "bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub created_at: DateTime<Utc>,
}

impl PaymentMethod {
    pub fn can_charge(&self) -> bool {
        self.authorization_code
            .as_deref()
            .map(|code| !code.trim().is_empty())
            .unwrap_or(false)
    }
}
