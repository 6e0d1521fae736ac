// models/transaction.rs
use bson::oid::ObjectId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

pub const STATUS_INITIATED: &str = "Initiated";
pub const STATUS_SUCCESS: &str = "success";
pub const STATUS_FAILED: &str = "failed";

// `abandoned` is not listed: an unfinished checkout can still be paid later.
const TERMINAL_STATUSES: [&str; 3] = ["success", "failed", "reversed"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PaymentChannel {
    #[serde(rename = "mobile-money")]
    MobileMoney,
    #[serde(rename = "card")]
    Card,
}

impl PaymentChannel {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentChannel::MobileMoney => "mobile-money",
            PaymentChannel::Card => "card",
        }
    }

    /// Maps the gateway's channel names (`mobile_money`, `card`) onto ours.
    pub fn from_gateway(channel: &str) -> Option<Self> {
        match channel.trim().to_lowercase().as_str() {
            "mobile_money" | "mobile-money" | "mobilemoney" => Some(PaymentChannel::MobileMoney),
            "card" => Some(PaymentChannel::Card),
            _ => None,
        }
    }
}

/// Position of a status on the forward-only path
/// `Initiated` -> in-flight gateway statuses -> terminal statuses.
pub fn status_rank(status: &str) -> u8 {
    if status == STATUS_INITIATED {
        0
    } else if is_terminal(status) {
        2
    } else {
        1
    }
}

pub fn is_terminal(status: &str) -> bool {
    TERMINAL_STATUSES.contains(&status.to_lowercase().as_str())
}

/// Whether gateway truth `next` may replace the stored `current` status.
/// In-flight statuses may move to a different in-flight status; terminal
/// statuses are final. Repeating the current status is not an advance.
pub fn can_advance(current: &str, next: &str) -> bool {
    if is_terminal(current) || current.eq_ignore_ascii_case(next) {
        return false;
    }
    status_rank(next) >= status_rank(current)
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, Validate)]
pub struct Address {
    #[serde(default)]
    pub place_id: String,
    #[serde(default)]
    #[validate(length(max = 512, message = "Address is too long"))]
    pub address: String,
}

/// Route and fee breakdown captured with the payment and carried through to
/// the order once the payment settles.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, Validate)]
pub struct OrderDetails {
    #[serde(default)]
    pub refinery_id: Option<i64>,
    #[serde(default)]
    #[validate(nested)]
    pub pickup: Address,
    #[serde(default)]
    #[validate(nested)]
    pub dropoff: Address,
    #[serde(default)]
    pub capacity: Option<String>,
    #[serde(default)]
    pub water_type: Option<String>,
    #[serde(default)]
    #[validate(range(min = 0.0, message = "Water cost cannot be negative"))]
    pub water_cost: f64,
    #[serde(default)]
    #[validate(range(min = 0.0, message = "Delivery fee cannot be negative"))]
    pub delivery_fee: f64,
    #[serde(default)]
    pub distance_km: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    #[serde(rename = "_id")]
    pub id: ObjectId,

    pub user_id: String,
    pub email: String,
    pub phone: Option<String>,

    pub amount: f64,
    pub currency: String,
    pub channel: PaymentChannel,
    pub provider: Option<String>,

    // Gateway fields
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
    pub status: String, // "Initiated", then whatever the gateway reports
    pub gateway_message: Option<String>,
    pub instrument_mask: Option<String>,
    pub scheme: Option<String>,

    // Audit payloads: the request is written once, responses are appended
    pub raw_request: serde_json::Value,
    #[serde(default)]
    pub raw_responses: Vec<serde_json::Value>,

    pub order: OrderDetails,

    #[serde(with = "bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub updated_at: DateTime<Utc>,
}

impl Transaction {
    /// A fresh attempt in `Initiated` status carrying our own reference.
    pub fn initiated(
        user_id: String,
        email: String,
        channel: PaymentChannel,
        amount: f64,
        currency: String,
        raw_request: serde_json::Value,
        order: OrderDetails,
    ) -> Self {
        let now = Utc::now();
        Transaction {
            id: ObjectId::new(),
            user_id,
            email,
            phone: None,
            amount,
            currency,
            channel,
            provider: None,
            reference: Some(uuid::Uuid::new_v4().simple().to_string()),
            status: STATUS_INITIATED.to_string(),
            gateway_message: None,
            instrument_mask: None,
            scheme: None,
            raw_request,
            raw_responses: Vec::new(),
            order,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_successful(&self) -> bool {
        self.status.eq_ignore_ascii_case(STATUS_SUCCESS)
    }
}

/// The subset of a canonical gateway result that is written back onto a
/// transaction.
#[derive(Debug, Clone)]
pub struct GatewayPatch {
    pub status: String,
    pub reference: Option<String>,
    pub channel: Option<PaymentChannel>,
    pub instrument_mask: Option<String>,
    pub scheme: Option<String>,
    pub gateway_message: Option<String>,
    pub raw_response: serde_json::Value,
}

impl GatewayPatch {
    pub fn apply_to(&self, tx: &mut Transaction) {
        tx.status = self.status.clone();
        if self.reference.is_some() {
            tx.reference = self.reference.clone();
        }
        if let Some(channel) = self.channel {
            tx.channel = channel;
        }
        if self.instrument_mask.is_some() {
            tx.instrument_mask = self.instrument_mask.clone();
        }
        if self.scheme.is_some() {
            tx.scheme = self.scheme.clone();
        }
        if self.gateway_message.is_some() {
            tx.gateway_message = self.gateway_message.clone();
        }
        tx.raw_responses.push(self.raw_response.clone());
        tx.updated_at = Utc::now();
    }
}
