use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use validator::Validate;

use crate::models::order::OrderStatus;
use crate::models::transaction::{OrderDetails, PaymentChannel};

fn default_currency() -> String {
    "GHS".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct InitiateTransactionRequest {
    pub channel: PaymentChannel,

    #[validate(range(exclusive_min = 0.0, message = "Amount must be greater than 0"))]
    pub amount: f64,

    #[serde(default = "default_currency")]
    #[validate(length(equal = 3, message = "Currency must be a 3-letter ISO code"))]
    pub currency: String,

    #[validate(email(message = "Invalid email format"))]
    pub email: Option<String>,

    #[validate(length(min = 9, max = 16, message = "Invalid phone number"))]
    pub phone: Option<String>,

    /// Mobile-money network, e.g. `mtn`, `vod`, `atl`.
    pub provider: Option<String>,

    #[serde(default)]
    #[validate(nested)]
    pub order: OrderDetails,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct RecurringPaymentRequest {
    #[validate(length(min = 1, message = "Payment method is required"))]
    pub payment_method_id: String,

    #[validate(range(exclusive_min = 0.0, message = "Amount must be greater than 0"))]
    pub amount: f64,

    #[serde(default = "default_currency")]
    #[validate(length(equal = 3, message = "Currency must be a 3-letter ISO code"))]
    pub currency: String,

    #[validate(email(message = "Invalid email format"))]
    pub email: Option<String>,

    #[serde(default)]
    #[validate(nested)]
    pub order: OrderDetails,
}

/// Gateway payload for a new payment with our transaction identity merged in.
#[derive(Debug, Clone, Serialize)]
pub struct PaymentInitiation {
    pub transaction_id: String,
    pub reference: Option<String>,
    pub status: String,
    pub channel: PaymentChannel,
    pub order_id: Option<String>,
    pub authorization_url: Option<String>,
    pub access_code: Option<String>,
    pub gateway_message: Option<String>,
    pub gateway: Value,
}

/// Flattened read model over a transaction, its order and the payer.
#[derive(Debug, Clone, Serialize)]
pub struct TransactionStatusView {
    pub transaction_id: String,
    pub reference: Option<String>,
    pub status: String,
    pub amount: f64,
    pub currency: String,
    pub channel: PaymentChannel,
    pub instrument_mask: Option<String>,
    pub scheme: Option<String>,
    pub gateway_message: Option<String>,
    pub water_cost: f64,
    pub delivery_fee: f64,
    pub order_id: Option<String>,
    pub order_status: Option<OrderStatus>,
    pub truck_id: Option<i64>,
    pub customer_name: Option<String>,
    pub email: String,
    pub phone: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
