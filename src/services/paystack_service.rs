// services/paystack_service.rs
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{header, Client, RequestBuilder};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{error, info};

use crate::config::AppConfig;
use crate::errors::{AppError, Result};
use crate::models::transaction::{GatewayPatch, PaymentChannel, STATUS_FAILED, STATUS_SUCCESS};

pub const PROVIDER: &str = "paystack";

const STATUS_PENDING: &str = "pending";

#[derive(Debug, Clone, Serialize)]
pub struct MobileMoneyCharge {
    pub reference: String,
    pub amount_minor: i64,
    pub currency: String,
    pub email: String,
    pub phone: String,
    pub provider: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct CardInitialization {
    pub reference: String,
    pub amount_minor: i64,
    pub currency: String,
    pub email: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct AuthorizationCharge {
    pub reference: String,
    pub amount_minor: i64,
    pub currency: String,
    pub email: String,
    pub authorization_code: String,
}

/// The normalised shape every gateway call is reduced to.
#[derive(Debug, Clone, Serialize)]
pub struct CanonicalResult {
    pub status: String,
    pub reference: Option<String>,
    pub channel: Option<PaymentChannel>,
    pub instrument_mask: Option<String>,
    pub scheme: Option<String>,
    pub authorization_code: Option<String>,
    pub customer_name: Option<String>,
    pub gateway_message: Option<String>,
    pub authorization_url: Option<String>,
    pub access_code: Option<String>,
    pub raw_response: Value,
}

impl CanonicalResult {
    pub fn is_success(&self) -> bool {
        self.status == STATUS_SUCCESS
    }

    pub fn is_failure(&self) -> bool {
        self.status == STATUS_FAILED
    }

    pub fn to_patch(&self) -> GatewayPatch {
        GatewayPatch {
            status: self.status.clone(),
            reference: self.reference.clone(),
            channel: self.channel,
            instrument_mask: self.instrument_mask.clone(),
            scheme: self.scheme.clone(),
            gateway_message: self.gateway_message.clone(),
            raw_response: self.raw_response.clone(),
        }
    }
}

/// Which endpoint produced a response; business failures are read
/// differently for token charges.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallKind {
    Charge,
    Initialize,
    ChargeAuthorization,
    Verify,
}

#[async_trait]
pub trait PaymentGatewayClient: Send + Sync {
    fn name(&self) -> &'static str;

    async fn charge(&self, request: &MobileMoneyCharge, deadline: Duration) -> Result<CanonicalResult>;

    async fn initialize(&self, request: &CardInitialization, deadline: Duration) -> Result<CanonicalResult>;

    async fn charge_with_token(
        &self,
        request: &AuthorizationCharge,
        deadline: Duration,
    ) -> Result<CanonicalResult>;

    async fn verify(&self, reference: &str, deadline: Duration) -> Result<CanonicalResult>;
}

// Response envelope. Every field is optional: the gateway omits whole
// sub-objects depending on channel and outcome.
#[derive(Debug, Default, Deserialize)]
struct Envelope {
    status: Option<bool>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    data: Option<Value>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ChargeData {
    status: Option<String>,
    reference: Option<String>,
    channel: Option<String>,
    gateway_response: Option<String>,
    display_text: Option<String>,
    authorization_url: Option<String>,
    access_code: Option<String>,
    authorization: Option<AuthorizationData>,
    customer: Option<CustomerData>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct AuthorizationData {
    authorization_code: Option<String>,
    bin: Option<String>,
    last4: Option<String>,
    brand: Option<String>,
    channel: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct CustomerData {
    first_name: Option<String>,
    last_name: Option<String>,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

fn mask_instrument(bin: Option<String>, last4: Option<String>) -> Option<String> {
    match (non_empty(bin), non_empty(last4)) {
        (Some(bin), Some(last4)) => Some(format!("{}******{}", bin, last4)),
        (None, Some(last4)) => Some(format!("******{}", last4)),
        _ => None,
    }
}

fn body_excerpt(body: &Value) -> String {
    let text = match body {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    text.chars().take(200).collect()
}

/// Reduces a raw gateway HTTP exchange to a canonical result.
///
/// Transport-level trouble (5xx, 429, unreadable non-2xx bodies) is a
/// retryable `Gateway` error. A well-formed `status: false` envelope is a
/// business outcome and becomes `status = "failed"`, except for token
/// charges where it means the stored authorization was rejected, and for
/// verification where the reference is simply not settled yet (`pending`).
pub fn canonicalize(kind: CallKind, http_status: u16, body: Value) -> Result<CanonicalResult> {
    if http_status >= 500 || http_status == 429 {
        return Err(AppError::gateway(
            format!("gateway returned HTTP {}: {}", http_status, body_excerpt(&body)),
            true,
        ));
    }

    let envelope: Envelope = serde_json::from_value(body.clone()).unwrap_or_default();
    let ok = match envelope.status {
        Some(ok) => ok,
        None if (200..300).contains(&http_status) => {
            return Err(AppError::gateway(
                format!("unreadable gateway response: {}", body_excerpt(&body)),
                false,
            ));
        }
        None => {
            let retryable = !matches!(http_status, 401 | 403);
            return Err(AppError::gateway(
                format!("gateway returned HTTP {}: {}", http_status, body_excerpt(&body)),
                retryable,
            ));
        }
    };

    let data: ChargeData = envelope
        .data
        .and_then(|d| serde_json::from_value(d).ok())
        .unwrap_or_default();

    if !ok && kind == CallKind::ChargeAuthorization {
        return Err(AppError::gateway(
            format!(
                "authorization rejected: {}",
                envelope.message.unwrap_or_else(|| "no reason given".to_string())
            ),
            false,
        ));
    }

    // A verify envelope with `status: false` is a lookup miss (unknown or
    // unpaid reference), not a decline. Only `data.status` settles a verify.
    let status = if ok || kind == CallKind::Verify {
        non_empty(data.status.clone())
            .filter(|_| ok)
            .map(|s| s.to_lowercase())
            .unwrap_or_else(|| STATUS_PENDING.to_string())
    } else {
        STATUS_FAILED.to_string()
    };

    let authorization = data.authorization.unwrap_or_default();
    let customer = data.customer.unwrap_or_default();

    let channel = non_empty(data.channel)
        .or_else(|| non_empty(authorization.channel))
        .and_then(|c| PaymentChannel::from_gateway(&c));

    let customer_name = {
        let name = format!(
            "{} {}",
            customer.first_name.unwrap_or_default(),
            customer.last_name.unwrap_or_default()
        );
        non_empty(Some(name))
    };

    let gateway_message = non_empty(data.gateway_response)
        .or_else(|| non_empty(data.display_text))
        .or_else(|| non_empty(envelope.message));

    Ok(CanonicalResult {
        status,
        reference: non_empty(data.reference),
        channel,
        instrument_mask: mask_instrument(authorization.bin, authorization.last4),
        scheme: non_empty(authorization.brand).map(|b| b.to_lowercase()),
        authorization_code: non_empty(authorization.authorization_code),
        customer_name,
        gateway_message,
        authorization_url: non_empty(data.authorization_url),
        access_code: non_empty(data.access_code),
        raw_response: body,
    })
}

/// Gateway amounts are integers in the currency's minor unit.
pub fn to_minor_units(amount: f64) -> i64 {
    (amount * 100.0).round() as i64
}

/// Normalises Ghanaian mobile-money numbers to the local `0XXXXXXXXX` form.
pub fn format_phone_number(phone: &str) -> String {
    let digits: String = phone.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.starts_with("233") && digits.len() == 12 {
        return format!("0{}", &digits[3..]);
    }
    if digits.len() == 9 && !digits.starts_with('0') {
        return format!("0{}", digits);
    }
    if digits.is_empty() {
        return phone.trim().to_string();
    }
    digits
}

#[derive(Debug, Clone)]
pub struct PaystackService {
    base_url: String,
    secret_key: String,
    callback_url: String,
    client: Client,
}

impl PaystackService {
    pub fn new(config: &AppConfig) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| AppError::configuration(format!("Failed to create HTTP client: {}", e)))?;

        Ok(PaystackService {
            base_url: config.paystack_base_url.trim_end_matches('/').to_string(),
            secret_key: config.paystack_secret_key.clone(),
            callback_url: config.paystack_callback_url.clone(),
            client,
        })
    }

    async fn send(
        &self,
        kind: CallKind,
        request: RequestBuilder,
        deadline: Duration,
    ) -> Result<CanonicalResult> {
        let response = request
            .bearer_auth(&self.secret_key)
            .header(header::ACCEPT, "application/json")
            .timeout(deadline)
            .send()
            .await
            .map_err(|e| {
                error!("Paystack {:?} request failed: {}", kind, e);
                AppError::gateway(format!("Paystack request failed: {}", e), true)
            })?;

        let http_status = response.status().as_u16();
        let text = response.text().await.map_err(|e| {
            AppError::gateway(format!("Failed to read Paystack response: {}", e), true)
        })?;
        let body = serde_json::from_str::<Value>(&text).unwrap_or(Value::String(text));

        let result = canonicalize(kind, http_status, body);
        match &result {
            Ok(canonical) => info!(
                "Paystack {:?} -> HTTP {} status={} reference={:?}",
                kind, http_status, canonical.status, canonical.reference
            ),
            Err(e) => error!("Paystack {:?} -> HTTP {} failed: {}", kind, http_status, e),
        }
        result
    }
}

#[async_trait]
impl PaymentGatewayClient for PaystackService {
    fn name(&self) -> &'static str {
        PROVIDER
    }

    async fn charge(&self, request: &MobileMoneyCharge, deadline: Duration) -> Result<CanonicalResult> {
        info!(
            "Mobile money charge {} for {} - {} {}",
            request.reference, request.phone, request.currency, request.amount_minor
        );
        let body = json!({
            "amount": request.amount_minor,
            "email": request.email,
            "currency": request.currency,
            "reference": request.reference,
            "mobile_money": {
                "phone": format_phone_number(&request.phone),
                "provider": request.provider.to_lowercase(),
            },
        });
        let builder = self
            .client
            .post(format!("{}/charge", self.base_url))
            .json(&body);
        self.send(CallKind::Charge, builder, deadline).await
    }

    async fn initialize(&self, request: &CardInitialization, deadline: Duration) -> Result<CanonicalResult> {
        info!(
            "Card initialization {} - {} {}",
            request.reference, request.currency, request.amount_minor
        );
        let body = json!({
            "amount": request.amount_minor,
            "email": request.email,
            "currency": request.currency,
            "reference": request.reference,
            "callback_url": self.callback_url,
            "channels": ["card"],
        });
        let builder = self
            .client
            .post(format!("{}/transaction/initialize", self.base_url))
            .json(&body);
        self.send(CallKind::Initialize, builder, deadline).await
    }

    async fn charge_with_token(
        &self,
        request: &AuthorizationCharge,
        deadline: Duration,
    ) -> Result<CanonicalResult> {
        info!(
            "Recurring charge {} - {} {}",
            request.reference, request.currency, request.amount_minor
        );
        let body = json!({
            "amount": request.amount_minor,
            "email": request.email,
            "currency": request.currency,
            "reference": request.reference,
            "authorization_code": request.authorization_code,
        });
        let builder = self
            .client
            .post(format!("{}/transaction/charge_authorization", self.base_url))
            .json(&body);
        self.send(CallKind::ChargeAuthorization, builder, deadline).await
    }

    async fn verify(&self, reference: &str, deadline: Duration) -> Result<CanonicalResult> {
        let builder = self
            .client
            .get(format!("{}/transaction/verify/{}", self.base_url, reference));
        self.send(CallKind::Verify, builder, deadline).await
    }
}
