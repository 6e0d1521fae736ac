// services/transaction_service.rs
//
// Payment attempts from initiation through settlement. Every gateway answer
// goes through `settle`, which only moves the stored status forward and
// creates the order at most once, so verification can be repeated freely.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tracing::{debug, info, warn};
use validator::Validate;

use crate::dtos::payment_dtos::{
    InitiateTransactionRequest, PaymentInitiation, RecurringPaymentRequest, TransactionStatusView,
};
use crate::errors::{AppError, Result};
use crate::models::order::Order;
use crate::models::transaction::{
    can_advance, GatewayPatch, PaymentChannel, Transaction, STATUS_FAILED, STATUS_INITIATED,
};
use crate::models::user::Principal;
use crate::services::notification_service::NotificationDispatcher;
use crate::services::order_service::OrderLifecycle;
use crate::services::payment_method_service::{InstrumentDetails, PaymentMethodVault};
use crate::services::paystack_service::{
    format_phone_number, to_minor_units, AuthorizationCharge, CanonicalResult, CardInitialization,
    MobileMoneyCharge, PaymentGatewayClient,
};
use crate::store::{TransactionStoreRef, UserDirectoryRef};

struct Settlement {
    transaction: Transaction,
    order: Option<Order>,
}

fn resolve_email(requested: Option<&str>, principal: &Principal) -> Result<String> {
    requested
        .or(principal.email.as_deref())
        .map(str::trim)
        .filter(|email| !email.is_empty())
        .map(str::to_string)
        .ok_or_else(|| AppError::invalid_data("Email is required for payment"))
}

fn required<'a>(value: Option<&'a str>, message: &str) -> Result<&'a str> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| AppError::invalid_data(message))
}

fn initiation(settlement: &Settlement, result: &CanonicalResult) -> PaymentInitiation {
    let tx = &settlement.transaction;
    PaymentInitiation {
        transaction_id: tx.id.to_hex(),
        reference: tx.reference.clone(),
        status: tx.status.clone(),
        channel: tx.channel,
        order_id: settlement.order.as_ref().map(|o| o.id.to_hex()),
        authorization_url: result.authorization_url.clone(),
        access_code: result.access_code.clone(),
        gateway_message: result.gateway_message.clone(),
        gateway: result.raw_response.clone(),
    }
}

#[derive(Clone)]
pub struct TransactionManager {
    gateway: Arc<dyn PaymentGatewayClient>,
    transactions: TransactionStoreRef,
    lifecycle: OrderLifecycle,
    vault: PaymentMethodVault,
    users: UserDirectoryRef,
    notifier: NotificationDispatcher,
    gateway_deadline: Duration,
}

impl TransactionManager {
    pub fn new(
        gateway: Arc<dyn PaymentGatewayClient>,
        transactions: TransactionStoreRef,
        lifecycle: OrderLifecycle,
        vault: PaymentMethodVault,
        users: UserDirectoryRef,
        notifier: NotificationDispatcher,
        gateway_deadline: Duration,
    ) -> Self {
        Self {
            gateway,
            transactions,
            lifecycle,
            vault,
            users,
            notifier,
            gateway_deadline,
        }
    }

    pub async fn initiate_transaction(
        &self,
        principal: &Principal,
        request: InitiateTransactionRequest,
    ) -> Result<PaymentInitiation> {
        request.validate()?;
        let email = resolve_email(request.email.as_deref(), principal)?;
        let currency = request.currency.trim().to_uppercase();

        let mut tx = Transaction::initiated(
            principal.user_id.clone(),
            email.clone(),
            request.channel,
            request.amount,
            currency.clone(),
            serde_json::to_value(&request)?,
            request.order.clone(),
        );

        if request.channel == PaymentChannel::MobileMoney {
            let phone = required(request.phone.as_deref(), "Phone number is required for mobile money")?;
            let provider = required(request.provider.as_deref(), "Provider is required for mobile money")?;
            tx.phone = Some(format_phone_number(phone));
            tx.provider = Some(provider.to_lowercase());
        } else {
            tx.phone = request.phone.clone().or_else(|| principal.phone.clone());
        }

        self.transactions.insert(&tx).await?;
        info!(
            transaction_id = %tx.id,
            reference = ?tx.reference,
            channel = tx.channel.as_str(),
            amount = tx.amount,
            "💰 Transaction initiated"
        );

        let reference = tx.reference.clone().unwrap_or_default();
        match request.channel {
            PaymentChannel::MobileMoney => {
                let charge = MobileMoneyCharge {
                    reference,
                    amount_minor: to_minor_units(tx.amount),
                    currency,
                    email,
                    phone: tx.phone.clone().unwrap_or_default(),
                    provider: tx.provider.clone().unwrap_or_default(),
                };
                let result = match self.gateway.charge(&charge, self.gateway_deadline).await {
                    Ok(result) => result,
                    Err(e) => return Err(self.record_gateway_error(tx, e).await),
                };
                let settlement = self.settle(tx, &result).await?;
                Ok(initiation(&settlement, &result))
            }
            PaymentChannel::Card => {
                let init = CardInitialization {
                    reference,
                    amount_minor: to_minor_units(tx.amount),
                    currency,
                    email,
                };
                let result = match self.gateway.initialize(&init, self.gateway_deadline).await {
                    Ok(result) => result,
                    Err(e) => return Err(self.record_gateway_error(tx, e).await),
                };
                let settlement = if result.is_failure() {
                    self.settle(tx, &result).await?
                } else {
                    self.record_initialization(tx, &result).await?
                };
                Ok(initiation(&settlement, &result))
            }
        }
    }

    pub async fn process_recurring_payment(
        &self,
        principal: &Principal,
        request: RecurringPaymentRequest,
    ) -> Result<PaymentInitiation> {
        request.validate()?;

        let method = self.vault.get(&request.payment_method_id).await?;
        if method.user_id != principal.user_id {
            return Err(AppError::not_found(format!(
                "Payment method {} not found",
                request.payment_method_id
            )));
        }
        if !method.can_charge() {
            return Err(AppError::invalid_data(format!(
                "Payment method {} has no reusable authorization",
                method.id
            )));
        }
        let authorization_code = method.authorization_code.clone().unwrap_or_default();

        let email = resolve_email(request.email.as_deref(), principal)?;
        let currency = request.currency.trim().to_uppercase();

        let mut tx = Transaction::initiated(
            principal.user_id.clone(),
            email.clone(),
            method.channel,
            request.amount,
            currency.clone(),
            serde_json::to_value(&request)?,
            request.order.clone(),
        );
        match method.channel {
            PaymentChannel::MobileMoney => {
                tx.phone = Some(method.unique_id.clone());
                tx.provider = method.scheme.clone();
            }
            PaymentChannel::Card => {
                tx.phone = principal.phone.clone();
                tx.instrument_mask = Some(method.unique_id.clone());
                tx.scheme = method.scheme.clone();
            }
        }

        self.transactions.insert(&tx).await?;
        info!(
            transaction_id = %tx.id,
            reference = ?tx.reference,
            payment_method_id = %method.id,
            amount = tx.amount,
            "🔁 Recurring transaction initiated"
        );

        let charge = AuthorizationCharge {
            reference: tx.reference.clone().unwrap_or_default(),
            amount_minor: to_minor_units(tx.amount),
            currency,
            email,
            authorization_code,
        };
        let result = match self.gateway.charge_with_token(&charge, self.gateway_deadline).await {
            Ok(result) => result,
            Err(e) => return Err(self.record_gateway_error(tx, e).await),
        };
        let settlement = self.settle(tx, &result).await?;
        Ok(initiation(&settlement, &result))
    }

    /// Re-reads gateway truth for `reference` and settles it. Safe to call
    /// any number of times.
    pub async fn verify_transaction(&self, reference: &str) -> Result<TransactionStatusView> {
        let reference = required(Some(reference), "Reference is required")?;
        let tx = self.find_by_reference(reference).await?;

        let result = self.gateway.verify(reference, self.gateway_deadline).await?;
        let settlement = self.settle(tx, &result).await?;
        Ok(self
            .status_view(settlement.transaction, settlement.order, result.customer_name)
            .await)
    }

    /// Current stored state for `reference`, without calling the gateway.
    pub async fn transaction_status(&self, reference: &str) -> Result<TransactionStatusView> {
        let reference = required(Some(reference), "Reference is required")?;
        let tx = self.find_by_reference(reference).await?;
        let order = self.lifecycle.order_for_transaction(&tx.id).await?;
        Ok(self.status_view(tx, order, None).await)
    }

    /// Customers only see their own transactions; anything else reads as
    /// missing. Staff see all of them.
    pub async fn ensure_visible(&self, principal: &Principal, reference: &str) -> Result<()> {
        let reference = required(Some(reference), "Reference is required")?;
        let tx = self.find_by_reference(reference).await?;
        if principal.is_staff() || tx.user_id == principal.user_id {
            Ok(())
        } else {
            debug!(user_id = %principal.user_id, reference, "Transaction owned by another user");
            Err(AppError::not_found(format!("Transaction {} not found", reference)))
        }
    }

    async fn find_by_reference(&self, reference: &str) -> Result<Transaction> {
        self.transactions
            .find_by_reference(reference)
            .await?
            .ok_or_else(|| AppError::not_found(format!("Transaction {} not found", reference)))
    }

    /// Applies a canonical gateway result and, once the transaction is
    /// successful, makes sure its order and payment method exist.
    async fn settle(&self, mut tx: Transaction, result: &CanonicalResult) -> Result<Settlement> {
        if can_advance(&tx.status, &result.status) {
            let patch = result.to_patch();
            if self
                .transactions
                .apply_gateway_result(&tx.id, &tx.status, &patch)
                .await?
            {
                info!(
                    transaction_id = %tx.id,
                    reference = ?patch.reference.as_ref().or(tx.reference.as_ref()),
                    from = %tx.status,
                    to = %patch.status,
                    "Transaction status updated"
                );
                patch.apply_to(&mut tx);
            } else {
                warn!(
                    transaction_id = %tx.id,
                    prior_status = %tx.status,
                    attempted_status = %result.status,
                    "Transaction changed concurrently, reloading"
                );
                tx = self.transactions.find_by_id(&tx.id).await?.ok_or_else(|| {
                    AppError::persistence(format!("transaction {} vanished", tx.id))
                })?;
            }
        } else if !tx.status.eq_ignore_ascii_case(&result.status) {
            warn!(
                transaction_id = %tx.id,
                prior_status = %tx.status,
                attempted_status = %result.status,
                "Transaction already final, ignoring gateway status"
            );
        }

        if !tx.is_successful() {
            return Ok(Settlement {
                transaction: tx,
                order: None,
            });
        }

        let (order, created) = self.lifecycle.create_from_transaction(&tx).await?;
        self.save_instrument(&tx, result).await?;
        if created {
            self.send_receipt(&tx, &order);
        }

        Ok(Settlement {
            transaction: tx,
            order: Some(order),
        })
    }

    async fn record_initialization(
        &self,
        mut tx: Transaction,
        result: &CanonicalResult,
    ) -> Result<Settlement> {
        let patch = GatewayPatch {
            status: STATUS_INITIATED.to_string(),
            reference: result.reference.clone(),
            channel: None,
            instrument_mask: None,
            scheme: None,
            gateway_message: result.gateway_message.clone(),
            raw_response: result.raw_response.clone(),
        };
        if self
            .transactions
            .apply_gateway_result(&tx.id, STATUS_INITIATED, &patch)
            .await?
        {
            patch.apply_to(&mut tx);
            info!(
                transaction_id = %tx.id,
                reference = ?tx.reference,
                "💳 Card payment initialized, awaiting verification"
            );
        }
        Ok(Settlement {
            transaction: tx,
            order: None,
        })
    }

    /// Non-retryable gateway refusals are final for this attempt and are
    /// recorded as failed. Retryable ones leave it `Initiated` for a later
    /// verification.
    async fn record_gateway_error(&self, tx: Transaction, err: AppError) -> AppError {
        if err.is_retryable() {
            warn!(
                transaction_id = %tx.id,
                reference = ?tx.reference,
                error = %err,
                "Gateway unavailable, transaction left for verification"
            );
            return err;
        }

        let patch = GatewayPatch {
            status: STATUS_FAILED.to_string(),
            reference: None,
            channel: None,
            instrument_mask: None,
            scheme: None,
            gateway_message: Some(err.to_string()),
            raw_response: json!({ "error": err.to_string() }),
        };
        match self
            .transactions
            .apply_gateway_result(&tx.id, &tx.status, &patch)
            .await
        {
            Ok(_) => warn!(
                transaction_id = %tx.id,
                reference = ?tx.reference,
                error = %err,
                "Gateway refused transaction"
            ),
            Err(e) => warn!(
                transaction_id = %tx.id,
                error = %e,
                "Failed to record gateway refusal"
            ),
        }
        err
    }

    async fn save_instrument(&self, tx: &Transaction, result: &CanonicalResult) -> Result<()> {
        let unique_id = match tx.channel {
            PaymentChannel::MobileMoney => tx.phone.clone().or_else(|| result.instrument_mask.clone()),
            PaymentChannel::Card => result
                .instrument_mask
                .clone()
                .or_else(|| tx.instrument_mask.clone()),
        };
        let Some(unique_id) = unique_id.filter(|id| !id.trim().is_empty()) else {
            debug!(transaction_id = %tx.id, "No instrument fingerprint, nothing to vault");
            return Ok(());
        };

        self.vault
            .create_or_get(InstrumentDetails {
                user_id: tx.user_id.clone(),
                provider: self.gateway.name().to_string(),
                channel: tx.channel,
                scheme: result.scheme.clone().or_else(|| tx.provider.clone()),
                unique_id,
                authorization_code: result.authorization_code.clone(),
                raw_data: result.raw_response.clone(),
            })
            .await?;
        Ok(())
    }

    fn send_receipt(&self, tx: &Transaction, order: &Order) {
        let reference = tx.reference.clone().unwrap_or_else(|| tx.id.to_hex());
        let body = format!(
            "Thank you for your payment.\n\nReference: {}\nAmount: {} {:.2}\nOrder: {}\n\nWe will notify you once a truck is assigned.",
            reference,
            tx.currency,
            tx.amount,
            order.id.to_hex()
        );
        self.notifier
            .email(&tx.email, format!("Payment receipt {}", reference), body);
    }

    /// `gateway_name` is the payer name the gateway reported, used when the
    /// user directory has none.
    async fn status_view(
        &self,
        tx: Transaction,
        order: Option<Order>,
        gateway_name: Option<String>,
    ) -> TransactionStatusView {
        let contact = match self.users.contact(&tx.user_id).await {
            Ok(contact) => contact,
            Err(e) => {
                warn!(user_id = %tx.user_id, error = %e, "Contact lookup failed for status view");
                None
            }
        };
        let customer_name = contact
            .as_ref()
            .map(|c| c.display_name())
            .filter(|name| !name.is_empty())
            .or(gateway_name);
        let phone = tx
            .phone
            .clone()
            .or_else(|| contact.as_ref().and_then(|c| c.phone.clone()));

        TransactionStatusView {
            transaction_id: tx.id.to_hex(),
            reference: tx.reference,
            status: tx.status,
            amount: tx.amount,
            currency: tx.currency,
            channel: tx.channel,
            instrument_mask: tx.instrument_mask,
            scheme: tx.scheme,
            gateway_message: tx.gateway_message,
            water_cost: tx.order.water_cost,
            delivery_fee: tx.order.delivery_fee,
            order_id: order.as_ref().map(|o| o.id.to_hex()),
            order_status: order.as_ref().map(|o| o.status),
            truck_id: order.as_ref().and_then(|o| o.truck_id),
            customer_name,
            email: tx.email,
            phone,
            created_at: tx.created_at,
            updated_at: tx.updated_at,
        }
    }
}
