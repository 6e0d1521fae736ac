// handlers/payment_handlers.rs
use axum::{
    extract::{Json, Path, State},
    Extension,
};
use tracing::info;

use crate::{
    dtos::payment_dtos::{
        InitiateTransactionRequest, PaymentInitiation, RecurringPaymentRequest, TransactionStatusView,
    },
    errors::Result,
    models::user::Principal,
    state::AppState,
};

pub async fn initiate_payment(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Json(payload): Json<InitiateTransactionRequest>,
) -> Result<Json<PaymentInitiation>> {
    info!(
        "💰 Payment request from {}: {} {} via {}",
        principal.user_id,
        payload.currency,
        payload.amount,
        payload.channel.as_str()
    );
    let initiation = state
        .transactions
        .initiate_transaction(&principal, payload)
        .await?;
    Ok(Json(initiation))
}

pub async fn recurring_payment(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Json(payload): Json<RecurringPaymentRequest>,
) -> Result<Json<PaymentInitiation>> {
    info!(
        "🔁 Recurring payment request from {} with method {}",
        principal.user_id, payload.payment_method_id
    );
    let initiation = state
        .transactions
        .process_recurring_payment(&principal, payload)
        .await?;
    Ok(Json(initiation))
}

pub async fn verify_payment(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(reference): Path<String>,
) -> Result<Json<TransactionStatusView>> {
    state.transactions.ensure_visible(&principal, &reference).await?;
    let view = state.transactions.verify_transaction(&reference).await?;
    Ok(Json(view))
}

pub async fn payment_status(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(reference): Path<String>,
) -> Result<Json<TransactionStatusView>> {
    state.transactions.ensure_visible(&principal, &reference).await?;
    let view = state.transactions.transaction_status(&reference).await?;
    Ok(Json(view))
}
