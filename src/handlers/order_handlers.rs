// handlers/order_handlers.rs
use axum::{
    extract::{Json, Path, State},
    Extension,
};
use validator::Validate;

use crate::{
    dtos::order_dtos::{OrderDecisionRequest, RateOrderRequest},
    errors::{AppError, Result},
    models::order::Order,
    models::user::Principal,
    services::order_service::Transition,
    state::AppState,
};

fn require_staff(principal: &Principal) -> Result<()> {
    if principal.is_staff() {
        Ok(())
    } else {
        Err(AppError::Unauthorized)
    }
}

// Customers only ever see their own orders
fn ensure_visible(principal: &Principal, order: &Order) -> Result<()> {
    if principal.is_staff() || order.customer_id == principal.user_id {
        Ok(())
    } else {
        Err(AppError::not_found(format!("Order {} not found", order.id)))
    }
}

pub async fn list_orders(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
) -> Result<Json<Vec<Order>>> {
    let orders = state.orders.list_customer_orders(&principal.user_id).await?;
    Ok(Json(orders))
}

pub async fn get_order(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(order_id): Path<String>,
) -> Result<Json<Order>> {
    let order = state.orders.get_order(&order_id).await?;
    ensure_visible(&principal, &order)?;
    Ok(Json(order))
}

pub async fn decide_order(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(order_id): Path<String>,
    Json(payload): Json<OrderDecisionRequest>,
) -> Result<Json<Transition>> {
    require_staff(&principal)?;
    payload.validate()?;
    let transition = state
        .orders
        .approve_or_reject(&order_id, &payload.action, payload.truck_id)
        .await?;
    Ok(Json(transition))
}

pub async fn mark_ready(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(order_id): Path<String>,
) -> Result<Json<Transition>> {
    require_staff(&principal)?;
    let transition = state.orders.mark_ready_for_delivery(&order_id).await?;
    Ok(Json(transition))
}

pub async fn close_order(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(order_id): Path<String>,
) -> Result<Json<Transition>> {
    require_staff(&principal)?;
    let transition = state.orders.close_order(&order_id).await?;
    Ok(Json(transition))
}

pub async fn rate_order(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(order_id): Path<String>,
    Json(payload): Json<RateOrderRequest>,
) -> Result<Json<Order>> {
    payload.validate()?;
    let order = state.orders.get_order(&order_id).await?;
    if order.customer_id != principal.user_id {
        return Err(AppError::not_found(format!("Order {} not found", order_id)));
    }
    let rated = state
        .orders
        .submit_rating(&order_id, payload.rating, payload.review)
        .await?;
    Ok(Json(rated))
}
