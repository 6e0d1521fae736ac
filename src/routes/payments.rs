use axum::{
    routing::{get, post},
    Router,
};

use crate::handlers::payment_handlers;
use crate::state::AppState;

pub fn payment_routes() -> Router<AppState> {
    Router::new()
        .route("/", post(payment_handlers::initiate_payment))
        .route("/recurring", post(payment_handlers::recurring_payment))
        .route("/verify/:reference", get(payment_handlers::verify_payment))
        .route("/:reference/status", get(payment_handlers::payment_status))
}
