use axum::{
    routing::{get, post},
    Router,
};

use crate::handlers::order_handlers;
use crate::state::AppState;

pub fn order_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(order_handlers::list_orders))
        .route("/:id", get(order_handlers::get_order))
        .route("/:id/decision", post(order_handlers::decide_order))
        .route("/:id/ready", post(order_handlers::mark_ready))
        .route("/:id/close", post(order_handlers::close_order))
        .route("/:id/rating", post(order_handlers::rate_order))
}
