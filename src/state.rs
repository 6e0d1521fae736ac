use std::sync::Arc;

use crate::services::order_service::OrderLifecycle;
use crate::services::transaction_service::TransactionManager;

#[derive(Clone)]
pub struct AppState {
    pub transactions: TransactionManager,
    pub orders: OrderLifecycle,
    pub jwt_secret: Arc<String>,
}

impl AppState {
    pub fn new(transactions: TransactionManager, orders: OrderLifecycle, jwt_secret: String) -> Self {
        AppState {
            transactions,
            orders,
            jwt_secret: Arc::new(jwt_secret),
        }
    }
}
