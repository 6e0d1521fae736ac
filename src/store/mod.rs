//! Persistence ports for the payment and fulfillment core.
//!
//! Every mutating write that races between the request path and the
//! reconciliation sweep is a guarded write: it only applies when the stored
//! status still equals the caller's expected prior status, and reports
//! whether it applied. Callers treat `false` as a stale attempt.

use std::sync::Arc;

use async_trait::async_trait;
use bson::oid::ObjectId;
use chrono::{DateTime, Utc};

use crate::errors::Result;
use crate::models::order::{Order, OrderStatus};
use crate::models::payment_method::PaymentMethod;
use crate::models::transaction::{GatewayPatch, Transaction};
use crate::models::truck::Truck;
use crate::models::user::UserContact;

pub mod in_memory;
pub mod mongo;

#[async_trait]
pub trait TransactionStore: Send + Sync {
    async fn insert(&self, tx: &Transaction) -> Result<()>;
    async fn find_by_id(&self, id: &ObjectId) -> Result<Option<Transaction>>;
    async fn find_by_reference(&self, reference: &str) -> Result<Option<Transaction>>;
    /// Applies gateway truth only if the stored status is still `expected_status`.
    async fn apply_gateway_result(
        &self,
        id: &ObjectId,
        expected_status: &str,
        patch: &GatewayPatch,
    ) -> Result<bool>;
}

#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Inserts the order unless one already exists for its transaction.
    /// Returns `None` when the transaction already has an order.
    async fn insert_for_transaction(&self, order: &Order) -> Result<Option<Order>>;
    async fn find_by_id(&self, id: &ObjectId) -> Result<Option<Order>>;
    async fn find_by_transaction(&self, transaction_id: &ObjectId) -> Result<Option<Order>>;
    async fn list_by_customer(&self, customer_id: &str) -> Result<Vec<Order>>;
    /// Pending orders, and assigned orders still without a truck, whose
    /// transaction was created before `cutoff`. Oldest first.
    async fn find_unassigned_before(&self, cutoff: DateTime<Utc>, limit: i64) -> Result<Vec<Order>>;
    /// Moves `expected -> next`, attaching `truck_id` when given.
    async fn transition(
        &self,
        id: &ObjectId,
        expected: OrderStatus,
        next: OrderStatus,
        truck_id: Option<i64>,
    ) -> Result<bool>;
    /// Attaches a truck to an order still in `expected` with no truck yet,
    /// moving it to `Assigned`.
    async fn assign_truck(&self, id: &ObjectId, expected: OrderStatus, truck_id: i64) -> Result<bool>;
    /// Rates a closed order that has not been rated yet.
    async fn attach_rating(&self, id: &ObjectId, rating: u8, review: Option<String>) -> Result<bool>;
}

#[async_trait]
pub trait PaymentMethodStore: Send + Sync {
    async fn find_by_id(&self, id: &ObjectId) -> Result<Option<PaymentMethod>>;
    async fn find_by_fingerprint(&self, user_id: &str, unique_id: &str) -> Result<Option<PaymentMethod>>;
    /// Inserts `method` unless `(user_id, unique_id)` already exists, returning
    /// whichever record is stored.
    async fn insert_if_absent(&self, method: &PaymentMethod) -> Result<PaymentMethod>;
}

/// Read-only view of customer and driver contact details.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn contact(&self, user_id: &str) -> Result<Option<UserContact>>;
}

/// Read-only view of the fleet; zero or one truck is active at a time.
#[async_trait]
pub trait FleetDirectory: Send + Sync {
    async fn active_truck(&self) -> Result<Option<Truck>>;
}

pub type TransactionStoreRef = Arc<dyn TransactionStore>;
pub type OrderStoreRef = Arc<dyn OrderStore>;
pub type PaymentMethodStoreRef = Arc<dyn PaymentMethodStore>;
pub type UserDirectoryRef = Arc<dyn UserDirectory>;
pub type FleetDirectoryRef = Arc<dyn FleetDirectory>;
