use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use bson::oid::ObjectId;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crate::errors::Result;
use crate::models::order::{Order, OrderStatus};
use crate::models::payment_method::PaymentMethod;
use crate::models::transaction::{GatewayPatch, Transaction};
use crate::models::truck::Truck;
use crate::models::user::UserContact;
use crate::store::{FleetDirectory, OrderStore, PaymentMethodStore, TransactionStore, UserDirectory};

/// A thread-safe in-memory transaction store.
///
/// Each guarded write checks and mutates under a single write lock, which
/// gives the same compare-and-set behaviour as the filtered Mongo updates.
#[derive(Default, Clone)]
pub struct InMemoryTransactionStore {
    transactions: Arc<RwLock<HashMap<ObjectId, Transaction>>>,
}

impl InMemoryTransactionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.transactions.read().await.len()
    }
}

#[async_trait]
impl TransactionStore for InMemoryTransactionStore {
    async fn insert(&self, tx: &Transaction) -> Result<()> {
        let mut transactions = self.transactions.write().await;
        transactions.insert(tx.id, tx.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: &ObjectId) -> Result<Option<Transaction>> {
        let transactions = self.transactions.read().await;
        Ok(transactions.get(id).cloned())
    }

    async fn find_by_reference(&self, reference: &str) -> Result<Option<Transaction>> {
        let transactions = self.transactions.read().await;
        Ok(transactions
            .values()
            .find(|tx| tx.reference.as_deref() == Some(reference))
            .cloned())
    }

    async fn apply_gateway_result(
        &self,
        id: &ObjectId,
        expected_status: &str,
        patch: &GatewayPatch,
    ) -> Result<bool> {
        let mut transactions = self.transactions.write().await;
        match transactions.get_mut(id) {
            Some(tx) if tx.status == expected_status => {
                patch.apply_to(tx);
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

#[derive(Default, Clone)]
pub struct InMemoryOrderStore {
    orders: Arc<RwLock<HashMap<ObjectId, Order>>>,
}

impl InMemoryOrderStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.orders.read().await.len()
    }
}

#[async_trait]
impl OrderStore for InMemoryOrderStore {
    async fn insert_for_transaction(&self, order: &Order) -> Result<Option<Order>> {
        let mut orders = self.orders.write().await;
        if orders
            .values()
            .any(|existing| existing.transaction_id == order.transaction_id)
        {
            return Ok(None);
        }
        orders.insert(order.id, order.clone());
        Ok(Some(order.clone()))
    }

    async fn find_by_id(&self, id: &ObjectId) -> Result<Option<Order>> {
        let orders = self.orders.read().await;
        Ok(orders.get(id).cloned())
    }

    async fn find_by_transaction(&self, transaction_id: &ObjectId) -> Result<Option<Order>> {
        let orders = self.orders.read().await;
        Ok(orders
            .values()
            .find(|order| &order.transaction_id == transaction_id)
            .cloned())
    }

    async fn list_by_customer(&self, customer_id: &str) -> Result<Vec<Order>> {
        let orders = self.orders.read().await;
        let mut found: Vec<Order> = orders
            .values()
            .filter(|order| order.customer_id == customer_id)
            .cloned()
            .collect();
        found.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(found)
    }

    async fn find_unassigned_before(&self, cutoff: DateTime<Utc>, limit: i64) -> Result<Vec<Order>> {
        let orders = self.orders.read().await;
        let mut found: Vec<Order> = orders
            .values()
            .filter(|order| order.transaction_created_at < cutoff)
            .filter(|order| match order.status {
                OrderStatus::Pending => true,
                OrderStatus::Assigned => order.truck_id.is_none(),
                _ => false,
            })
            .cloned()
            .collect();
        found.sort_by(|a, b| a.transaction_created_at.cmp(&b.transaction_created_at));
        found.truncate(limit.max(0) as usize);
        Ok(found)
    }

    async fn transition(
        &self,
        id: &ObjectId,
        expected: OrderStatus,
        next: OrderStatus,
        truck_id: Option<i64>,
    ) -> Result<bool> {
        let mut orders = self.orders.write().await;
        match orders.get_mut(id) {
            Some(order) if order.status == expected => {
                order.status = next;
                if truck_id.is_some() {
                    order.truck_id = truck_id;
                }
                order.updated_at = Utc::now();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn assign_truck(&self, id: &ObjectId, expected: OrderStatus, truck_id: i64) -> Result<bool> {
        let mut orders = self.orders.write().await;
        match orders.get_mut(id) {
            Some(order) if order.status == expected && order.truck_id.is_none() => {
                order.status = OrderStatus::Assigned;
                order.truck_id = Some(truck_id);
                order.updated_at = Utc::now();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn attach_rating(&self, id: &ObjectId, rating: u8, review: Option<String>) -> Result<bool> {
        let mut orders = self.orders.write().await;
        match orders.get_mut(id) {
            Some(order) if order.status == OrderStatus::Closed && order.rating.is_none() => {
                order.rating = Some(rating);
                order.review = review;
                order.updated_at = Utc::now();
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

#[derive(Default, Clone)]
pub struct InMemoryPaymentMethodStore {
    methods: Arc<RwLock<HashMap<ObjectId, PaymentMethod>>>,
}

impl InMemoryPaymentMethodStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.methods.read().await.len()
    }
}

#[async_trait]
impl PaymentMethodStore for InMemoryPaymentMethodStore {
    async fn find_by_id(&self, id: &ObjectId) -> Result<Option<PaymentMethod>> {
        let methods = self.methods.read().await;
        Ok(methods.get(id).cloned())
    }

    async fn find_by_fingerprint(&self, user_id: &str, unique_id: &str) -> Result<Option<PaymentMethod>> {
        let methods = self.methods.read().await;
        Ok(methods
            .values()
            .find(|m| m.user_id == user_id && m.unique_id == unique_id)
            .cloned())
    }

    async fn insert_if_absent(&self, method: &PaymentMethod) -> Result<PaymentMethod> {
        let mut methods = self.methods.write().await;
        if let Some(existing) = methods
            .values()
            .find(|m| m.user_id == method.user_id && m.unique_id == method.unique_id)
        {
            return Ok(existing.clone());
        }
        methods.insert(method.id, method.clone());
        Ok(method.clone())
    }
}

#[derive(Default, Clone)]
pub struct InMemoryUserDirectory {
    contacts: Arc<RwLock<HashMap<String, UserContact>>>,
}

impl InMemoryUserDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn upsert(&self, contact: UserContact) {
        let mut contacts = self.contacts.write().await;
        contacts.insert(contact.user_id.clone(), contact);
    }
}

#[async_trait]
impl UserDirectory for InMemoryUserDirectory {
    async fn contact(&self, user_id: &str) -> Result<Option<UserContact>> {
        let contacts = self.contacts.read().await;
        Ok(contacts.get(user_id).cloned())
    }
}

#[derive(Default, Clone)]
pub struct InMemoryFleetDirectory {
    trucks: Arc<RwLock<Vec<Truck>>>,
}

impl InMemoryFleetDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn register(&self, truck: Truck) {
        let mut trucks = self.trucks.write().await;
        trucks.retain(|t| t.id != truck.id);
        trucks.push(truck);
    }
}

#[async_trait]
impl FleetDirectory for InMemoryFleetDirectory {
    async fn active_truck(&self) -> Result<Option<Truck>> {
        let trucks = self.trucks.read().await;
        Ok(trucks.iter().find(|t| t.active).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::transaction::{OrderDetails, PaymentChannel, STATUS_INITIATED};

    fn transaction(created_at: DateTime<Utc>) -> Transaction {
        Transaction {
            id: ObjectId::new(),
            user_id: "user-1".to_string(),
            email: "ama@example.com".to_string(),
            phone: None,
            amount: 50.0,
            currency: "GHS".to_string(),
            channel: PaymentChannel::Card,
            provider: None,
            reference: Some("ref-1".to_string()),
            status: STATUS_INITIATED.to_string(),
            gateway_message: None,
            instrument_mask: None,
            scheme: None,
            raw_request: serde_json::json!({}),
            raw_responses: vec![],
            order: OrderDetails::default(),
            created_at,
            updated_at: created_at,
        }
    }

    #[tokio::test]
    async fn only_one_order_per_transaction() {
        let store = InMemoryOrderStore::new();
        let tx = transaction(Utc::now());

        let first = store.insert_for_transaction(&Order::from_transaction(&tx)).await.unwrap();
        let second = store.insert_for_transaction(&Order::from_transaction(&tx)).await.unwrap();

        assert!(first.is_some());
        assert!(second.is_none());
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn transition_requires_expected_status() {
        let store = InMemoryOrderStore::new();
        let order = Order::from_transaction(&transaction(Utc::now()));
        store.insert_for_transaction(&order).await.unwrap();

        let stale = store
            .transition(&order.id, OrderStatus::Assigned, OrderStatus::ReadyForDelivery, None)
            .await
            .unwrap();
        let applied = store
            .transition(&order.id, OrderStatus::Pending, OrderStatus::Assigned, Some(3))
            .await
            .unwrap();

        assert!(!stale);
        assert!(applied);
        let stored = store.find_by_id(&order.id).await.unwrap().unwrap();
        assert_eq!(stored.status, OrderStatus::Assigned);
        assert_eq!(stored.truck_id, Some(3));
    }

    #[tokio::test]
    async fn unassigned_query_respects_cutoff_and_truck() {
        let store = InMemoryOrderStore::new();
        let old = Utc::now() - chrono::Duration::minutes(30);
        let pending = Order::from_transaction(&transaction(old));
        let fresh = Order::from_transaction(&transaction(Utc::now()));
        let mut with_truck = Order::from_transaction(&transaction(old));
        with_truck.status = OrderStatus::Assigned;
        with_truck.truck_id = Some(9);
        let mut without_truck = Order::from_transaction(&transaction(old));
        without_truck.status = OrderStatus::Assigned;

        for order in [&pending, &fresh, &with_truck, &without_truck] {
            store.insert_for_transaction(order).await.unwrap();
        }

        let cutoff = Utc::now() - chrono::Duration::minutes(5);
        let found = store.find_unassigned_before(cutoff, 10).await.unwrap();
        let ids: Vec<ObjectId> = found.iter().map(|o| o.id).collect();

        assert_eq!(found.len(), 2);
        assert!(ids.contains(&pending.id));
        assert!(ids.contains(&without_truck.id));
    }

    #[tokio::test]
    async fn gateway_result_is_guarded_by_status() {
        let store = InMemoryTransactionStore::new();
        let tx = transaction(Utc::now());
        store.insert(&tx).await.unwrap();
        let patch = GatewayPatch {
            status: "success".to_string(),
            reference: None,
            channel: None,
            instrument_mask: None,
            scheme: None,
            gateway_message: None,
            raw_response: serde_json::json!({"status": "success"}),
        };

        assert!(store.apply_gateway_result(&tx.id, STATUS_INITIATED, &patch).await.unwrap());
        assert!(!store.apply_gateway_result(&tx.id, STATUS_INITIATED, &patch).await.unwrap());

        let stored = store.find_by_id(&tx.id).await.unwrap().unwrap();
        assert_eq!(stored.status, "success");
        assert_eq!(stored.raw_responses.len(), 1);
    }
}
