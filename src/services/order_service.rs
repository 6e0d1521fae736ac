// services/order_service.rs
use bson::oid::ObjectId;
use serde::Serialize;
use serde_json::json;
use tracing::{info, warn};

use crate::errors::{AppError, Result};
use crate::models::order::{Order, OrderAction, OrderStatus};
use crate::models::transaction::Transaction;
use crate::models::truck::Truck;
use crate::services::notification_service::{NotificationDispatcher, PushNotice};
use crate::store::OrderStoreRef;

/// Outcome of a guarded transition. `applied == false` means the stored
/// order was no longer in the required state; `order` is the current copy.
#[derive(Debug, Clone, Serialize)]
pub struct Transition {
    pub applied: bool,
    pub order: Order,
}

pub(crate) fn parse_object_id(id: &str, entity: &str) -> Result<ObjectId> {
    ObjectId::parse_str(id.trim())
        .map_err(|_| AppError::invalid_data(format!("Invalid {} id: {}", entity, id)))
}

fn log_stale(order: &Order, expected: OrderStatus, attempted: OrderStatus) {
    let conflict = AppError::StateConflict {
        entity: "order",
        id: order.id.to_hex(),
        expected: expected.to_string(),
        actual: order.status.to_string(),
    };
    warn!(
        order_id = %order.id,
        prior_status = %order.status,
        attempted_status = %attempted,
        "Skipping stale transition: {}",
        conflict
    );
}

#[derive(Clone)]
pub struct OrderLifecycle {
    orders: OrderStoreRef,
    notifier: NotificationDispatcher,
}

impl OrderLifecycle {
    pub fn new(orders: OrderStoreRef, notifier: NotificationDispatcher) -> Self {
        Self { orders, notifier }
    }

    /// Creates the pending order for a settled transaction. Returns the
    /// existing order instead when one is already linked, with `false`.
    pub async fn create_from_transaction(&self, tx: &Transaction) -> Result<(Order, bool)> {
        if let Some(existing) = self.orders.find_by_transaction(&tx.id).await? {
            return Ok((existing, false));
        }

        let order = Order::from_transaction(tx);
        match self.orders.insert_for_transaction(&order).await? {
            Some(created) => {
                info!(
                    order_id = %created.id,
                    transaction_id = %tx.id,
                    reference = ?tx.reference,
                    "📦 Order created from settled transaction"
                );
                Ok((created, true))
            }
            None => {
                let existing = self.orders.find_by_transaction(&tx.id).await?.ok_or_else(|| {
                    AppError::persistence(format!("order for transaction {} vanished", tx.id))
                })?;
                Ok((existing, false))
            }
        }
    }

    pub async fn get_order(&self, order_id: &str) -> Result<Order> {
        let id = parse_object_id(order_id, "order")?;
        self.load(&id).await
    }

    pub async fn order_for_transaction(&self, transaction_id: &ObjectId) -> Result<Option<Order>> {
        self.orders.find_by_transaction(transaction_id).await
    }

    pub async fn list_customer_orders(&self, customer_id: &str) -> Result<Vec<Order>> {
        self.orders.list_by_customer(customer_id).await
    }

    pub async fn approve_or_reject(
        &self,
        order_id: &str,
        action: &str,
        truck_id: Option<i64>,
    ) -> Result<Transition> {
        let action: OrderAction = action.parse()?;
        let order = self.get_order(order_id).await?;

        match action {
            OrderAction::Approve => {
                self.guarded(order, OrderStatus::Pending, OrderStatus::Assigned, truck_id)
                    .await
            }
            OrderAction::Reject => {
                self.guarded(order, OrderStatus::Pending, OrderStatus::Rejected, None)
                    .await
            }
        }
    }

    pub async fn mark_ready_for_delivery(&self, order_id: &str) -> Result<Transition> {
        let order = self.get_order(order_id).await?;
        let transition = self
            .guarded(order, OrderStatus::Assigned, OrderStatus::ReadyForDelivery, None)
            .await?;

        if transition.applied {
            let order = &transition.order;
            self.notifier.push_to_user(
                &order.customer_id,
                PushNotice::new(
                    "Order ready for delivery",
                    "Your water is loaded and on its way.",
                    json!({ "order_id": order.id.to_hex(), "status": order.status.code() }),
                ),
            );
        }
        Ok(transition)
    }

    pub async fn close_order(&self, order_id: &str) -> Result<Transition> {
        let order = self.get_order(order_id).await?;
        let transition = self
            .guarded(order, OrderStatus::ReadyForDelivery, OrderStatus::Closed, None)
            .await?;

        if transition.applied {
            let order = &transition.order;
            self.notifier.push_to_user(
                &order.customer_id,
                PushNotice::new(
                    "Order delivered",
                    "Your water has been delivered. Tap to rate your delivery.",
                    json!({ "order_id": order.id.to_hex(), "status": order.status.code() }),
                ),
            );
        }
        Ok(transition)
    }

    pub async fn submit_rating(
        &self,
        order_id: &str,
        rating: i32,
        review: Option<String>,
    ) -> Result<Order> {
        if !(1..=5).contains(&rating) {
            return Err(AppError::invalid_data(format!(
                "Rating must be between 1 and 5, got {}",
                rating
            )));
        }

        let order = self.get_order(order_id).await?;
        if order.status != OrderStatus::Closed {
            return Err(AppError::invalid_data(format!(
                "Order {} is {}, only closed orders can be rated",
                order.id, order.status
            )));
        }
        if order.rating.is_some() {
            return Err(AppError::invalid_data(format!("Order {} is already rated", order.id)));
        }

        let review = review.map(|r| r.trim().to_string()).filter(|r| !r.is_empty());
        if !self.orders.attach_rating(&order.id, rating as u8, review).await? {
            return Err(AppError::invalid_data(format!("Order {} is already rated", order.id)));
        }

        info!(order_id = %order.id, rating, "⭐ Order rated");
        self.load(&order.id).await
    }

    /// Attaches the active truck to an unassigned order. Used by the
    /// reconciliation sweep; notifications are the caller's concern.
    pub async fn attach_truck(&self, order: &Order, truck: &Truck) -> Result<Transition> {
        if !order.status.can_transition_to(OrderStatus::Assigned) || order.truck_id.is_some() {
            log_stale(order, OrderStatus::Pending, OrderStatus::Assigned);
            return Ok(Transition {
                applied: false,
                order: order.clone(),
            });
        }

        let applied = self
            .orders
            .assign_truck(&order.id, order.status, truck.id)
            .await?;
        let current = self.load(&order.id).await?;

        if applied {
            info!(
                order_id = %order.id,
                truck_id = truck.id,
                from = %order.status,
                to = %OrderStatus::Assigned,
                "🚚 Truck assigned"
            );
        } else {
            log_stale(&current, order.status, OrderStatus::Assigned);
        }
        Ok(Transition {
            applied,
            order: current,
        })
    }

    async fn load(&self, id: &ObjectId) -> Result<Order> {
        self.orders
            .find_by_id(id)
            .await?
            .ok_or_else(|| AppError::not_found(format!("Order {} not found", id)))
    }

    async fn guarded(
        &self,
        order: Order,
        expected: OrderStatus,
        next: OrderStatus,
        truck_id: Option<i64>,
    ) -> Result<Transition> {
        if order.status != expected {
            log_stale(&order, expected, next);
            return Ok(Transition {
                applied: false,
                order,
            });
        }

        let applied = self
            .orders
            .transition(&order.id, expected, next, truck_id)
            .await?;
        let current = self.load(&order.id).await?;

        if applied {
            info!(
                order_id = %order.id,
                from = %expected,
                to = %next,
                truck_id = ?truck_id,
                "Order transition applied"
            );
        } else {
            log_stale(&current, expected, next);
        }
        Ok(Transition {
            applied,
            order: current,
        })
    }
}
