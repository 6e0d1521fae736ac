// models/order.rs
use std::fmt;
use std::str::FromStr;

use bson::oid::ObjectId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::AppError;
use crate::models::transaction::{Address, Transaction};

/// Integer-coded order lifecycle. `Rejected` sits one below `Pending` so the
/// legacy numeric view (`Pending - 1`) still reads the same.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "i32", try_from = "i32")]
pub enum OrderStatus {
    Rejected,
    Pending,
    Assigned,
    ReadyForDelivery,
    Closed,
}

impl OrderStatus {
    pub fn code(self) -> i32 {
        match self {
            OrderStatus::Rejected => -1,
            OrderStatus::Pending => 0,
            OrderStatus::Assigned => 2,
            OrderStatus::ReadyForDelivery => 3,
            OrderStatus::Closed => 4,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, OrderStatus::Rejected | OrderStatus::Closed)
    }

    /// The transition table. Reconciliation re-enters `Assigned` to attach a
    /// truck, so `Assigned -> Assigned` is allowed.
    pub fn can_transition_to(self, next: OrderStatus) -> bool {
        matches!(
            (self, next),
            (OrderStatus::Pending, OrderStatus::Assigned)
                | (OrderStatus::Pending, OrderStatus::Rejected)
                | (OrderStatus::Assigned, OrderStatus::Assigned)
                | (OrderStatus::Assigned, OrderStatus::ReadyForDelivery)
                | (OrderStatus::ReadyForDelivery, OrderStatus::Closed)
        )
    }
}

impl From<OrderStatus> for i32 {
    fn from(status: OrderStatus) -> Self {
        status.code()
    }
}

impl TryFrom<i32> for OrderStatus {
    type Error = String;

    fn try_from(code: i32) -> Result<Self, Self::Error> {
        match code {
            -1 => Ok(OrderStatus::Rejected),
            0 => Ok(OrderStatus::Pending),
            2 => Ok(OrderStatus::Assigned),
            3 => Ok(OrderStatus::ReadyForDelivery),
            4 => Ok(OrderStatus::Closed),
            other => Err(format!("unknown order status code {}", other)),
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            OrderStatus::Rejected => "Rejected",
            OrderStatus::Pending => "Pending",
            OrderStatus::Assigned => "Assigned",
            OrderStatus::ReadyForDelivery => "ReadyForDelivery",
            OrderStatus::Closed => "Closed",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderAction {
    Approve,
    Reject,
}

impl FromStr for OrderAction {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "approve" => Ok(OrderAction::Approve),
            "reject" => Ok(OrderAction::Reject),
            other => Err(AppError::invalid_data(format!(
                "Unknown order action '{}', expected 'approve' or 'reject'",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    #[serde(rename = "_id")]
    pub id: ObjectId,

    pub transaction_id: ObjectId,
    pub reference: Option<String>,
    pub customer_id: String,

    pub refinery_id: Option<i64>,
    pub truck_id: Option<i64>,

    // Cost fields mirrored from the transaction
    pub amount: f64,
    pub currency: String,
    pub water_cost: f64,
    pub delivery_fee: f64,
    pub distance_km: Option<f64>,

    pub pickup: Address,
    pub dropoff: Address,
    pub capacity: Option<String>,
    pub water_type: Option<String>,

    pub status: OrderStatus,
    pub rating: Option<u8>,
    pub review: Option<String>,

    #[serde(with = "bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub transaction_created_at: DateTime<Utc>,
    #[serde(with = "bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub updated_at: DateTime<Utc>,
}

impl Order {
    /// Materialises a pending order from a settled transaction.
    pub fn from_transaction(tx: &Transaction) -> Self {
        let now = Utc::now();
        let details = &tx.order;
        Order {
            id: ObjectId::new(),
            transaction_id: tx.id,
            reference: tx.reference.clone(),
            customer_id: tx.user_id.clone(),
            refinery_id: details.refinery_id,
            truck_id: None,
            amount: tx.amount,
            currency: tx.currency.clone(),
            water_cost: details.water_cost,
            delivery_fee: details.delivery_fee,
            distance_km: details.distance_km,
            pickup: details.pickup.clone(),
            dropoff: details.dropoff.clone(),
            capacity: details.capacity.clone(),
            water_type: details.water_type.clone(),
            status: OrderStatus::Pending,
            rating: None,
            review: None,
            transaction_created_at: tx.created_at,
            created_at: now,
            updated_at: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_round_trip_through_integers() {
        for status in [
            OrderStatus::Rejected,
            OrderStatus::Pending,
            OrderStatus::Assigned,
            OrderStatus::ReadyForDelivery,
            OrderStatus::Closed,
        ] {
            assert_eq!(OrderStatus::try_from(status.code()), Ok(status));
        }
        assert!(OrderStatus::try_from(1).is_err());
        assert_eq!(OrderStatus::Rejected.code(), OrderStatus::Pending.code() - 1);
    }

    #[test]
    fn closed_is_only_reachable_from_ready_for_delivery() {
        for from in [
            OrderStatus::Rejected,
            OrderStatus::Pending,
            OrderStatus::Assigned,
            OrderStatus::Closed,
        ] {
            assert!(!from.can_transition_to(OrderStatus::Closed), "{} -> Closed", from);
        }
        assert!(OrderStatus::ReadyForDelivery.can_transition_to(OrderStatus::Closed));
    }

    #[test]
    fn terminal_states_have_no_exits() {
        for next in [
            OrderStatus::Pending,
            OrderStatus::Assigned,
            OrderStatus::ReadyForDelivery,
            OrderStatus::Closed,
            OrderStatus::Rejected,
        ] {
            assert!(!OrderStatus::Closed.can_transition_to(next));
            assert!(!OrderStatus::Rejected.can_transition_to(next));
        }
    }

    #[test]
    fn status_serializes_as_integer() {
        assert_eq!(serde_json::to_string(&OrderStatus::Assigned).unwrap(), "2");
        let parsed: OrderStatus = serde_json::from_str("3").unwrap();
        assert_eq!(parsed, OrderStatus::ReadyForDelivery);
    }

    #[test]
    fn unknown_action_is_a_validation_error() {
        assert_eq!("Approve".parse::<OrderAction>().unwrap(), OrderAction::Approve);
        assert!(matches!(
            "cancel".parse::<OrderAction>(),
            Err(AppError::Validation(_))
        ));
    }
}
