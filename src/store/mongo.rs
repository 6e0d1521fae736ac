use async_trait::async_trait;
use bson::{doc, oid::ObjectId, DateTime as BsonDateTime, Document};
use chrono::{DateTime, Utc};
use futures_util::TryStreamExt;
use mongodb::error::{ErrorKind, WriteFailure};
use mongodb::options::IndexOptions;
use mongodb::{Collection, Database, IndexModel};

use crate::errors::Result;
use crate::models::order::{Order, OrderStatus};
use crate::models::payment_method::PaymentMethod;
use crate::models::transaction::{GatewayPatch, Transaction};
use crate::models::truck::Truck;
use crate::models::user::UserContact;
use crate::store::{FleetDirectory, OrderStore, PaymentMethodStore, TransactionStore, UserDirectory};

const TRANSACTIONS: &str = "transactions";
const ORDERS: &str = "orders";
const PAYMENT_METHODS: &str = "payment_methods";
const USERS: &str = "users";
const TRUCKS: &str = "trucks";

const DUPLICATE_KEY: i32 = 11000;

fn is_duplicate_key(err: &mongodb::error::Error) -> bool {
    match err.kind.as_ref() {
        ErrorKind::Write(WriteFailure::WriteError(write_error)) => write_error.code == DUPLICATE_KEY,
        _ => false,
    }
}

/// Creates the unique indexes the guarded writes rely on.
pub async fn ensure_indexes(db: &Database) -> Result<()> {
    db.collection::<Document>(TRANSACTIONS)
        .create_index(
            IndexModel::builder()
                .keys(doc! { "reference": 1 })
                .options(IndexOptions::builder().unique(true).sparse(true).build())
                .build(),
        )
        .await?;

    db.collection::<Document>(ORDERS)
        .create_index(
            IndexModel::builder()
                .keys(doc! { "transaction_id": 1 })
                .options(IndexOptions::builder().unique(true).build())
                .build(),
        )
        .await?;

    db.collection::<Document>(ORDERS)
        .create_index(
            IndexModel::builder()
                .keys(doc! { "status": 1, "transaction_created_at": 1 })
                .build(),
        )
        .await?;

    db.collection::<Document>(PAYMENT_METHODS)
        .create_index(
            IndexModel::builder()
                .keys(doc! { "user_id": 1, "unique_id": 1 })
                .options(IndexOptions::builder().unique(true).build())
                .build(),
        )
        .await?;

    Ok(())
}

#[derive(Clone)]
pub struct MongoTransactionStore {
    collection: Collection<Transaction>,
}

impl MongoTransactionStore {
    pub fn new(db: &Database) -> Self {
        Self {
            collection: db.collection(TRANSACTIONS),
        }
    }
}

#[async_trait]
impl TransactionStore for MongoTransactionStore {
    async fn insert(&self, tx: &Transaction) -> Result<()> {
        self.collection.insert_one(tx).await?;
        Ok(())
    }

    async fn find_by_id(&self, id: &ObjectId) -> Result<Option<Transaction>> {
        Ok(self.collection.find_one(doc! { "_id": id }).await?)
    }

    async fn find_by_reference(&self, reference: &str) -> Result<Option<Transaction>> {
        Ok(self.collection.find_one(doc! { "reference": reference }).await?)
    }

    async fn apply_gateway_result(
        &self,
        id: &ObjectId,
        expected_status: &str,
        patch: &GatewayPatch,
    ) -> Result<bool> {
        let mut set = doc! {
            "status": &patch.status,
            "updated_at": BsonDateTime::now(),
        };
        if let Some(reference) = &patch.reference {
            set.insert("reference", reference);
        }
        if let Some(channel) = &patch.channel {
            set.insert("channel", bson::to_bson(channel)?);
        }
        if let Some(mask) = &patch.instrument_mask {
            set.insert("instrument_mask", mask);
        }
        if let Some(scheme) = &patch.scheme {
            set.insert("scheme", scheme);
        }
        if let Some(message) = &patch.gateway_message {
            set.insert("gateway_message", message);
        }

        let filter = doc! { "_id": id, "status": expected_status };
        let update = doc! {
            "$set": set,
            "$push": { "raw_responses": bson::to_bson(&patch.raw_response)? },
        };

        let result = self.collection.update_one(filter, update).await?;
        Ok(result.matched_count == 1)
    }
}

#[derive(Clone)]
pub struct MongoOrderStore {
    collection: Collection<Order>,
}

impl MongoOrderStore {
    pub fn new(db: &Database) -> Self {
        Self {
            collection: db.collection(ORDERS),
        }
    }
}

#[async_trait]
impl OrderStore for MongoOrderStore {
    async fn insert_for_transaction(&self, order: &Order) -> Result<Option<Order>> {
        match self.collection.insert_one(order).await {
            Ok(_) => Ok(Some(order.clone())),
            Err(e) if is_duplicate_key(&e) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn find_by_id(&self, id: &ObjectId) -> Result<Option<Order>> {
        Ok(self.collection.find_one(doc! { "_id": id }).await?)
    }

    async fn find_by_transaction(&self, transaction_id: &ObjectId) -> Result<Option<Order>> {
        Ok(self
            .collection
            .find_one(doc! { "transaction_id": transaction_id })
            .await?)
    }

    async fn list_by_customer(&self, customer_id: &str) -> Result<Vec<Order>> {
        let cursor = self
            .collection
            .find(doc! { "customer_id": customer_id })
            .sort(doc! { "created_at": -1 })
            .await?;
        Ok(cursor.try_collect().await?)
    }

    async fn find_unassigned_before(&self, cutoff: DateTime<Utc>, limit: i64) -> Result<Vec<Order>> {
        let filter = doc! {
            "$or": [
                { "status": OrderStatus::Pending.code() },
                { "status": OrderStatus::Assigned.code(), "truck_id": null },
            ],
            "transaction_created_at": { "$lt": BsonDateTime::from_chrono(cutoff) },
        };
        let cursor = self
            .collection
            .find(filter)
            .sort(doc! { "transaction_created_at": 1 })
            .limit(limit)
            .await?;
        Ok(cursor.try_collect().await?)
    }

    async fn transition(
        &self,
        id: &ObjectId,
        expected: OrderStatus,
        next: OrderStatus,
        truck_id: Option<i64>,
    ) -> Result<bool> {
        let mut set = doc! {
            "status": next.code(),
            "updated_at": BsonDateTime::now(),
        };
        if let Some(truck_id) = truck_id {
            set.insert("truck_id", truck_id);
        }

        let result = self
            .collection
            .update_one(doc! { "_id": id, "status": expected.code() }, doc! { "$set": set })
            .await?;
        Ok(result.matched_count == 1)
    }

    async fn assign_truck(&self, id: &ObjectId, expected: OrderStatus, truck_id: i64) -> Result<bool> {
        let filter = doc! { "_id": id, "status": expected.code(), "truck_id": null };
        let update = doc! {
            "$set": {
                "status": OrderStatus::Assigned.code(),
                "truck_id": truck_id,
                "updated_at": BsonDateTime::now(),
            }
        };
        let result = self.collection.update_one(filter, update).await?;
        Ok(result.matched_count == 1)
    }

    async fn attach_rating(&self, id: &ObjectId, rating: u8, review: Option<String>) -> Result<bool> {
        let filter = doc! {
            "_id": id,
            "status": OrderStatus::Closed.code(),
            "rating": null,
        };
        let update = doc! {
            "$set": {
                "rating": rating as i32,
                "review": review,
                "updated_at": BsonDateTime::now(),
            }
        };
        let result = self.collection.update_one(filter, update).await?;
        Ok(result.matched_count == 1)
    }
}

#[derive(Clone)]
pub struct MongoPaymentMethodStore {
    collection: Collection<PaymentMethod>,
}

impl MongoPaymentMethodStore {
    pub fn new(db: &Database) -> Self {
        Self {
            collection: db.collection(PAYMENT_METHODS),
        }
    }
}

#[async_trait]
impl PaymentMethodStore for MongoPaymentMethodStore {
    async fn find_by_id(&self, id: &ObjectId) -> Result<Option<PaymentMethod>> {
        Ok(self.collection.find_one(doc! { "_id": id }).await?)
    }

    async fn find_by_fingerprint(&self, user_id: &str, unique_id: &str) -> Result<Option<PaymentMethod>> {
        Ok(self
            .collection
            .find_one(doc! { "user_id": user_id, "unique_id": unique_id })
            .await?)
    }

    async fn insert_if_absent(&self, method: &PaymentMethod) -> Result<PaymentMethod> {
        match self.collection.insert_one(method).await {
            Ok(_) => Ok(method.clone()),
            Err(e) if is_duplicate_key(&e) => {
                // Lost the race to a concurrent verification; return the winner.
                self.find_by_fingerprint(&method.user_id, &method.unique_id)
                    .await?
                    .ok_or_else(|| {
                        crate::errors::AppError::persistence(
                            "payment method vanished after duplicate key",
                        )
                    })
            }
            Err(e) => Err(e.into()),
        }
    }
}

#[derive(Clone)]
pub struct MongoUserDirectory {
    collection: Collection<UserContact>,
}

impl MongoUserDirectory {
    pub fn new(db: &Database) -> Self {
        Self {
            collection: db.collection(USERS),
        }
    }
}

#[async_trait]
impl UserDirectory for MongoUserDirectory {
    async fn contact(&self, user_id: &str) -> Result<Option<UserContact>> {
        Ok(self.collection.find_one(doc! { "_id": user_id }).await?)
    }
}

#[derive(Clone)]
pub struct MongoFleetDirectory {
    collection: Collection<Truck>,
}

impl MongoFleetDirectory {
    pub fn new(db: &Database) -> Self {
        Self {
            collection: db.collection(TRUCKS),
        }
    }
}

#[async_trait]
impl FleetDirectory for MongoFleetDirectory {
    async fn active_truck(&self) -> Result<Option<Truck>> {
        Ok(self.collection.find_one(doc! { "active": true }).await?)
    }
}
