#![allow(dead_code)]

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bson::oid::ObjectId;
use chrono::{DateTime, Utc};
use serde_json::{json, Value};

use aquaflow::dtos::payment_dtos::InitiateTransactionRequest;
use aquaflow::errors::{AppError, Result};
use aquaflow::models::order::{Order, OrderStatus};
use aquaflow::models::transaction::{Address, OrderDetails, PaymentChannel, Transaction};
use aquaflow::models::truck::Truck;
use aquaflow::models::user::{Principal, UserContact};
use aquaflow::services::fcm_service::PushNotifier;
use aquaflow::services::notification_service::NotificationDispatcher;
use aquaflow::services::order_service::OrderLifecycle;
use aquaflow::services::payment_method_service::PaymentMethodVault;
use aquaflow::services::paystack_service::{
    canonicalize, AuthorizationCharge, CallKind, CanonicalResult, CardInitialization,
    MobileMoneyCharge, PaymentGatewayClient,
};
use aquaflow::services::reconciliation_service::{ReconciliationConfig, ReconciliationScheduler};
use aquaflow::services::sms_service::MessageDispatcher;
use aquaflow::services::transaction_service::TransactionManager;
use aquaflow::store::in_memory::{
    InMemoryFleetDirectory, InMemoryOrderStore, InMemoryPaymentMethodStore,
    InMemoryTransactionStore, InMemoryUserDirectory,
};
use aquaflow::store::{OrderStore, OrderStoreRef};

pub const CUSTOMER_ID: &str = "cust-1";
pub const DRIVER_ID: &str = "driver-7";

// ---------------------------------------------------------------- gateway

/// A scripted gateway reply: an HTTP status and body fed through the real
/// response parser, or a transport failure.
#[derive(Debug, Clone)]
pub enum Reply {
    Http(u16, Value),
    Unavailable,
}

impl Reply {
    fn into_result(self, kind: CallKind) -> Result<CanonicalResult> {
        match self {
            Reply::Http(status, body) => canonicalize(kind, status, body),
            Reply::Unavailable => Err(AppError::gateway("operation timed out", true)),
        }
    }
}

#[derive(Default)]
pub struct FakeGateway {
    charges: Mutex<VecDeque<Reply>>,
    initializations: Mutex<VecDeque<Reply>>,
    token_charges: Mutex<VecDeque<Reply>>,
    verifications: Mutex<HashMap<String, Reply>>,
    /// `"<call>:<reference>"` for every call, in order.
    pub calls: Mutex<Vec<String>>,
    pub charges_seen: Mutex<Vec<MobileMoneyCharge>>,
    pub token_charges_seen: Mutex<Vec<AuthorizationCharge>>,
}

impl FakeGateway {
    pub fn on_charge(&self, reply: Reply) {
        self.charges.lock().unwrap().push_back(reply);
    }

    pub fn on_initialize(&self, reply: Reply) {
        self.initializations.lock().unwrap().push_back(reply);
    }

    pub fn on_token_charge(&self, reply: Reply) {
        self.token_charges.lock().unwrap().push_back(reply);
    }

    /// Every verification of `reference` answers with `reply`.
    pub fn on_verify(&self, reference: &str, reply: Reply) {
        self.verifications
            .lock()
            .unwrap()
            .insert(reference.to_string(), reply);
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn last_charge(&self) -> Option<MobileMoneyCharge> {
        self.charges_seen.lock().unwrap().last().cloned()
    }

    pub fn last_token_charge(&self) -> Option<AuthorizationCharge> {
        self.token_charges_seen.lock().unwrap().last().cloned()
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl PaymentGatewayClient for FakeGateway {
    fn name(&self) -> &'static str {
        "paystack"
    }

    async fn charge(&self, request: &MobileMoneyCharge, _deadline: Duration) -> Result<CanonicalResult> {
        self.record(format!("charge:{}", request.reference));
        self.charges_seen.lock().unwrap().push(request.clone());
        let reply = self.charges.lock().unwrap().pop_front().unwrap_or(Reply::Unavailable);
        reply.into_result(CallKind::Charge)
    }

    async fn initialize(&self, request: &CardInitialization, _deadline: Duration) -> Result<CanonicalResult> {
        self.record(format!("initialize:{}", request.reference));
        let reply = self
            .initializations
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Reply::Unavailable);
        reply.into_result(CallKind::Initialize)
    }

    async fn charge_with_token(
        &self,
        request: &AuthorizationCharge,
        _deadline: Duration,
    ) -> Result<CanonicalResult> {
        self.record(format!("token:{}", request.reference));
        self.token_charges_seen.lock().unwrap().push(request.clone());
        let reply = self
            .token_charges
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Reply::Unavailable);
        reply.into_result(CallKind::ChargeAuthorization)
    }

    async fn verify(&self, reference: &str, _deadline: Duration) -> Result<CanonicalResult> {
        self.record(format!("verify:{}", reference));
        let reply = self
            .verifications
            .lock()
            .unwrap()
            .get(reference)
            .cloned()
            .unwrap_or(Reply::Unavailable);
        reply.into_result(CallKind::Verify)
    }
}

// ---------------------------------------------------------- gateway bodies

pub fn card_success(reference: &str) -> Reply {
    Reply::Http(
        200,
        json!({
            "status": true,
            "message": "Verification successful",
            "data": {
                "status": "success",
                "reference": reference,
                "amount": 10000,
                "gateway_response": "Approved",
                "channel": "card",
                "currency": "GHS",
                "created_at": "2024-08-22T09:15:02.000Z",
                "authorization": {
                    "authorization_code": "AUTH_card01",
                    "bin": "408408",
                    "last4": "4081",
                    "channel": "card",
                    "brand": "visa",
                    "reusable": true
                },
                "customer": { "first_name": "Ama", "last_name": "Mensah", "email": "ama@example.com" }
            }
        }),
    )
}

pub fn momo_success(reference: &str) -> Reply {
    Reply::Http(
        200,
        json!({
            "status": true,
            "message": "Charge attempted",
            "data": {
                "status": "success",
                "reference": reference,
                "amount": 5000,
                "channel": "mobile_money",
                "currency": "GHS",
                "gateway_response": "Approved",
                "authorization": {
                    "authorization_code": "AUTH_momo01",
                    "bin": "055XXX",
                    "last4": "4567",
                    "channel": "mobile_money",
                    "brand": "mtn"
                },
                "customer": { "first_name": "Ama", "last_name": "Mensah", "email": "ama@example.com" }
            }
        }),
    )
}

pub fn in_flight(reference: &str, status: &str) -> Reply {
    Reply::Http(
        200,
        json!({
            "status": true,
            "message": "Charge attempted",
            "data": { "status": status, "reference": reference, "authorization": null }
        }),
    )
}

pub fn declined(message: &str) -> Reply {
    Reply::Http(400, json!({ "status": false, "message": message }))
}

pub fn card_initialized(reference: &str) -> Reply {
    Reply::Http(
        200,
        json!({
            "status": true,
            "message": "Authorization URL created",
            "data": {
                "authorization_url": format!("https://checkout.paystack.com/{}", reference),
                "access_code": "acc_123",
                "reference": reference
            }
        }),
    )
}

// ------------------------------------------------------------ notifications

#[derive(Default)]
pub struct RecordingPush {
    pub sent: Mutex<Vec<(String, String)>>,
}

impl RecordingPush {
    pub fn titles_for(&self, token: &str) -> Vec<String> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .filter(|(t, _)| t == token)
            .map(|(_, title)| title.clone())
            .collect()
    }

    pub fn count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }
}

#[async_trait]
impl PushNotifier for RecordingPush {
    async fn send_to_device(
        &self,
        token: &str,
        title: &str,
        _body: &str,
        _data: Value,
        _click_action: &str,
    ) -> Result<()> {
        self.sent
            .lock()
            .unwrap()
            .push((token.to_string(), title.to_string()));
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingMessenger {
    pub sms: Mutex<Vec<(String, String)>>,
    pub emails: Mutex<Vec<(String, String)>>,
}

impl RecordingMessenger {
    pub fn email_count(&self) -> usize {
        self.emails.lock().unwrap().len()
    }

    pub fn sms_count(&self) -> usize {
        self.sms.lock().unwrap().len()
    }
}

#[async_trait]
impl MessageDispatcher for RecordingMessenger {
    async fn send_sms(&self, phone: &str, message: &str) -> Result<()> {
        self.sms
            .lock()
            .unwrap()
            .push((phone.to_string(), message.to_string()));
        Ok(())
    }

    async fn send_email(&self, to: &str, subject: &str, _body: &str) -> Result<()> {
        self.emails
            .lock()
            .unwrap()
            .push((to.to_string(), subject.to_string()));
        Ok(())
    }
}

/// Polls `check` until it holds or a second has passed.
pub async fn eventually<F: Fn() -> bool>(check: F) -> bool {
    for _ in 0..100 {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    check()
}

/// Gives spawned notification tasks a chance to run.
pub async fn settle_background() {
    tokio::time::sleep(Duration::from_millis(50)).await;
}

// ------------------------------------------------------------- flaky store

/// Wraps the in-memory order store and fails truck assignment for chosen
/// orders, to exercise batch resilience.
pub struct FlakyOrderStore {
    inner: Arc<InMemoryOrderStore>,
    failing: HashSet<ObjectId>,
}

impl FlakyOrderStore {
    pub fn new(inner: Arc<InMemoryOrderStore>, failing: impl IntoIterator<Item = ObjectId>) -> Self {
        Self {
            inner,
            failing: failing.into_iter().collect(),
        }
    }
}

#[async_trait]
impl OrderStore for FlakyOrderStore {
    async fn insert_for_transaction(&self, order: &Order) -> Result<Option<Order>> {
        self.inner.insert_for_transaction(order).await
    }

    async fn find_by_id(&self, id: &ObjectId) -> Result<Option<Order>> {
        self.inner.find_by_id(id).await
    }

    async fn find_by_transaction(&self, transaction_id: &ObjectId) -> Result<Option<Order>> {
        self.inner.find_by_transaction(transaction_id).await
    }

    async fn list_by_customer(&self, customer_id: &str) -> Result<Vec<Order>> {
        self.inner.list_by_customer(customer_id).await
    }

    async fn find_unassigned_before(&self, cutoff: DateTime<Utc>, limit: i64) -> Result<Vec<Order>> {
        self.inner.find_unassigned_before(cutoff, limit).await
    }

    async fn transition(
        &self,
        id: &ObjectId,
        expected: OrderStatus,
        next: OrderStatus,
        truck_id: Option<i64>,
    ) -> Result<bool> {
        if self.failing.contains(id) {
            return Err(AppError::persistence("write concern timeout"));
        }
        self.inner.transition(id, expected, next, truck_id).await
    }

    async fn assign_truck(&self, id: &ObjectId, expected: OrderStatus, truck_id: i64) -> Result<bool> {
        if self.failing.contains(id) {
            return Err(AppError::persistence("write concern timeout"));
        }
        self.inner.assign_truck(id, expected, truck_id).await
    }

    async fn attach_rating(&self, id: &ObjectId, rating: u8, review: Option<String>) -> Result<bool> {
        self.inner.attach_rating(id, rating, review).await
    }
}

// ------------------------------------------------------------------ harness

pub struct Harness {
    pub gateway: Arc<FakeGateway>,
    pub transactions: Arc<InMemoryTransactionStore>,
    pub orders: Arc<InMemoryOrderStore>,
    pub methods: Arc<InMemoryPaymentMethodStore>,
    pub users: Arc<InMemoryUserDirectory>,
    pub fleet: Arc<InMemoryFleetDirectory>,
    pub push: Arc<RecordingPush>,
    pub messages: Arc<RecordingMessenger>,
    pub notifier: NotificationDispatcher,
    pub lifecycle: OrderLifecycle,
    pub vault: PaymentMethodVault,
    pub manager: TransactionManager,
}

impl Harness {
    pub fn new() -> Self {
        let gateway = Arc::new(FakeGateway::default());
        let transactions = Arc::new(InMemoryTransactionStore::new());
        let orders = Arc::new(InMemoryOrderStore::new());
        let methods = Arc::new(InMemoryPaymentMethodStore::new());
        let users = Arc::new(InMemoryUserDirectory::new());
        let fleet = Arc::new(InMemoryFleetDirectory::new());
        let push = Arc::new(RecordingPush::default());
        let messages = Arc::new(RecordingMessenger::default());

        let notifier = NotificationDispatcher::new(push.clone(), messages.clone(), users.clone());
        let lifecycle = OrderLifecycle::new(orders.clone(), notifier.clone());
        let vault = PaymentMethodVault::new(methods.clone());
        let manager = TransactionManager::new(
            gateway.clone(),
            transactions.clone(),
            lifecycle.clone(),
            vault.clone(),
            users.clone(),
            notifier.clone(),
            Duration::from_secs(5),
        );

        Self {
            gateway,
            transactions,
            orders,
            methods,
            users,
            fleet,
            push,
            messages,
            notifier,
            lifecycle,
            vault,
            manager,
        }
    }

    pub async fn with_customer(self, device_token: Option<&str>) -> Self {
        self.users
            .upsert(UserContact {
                user_id: CUSTOMER_ID.into(),
                first_name: "Ama".into(),
                last_name: "Mensah".into(),
                email: Some("ama@example.com".into()),
                phone: Some("0551234567".into()),
                device_token: device_token.map(str::to_string),
            })
            .await;
        self
    }

    pub async fn with_active_truck(self, id: i64) -> Self {
        self.users
            .upsert(UserContact {
                user_id: DRIVER_ID.into(),
                first_name: "Kofi".into(),
                device_token: Some("driver-token".into()),
                ..Default::default()
            })
            .await;
        self.fleet
            .register(Truck {
                id,
                driver_id: DRIVER_ID.into(),
                plate_number: "GR-1234-24".into(),
                capacity: Some("10000L".into()),
                active: true,
            })
            .await;
        self
    }

    pub fn scheduler(&self, threshold: Duration) -> ReconciliationScheduler {
        self.scheduler_over(self.orders.clone(), threshold)
    }

    pub fn scheduler_over(&self, orders: OrderStoreRef, threshold: Duration) -> ReconciliationScheduler {
        let lifecycle = OrderLifecycle::new(orders.clone(), self.notifier.clone());
        ReconciliationScheduler::new(
            orders,
            lifecycle,
            self.fleet.clone(),
            self.notifier.clone(),
            ReconciliationConfig {
                interval: Duration::from_millis(20),
                threshold,
                batch_size: 100,
            },
        )
    }

    /// Stores a pending order whose transaction is `age` old.
    pub async fn seed_order(&self, age: chrono::Duration, status: OrderStatus) -> Order {
        let tx = Transaction::initiated(
            CUSTOMER_ID.into(),
            "ama@example.com".into(),
            PaymentChannel::MobileMoney,
            50.0,
            "GHS".into(),
            json!({}),
            order_details(),
        );
        let mut order = Order::from_transaction(&tx);
        order.transaction_created_at = Utc::now() - age;
        order.status = status;
        self.orders
            .insert_for_transaction(&order)
            .await
            .unwrap()
            .unwrap()
    }
}

// ----------------------------------------------------------------- fixtures

pub fn customer() -> Principal {
    Principal {
        user_id: CUSTOMER_ID.into(),
        email: Some("ama@example.com".into()),
        phone: Some("0551234567".into()),
        role: Some("customer".into()),
    }
}

pub fn order_details() -> OrderDetails {
    OrderDetails {
        refinery_id: Some(3),
        pickup: Address {
            place_id: "ChIJpickup".into(),
            address: "Weija Treatment Plant".into(),
        },
        dropoff: Address {
            place_id: "ChIJdropoff".into(),
            address: "12 Oxford St, Osu".into(),
        },
        capacity: Some("5000L".into()),
        water_type: Some("treated".into()),
        water_cost: 40.0,
        delivery_fee: 10.0,
        distance_km: Some(14.2),
    }
}

pub fn mobile_money_request() -> InitiateTransactionRequest {
    InitiateTransactionRequest {
        channel: PaymentChannel::MobileMoney,
        amount: 50.0,
        currency: "GHS".into(),
        email: None,
        phone: Some("0551234567".into()),
        provider: Some("mtn".into()),
        order: order_details(),
    }
}

pub fn card_request() -> InitiateTransactionRequest {
    InitiateTransactionRequest {
        channel: PaymentChannel::Card,
        amount: 100.0,
        currency: "GHS".into(),
        email: None,
        phone: None,
        provider: None,
        order: order_details(),
    }
}
