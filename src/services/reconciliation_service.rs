//! Periodic sweep that assigns the active truck to orders nobody picked up.
//!
//! Orders are only considered once their transaction is older than the
//! configured threshold, so a customer who just paid is never raced. Each
//! order is processed on its own; a failure is logged and the sweep moves on.

use std::time::Duration;

use chrono::Utc;
use serde_json::json;
use tokio::sync::{watch, Mutex};
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, instrument};

use crate::config::AppConfig;
use crate::errors::{AppError, Result};
use crate::models::order::{Order, OrderStatus};
use crate::models::truck::Truck;
use crate::services::notification_service::{NotificationDispatcher, PushNotice};
use crate::services::order_service::OrderLifecycle;
use crate::store::{FleetDirectoryRef, OrderStoreRef};

#[derive(Debug, Clone)]
pub struct ReconciliationConfig {
    pub interval: Duration,
    pub threshold: Duration,
    pub batch_size: i64,
}

impl ReconciliationConfig {
    pub fn from_app_config(config: &AppConfig) -> Self {
        Self {
            interval: config.reconciliation_interval,
            threshold: config.reconciliation_threshold,
            batch_size: config.reconciliation_batch_size,
        }
    }
}

impl Default for ReconciliationConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(60),
            threshold: Duration::from_secs(300),
            batch_size: 100,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub scanned: usize,
    pub assigned: usize,
    pub skipped: usize,
    pub failed: usize,
}

pub struct ReconciliationScheduler {
    orders: OrderStoreRef,
    lifecycle: OrderLifecycle,
    fleet: FleetDirectoryRef,
    notifier: NotificationDispatcher,
    config: ReconciliationConfig,
    running: Mutex<()>,
}

impl ReconciliationScheduler {
    pub fn new(
        orders: OrderStoreRef,
        lifecycle: OrderLifecycle,
        fleet: FleetDirectoryRef,
        notifier: NotificationDispatcher,
        config: ReconciliationConfig,
    ) -> Self {
        Self {
            orders,
            lifecycle,
            fleet,
            notifier,
            config,
            running: Mutex::new(()),
        }
    }

    pub async fn run(self, mut shutdown_rx: watch::Receiver<bool>) {
        info!(
            "🕒 Reconciliation scheduler started (every {}s, threshold {}s)",
            self.config.interval.as_secs(),
            self.config.threshold.as_secs()
        );

        let mut interval = tokio::time::interval(self.config.interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if let Err(e) = self.tick().await {
                        error!(error = %e, "reconciliation sweep failed");
                    }
                }
                changed = shutdown_rx.changed() => {
                    if changed.is_err() {
                        info!("Shutdown sender dropped, stopping reconciliation scheduler");
                        break;
                    }
                    if *shutdown_rx.borrow() {
                        info!("Reconciliation scheduler received shutdown signal");
                        break;
                    }
                }
            }
        }

        info!("Reconciliation scheduler stopped");
    }

    /// Runs one sweep. Returns `None` without doing anything when another
    /// sweep is still in progress.
    #[instrument(skip(self), name = "reconciliation_sweep")]
    pub async fn tick(&self) -> Result<Option<SweepReport>> {
        let Ok(_guard) = self.running.try_lock() else {
            debug!("Previous sweep still running, skipping tick");
            return Ok(None);
        };

        let Some(truck) = self.fleet.active_truck().await? else {
            debug!("No active truck, nothing to reconcile");
            return Ok(Some(SweepReport::default()));
        };

        let threshold = chrono::Duration::from_std(self.config.threshold)
            .map_err(|e| AppError::configuration(format!("Invalid reconciliation threshold: {}", e)))?;
        let cutoff = Utc::now() - threshold;

        let orders = self
            .orders
            .find_unassigned_before(cutoff, self.config.batch_size)
            .await?;

        let mut report = SweepReport {
            scanned: orders.len(),
            ..Default::default()
        };

        for order in orders {
            match self.lifecycle.attach_truck(&order, &truck).await {
                Ok(transition) if transition.applied => {
                    report.assigned += 1;
                    self.announce(&transition.order, &truck);
                }
                Ok(_) => report.skipped += 1,
                Err(e) => {
                    report.failed += 1;
                    error!(
                        order_id = %order.id,
                        prior_status = %order.status,
                        attempted_status = %OrderStatus::Assigned,
                        truck_id = truck.id,
                        error = %e,
                        "Failed to assign truck, continuing sweep"
                    );
                }
            }
        }

        if report.scanned > 0 {
            info!(
                scanned = report.scanned,
                assigned = report.assigned,
                skipped = report.skipped,
                failed = report.failed,
                "Reconciliation sweep finished"
            );
        }
        Ok(Some(report))
    }

    fn announce(&self, order: &Order, truck: &Truck) {
        let data = json!({
            "order_id": order.id.to_hex(),
            "truck_id": truck.id,
            "status": order.status.code(),
        });

        self.notifier.push_to_user(
            &order.customer_id,
            PushNotice::new(
                "Order confirmed",
                "Your order is being processed and a truck has been assigned.",
                data.clone(),
            ),
        );
        self.notifier.push_to_user(
            &truck.driver_id,
            PushNotice::new(
                "New order assigned",
                format!("Deliver to {}", order.dropoff.address),
                data,
            ),
        );
        self.notifier.sms_user(
            &order.customer_id,
            format!(
                "Your water order {} is confirmed. Truck {} has been assigned.",
                order.id.to_hex(),
                truck.plate_number
            ),
        );
    }
}
