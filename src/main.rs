use std::net::SocketAddr;
use std::sync::Arc;

use mongodb::Database;
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;

use aquaflow::config::AppConfig;
use aquaflow::database::connection::get_db_client;
use aquaflow::errors::{AppError, Result};
use aquaflow::routes::build_router;
use aquaflow::services::fcm_service::{DisabledPush, FCMService, PushNotifier};
use aquaflow::services::notification_service::NotificationDispatcher;
use aquaflow::services::order_service::OrderLifecycle;
use aquaflow::services::payment_method_service::PaymentMethodVault;
use aquaflow::services::paystack_service::PaystackService;
use aquaflow::services::reconciliation_service::{ReconciliationConfig, ReconciliationScheduler};
use aquaflow::services::sms_service::SMSService;
use aquaflow::services::transaction_service::TransactionManager;
use aquaflow::state::AppState;
use aquaflow::store::mongo::{
    MongoFleetDirectory, MongoOrderStore, MongoPaymentMethodStore, MongoTransactionStore,
    MongoUserDirectory,
};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    if let Err(e) = run().await {
        tracing::error!("❌ {}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let config = AppConfig::from_env()?;
    tracing::info!("✅ App config loaded: {}", config.get_config_info());

    let db = get_db_client(&config).await?;
    let (app_state, scheduler) = initialize_services(&config, &db)?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let scheduler_handle = tokio::spawn(scheduler.run(shutdown_rx));

    let app = build_router(app_state);
    let served = start_server(&config, app).await;

    let _ = shutdown_tx.send(true);
    if let Err(e) = scheduler_handle.await {
        tracing::warn!("Reconciliation scheduler ended abnormally: {}", e);
    }
    served
}

fn initialize_services(
    config: &AppConfig,
    db: &Database,
) -> Result<(AppState, ReconciliationScheduler)> {
    let transactions = Arc::new(MongoTransactionStore::new(db));
    let orders = Arc::new(MongoOrderStore::new(db));
    let payment_methods = Arc::new(MongoPaymentMethodStore::new(db));
    let users = Arc::new(MongoUserDirectory::new(db));
    let fleet = Arc::new(MongoFleetDirectory::new(db));

    let push: Arc<dyn PushNotifier> = if config.push_enabled() {
        tracing::info!("✅ FCM push notifications enabled");
        Arc::new(FCMService::new(config.fcm_server_key.clone()))
    } else {
        tracing::warn!("FCM_SERVER_KEY not set, push notifications will be disabled");
        Arc::new(DisabledPush)
    };
    if !config.email_enabled() {
        tracing::warn!("MAIL_API_URL not set, payment receipts will not be emailed");
    }
    let notifier = NotificationDispatcher::new(push, Arc::new(SMSService::new(config)), users.clone());

    let gateway = Arc::new(PaystackService::new(config)?);
    tracing::info!("✅ Paystack gateway ready at {}", config.paystack_base_url);

    let lifecycle = OrderLifecycle::new(orders.clone(), notifier.clone());
    let vault = PaymentMethodVault::new(payment_methods);
    let manager = TransactionManager::new(
        gateway,
        transactions,
        lifecycle.clone(),
        vault,
        users,
        notifier.clone(),
        config.gateway_timeout,
    );

    let scheduler = ReconciliationScheduler::new(
        orders,
        lifecycle.clone(),
        fleet,
        notifier,
        ReconciliationConfig::from_app_config(config),
    );

    let app_state = AppState::new(manager, lifecycle, config.jwt_secret.clone());
    Ok((app_state, scheduler))
}

async fn start_server(config: &AppConfig, app: axum::Router) -> Result<()> {
    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .map_err(|e| AppError::configuration(format!("Invalid HOST/PORT: {}", e)))?;

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| AppError::configuration(format!("Failed to bind to {}: {}", addr, e)))?;

    tracing::info!("🚀 Server starting on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            match tokio::signal::ctrl_c().await {
                Ok(()) => tracing::info!("🛑 Shutdown signal received"),
                Err(e) => {
                    tracing::error!("Failed to listen for shutdown signal: {}", e);
                    std::future::pending::<()>().await;
                }
            }
        })
        .await
        .map_err(|e| AppError::configuration(format!("Server error: {}", e)))
}
