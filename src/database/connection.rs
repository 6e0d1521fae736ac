use mongodb::{bson::doc, Client, Database};

use crate::config::AppConfig;
use crate::errors::Result;
use crate::store::mongo::ensure_indexes;

pub async fn get_db_client(config: &AppConfig) -> Result<Database> {
    let client = Client::with_uri_str(&config.database_url).await?;
    let db = client.database(&config.database_name);

    db.run_command(doc! { "ping": 1 }).await?;
    tracing::info!("✅ Connected to database: {}", config.database_name);

    ensure_indexes(&db).await?;
    tracing::info!("📂 Indexes ensured on transactions, orders and payment_methods");

    Ok(db)
}
