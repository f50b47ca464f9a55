//! Basic usage example - connect named clients to a local Redis/Valkey

use kv_hub::{LogLevel, LoggerConfig};
use serde_json::json;
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(tracing::Level::DEBUG)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    // Get URL from args or use the local default
    let url = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "redis://127.0.0.1:6379".to_string());

    let hub = kv_hub::shared();
    hub.configure_logger(
        LoggerConfig::default().with_levels([LogLevel::Info, LogLevel::Warn, LogLevel::Error]),
    );
    hub.init(json!({ "url": url, "defaultClientName": "main" }))?;

    let main = kv_hub::default_client().await?;
    let publisher = kv_hub::redis_client("publisher", None).await?;
    println!("main: {:?}", main);
    println!("publisher: {:?}", publisher);

    if let Some(mut conn) = main.connection().await {
        let pong: String = redis::cmd("PING").query_async(&mut conn).await?;
        println!("PING -> {}", pong);
    }

    println!("Status: {}", hub.status().unwrap_or_default());
    hub.disconnect_all().await?;

    println!("Recorded {} log entries", hub.logs().len());
    Ok(())
}
