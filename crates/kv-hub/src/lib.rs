//! kv-hub - named, lazily connected key-value store clients.
//!
//! A [`Hub`] hands out one shared client per logical name. The first request
//! for a name builds the client from explicit or default options and connects
//! it; every later request gets the same client back. Lifecycle events from
//! the clients are mirrored into the hub's status and into an in-memory log
//! that can also echo to `tracing` and forward to a callback.
//!
//! The client library itself sits behind [`ClientFactory`] and
//! [`ClientHandle`]. With the default `redis` feature a Redis/Valkey
//! implementation is provided, along with process-wide accessors.
//!
//! # Example
//!
//! ```rust,ignore
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> kv_hub::Result<()> {
//!     kv_hub::shared().init(json!({
//!         "url": "redis://127.0.0.1:6379",
//!         "defaultClientName": "main",
//!     }))?;
//!
//!     let main = kv_hub::default_client().await?;
//!     let publisher = kv_hub::redis_client("publisher", None).await?;
//!
//!     kv_hub::shared().disconnect_all().await?;
//!     Ok(())
//! }
//! ```

pub mod client;
pub mod config;
pub mod error;
pub mod hub;
pub mod logger;
#[cfg(feature = "redis")]
pub mod redis_client;
pub mod shared;

// Re-export commonly used types
pub use client::{ClientEvent, ClientFactory, ClientHandle, ClientOptions, EventListener};
pub use config::HubConfig;
pub use error::{BoxError, HubError, Result, SharedError};
pub use hub::{Hub, HubBuilder};
pub use logger::{LogCallback, LogEntry, LogLevel, Logger, LoggerConfig};
#[cfg(feature = "redis")]
pub use redis_client::{RedisConnector, RedisHandle};
pub use shared::{has_shared_hub, install_shared_hub, shared_hub};

#[cfg(feature = "redis")]
use std::sync::Arc;

/// The process-wide Redis hub.
#[cfg(feature = "redis")]
pub fn shared() -> &'static Hub<RedisConnector> {
    shared_hub::<RedisConnector>()
}

/// Get or create a named client on the process-wide Redis hub.
#[cfg(feature = "redis")]
pub async fn redis_client(
    client_id: &str,
    options: Option<ClientOptions>,
) -> Result<Arc<RedisHandle>> {
    shared().client(client_id, options).await
}

/// Get or create the default client on the process-wide Redis hub.
#[cfg(feature = "redis")]
pub async fn default_client() -> Result<Arc<RedisHandle>> {
    shared().default_client().await
}
