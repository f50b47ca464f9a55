//! Contract between the hub and a key-value store client library.
//!
//! The hub never speaks the store's protocol. It builds clients through a
//! [`ClientFactory`], drives their connect and destroy steps, and listens to
//! the lifecycle events they report.

use crate::error::{BoxError, SharedError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

/// Options forwarded untouched to the client library.
///
/// The hub only compares them for equality. Comparison is structural, so
/// object key order does not matter.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClientOptions(Value);

impl ClientOptions {
    pub fn new(value: Value) -> Self {
        Self(value)
    }

    /// Look up a top-level field.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn as_value(&self) -> &Value {
        &self.0
    }

    pub fn into_value(self) -> Value {
        self.0
    }
}

impl From<Value> for ClientOptions {
    fn from(value: Value) -> Self {
        Self(value)
    }
}

impl fmt::Display for ClientOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle transitions reported by a client.
#[derive(Debug, Clone)]
pub enum ClientEvent {
    /// The transport is established.
    Connect,
    /// The client is ready to serve commands.
    Ready,
    /// The connection dropped and the client is trying again.
    Reconnecting,
    /// The connection was closed.
    End,
    Error(SharedError),
}

impl ClientEvent {
    /// Human-readable description used in status messages.
    pub fn description(&self) -> &'static str {
        match self {
            ClientEvent::Connect => "client connected.",
            ClientEvent::Ready => "client ready.",
            ClientEvent::Reconnecting => "client reconnecting...",
            ClientEvent::End => "client closed.",
            ClientEvent::Error(_) => "client error:",
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, ClientEvent::Error(_))
    }
}

/// Observer registered on a client for its lifecycle events.
pub type EventListener = Arc<dyn Fn(ClientEvent) + Send + Sync>;

/// A client handle as seen by the hub.
///
/// Implementations must not invoke listeners from inside `on_event`.
#[async_trait]
pub trait ClientHandle: Send + Sync + 'static {
    /// Establish the connection. Resolves once the client is usable.
    async fn connect(&self) -> Result<(), BoxError>;

    /// Tear the connection down.
    async fn destroy(&self) -> Result<(), BoxError>;

    /// Register a listener for every subsequent lifecycle event.
    fn on_event(&self, listener: EventListener);
}

/// Builds client handles from options.
pub trait ClientFactory: Send + Sync + 'static {
    type Handle: ClientHandle;

    /// Construct an unconnected client.
    fn create(&self, options: &ClientOptions) -> Result<Self::Handle, BoxError>;
}
