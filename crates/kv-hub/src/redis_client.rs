//! Redis/Valkey client adapter built on the `redis` crate.
//!
//! Options follow the node-redis shape: either a `url`, or `socket.host`,
//! `socket.port` and `socket.tls`, plus optional `username`, `password` and
//! `database` overrides. Empty options connect to `127.0.0.1:6379`.
//!
//! The multiplexed connection does not report drops, so this adapter never
//! emits `Reconnecting`. Faults after connect surface as `Error` when
//! [`RedisHandle::ping`] fails. A failed `connect` is only returned; the hub
//! records it.

use crate::client::{ClientEvent, ClientFactory, ClientHandle, ClientOptions, EventListener};
use crate::config::RedisConfig;
use crate::error::{BoxError, SharedError};
use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use serde_json::Value;
use std::sync::{Arc, PoisonError, RwLock};
use tokio::sync::Mutex;
use tracing::debug;
use url::Url;

/// Factory producing [`RedisHandle`]s.
#[derive(Debug, Clone, Copy, Default)]
pub struct RedisConnector;

impl ClientFactory for RedisConnector {
    type Handle = RedisHandle;

    fn create(&self, options: &ClientOptions) -> Result<RedisHandle, BoxError> {
        let url = connection_url(options)?;
        let client = redis::Client::open(url.as_str())?;
        Ok(RedisHandle {
            client,
            url,
            connection: Mutex::new(None),
            listeners: RwLock::new(Vec::new()),
        })
    }
}

/// A lazily connected Redis client.
pub struct RedisHandle {
    client: redis::Client,
    url: Url,
    connection: Mutex<Option<MultiplexedConnection>>,
    listeners: RwLock<Vec<EventListener>>,
}

impl RedisHandle {
    /// The live connection, if `connect` has succeeded and `destroy` has not
    /// run since. Clones share the same underlying socket.
    pub async fn connection(&self) -> Option<MultiplexedConnection> {
        self.connection.lock().await.clone()
    }

    pub async fn is_connected(&self) -> bool {
        self.connection.lock().await.is_some()
    }

    /// The underlying `redis` client, for opening dedicated connections
    /// such as pub/sub.
    pub fn redis(&self) -> &redis::Client {
        &self.client
    }

    /// Connection URL with any password removed.
    pub fn redacted_url(&self) -> String {
        let mut url = self.url.clone();
        if url.password().is_some() {
            let _ = url.set_password(Some("***"));
        }
        url.to_string()
    }

    /// Round-trip a `PING` over the live connection.
    ///
    /// A server or socket failure is emitted as `Error` before it is returned.
    pub async fn ping(&self) -> Result<(), BoxError> {
        let Some(mut conn) = self.connection().await else {
            return Err("client is not connected".into());
        };
        let pong: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(|err| self.fault(err))?;
        debug!("{} answered {}", self.redacted_url(), pong);
        Ok(())
    }

    fn fault(&self, err: redis::RedisError) -> BoxError {
        let shared: SharedError = Arc::new(err);
        self.emit(ClientEvent::Error(shared.clone()));
        Box::new(SharedFault(shared))
    }

    fn emit(&self, event: ClientEvent) {
        let listeners = self
            .listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        for listener in listeners {
            listener(event.clone());
        }
    }
}

/// A fault already reported to listeners, returned to the caller as well.
#[derive(Debug)]
struct SharedFault(SharedError);

impl std::fmt::Display for SharedFault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Display::fmt(&self.0, f)
    }
}

impl std::error::Error for SharedFault {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.0.source()
    }
}

impl std::fmt::Debug for RedisHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisHandle")
            .field("url", &self.redacted_url())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl ClientHandle for RedisHandle {
    async fn connect(&self) -> Result<(), BoxError> {
        let mut slot = self.connection.lock().await;
        if slot.is_some() {
            return Ok(());
        }

        debug!("Connecting to {}", self.redacted_url());
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        self.emit(ClientEvent::Connect);

        let pong: String = redis::cmd("PING").query_async(&mut conn).await?;
        debug!("{} answered {}", self.redacted_url(), pong);

        *slot = Some(conn);
        self.emit(ClientEvent::Ready);
        Ok(())
    }

    async fn destroy(&self) -> Result<(), BoxError> {
        let conn = self.connection.lock().await.take();
        if conn.is_some() {
            debug!("Closing connection to {}", self.redacted_url());
        }
        drop(conn);
        self.emit(ClientEvent::End);
        Ok(())
    }

    fn on_event(&self, listener: EventListener) {
        self.listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(listener);
    }
}

/// Build the connection URL described by `options`.
fn connection_url(options: &ClientOptions) -> Result<Url, BoxError> {
    let fields = match options.as_value() {
        Value::Null => return default_url(),
        Value::Object(fields) => fields,
        other => return Err(format!("options must be an object, got {}", other).into()),
    };

    let mut url = match fields.get("url") {
        Some(Value::String(raw)) => {
            let url = Url::parse(raw)?;
            if url.scheme() != RedisConfig::SCHEME && url.scheme() != RedisConfig::TLS_SCHEME {
                return Err(format!("unsupported URL scheme '{}'", url.scheme()).into());
            }
            url
        }
        Some(other) => return Err(format!("url must be a string, got {}", other).into()),
        None => socket_url(fields.get("socket"))?,
    };

    if let Some(username) = string_field(fields, "username")? {
        url.set_username(username)
            .map_err(|_| BoxError::from("cannot set username on this URL"))?;
    }
    if let Some(password) = string_field(fields, "password")? {
        url.set_password(Some(password))
            .map_err(|_| BoxError::from("cannot set password on this URL"))?;
    }
    match fields.get("database") {
        None | Some(Value::Null) => {}
        Some(Value::Number(n)) if n.is_u64() => url.set_path(&format!("/{}", n)),
        Some(other) => {
            return Err(format!("database must be a non-negative integer, got {}", other).into())
        }
    }

    Ok(url)
}

fn default_url() -> Result<Url, BoxError> {
    socket_url(None)
}

fn socket_url(socket: Option<&Value>) -> Result<Url, BoxError> {
    let empty = serde_json::Map::new();
    let socket = match socket {
        None | Some(Value::Null) => &empty,
        Some(Value::Object(socket)) => socket,
        Some(other) => return Err(format!("socket must be an object, got {}", other).into()),
    };

    let host = string_field(socket, "host")?.unwrap_or(RedisConfig::DEFAULT_HOST);
    let port = match socket.get("port") {
        None | Some(Value::Null) => RedisConfig::DEFAULT_PORT,
        Some(Value::Number(n)) => n
            .as_u64()
            .and_then(|port| u16::try_from(port).ok())
            .ok_or_else(|| format!("invalid port {}", n))?,
        Some(other) => return Err(format!("port must be a number, got {}", other).into()),
    };
    let scheme = match socket.get("tls") {
        Some(Value::Bool(true)) => RedisConfig::TLS_SCHEME,
        _ => RedisConfig::SCHEME,
    };

    let host = if host.contains(':') && !host.starts_with('[') {
        format!("[{}]", host)
    } else {
        host.to_string()
    };
    Ok(Url::parse(&format!("{}://{}:{}", scheme, host, port))?)
}

fn string_field<'a>(
    fields: &'a serde_json::Map<String, Value>,
    key: &str,
) -> Result<Option<&'a str>, BoxError> {
    match fields.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.as_str())),
        Some(other) => Err(format!("{} must be a string, got {}", key, other).into()),
    }
}
