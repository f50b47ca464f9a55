//! Central registry of named key-value store clients.
//!
//! Each name maps to exactly one client for the lifetime of the registry.
//! Pub/sub roles or per-tenant connections are just distinct names.
//!
//! The first request for a name builds the client, registers it and starts its
//! connect step while holding the registry lock, so concurrent requests for the
//! same name find the entry and wait on the same connect future instead of
//! opening a second connection. A failed connect is not rolled back: the entry
//! stays until [`Hub::disconnect_all`].

use crate::client::{ClientEvent, ClientFactory, ClientHandle, ClientOptions};
use crate::config::HubConfig;
use crate::error::{HubError, Result, SharedError};
use crate::logger::{LogEntry, Logger, LoggerConfig};
use futures::channel::oneshot;
use futures::future::{self, BoxFuture, FutureExt, Shared};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::debug;

type Connecting = Shared<BoxFuture<'static, std::result::Result<(), SharedError>>>;

/// Resolves once the teardown destroying an entry has finished.
type Retiring = Shared<oneshot::Receiver<()>>;

struct ClientEntry<H> {
    handle: Arc<H>,
    /// Options the client was built with, kept for conflict detection.
    options: ClientOptions,
    connecting: Connecting,
    /// Set while a teardown is destroying this client.
    retiring: Option<Retiring>,
}

struct HubState<H> {
    default_client_name: String,
    default_options: Option<ClientOptions>,
    clients: HashMap<String, ClientEntry<H>>,
    status: Option<String>,
    error: Option<SharedError>,
}

struct Inner<H> {
    logger: Logger,
    state: Mutex<HubState<H>>,
}

impl<H> Inner<H> {
    fn lock(&self) -> MutexGuard<'_, HubState<H>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Mirror a lifecycle event into `status`/`error` and the log.
    fn record_event(&self, client_id: &str, event: &ClientEvent) {
        let status = format!("[{}]: {}", client_id, event.description());
        {
            let mut state = self.lock();
            state.status = Some(status.clone());
            if let ClientEvent::Error(err) = event {
                state.error = Some(err.clone());
            }
        }

        match event {
            ClientEvent::Error(err) => self
                .logger
                .error([Value::from(status), Value::from(err.to_string())]),
            _ => self.logger.info([status]),
        }
    }
}

struct Acquired<H> {
    handle: Arc<H>,
    connecting: Connecting,
    created: bool,
    conflict: bool,
}

enum Acquire<H> {
    Registered(Acquired<H>),
    /// The name is being torn down; retry once this resolves.
    Retiring(Retiring),
}

/// Marks a teardown's entries as retiring and, when dropped, removes them
/// and wakes requests waiting on those names. Dropping also covers a
/// teardown future cancelled mid-way.
struct Retire<'a, H> {
    inner: &'a Inner<H>,
    targets: &'a [(String, Arc<H>)],
    done: Option<oneshot::Sender<()>>,
}

impl<H> Drop for Retire<'_, H> {
    fn drop(&mut self) {
        {
            let mut state = self.inner.lock();
            for (client_id, handle) in self.targets {
                let current = state
                    .clients
                    .get(client_id)
                    .map_or(false, |entry| Arc::ptr_eq(&entry.handle, handle));
                if current {
                    state.clients.remove(client_id);
                }
            }
        }
        if let Some(done) = self.done.take() {
            let _ = done.send(());
        }
    }
}

/// Registry handing out one shared client per logical name.
///
/// # Example
///
/// ```rust,ignore
/// use kv_hub::{Hub, RedisConnector};
/// use serde_json::json;
///
/// let hub = Hub::new(RedisConnector);
/// hub.set_defaults(json!({"url": "redis://127.0.0.1:6379"}).into(), None);
///
/// let publisher = hub.client("publisher", None).await?;
/// let same = hub.client("publisher", None).await?;
/// assert!(std::sync::Arc::ptr_eq(&publisher, &same));
/// ```
pub struct Hub<F: ClientFactory> {
    factory: F,
    inner: Arc<Inner<F::Handle>>,
}

impl<F: ClientFactory> Hub<F> {
    /// Create a hub with console logging enabled and no default options.
    pub fn new(factory: F) -> Self {
        HubBuilder::new().build(factory)
    }

    /// Replace the logger configuration. Already recorded entries are kept.
    pub fn configure_logger(&self, config: LoggerConfig) {
        self.inner.logger.setup(config);
    }

    /// Set the options used for names requested without explicit options,
    /// and optionally rename the default client.
    ///
    /// Clients that already exist are not affected.
    pub fn set_defaults(&self, options: ClientOptions, default_client_name: Option<&str>) {
        let mut state = self.inner.lock();
        state.default_options = Some(options);
        if let Some(name) = default_client_name {
            state.default_client_name = name.to_string();
        }
    }

    /// Set defaults from a single options object.
    ///
    /// A string `defaultClientName` field is removed from the object and used
    /// as the default client name; everything else becomes the default options.
    pub fn init(&self, options: Value) -> Result<()> {
        let Value::Object(mut fields) = options else {
            return Err(HubError::Config {
                message: "init options must be a JSON object".to_string(),
            });
        };

        let name = match fields.remove(HubConfig::DEFAULT_CLIENT_NAME_KEY) {
            None | Some(Value::Null) => None,
            Some(Value::String(name)) => Some(name),
            Some(other) => {
                return Err(HubError::Config {
                    message: format!(
                        "{} must be a string, got {}",
                        HubConfig::DEFAULT_CLIENT_NAME_KEY,
                        other
                    ),
                })
            }
        };

        let name = name.filter(|name| !name.is_empty());
        self.set_defaults(Value::Object(fields).into(), name.as_deref());
        Ok(())
    }

    pub fn default_client_name(&self) -> String {
        self.inner.lock().default_client_name.clone()
    }

    pub fn default_options(&self) -> Option<ClientOptions> {
        self.inner.lock().default_options.clone()
    }

    /// Get or create the client registered under `client_id`.
    ///
    /// On first use the client is built from `options`, or from the default
    /// options when none are given, and connected before it is returned.
    /// Later calls return the same client; options passed again that differ
    /// from the original ones are ignored with a warning.
    ///
    /// Calls that arrive while the first connect is still in flight wait for
    /// it and share its outcome. Once it has settled, the client is returned
    /// right away even if that connect failed.
    ///
    /// A request for a name that [`Hub::disconnect_all`] is destroying waits
    /// for that teardown and then builds a fresh client.
    pub async fn client(
        &self,
        client_id: &str,
        options: Option<ClientOptions>,
    ) -> Result<Arc<F::Handle>> {
        let acquired = loop {
            match self.acquire(client_id, options.clone())? {
                Acquire::Registered(acquired) => break acquired,
                Acquire::Retiring(done) => {
                    debug!("Waiting for teardown of '{}'", client_id);
                    let _ = done.await;
                }
            }
        };

        if acquired.conflict {
            self.inner.logger.warn([format!(
                "Options for '{}' were passed again and ignored.",
                client_id
            )]);
        }

        if !acquired.created && acquired.connecting.peek().is_some() {
            return Ok(acquired.handle);
        }

        acquired
            .connecting
            .await
            .map_err(|source| HubError::Connection {
                client_id: client_id.to_string(),
                source,
            })?;

        Ok(acquired.handle)
    }

    /// Shorthand for [`Hub::client`] without options.
    pub async fn connect(&self, client_id: &str) -> Result<Arc<F::Handle>> {
        self.client(client_id, None).await
    }

    /// Get or create the client registered under the default name.
    pub async fn default_client(&self) -> Result<Arc<F::Handle>> {
        let name = self.default_client_name();
        self.client(&name, None).await
    }

    /// Look up an existing client without creating or waiting on anything.
    pub fn get_client_by_id(&self, client_id: &str) -> Option<Arc<F::Handle>> {
        self.inner
            .lock()
            .clients
            .get(client_id)
            .map(|entry| entry.handle.clone())
    }

    /// Options the named client was created with.
    pub fn client_options(&self, client_id: &str) -> Option<ClientOptions> {
        self.inner
            .lock()
            .clients
            .get(client_id)
            .map(|entry| entry.options.clone())
    }

    /// Names of all registered clients, sorted.
    pub fn client_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.inner.lock().clients.keys().cloned().collect();
        names.sort();
        names
    }

    /// Destroy every registered client and clear the registry.
    ///
    /// All destroys run concurrently, and the entries stay registered until
    /// every one of them has finished. The registry is cleared even when some
    /// fail; those failures are logged and returned together.
    ///
    /// Requests for a name being torn down wait and then get a fresh client.
    /// Clients registered for other names meanwhile are left in place, as
    /// are entries already claimed by another teardown still in progress.
    pub async fn disconnect_all(&self) -> Result<()> {
        let (done, retiring) = oneshot::channel();
        let retiring = retiring.shared();

        let targets: Vec<(String, Arc<F::Handle>)> = self
            .inner
            .lock()
            .clients
            .iter_mut()
            .filter(|(_, entry)| entry.retiring.is_none())
            .map(|(client_id, entry)| {
                entry.retiring = Some(retiring.clone());
                (client_id.clone(), entry.handle.clone())
            })
            .collect();

        debug!("Disconnecting {} client(s)", targets.len());

        let retire = Retire {
            inner: &self.inner,
            targets: &targets,
            done: Some(done),
        };
        let outcomes = future::join_all(targets.iter().map(|(_, handle)| handle.destroy())).await;
        drop(retire);

        let mut failures = Vec::new();
        for ((client_id, _), outcome) in targets.into_iter().zip(outcomes) {
            if let Err(err) = outcome {
                let err: SharedError = Arc::from(err);
                self.inner
                    .record_event(&client_id, &ClientEvent::Error(err.clone()));
                failures.push((client_id, err));
            }
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(HubError::Teardown { failures })
        }
    }

    /// Every log entry recorded by this hub, oldest first.
    pub fn logs(&self) -> Vec<LogEntry> {
        self.inner.logger.entries()
    }

    pub fn logger(&self) -> &Logger {
        &self.inner.logger
    }

    /// Most recent lifecycle message across all clients.
    pub fn status(&self) -> Option<String> {
        self.inner.lock().status.clone()
    }

    /// Most recent client error across all clients.
    pub fn last_error(&self) -> Option<SharedError> {
        self.inner.lock().error.clone()
    }

    fn acquire(
        &self,
        client_id: &str,
        options: Option<ClientOptions>,
    ) -> Result<Acquire<F::Handle>> {
        let mut state = self.inner.lock();

        if let Some(entry) = state.clients.get(client_id) {
            if let Some(retiring) = &entry.retiring {
                return Ok(Acquire::Retiring(retiring.clone()));
            }
            let conflict = options
                .as_ref()
                .map_or(false, |options| *options != entry.options);
            return Ok(Acquire::Registered(Acquired {
                handle: entry.handle.clone(),
                connecting: entry.connecting.clone(),
                created: false,
                conflict,
            }));
        }

        let options = options
            .or_else(|| state.default_options.clone())
            .ok_or_else(|| HubError::MissingOptions {
                client_id: client_id.to_string(),
            })?;

        let handle = self
            .factory
            .create(&options)
            .map_err(|err| HubError::InvalidOptions {
                client_id: client_id.to_string(),
                message: err.to_string(),
            })?;
        let handle = Arc::new(handle);

        // Listen before connecting so no early event is lost.
        self.bind_events(client_id, &handle);
        let connecting = self.connect_once(client_id, &handle);

        state.clients.insert(
            client_id.to_string(),
            ClientEntry {
                handle: handle.clone(),
                options,
                connecting: connecting.clone(),
                retiring: None,
            },
        );
        debug!("Registered client '{}'", client_id);

        Ok(Acquire::Registered(Acquired {
            handle,
            connecting,
            created: true,
            conflict: false,
        }))
    }

    fn bind_events(&self, client_id: &str, handle: &Arc<F::Handle>) {
        let inner = Arc::downgrade(&self.inner);
        let client_id = client_id.to_string();

        // Events only touch status and the log, never the registry, so a
        // client retired by teardown cannot reappear through one.
        handle.on_event(Arc::new(move |event| {
            if let Some(inner) = inner.upgrade() {
                inner.record_event(&client_id, &event);
            }
        }));
    }

    /// Build the single connect future shared by every waiter for this client.
    fn connect_once(&self, client_id: &str, handle: &Arc<F::Handle>) -> Connecting {
        let handle = handle.clone();
        let inner = Arc::downgrade(&self.inner);
        let client_id = client_id.to_string();

        async move {
            handle.connect().await.map_err(|err| {
                let err: SharedError = Arc::from(err);
                if let Some(inner) = inner.upgrade() {
                    inner.record_event(&client_id, &ClientEvent::Error(err.clone()));
                }
                err
            })
        }
        .boxed()
        .shared()
    }
}

/// Builder for configuring a [`Hub`].
///
/// ```rust,ignore
/// let hub = HubBuilder::new()
///     .default_client_name("primary")
///     .default_options(json!({"url": "redis://cache:6379"}).into())
///     .logging(LoggerConfig::silent())
///     .build(RedisConnector);
/// ```
#[derive(Debug, Default)]
pub struct HubBuilder {
    default_client_name: Option<String>,
    default_options: Option<ClientOptions>,
    logging: LoggerConfig,
}

impl HubBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Name used by `default_client()`.
    ///
    /// Default: `"default"`
    pub fn default_client_name(mut self, name: impl Into<String>) -> Self {
        self.default_client_name = Some(name.into());
        self
    }

    /// Options for names requested without explicit options.
    ///
    /// Default: none (such requests fail)
    pub fn default_options(mut self, options: ClientOptions) -> Self {
        self.default_options = Some(options);
        self
    }

    /// Logger configuration.
    ///
    /// Default: console mirroring on, all levels, no callback
    pub fn logging(mut self, config: LoggerConfig) -> Self {
        self.logging = config;
        self
    }

    pub fn build<F: ClientFactory>(self, factory: F) -> Hub<F> {
        let state = HubState {
            default_client_name: self
                .default_client_name
                .unwrap_or_else(|| HubConfig::DEFAULT_CLIENT_NAME.to_string()),
            default_options: self.default_options,
            clients: HashMap::new(),
            status: None,
            error: None,
        };

        Hub {
            factory,
            inner: Arc::new(Inner {
                logger: Logger::new(self.logging),
                state: Mutex::new(state),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BoxError;
    use async_trait::async_trait;
    use serde_json::json;

    struct NullClient;

    #[async_trait]
    impl ClientHandle for NullClient {
        async fn connect(&self) -> std::result::Result<(), BoxError> {
            Ok(())
        }

        async fn destroy(&self) -> std::result::Result<(), BoxError> {
            Ok(())
        }

        fn on_event(&self, _listener: crate::client::EventListener) {}
    }

    struct NullFactory;

    impl ClientFactory for NullFactory {
        type Handle = NullClient;

        fn create(&self, _options: &ClientOptions) -> std::result::Result<NullClient, BoxError> {
            Ok(NullClient)
        }
    }

    #[test]
    fn test_builder_defaults() {
        let hub = Hub::new(NullFactory);
        assert_eq!(hub.default_client_name(), "default");
        assert!(hub.default_options().is_none());
        assert!(hub.status().is_none());
        assert!(hub.last_error().is_none());
        assert!(hub.client_names().is_empty());
    }

    #[test]
    fn test_init_strips_default_client_name() {
        let hub = Hub::new(NullFactory);
        hub.init(json!({"url": "redis://a", "defaultClientName": "primary"}))
            .unwrap();

        assert_eq!(hub.default_client_name(), "primary");
        assert_eq!(
            hub.default_options(),
            Some(ClientOptions::new(json!({"url": "redis://a"})))
        );
    }

    #[test]
    fn test_init_keeps_name_when_blank() {
        let hub = HubBuilder::new().default_client_name("main").build(NullFactory);
        hub.init(json!({"defaultClientName": ""})).unwrap();
        assert_eq!(hub.default_client_name(), "main");
        assert_eq!(hub.default_options(), Some(ClientOptions::new(json!({}))));
    }

    #[test]
    fn test_init_rejects_malformed_payloads() {
        let hub = Hub::new(NullFactory);
        assert!(matches!(
            hub.init(json!("redis://a")),
            Err(HubError::Config { .. })
        ));
        assert!(matches!(
            hub.init(json!({"defaultClientName": 3})),
            Err(HubError::Config { .. })
        ));
        assert!(hub.default_options().is_none());
    }

    #[test]
    fn test_record_event_updates_status_and_log() {
        let hub = HubBuilder::new()
            .logging(LoggerConfig::silent())
            .build(NullFactory);
        let err: SharedError = Arc::new(std::io::Error::other("socket closed"));

        hub.inner.record_event("cache", &ClientEvent::Ready);
        assert_eq!(hub.status().as_deref(), Some("[cache]: client ready."));

        hub.inner.record_event("cache", &ClientEvent::Error(err));
        assert_eq!(hub.status().as_deref(), Some("[cache]: client error:"));
        assert_eq!(hub.last_error().unwrap().to_string(), "socket closed");

        let logs = hub.logs();
        assert_eq!(logs.len(), 2);
        assert_eq!(logs[1].message, "[cache]: client error: socket closed");
    }
}
