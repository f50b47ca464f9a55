//! Scripted in-memory client used by the integration tests.
//!
//! Behavior is driven by flags in the options object:
//! - `"reject": true`       construction fails
//! - `"gated": true`        connect waits for [`MockFactory::release`]
//! - `"fail_connect": true` connect fails after emitting `Connect`
//! - `"fail_destroy": true` destroy fails after emitting `End`
//! - `"gated_destroy": true` destroy waits for [`MockFactory::release_destroys`]

#![allow(dead_code)]

use async_trait::async_trait;
use kv_hub::{BoxError, ClientEvent, ClientFactory, ClientHandle, ClientOptions, EventListener};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::fmt;
use std::sync::{Arc, Mutex};
use tokio::sync::Semaphore;

pub struct MockState {
    created: Mutex<Vec<ClientOptions>>,
    connects: AtomicUsize,
    destroys: AtomicUsize,
    gate: Semaphore,
    destroy_gate: Semaphore,
}

impl Default for MockState {
    fn default() -> Self {
        Self {
            created: Mutex::new(Vec::new()),
            connects: AtomicUsize::new(0),
            destroys: AtomicUsize::new(0),
            gate: Semaphore::new(0),
            destroy_gate: Semaphore::new(0),
        }
    }
}

#[derive(Clone, Default)]
pub struct MockFactory {
    state: Arc<MockState>,
}

impl MockFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Options of every client constructed so far, in order.
    pub fn created(&self) -> Vec<ClientOptions> {
        self.state.created.lock().unwrap().clone()
    }

    pub fn connects(&self) -> usize {
        self.state.connects.load(Ordering::SeqCst)
    }

    pub fn destroys(&self) -> usize {
        self.state.destroys.load(Ordering::SeqCst)
    }

    /// Let `n` gated connects proceed.
    pub fn release(&self, n: usize) {
        self.state.gate.add_permits(n);
    }

    /// Let `n` gated destroys proceed.
    pub fn release_destroys(&self, n: usize) {
        self.state.destroy_gate.add_permits(n);
    }
}

impl ClientFactory for MockFactory {
    type Handle = MockClient;

    fn create(&self, options: &ClientOptions) -> Result<MockClient, BoxError> {
        if flag(options, "reject") {
            return Err("malformed options".into());
        }
        self.state.created.lock().unwrap().push(options.clone());
        Ok(MockClient {
            options: options.clone(),
            state: self.state.clone(),
            listeners: Mutex::new(Vec::new()),
            connects: AtomicUsize::new(0),
            destroys: AtomicUsize::new(0),
        })
    }
}

pub struct MockClient {
    options: ClientOptions,
    state: Arc<MockState>,
    listeners: Mutex<Vec<EventListener>>,
    connects: AtomicUsize,
    destroys: AtomicUsize,
}

impl fmt::Debug for MockClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MockClient")
            .field("options", &self.options)
            .field("connects", &self.connects())
            .field("destroys", &self.destroys())
            .finish_non_exhaustive()
    }
}

impl MockClient {
    pub fn options(&self) -> &ClientOptions {
        &self.options
    }

    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    pub fn destroys(&self) -> usize {
        self.destroys.load(Ordering::SeqCst)
    }

    /// Deliver `event` to every listener, as the client library would.
    pub fn emit(&self, event: ClientEvent) {
        let listeners = self.listeners.lock().unwrap().clone();
        for listener in listeners {
            listener(event.clone());
        }
    }
}

#[async_trait]
impl ClientHandle for MockClient {
    async fn connect(&self) -> Result<(), BoxError> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        self.state.connects.fetch_add(1, Ordering::SeqCst);

        if flag(&self.options, "gated") {
            self.state.gate.acquire().await?.forget();
        }

        self.emit(ClientEvent::Connect);
        if flag(&self.options, "fail_connect") {
            return Err("connection refused".into());
        }
        self.emit(ClientEvent::Ready);
        Ok(())
    }

    async fn destroy(&self) -> Result<(), BoxError> {
        self.destroys.fetch_add(1, Ordering::SeqCst);
        self.state.destroys.fetch_add(1, Ordering::SeqCst);

        if flag(&self.options, "gated_destroy") {
            self.state.destroy_gate.acquire().await?.forget();
        }

        self.emit(ClientEvent::End);
        if flag(&self.options, "fail_destroy") {
            return Err("destroy timed out".into());
        }
        Ok(())
    }

    fn on_event(&self, listener: EventListener) {
        self.listeners.lock().unwrap().push(listener);
    }
}

fn flag(options: &ClientOptions, key: &str) -> bool {
    options.get(key).and_then(|v| v.as_bool()).unwrap_or(false)
}
