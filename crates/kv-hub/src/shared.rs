//! Process-wide hub instances.
//!
//! One hub exists per client factory type for the whole process, however many
//! times callers ask for it. The factory's `TypeId` is the lookup key in a
//! global table; instances are leaked on creation and live until exit.

use crate::client::ClientFactory;
use crate::hub::Hub;
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, OnceLock, PoisonError};
use tracing::debug;

type SharedHubs = HashMap<TypeId, &'static (dyn Any + Send + Sync)>;

static HUBS: OnceLock<Mutex<SharedHubs>> = OnceLock::new();

fn hubs() -> MutexGuard<'static, SharedHubs> {
    HUBS.get_or_init(|| Mutex::new(HashMap::new()))
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
}

fn downcast<F: ClientFactory>(hub: &'static (dyn Any + Send + Sync)) -> &'static Hub<F> {
    hub.downcast_ref::<Hub<F>>()
        .unwrap_or_else(|| panic!("BUG: shared hub stored under a foreign factory type"))
}

/// The shared hub for factory type `F`, created from `F::default()` on first use.
///
/// The factory is built without the global table locked, so its `Default`
/// impl may itself ask for shared hubs. If two threads race on first use, one
/// candidate wins and the other is dropped unused.
pub fn shared_hub<F>() -> &'static Hub<F>
where
    F: ClientFactory + Default,
{
    let key = TypeId::of::<F>();
    if let Some(hub) = hubs().get(&key).copied() {
        return downcast(hub);
    }

    let candidate = Hub::new(F::default());
    let mut hubs = hubs();
    let hub = *hubs.entry(key).or_insert_with(|| {
        debug!("Creating shared hub for {}", std::any::type_name::<F>());
        let hub: &'static Hub<F> = Box::leak(Box::new(candidate));
        hub as &'static (dyn Any + Send + Sync)
    });
    downcast(hub)
}

/// Install `hub` as the shared instance for its factory type.
///
/// Only succeeds before the first [`shared_hub`] call for that type; otherwise
/// the hub is handed back untouched.
pub fn install_shared_hub<F>(hub: Hub<F>) -> Result<&'static Hub<F>, Hub<F>>
where
    F: ClientFactory,
{
    let mut hubs = hubs();
    let key = TypeId::of::<F>();
    if hubs.contains_key(&key) {
        return Err(hub);
    }

    let hub: &'static Hub<F> = Box::leak(Box::new(hub));
    hubs.insert(key, hub);
    Ok(hub)
}

/// Whether a shared hub exists for factory type `F`.
pub fn has_shared_hub<F: ClientFactory>() -> bool {
    hubs().contains_key(&TypeId::of::<F>())
}
