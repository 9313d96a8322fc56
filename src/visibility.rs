//! Process-wide page visibility observable.
//!
//! The host forwards its single native visibility listener to [`notify`];
//! any number of components subscribe here instead of registering their own.
//! Dropping a [`Subscription`] unsubscribes.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use once_cell::sync::Lazy;

type Listener = Arc<dyn Fn(bool) + Send + Sync>;

struct Registry {
    next_id: u64,
    visible: bool,
    listeners: BTreeMap<u64, Listener>,
}

static REGISTRY: Lazy<Mutex<Registry>> = Lazy::new(|| {
    Mutex::new(Registry {
        next_id: 0,
        visible: true,
        listeners: BTreeMap::new(),
    })
});

fn with_registry<T>(f: impl FnOnce(&mut Registry) -> T) -> T {
    let mut guard = REGISTRY
        .lock()
        .unwrap_or_else(std::sync::PoisonError::into_inner);
    f(&mut guard)
}

#[must_use = "dropping the subscription unsubscribes immediately"]
pub struct Subscription {
    id: u64,
}

impl Drop for Subscription {
    fn drop(&mut self) {
        with_registry(|registry| registry.listeners.remove(&self.id));
    }
}

pub fn subscribe<F>(listener: F) -> Subscription
where
    F: Fn(bool) + Send + Sync + 'static,
{
    let id = with_registry(|registry| {
        let id = registry.next_id;
        registry.next_id += 1;
        registry.listeners.insert(id, Arc::new(listener));
        id
    });
    Subscription { id }
}

/// Records a visibility change and calls every listener when the value
/// actually changed. Listeners run outside the lock, so they may subscribe or
/// unsubscribe.
pub fn notify(visible: bool) {
    let listeners: Vec<Listener> = with_registry(|registry| {
        if registry.visible == visible {
            return Vec::new();
        }
        registry.visible = visible;
        registry.listeners.values().cloned().collect()
    });
    tracing::debug!(visible, listeners = listeners.len(), "visibility changed");
    for listener in listeners {
        listener(visible);
    }
}

pub fn is_visible() -> bool {
    with_registry(|registry| registry.visible)
}

pub fn subscriber_count() -> usize {
    with_registry(|registry| registry.listeners.len())
}
