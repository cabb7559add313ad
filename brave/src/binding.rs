//! Two-way binding of a single resource key.

use std::sync::{Arc, Weak};

use log::trace;
use parking_lot::Mutex;

use crate::observable::{Converter, Observer, Observers, convert};
use crate::resources::{ChangeCallback, Resources, Subscription};
use crate::value::Value;

struct State {
    value: Value,
    target_converter: Option<Converter>,
    source_converter: Option<Converter>,
    observers: Observers,
    disposed: bool,
}

struct Inner {
    resources: Arc<dyn Resources>,
    key: Arc<str>,
    state: Mutex<State>,
    upstream: Mutex<Option<Subscription>>,
}

/// Mirrors one resource key to observers and writes values coming back from
/// the bound target into the store.
#[derive(Clone)]
pub struct KeyBinding {
    inner: Arc<Inner>,
}

impl KeyBinding {
    /// Reads `key`, creating it as null when absent, and starts watching it.
    pub fn new(resources: Arc<dyn Resources>, key: &str) -> Self {
        let value = resources.get_or_create(key, Value::Null);
        let inner = Arc::new(Inner {
            resources,
            key: key.into(),
            state: Mutex::new(State {
                value,
                target_converter: None,
                source_converter: None,
                observers: Observers::default(),
                disposed: false,
            }),
            upstream: Mutex::new(None),
        });

        let weak = Arc::downgrade(&inner);
        let callback: ChangeCallback = Arc::new(move || {
            if let Some(inner) = Weak::upgrade(&weak) {
                inner.refresh();
            }
        });
        let subscription = inner.resources.subscribe(&inner.key, callback);
        *inner.upstream.lock() = Some(subscription);

        Self { inner }
    }

    pub fn key(&self) -> &str {
        &self.inner.key
    }

    /// The current value, passed through the target converter.
    pub fn value(&self) -> Value {
        let state = self.inner.state.lock();
        convert(&state.target_converter, &state.value)
    }

    pub fn set_target_converter(&self, converter: Option<Converter>) {
        self.inner.state.lock().target_converter = converter;
    }

    pub fn set_source_converter(&self, converter: Option<Converter>) {
        self.inner.state.lock().source_converter = converter;
    }

    /// Writes a value from the bound target back into the store. Values equal
    /// to the current one are ignored.
    pub fn push(&self, value: Value) {
        let value = {
            let state = self.inner.state.lock();
            if state.disposed {
                return;
            }
            let value = convert(&state.source_converter, &value);
            if value.is_identical(&state.value) {
                return;
            }
            value
        };
        trace!("binding {} pushes {value}", self.inner.key);
        self.inner
            .resources
            .set_to_existing_key(&self.inner.key, value);
    }

    /// Replays the current value, then forwards changes.
    pub fn subscribe(&self, observer: Arc<dyn Observer>) -> Subscription {
        let (id, current) = {
            let mut state = self.inner.state.lock();
            if state.disposed {
                drop(state);
                observer.on_completed();
                return Subscription::empty();
            }
            let current = convert(&state.target_converter, &state.value);
            (state.observers.add(Arc::clone(&observer)), current)
        };
        observer.on_next(&current);

        let weak = Arc::downgrade(&self.inner);
        Subscription::new(move || {
            if let Some(inner) = weak.upgrade() {
                inner.state.lock().observers.remove(id);
            }
        })
    }

    pub fn dispose(&self) {
        let observers = {
            let mut state = self.inner.state.lock();
            if state.disposed {
                return;
            }
            state.disposed = true;
            state.observers.take()
        };
        drop(self.inner.upstream.lock().take());
        for observer in observers {
            observer.on_completed();
        }
    }
}

impl Inner {
    fn refresh(&self) {
        let value = self
            .resources
            .try_get_resource(&self.key)
            .unwrap_or_default();

        let (converted, observers) = {
            let mut state = self.state.lock();
            if state.disposed || state.value.is_identical(&value) {
                return;
            }
            state.value = value;
            (
                convert(&state.target_converter, &state.value),
                state.observers.snapshot(),
            )
        };
        for observer in observers {
            observer.on_next(&converted);
        }
    }
}

/// Read-only view of one key through the store's scope walk.
#[derive(Clone)]
pub struct ObservableKey {
    resources: Arc<dyn Resources>,
    key: Arc<str>,
}

impl ObservableKey {
    pub fn new(resources: Arc<dyn Resources>, key: &str) -> Self {
        Self {
            resources,
            key: key.into(),
        }
    }

    /// Current value, `Null` when no scope defines the key.
    pub fn value(&self) -> Value {
        self.resources
            .try_get_resource(&self.key)
            .unwrap_or_default()
    }

    /// Calls `callback` whenever the key changes in any scope of the chain.
    pub fn subscribe(&self, callback: ChangeCallback) -> Subscription {
        self.resources.subscribe(&self.key, callback)
    }
}
