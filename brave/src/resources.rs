//! The scoped named-slot store expressions read and write.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Weak};

use parking_lot::{Mutex, RwLock};

use crate::value::Value;

/// Invoked after a watched slot changed. Runs on the mutating thread.
pub type ChangeCallback = Arc<dyn Fn() + Send + Sync>;

/// Handle returned by a subscription. Dropping or disposing it unsubscribes.
#[must_use = "dropping a subscription unsubscribes immediately"]
pub struct Subscription {
    cancel: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl Subscription {
    pub fn new(cancel: impl FnOnce() + Send + Sync + 'static) -> Self {
        Self {
            cancel: Some(Box::new(cancel)),
        }
    }

    /// A subscription with nothing to cancel.
    pub fn empty() -> Self {
        Self { cancel: None }
    }

    /// One handle cancelling several subscriptions.
    pub fn combine(parts: Vec<Subscription>) -> Self {
        Self::new(move || drop(parts))
    }

    pub fn dispose(mut self) {
        self.cancel_now();
    }

    fn cancel_now(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.cancel_now();
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.cancel.is_some())
            .finish()
    }
}

/// A named-slot map with an optional parent scope.
///
/// Lookups walk the local scope first, then each ancestor in order. Writes
/// through [`set_to_existing_key`](Resources::set_to_existing_key) use the
/// same walk.
pub trait Resources: Send + Sync {
    /// Local lookup only.
    fn get(&self, key: &str) -> Option<Value>;

    /// Local write.
    fn set(&self, key: &str, value: Value);

    fn contains_key(&self, key: &str) -> bool;

    fn remove(&self, key: &str) -> Option<Value>;

    fn parent(&self) -> Option<Arc<dyn Resources>>;

    /// Identity `$self` falls back to.
    fn owner(&self) -> Value;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn keys(&self) -> Vec<Arc<str>>;

    fn values(&self) -> Vec<Value>;

    /// Notifies `callback` whenever `key` changes.
    fn subscribe(&self, key: &str, callback: ChangeCallback) -> Subscription;

    /// Notifies `callback` on bulk changes that are not reported per key.
    fn subscribe_all(&self, callback: ChangeCallback) -> Subscription;

    /// Scope-aware lookup: local, then ancestors.
    fn try_get_resource(&self, key: &str) -> Option<Value> {
        if let Some(value) = self.get(key) {
            return Some(value);
        }
        let mut scope = self.parent();
        while let Some(current) = scope {
            if let Some(value) = current.get(key) {
                return Some(value);
            }
            scope = current.parent();
        }
        None
    }

    /// Writes to the nearest scope that defines `key`, else locally.
    fn set_to_existing_key(&self, key: &str, value: Value) {
        if !self.contains_key(key) {
            let mut scope = self.parent();
            while let Some(current) = scope {
                if current.contains_key(key) {
                    current.set(key, value);
                    return;
                }
                scope = current.parent();
            }
        }
        self.set(key, value);
    }

    /// Scope-aware lookup that stores `default` locally on a miss.
    fn get_or_create(&self, key: &str, default: Value) -> Value {
        if let Some(value) = self.try_get_resource(key) {
            return value;
        }
        self.set(key, default.clone());
        default
    }
}

// ═══════════════════════════════════════════════════════════════════
// In-memory store
// ═══════════════════════════════════════════════════════════════════

#[derive(Default)]
struct Listeners {
    next_id: u64,
    by_key: HashMap<Arc<str>, Vec<(u64, ChangeCallback)>>,
    all: Vec<(u64, ChangeCallback)>,
}

impl Listeners {
    fn allocate(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    fn for_key(&self, key: &str) -> Vec<ChangeCallback> {
        self.by_key
            .get(key)
            .map(|list| list.iter().map(|(_, cb)| Arc::clone(cb)).collect())
            .unwrap_or_default()
    }

    fn for_all(&self) -> Vec<ChangeCallback> {
        self.all.iter().map(|(_, cb)| Arc::clone(cb)).collect()
    }
}

/// A complete [`Resources`] implementation over a hash map.
pub struct MemoryResources {
    entries: RwLock<HashMap<Arc<str>, Value>>,
    parent: Option<Arc<dyn Resources>>,
    owner: Value,
    listeners: Arc<Mutex<Listeners>>,
}

impl MemoryResources {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            parent: None,
            owner: Value::Null,
            listeners: Arc::new(Mutex::new(Listeners::default())),
        }
    }

    pub fn with_parent(mut self, parent: Arc<dyn Resources>) -> Self {
        self.parent = Some(parent);
        self
    }

    pub fn with_owner(mut self, owner: Value) -> Self {
        self.owner = owner;
        self
    }

    /// Removes every local entry. Reported to aggregate subscribers and to
    /// the subscribers of each removed key.
    pub fn clear(&self) {
        let removed: Vec<Arc<str>> = self.entries.write().drain().map(|(k, _)| k).collect();
        let callbacks = {
            let listeners = self.listeners.lock();
            let mut callbacks = listeners.for_all();
            for key in &removed {
                callbacks.extend(listeners.for_key(key));
            }
            callbacks
        };
        for callback in callbacks {
            callback();
        }
    }

    fn notify(&self, key: &str) {
        // Snapshot so callbacks may subscribe, unsubscribe or write.
        let callbacks = self.listeners.lock().for_key(key);
        for callback in callbacks {
            callback();
        }
    }

    fn unsubscriber(&self, key: Option<Arc<str>>, id: u64) -> Subscription {
        let listeners: Weak<Mutex<Listeners>> = Arc::downgrade(&self.listeners);
        Subscription::new(move || {
            let Some(listeners) = listeners.upgrade() else {
                return;
            };
            let mut listeners = listeners.lock();
            match key {
                Some(key) => {
                    if let Some(list) = listeners.by_key.get_mut(&key) {
                        list.retain(|(i, _)| *i != id);
                        if list.is_empty() {
                            listeners.by_key.remove(&key);
                        }
                    }
                }
                None => listeners.all.retain(|(i, _)| *i != id),
            }
        })
    }
}

impl Default for MemoryResources {
    fn default() -> Self {
        Self::new()
    }
}

impl Resources for MemoryResources {
    fn get(&self, key: &str) -> Option<Value> {
        self.entries.read().get(key).cloned()
    }

    fn set(&self, key: &str, value: Value) {
        self.entries.write().insert(key.into(), value);
        self.notify(key);
    }

    fn contains_key(&self, key: &str) -> bool {
        self.entries.read().contains_key(key)
    }

    fn remove(&self, key: &str) -> Option<Value> {
        let removed = self.entries.write().remove(key);
        if removed.is_some() {
            self.notify(key);
        }
        removed
    }

    fn parent(&self) -> Option<Arc<dyn Resources>> {
        self.parent.clone()
    }

    fn owner(&self) -> Value {
        self.owner.clone()
    }

    fn len(&self) -> usize {
        self.entries.read().len()
    }

    fn keys(&self) -> Vec<Arc<str>> {
        self.entries.read().keys().cloned().collect()
    }

    fn values(&self) -> Vec<Value> {
        self.entries.read().values().cloned().collect()
    }

    /// Also subscribes to `key` on every ancestor, since a lookup may be
    /// answered there.
    fn subscribe(&self, key: &str, callback: ChangeCallback) -> Subscription {
        let key: Arc<str> = key.into();
        let id = {
            let mut listeners = self.listeners.lock();
            let id = listeners.allocate();
            listeners
                .by_key
                .entry(Arc::clone(&key))
                .or_default()
                .push((id, Arc::clone(&callback)));
            id
        };
        let local = self.unsubscriber(Some(Arc::clone(&key)), id);

        match &self.parent {
            Some(parent) => Subscription::combine(vec![local, parent.subscribe(&key, callback)]),
            None => local,
        }
    }

    fn subscribe_all(&self, callback: ChangeCallback) -> Subscription {
        let id = {
            let mut listeners = self.listeners.lock();
            let id = listeners.allocate();
            listeners.all.push((id, callback));
            id
        };
        self.unsubscriber(None, id)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    fn counter() -> (Arc<AtomicUsize>, ChangeCallback) {
        let count = Arc::new(AtomicUsize::new(0));
        let hits = Arc::clone(&count);
        (count, Arc::new(move || {
            hits.fetch_add(1, Ordering::SeqCst);
        }))
    }

    fn chain() -> (Arc<MemoryResources>, MemoryResources) {
        let parent = Arc::new(MemoryResources::new());
        let parent_dyn: Arc<dyn Resources> = Arc::clone(&parent) as Arc<dyn Resources>;
        (parent, MemoryResources::new().with_parent(parent_dyn))
    }

    // ── Scope walk ────────────────────────────────────────────

    #[test]
    fn lookup_walks_to_ancestors() {
        let (parent, child) = chain();
        parent.set("$A", Value::Int32(1));
        assert_eq!(child.get("$A"), None);
        assert_eq!(child.try_get_resource("$A"), Some(Value::Int32(1)));
    }

    #[test]
    fn existing_key_write_targets_the_defining_scope() {
        let (parent, child) = chain();
        parent.set("$A", Value::Int32(10));
        child.set_to_existing_key("$A", Value::Int32(123));
        assert_eq!(parent.get("$A"), Some(Value::Int32(123)));
        assert!(!child.contains_key("$A"));

        child.set_to_existing_key("$B", Value::Int32(1));
        assert!(child.contains_key("$B"));
        assert!(!parent.contains_key("$B"));
    }

    #[test]
    fn get_or_create_stores_locally() {
        let store = MemoryResources::new();
        assert_eq!(store.get_or_create("$A", Value::Int32(5)), Value::Int32(5));
        assert_eq!(store.get_or_create("$A", Value::Int32(9)), Value::Int32(5));
        assert_eq!(store.len(), 1);
    }

    // ── Notifications ─────────────────────────────────────────

    #[test]
    fn key_subscribers_see_writes_and_removals() {
        let store = MemoryResources::new();
        let (count, callback) = counter();
        let sub = store.subscribe("$A", callback);
        store.set("$A", Value::Int32(1));
        store.set("$B", Value::Int32(1));
        store.remove("$A");
        store.remove("$missing");
        assert_eq!(count.load(Ordering::SeqCst), 2);

        sub.dispose();
        store.set("$A", Value::Int32(2));
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn child_subscription_observes_ancestors() {
        let (parent, child) = chain();
        let (count, callback) = counter();
        let _sub = child.subscribe("$A", callback);
        parent.set("$A", Value::Int32(1));
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn clear_reports_to_aggregate_subscribers() {
        let store = MemoryResources::new();
        store.set("$A", Value::Int32(1));
        let (all, all_cb) = counter();
        let (key, key_cb) = counter();
        let _a = store.subscribe_all(all_cb);
        let _k = store.subscribe("$A", key_cb);
        store.clear();
        assert!(store.is_empty());
        assert_eq!(all.load(Ordering::SeqCst), 1);
        assert_eq!(key.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn callbacks_may_write_back() {
        let store = Arc::new(MemoryResources::new());
        let inner = Arc::clone(&store);
        let _sub = store.subscribe(
            "$A",
            Arc::new(move || {
                if inner.get("$B").is_none() {
                    inner.set("$B", Value::Bool(true));
                }
            }),
        );
        store.set("$A", Value::Int32(1));
        assert_eq!(store.get("$B"), Some(Value::Bool(true)));
    }

    #[test]
    fn enumeration() {
        let store = MemoryResources::new().with_owner(Value::string("owner"));
        store.set("$A", Value::Int32(1));
        store.set("$B", Value::Int32(2));
        let mut keys: Vec<String> = store.keys().iter().map(|k| k.to_string()).collect();
        keys.sort();
        assert_eq!(keys, ["$A", "$B"]);
        assert_eq!(store.values().len(), 2);
        assert_eq!(store.owner(), Value::string("owner"));
    }
}
