//! Expressions that recompute when the resources they read change.

use std::sync::{Arc, Weak};

use log::{debug, trace, warn};
use parking_lot::Mutex;

use crate::error::RuntimeError;
use crate::host::HostContext;
use crate::instruction::Bytecode;
use crate::interpreter::Interpreter;
use crate::resources::{ChangeCallback, Resources, Subscription};
use crate::slots::SlotCache;
use crate::value::Value;

/// Receives values pushed by an observable.
pub trait Observer: Send + Sync {
    fn on_next(&self, value: &Value);

    /// Called once when the source is disposed while still subscribed.
    fn on_completed(&self) {}
}

impl<F> Observer for F
where
    F: Fn(&Value) + Send + Sync,
{
    fn on_next(&self, value: &Value) {
        self(value)
    }
}

/// Maps a value on its way between the store and a bound target.
pub type Converter = Arc<dyn Fn(&Value) -> Value + Send + Sync>;

pub(crate) fn convert(converter: &Option<Converter>, value: &Value) -> Value {
    match converter {
        Some(converter) => converter(value),
        None => value.clone(),
    }
}

// ═══════════════════════════════════════════════════════════════════
// Observer list
// ═══════════════════════════════════════════════════════════════════

/// Subscribed observers in subscription order.
#[derive(Default)]
pub(crate) struct Observers {
    next_id: u64,
    list: Vec<(u64, Arc<dyn Observer>)>,
}

impl Observers {
    pub(crate) fn add(&mut self, observer: Arc<dyn Observer>) -> u64 {
        self.next_id += 1;
        self.list.push((self.next_id, observer));
        self.next_id
    }

    pub(crate) fn remove(&mut self, id: u64) {
        self.list.retain(|(i, _)| *i != id);
    }

    pub(crate) fn snapshot(&self) -> Vec<Arc<dyn Observer>> {
        self.list.iter().map(|(_, o)| Arc::clone(o)).collect()
    }

    pub(crate) fn take(&mut self) -> Vec<Arc<dyn Observer>> {
        std::mem::take(&mut self.list)
            .into_iter()
            .map(|(_, o)| o)
            .collect()
    }

    pub(crate) fn len(&self) -> usize {
        self.list.len()
    }
}

// ═══════════════════════════════════════════════════════════════════
// Watch keys
// ═══════════════════════════════════════════════════════════════════

#[derive(Clone)]
struct WatchEntry {
    code: Bytecode,
    keys: Arc<[Arc<str>]>,
}

static WATCH_KEYS: SlotCache<WatchEntry, 16> = SlotCache::new();

fn bytecode_hash(code: &Bytecode) -> u32 {
    let mut hash = code.first().map_or(0, |i| i.fingerprint());
    for (k, instruction) in code.iter().enumerate().skip(1) {
        hash ^= instruction.fingerprint();
        hash = hash.wrapping_add(k as u32);
    }
    hash
}

/// Every key `code` may read, whichever branches a run takes.
pub fn watch_keys(code: &Bytecode) -> Arc<[Arc<str>]> {
    if code.is_empty() {
        return Arc::from(Vec::new());
    }

    let hash = bytecode_hash(code);
    if let Some(entry) = WATCH_KEYS.get(hash, |e| e.code.ptr_eq(code)) {
        trace!("watch key cache hit ({} keys)", entry.keys.len());
        return entry.keys;
    }

    let keys: Arc<[Arc<str>]> = code.read_keys().into();
    WATCH_KEYS.insert(
        hash,
        WatchEntry {
            code: code.clone(),
            keys: Arc::clone(&keys),
        },
    );
    keys
}

// ═══════════════════════════════════════════════════════════════════
// Observable expression
// ═══════════════════════════════════════════════════════════════════

struct State {
    value: Value,
    parameter: Value,
    converter: Option<Converter>,
    observers: Observers,
    /// Set while a recalculation runs; writes made by the expression itself
    /// do not trigger another one.
    evaluating: bool,
    disposed: bool,
}

struct Inner {
    resources: Arc<dyn Resources>,
    host: Option<Arc<dyn HostContext>>,
    code: Bytecode,
    state: Mutex<State>,
    upstream: Mutex<Vec<Subscription>>,
}

/// Bytecode plus the latest value it produced, republished to observers
/// whenever a watched resource changes.
///
/// Cloning yields another handle to the same expression.
#[derive(Clone)]
pub struct ObservableExpression {
    inner: Arc<Inner>,
}

impl ObservableExpression {
    /// Evaluates `code` once and starts watching the keys it reads.
    pub fn new(
        resources: Arc<dyn Resources>,
        code: Bytecode,
        parameter: Value,
    ) -> Result<Self, RuntimeError> {
        Self::with_host(resources, None, code, parameter)
    }

    pub fn with_host(
        resources: Arc<dyn Resources>,
        host: Option<Arc<dyn HostContext>>,
        code: Bytecode,
        parameter: Value,
    ) -> Result<Self, RuntimeError> {
        let inner = Arc::new(Inner {
            resources,
            host,
            code,
            state: Mutex::new(State {
                value: Value::Null,
                parameter,
                converter: None,
                observers: Observers::default(),
                evaluating: false,
                disposed: false,
            }),
            upstream: Mutex::new(Vec::new()),
        });

        let initial = inner.evaluate()?;
        inner.state.lock().value = initial;

        let weak = Arc::downgrade(&inner);
        let callback: ChangeCallback = Arc::new(move || {
            if let Some(inner) = Weak::upgrade(&weak) {
                inner.recalculate();
            }
        });

        let keys = watch_keys(&inner.code);
        debug!("observing {} keys", keys.len());
        let mut upstream = Vec::with_capacity(keys.len() + 1);
        for key in keys.iter() {
            upstream.push(inner.resources.subscribe(key, Arc::clone(&callback)));
        }
        upstream.push(inner.resources.subscribe_all(callback));
        *inner.upstream.lock() = upstream;

        Ok(Self { inner })
    }

    /// The latest value, passed through the target converter.
    pub fn value(&self) -> Value {
        let state = self.inner.state.lock();
        convert(&state.converter, &state.value)
    }

    pub fn parameter(&self) -> Value {
        self.inner.state.lock().parameter.clone()
    }

    pub fn set_parameter(&self, parameter: Value) {
        self.inner.state.lock().parameter = parameter;
        self.inner.recalculate();
    }

    pub fn set_target_converter(&self, converter: Option<Converter>) {
        self.inner.state.lock().converter = converter;
        self.inner.recalculate();
    }

    pub fn watched_keys(&self) -> Arc<[Arc<str>]> {
        watch_keys(&self.inner.code)
    }

    /// Replays the current value to `observer` right away, then forwards
    /// every change until the subscription is dropped.
    pub fn subscribe(&self, observer: Arc<dyn Observer>) -> Subscription {
        let (id, current) = {
            let mut state = self.inner.state.lock();
            if state.disposed {
                drop(state);
                observer.on_completed();
                return Subscription::empty();
            }
            let current = convert(&state.converter, &state.value);
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

    pub fn observer_count(&self) -> usize {
        self.inner.state.lock().observers.len()
    }

    pub fn is_disposed(&self) -> bool {
        self.inner.state.lock().disposed
    }

    /// Stops watching and completes the observers subscribed right now.
    pub fn dispose(&self) {
        let observers = {
            let mut state = self.inner.state.lock();
            if state.disposed {
                return;
            }
            state.disposed = true;
            state.observers.take()
        };
        drop(std::mem::take(&mut *self.inner.upstream.lock()));
        for observer in observers {
            observer.on_completed();
        }
    }
}

impl Inner {
    fn evaluate(&self) -> Result<Value, RuntimeError> {
        let parameter = self.state.lock().parameter.clone();
        let mut interpreter = Interpreter::new(&*self.resources).with_parameter(parameter);
        if let Some(host) = &self.host {
            interpreter = interpreter.with_host(&**host);
        }
        Ok(interpreter.run(&self.code)?.into_value())
    }

    fn recalculate(&self) {
        {
            let mut state = self.state.lock();
            if state.disposed || state.evaluating {
                return;
            }
            state.evaluating = true;
        }
        let result = self.evaluate();
        self.state.lock().evaluating = false;

        let value = match result {
            Ok(value) => value,
            Err(err) => {
                warn!("observable expression failed to recalculate: {err}");
                return;
            }
        };

        let (converted, observers) = {
            let mut state = self.state.lock();
            if state.disposed || state.value.is_identical(&value) {
                return;
            }
            debug!("observable value changed to {value}");
            state.value = value;
            (
                convert(&state.converter, &state.value),
                state.observers.snapshot(),
            )
        };
        for observer in observers {
            observer.on_next(&converted);
        }
    }
}
