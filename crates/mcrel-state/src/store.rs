//! Observable store: one current state plus an ordered list of subscribers.
//!
//! Every update goes through [`deep_merge`](crate::deep_merge), so subscribers can compare the old
//! and new state with [`Value::same`] and skip work for untouched subtrees.
//!
//! Subscribers run synchronously on the thread that called `set_state`, after
//! the new state is committed and with no internal lock held. A subscriber may
//! therefore read the store, subscribe, unsubscribe, or call `set_state` again.

use crate::{
    deep_merge_with, AtomicClassifier, AtomicPredicate, MergeError, MergeOptions, Patch, Value,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock, Weak};
use thiserror::Error;
use tracing::{debug, warn};

/// A subscriber callback. Receives the newly committed state.
pub type Callback = Arc<dyn Fn(&Value) + Send + Sync>;

/// Result type alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur while building or updating a store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The update could not be merged; the state is unchanged.
    #[error("failed to merge update: {0}")]
    Merge(#[from] MergeError),

    /// The initial state is not a record.
    #[error("initial state must be a record, but got: {found}")]
    InvalidInitialState { found: &'static str },

    /// The configuration could not be parsed.
    #[error("invalid store configuration: {0}")]
    Config(#[from] serde_json::Error),
}

/// Store settings.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Options passed to every merge.
    pub merge: MergeOptions,
    /// Label attached to log events.
    pub name: Option<String>,
}

impl StoreConfig {
    /// Parse a configuration from JSON. Missing fields take their defaults.
    ///
    /// ```
    /// use mcrel_state::StoreConfig;
    ///
    /// let config = StoreConfig::from_json(r#"{ "merge": { "max_depth": 32 } }"#).unwrap();
    /// assert_eq!(config.merge.max_depth, 32);
    /// assert_eq!(config.name, None);
    /// ```
    pub fn from_json(json: &str) -> StoreResult<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

/// Read access plus change notification.
///
/// This is the narrowed view handed to code that observes state but never
/// writes it, such as [`Selection`](crate::Selection).
pub trait ReadonlyStore: Send + Sync {
    /// The current state.
    fn get_state(&self) -> Value;

    /// Register a callback invoked after every committed update.
    fn subscribe(&self, callback: Callback) -> Unsubscribe;
}

struct Subscriber {
    id: u64,
    callback: Callback,
    active: AtomicBool,
}

struct Inner {
    state: RwLock<Value>,
    subscribers: Mutex<Vec<Arc<Subscriber>>>,
    next_id: AtomicU64,
    classifier: AtomicClassifier,
    config: StoreConfig,
}

impl Inner {
    fn name(&self) -> &str {
        self.config.name.as_deref().unwrap_or("store")
    }

    fn remove(&self, id: u64) -> bool {
        let mut subscribers = self
            .subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        match subscribers.iter().position(|s| s.id == id) {
            Some(pos) => {
                let removed = subscribers.remove(pos);
                removed.active.store(false, Ordering::Release);
                true
            }
            None => false,
        }
    }
}

/// Handle returned by `subscribe`.
///
/// Dropping the handle keeps the subscription alive; call
/// [`unsubscribe`](Unsubscribe::unsubscribe) to remove it.
pub struct Unsubscribe {
    inner: Weak<Inner>,
    id: u64,
}

impl Unsubscribe {
    /// Remove the subscription. Calling this more than once is a no-op.
    ///
    /// Returns true if this call removed it.
    pub fn unsubscribe(&self) -> bool {
        let Some(inner) = self.inner.upgrade() else {
            return false;
        };
        let removed = inner.remove(self.id);
        if removed {
            debug!(store = inner.name(), id = self.id, "unsubscribed");
        }
        removed
    }
}

impl fmt::Debug for Unsubscribe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Unsubscribe").field("id", &self.id).finish()
    }
}

/// Observable deep-merge state container.
///
/// Cloning a `Store` yields another handle to the same state and subscribers.
/// Merges run against a snapshot with no lock held, so atomic guards may read
/// the store. The result is committed only if no other update landed in the
/// meantime; otherwise the merge is retried against the newer state.
///
/// # Examples
///
/// ```
/// use mcrel_state::{record, Patch, Store, Value};
/// use std::sync::{Arc, Mutex};
///
/// let store = Store::new(record! { "count" => 0, "todos" => record! {} }).unwrap();
/// let seen = Arc::new(Mutex::new(Vec::new()));
///
/// let log = Arc::clone(&seen);
/// let handle = store.subscribe(move |state| log.lock().unwrap().push(state["count"].clone()));
///
/// store.set_state(Patch::new().set("count", 1)).unwrap();
/// handle.unsubscribe();
/// store.set_state(Patch::new().set("count", 2)).unwrap();
///
/// assert_eq!(*seen.lock().unwrap(), vec![Value::from(1)]);
/// assert_eq!(store.get_state()["count"], 2);
/// ```
#[derive(Clone)]
pub struct Store {
    inner: Arc<Inner>,
}

impl Store {
    /// Create a store with the built-in atomic rules only.
    pub fn new(initial: Value) -> StoreResult<Self> {
        Self::builder(initial).build()
    }

    /// Create a store with extra atomic guards.
    pub fn with_guards<I>(initial: Value, guards: I) -> StoreResult<Self>
    where
        I: IntoIterator<Item = Arc<dyn AtomicPredicate>>,
    {
        Self::builder(initial).guards(guards).build()
    }

    /// Start building a store.
    pub fn builder(initial: Value) -> StoreBuilder {
        StoreBuilder::new(initial)
    }

    /// The current state. Cheap: the root is shared, not copied.
    pub fn get_state(&self) -> Value {
        self.inner
            .state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// The classifier used for every merge.
    pub fn classifier(&self) -> &AtomicClassifier {
        &self.inner.classifier
    }

    pub fn config(&self) -> &StoreConfig {
        &self.inner.config
    }

    /// Merge `patch` into the current state, commit it, and notify
    /// subscribers. Returns the new state.
    ///
    /// On a merge error nothing is committed and no subscriber runs.
    pub fn set_state(&self, patch: Patch) -> StoreResult<Value> {
        let next = self.commit(&patch)?;
        self.notify(&next);
        Ok(next)
    }

    /// Like [`set_state`](Self::set_state), computing the patch from the
    /// current state.
    ///
    /// The closure runs without any lock held. If another thread commits in
    /// between, the patch is merged against that newer state.
    pub fn set_state_with<F>(&self, f: F) -> StoreResult<Value>
    where
        F: FnOnce(&Value) -> Patch,
    {
        let current = self.get_state();
        self.set_state(f(&current))
    }

    /// Register a callback invoked with the new state after every update.
    pub fn subscribe<F>(&self, callback: F) -> Unsubscribe
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        self.subscribe_shared(Arc::new(callback))
    }

    /// Register an already shared callback.
    pub fn subscribe_shared(&self, callback: Callback) -> Unsubscribe {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let count = {
            let mut subscribers = self
                .inner
                .subscribers
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            subscribers.push(Arc::new(Subscriber {
                id,
                callback,
                active: AtomicBool::new(true),
            }));
            subscribers.len()
        };
        debug!(store = self.inner.name(), id, subscribers = count, "subscribed");

        Unsubscribe {
            inner: Arc::downgrade(&self.inner),
            id,
        }
    }

    /// Number of registered subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.inner
            .subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    fn commit(&self, patch: &Patch) -> StoreResult<Value> {
        loop {
            let base = self.get_state();
            let next = deep_merge_with(
                &base,
                patch,
                &self.inner.classifier,
                &self.inner.config.merge,
            )
            .inspect_err(|err| {
                warn!(store = self.inner.name(), error = %err, "rejected state update");
            })?;

            let mut state = self
                .inner
                .state
                .write()
                .unwrap_or_else(PoisonError::into_inner);
            if state.same(&base) {
                *state = next.clone();
                return Ok(next);
            }
            debug!(store = self.inner.name(), "state changed during merge, retrying");
        }
    }

    fn notify(&self, state: &Value) {
        let pass: Vec<Arc<Subscriber>> = self
            .inner
            .subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        debug!(store = self.inner.name(), subscribers = pass.len(), "state committed");

        for subscriber in pass {
            if subscriber.active.load(Ordering::Acquire) {
                (subscriber.callback)(state);
            }
        }
    }
}

impl ReadonlyStore for Store {
    fn get_state(&self) -> Value {
        Store::get_state(self)
    }

    fn subscribe(&self, callback: Callback) -> Unsubscribe {
        self.subscribe_shared(callback)
    }
}

impl fmt::Debug for Store {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Store")
            .field("name", &self.inner.name())
            .field("state", &self.get_state())
            .field("subscribers", &self.subscriber_count())
            .field("classifier", &self.inner.classifier)
            .finish()
    }
}

/// Builder for [`Store`].
///
/// ```
/// use mcrel_state::{has_fields, record, Patch, Store};
///
/// let store = Store::builder(record! { "pos" => record! { "x" => 1, "y" => 2 } })
///     .guard(has_fields(&["x", "y"]))
///     .name("canvas")
///     .build()
///     .unwrap();
///
/// let next = store
///     .set_state(Patch::new().set("pos", record! { "x" => 5 }))
///     .unwrap();
/// assert_eq!(next["pos"], record! { "x" => 5 });
/// ```
#[derive(Debug)]
pub struct StoreBuilder {
    initial: Value,
    classifier: AtomicClassifier,
    config: StoreConfig,
}

impl StoreBuilder {
    pub fn new(initial: Value) -> Self {
        Self {
            initial,
            classifier: AtomicClassifier::new(),
            config: StoreConfig::default(),
        }
    }

    /// Add an atomic guard.
    pub fn guard(mut self, guard: impl AtomicPredicate + 'static) -> Self {
        self.classifier.push(guard);
        self
    }

    /// Add several shared atomic guards.
    pub fn guards<I>(mut self, guards: I) -> Self
    where
        I: IntoIterator<Item = Arc<dyn AtomicPredicate>>,
    {
        for guard in guards {
            self.classifier.push_shared(guard);
        }
        self
    }

    /// Replace the classifier, dropping guards added so far.
    pub fn classifier(mut self, classifier: AtomicClassifier) -> Self {
        self.classifier = classifier;
        self
    }

    pub fn config(mut self, config: StoreConfig) -> Self {
        self.config = config;
        self
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.config.name = Some(name.into());
        self
    }

    pub fn max_depth(mut self, max_depth: usize) -> Self {
        self.config.merge.max_depth = max_depth;
        self
    }

    /// Build the store. Fails if the initial state is not a record.
    pub fn build(self) -> StoreResult<Store> {
        if !self.initial.is_record() {
            return Err(StoreError::InvalidInitialState {
                found: self.initial.type_name(),
            });
        }

        Ok(Store {
            inner: Arc::new(Inner {
                state: RwLock::new(self.initial),
                subscribers: Mutex::new(Vec::new()),
                next_id: AtomicU64::new(0),
                classifier: self.classifier,
                config: self.config,
            }),
        })
    }
}
