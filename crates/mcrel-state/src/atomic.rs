//! Atomic value classification.
//!
//! An atomic value is an indivisible leaf: the merge engine replaces it
//! wholesale instead of descending into it. Lists, maps, sets, datetimes,
//! regexes, callables and opaque values are always atomic. Callers can mark
//! records atomic too by registering [`AtomicPredicate`]s, which is how a
//! domain type stored as a record (a coordinate, a money amount) opts out of
//! field-by-field merging.

use crate::Value;
use std::fmt;
use std::sync::Arc;

/// A caller-supplied test that marks values as atomic.
///
/// Implemented for every `Fn(&Value) -> bool + Send + Sync` closure.
pub trait AtomicPredicate: Send + Sync {
    /// Return true if `value` must be treated as an opaque leaf.
    fn is_atomic(&self, value: &Value) -> bool;
}

impl<F> AtomicPredicate for F
where
    F: Fn(&Value) -> bool + Send + Sync,
{
    fn is_atomic(&self, value: &Value) -> bool {
        self(value)
    }
}

/// Guard matching records that carry every one of `fields`.
///
/// # Examples
///
/// ```
/// use mcrel_state::{has_fields, record, AtomicClassifier};
///
/// let classifier = AtomicClassifier::new().with_guard(has_fields(&["lat", "lng"]));
/// assert!(classifier.is_atomic(&record! { "lat" => 1.0, "lng" => 2.0 }));
/// assert!(!classifier.is_atomic(&record! { "lat" => 1.0 }));
/// ```
pub fn has_fields(fields: &'static [&'static str]) -> impl AtomicPredicate + Clone {
    move |value: &Value| {
        value
            .as_record()
            .is_some_and(|record| fields.iter().all(|f| record.contains_key(*f)))
    }
}

/// Built-in atomic rules combined with caller guards.
///
/// Guards are evaluated in registration order and short-circuit on the first
/// match. Cloning shares the guard list.
#[derive(Clone, Default)]
pub struct AtomicClassifier {
    guards: Vec<Arc<dyn AtomicPredicate>>,
}

impl AtomicClassifier {
    /// A classifier with only the built-in rules.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a guard (builder pattern).
    pub fn with_guard(mut self, guard: impl AtomicPredicate + 'static) -> Self {
        self.push(guard);
        self
    }

    /// Register a guard.
    pub fn push(&mut self, guard: impl AtomicPredicate + 'static) {
        self.guards.push(Arc::new(guard));
    }

    /// Register an already shared guard.
    pub fn push_shared(&mut self, guard: Arc<dyn AtomicPredicate>) {
        self.guards.push(guard);
    }

    /// Number of caller guards.
    pub fn guard_count(&self) -> usize {
        self.guards.len()
    }

    /// The fixed rule: every object-like variant except records.
    pub fn is_builtin_atomic(value: &Value) -> bool {
        matches!(
            value,
            Value::List(_)
                | Value::Map(_)
                | Value::Set(_)
                | Value::DateTime(_)
                | Value::Regex(_)
                | Value::Callable(_)
                | Value::Opaque(_)
        )
    }

    /// Whether `value` is an atomic object.
    ///
    /// Primitives and null are not objects and always return false; the
    /// merge engine replaces them anyway.
    pub fn is_atomic(&self, value: &Value) -> bool {
        if !value.is_object() {
            return false;
        }
        Self::is_builtin_atomic(value) || self.guards.iter().any(|g| g.is_atomic(value))
    }
}

impl fmt::Debug for AtomicClassifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AtomicClassifier")
            .field("guards", &self.guards.len())
            .finish()
    }
}
