//! Derived values with change detection.
//!
//! A [`Selection`] keeps the result of a selector over the store state and
//! calls back only when that result changes. View layers use it to re-render
//! a component when the part of the state it reads is replaced, and to stay
//! idle when an unrelated branch is updated.

use crate::{ReadonlyStore, Unsubscribe, Value};
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError, Weak};

/// Equality comparator: `PartialEq`, the default for [`Selection::new`].
///
/// For [`Value`] this is deep structural equality, so a subtree rebuilt with
/// equal contents counts as unchanged. Shared nodes compare in O(1) through a
/// pointer check; rebuilt ones cost a full walk. Use [`compare_by_identity`]
/// to treat any replaced node as a change.
pub fn compare_by_value<R: PartialEq>(a: &R, b: &R) -> bool {
    a == b
}

/// Identity comparator: [`Value::same`].
///
/// Pairs with structural sharing: a subtree the merge did not touch is the
/// same pointer, so the comparison is O(1) however large the subtree is.
pub fn compare_by_identity(a: &Value, b: &Value) -> bool {
    a.same(b)
}

type Selector<R> = Box<dyn Fn(&Value) -> R + Send + Sync>;
type Comparator<R> = Box<dyn Fn(&R, &R) -> bool + Send + Sync>;
type OnChange<R> = Box<dyn Fn(&R) + Send + Sync>;

struct Shared<R> {
    selector: Selector<R>,
    compare: Comparator<R>,
    on_change: OnChange<R>,
    current: Mutex<R>,
}

impl<R: Clone> Shared<R> {
    /// Store `next` if it differs from the held value and report it.
    fn update(&self, state: &Value) -> bool {
        let next = (self.selector)(state);
        {
            let mut current = self.current.lock().unwrap_or_else(PoisonError::into_inner);
            if (self.compare)(&current, &next) {
                return false;
            }
            *current = next.clone();
        }
        (self.on_change)(&next);
        true
    }
}

/// A subscription that tracks one selected value.
///
/// Dropping the selection unsubscribes it.
///
/// # Examples
///
/// ```
/// use mcrel_state::{record, Patch, Selection, Store};
/// use std::sync::atomic::{AtomicUsize, Ordering};
/// use std::sync::Arc;
///
/// let store = Store::new(record! { "count" => 0, "other" => 0 }).unwrap();
/// let renders = Arc::new(AtomicUsize::new(0));
///
/// let r = Arc::clone(&renders);
/// let count = Selection::new(
///     store.clone(),
///     |state| state["count"].as_i64(),
///     move |_| {
///         r.fetch_add(1, Ordering::SeqCst);
///     },
/// );
///
/// store.set_state(Patch::new().set("other", 1)).unwrap();
/// store.set_state(Patch::new().set("count", 5)).unwrap();
///
/// assert_eq!(count.get(), Some(5));
/// assert_eq!(renders.load(Ordering::SeqCst), 1);
/// ```
pub struct Selection<S: ReadonlyStore + 'static, R> {
    store: Arc<S>,
    shared: Arc<Shared<R>>,
    handle: Unsubscribe,
}

impl<S, R> Selection<S, R>
where
    S: ReadonlyStore + 'static,
    R: Clone + Send + Sync + 'static,
{
    /// Select with [`compare_by_value`].
    pub fn new<F, C>(store: S, selector: F, on_change: C) -> Self
    where
        R: PartialEq,
        F: Fn(&Value) -> R + Send + Sync + 'static,
        C: Fn(&R) + Send + Sync + 'static,
    {
        Self::with_compare(store, selector, compare_by_value::<R>, on_change)
    }

    /// Select with a custom comparator. `compare` returns true when two
    /// results are equivalent and the change callback should not run.
    ///
    /// Notifications re-read the store rather than trusting the state they
    /// carry, so a selection subscribed after a reentrant writer still ends
    /// up holding the latest value.
    pub fn with_compare<F, E, C>(store: S, selector: F, compare: E, on_change: C) -> Self
    where
        F: Fn(&Value) -> R + Send + Sync + 'static,
        E: Fn(&R, &R) -> bool + Send + Sync + 'static,
        C: Fn(&R) + Send + Sync + 'static,
    {
        let initial = selector(&store.get_state());
        let shared = Arc::new(Shared {
            selector: Box::new(selector),
            compare: Box::new(compare),
            on_change: Box::new(on_change),
            current: Mutex::new(initial),
        });

        let store = Arc::new(store);
        let source: Weak<S> = Arc::downgrade(&store);
        let listener = Arc::clone(&shared);
        let handle = store.subscribe(Arc::new(move |_: &Value| {
            if let Some(store) = source.upgrade() {
                listener.update(&store.get_state());
            }
        }));

        Self {
            store,
            shared,
            handle,
        }
    }

    /// The last selected value.
    pub fn get(&self) -> R {
        self.shared
            .current
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Run the selector against the current state now.
    ///
    /// Returns true if the selected value changed, in which case the change
    /// callback has run.
    pub fn reselect(&self) -> bool {
        self.shared.update(&self.store.get_state())
    }

    /// Stop tracking. The held value is kept. Returns false if already
    /// unsubscribed.
    pub fn unsubscribe(&self) -> bool {
        self.handle.unsubscribe()
    }
}

impl<S: ReadonlyStore + 'static, R> Drop for Selection<S, R> {
    fn drop(&mut self) {
        self.handle.unsubscribe();
    }
}

impl<S: ReadonlyStore + 'static, R: fmt::Debug> fmt::Debug for Selection<S, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let current = self.shared.current.lock().unwrap_or_else(PoisonError::into_inner);
        f.debug_struct("Selection")
            .field("current", &*current)
            .field("handle", &self.handle)
            .finish()
    }
}
