//! Immutable state tree with deep-merge updates and change subscription.
//!
//! `mcrel-state` keeps application state as a tree of shared, immutable nodes.
//! Updates are partial patches merged into the current tree; every subtree a
//! patch does not touch is reused by pointer in the new tree, so observers
//! detect changes with an O(1) identity check.
//!
//! # Core Concepts
//!
//! - **Value**: A state node. Records merge field by field; everything else
//!   (lists, maps, sets, datetimes, regexes, callables, opaque host objects)
//!   is an atomic leaf replaced wholesale
//! - **AtomicClassifier**: Built-in atomic rules plus caller guards that can
//!   mark specific records atomic
//! - **Patch**: An ordered set of field updates, including `Clear` to remove a
//!   field and `pierce` to update one element of a list or map
//! - **deep_merge**: The pure merge function
//! - **Store**: Current state plus ordered, synchronous subscribers
//! - **Selection**: A derived value that calls back only when it changes
//!
//! # Merge Semantics
//!
//! ```text
//! State' = deep_merge(State, Patch)
//! ```
//!
//! - `deep_merge` never mutates its input
//! - Untouched subtrees of `State'` are the same nodes as in `State`
//! - A failed merge returns an error and produces no state at all
//!
//! # Quick Start
//!
//! ```
//! use mcrel_state::{pierce, record, Patch, Store};
//!
//! let store = Store::new(record! {
//!     "todos" => vec![
//!         record! { "title" => "milk", "done" => false },
//!         record! { "title" => "eggs", "done" => false },
//!     ],
//!     "filter" => "all",
//! })
//! .unwrap();
//!
//! let before = store.get_state();
//! let after = store
//!     .set_state(Patch::new().with("todos", pierce(1, Patch::new().set("done", true))))
//!     .unwrap();
//!
//! assert_eq!(after["todos"][1]["done"], true);
//! assert!(after["todos"][0].same(&before["todos"][0]));
//! assert!(!after["todos"].same(&before["todos"]));
//! assert_eq!(before["todos"][1]["done"], false);
//! ```

mod atomic;
mod error;
mod key;
mod merge;
mod patch;
mod path;
mod select;
mod store;
mod value;

// Core types
pub use atomic::{has_fields, AtomicClassifier, AtomicPredicate};
pub use error::{MergeError, MergeResult};
pub use key::Key;
pub use merge::{
    deep_merge, deep_merge_value, deep_merge_value_with, deep_merge_with, MergeOptions,
    DEFAULT_MAX_DEPTH,
};
pub use patch::{pierce, Patch, PatchValue, Pierce};
pub use path::{Path, Seg};
pub use value::{Callable, Map, Opaque, Record, Set, Value};

// Store types
pub use select::{compare_by_identity, compare_by_value, Selection};
pub use store::{
    Callback, ReadonlyStore, Store, StoreBuilder, StoreConfig, StoreError, StoreResult, Unsubscribe,
};
