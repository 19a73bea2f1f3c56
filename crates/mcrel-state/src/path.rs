//! Locations inside a state tree.
//!
//! A `Path` names where in a tree something happened: merge errors carry the
//! path of the offending field, and `Value::pointer` resolves a path for reads.
//! Each segment is a record field, a list index, or a map entry.

use crate::Key;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A single segment in a state path.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Seg {
    /// Record field access.
    Field(String),
    /// List element access.
    Index(usize),
    /// Map entry access.
    Entry(Key),
}

impl Seg {
    /// Create a field segment.
    #[inline]
    pub fn field(name: impl Into<String>) -> Self {
        Seg::Field(name.into())
    }

    /// Create an index segment.
    #[inline]
    pub fn index(i: usize) -> Self {
        Seg::Index(i)
    }

    /// Create a map entry segment.
    #[inline]
    pub fn entry(key: impl Into<Key>) -> Self {
        Seg::Entry(key.into())
    }

    /// Get the field name if this is a field segment.
    #[inline]
    pub fn as_field(&self) -> Option<&str> {
        match self {
            Seg::Field(name) => Some(name),
            _ => None,
        }
    }

    /// Get the index if this is an index segment.
    #[inline]
    pub fn as_index(&self) -> Option<usize> {
        match self {
            Seg::Index(i) => Some(*i),
            _ => None,
        }
    }
}

impl fmt::Display for Seg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Seg::Field(name) => write!(f, ".{}", name),
            Seg::Index(i) => write!(f, "[{}]", i),
            Seg::Entry(key) => write!(f, "{{{}}}", key),
        }
    }
}

impl From<String> for Seg {
    fn from(s: String) -> Self {
        Seg::Field(s)
    }
}

impl From<&str> for Seg {
    fn from(s: &str) -> Self {
        Seg::Field(s.to_owned())
    }
}

impl From<usize> for Seg {
    fn from(i: usize) -> Self {
        Seg::Index(i)
    }
}

/// A complete path into a state tree.
///
/// # Examples
///
/// ```
/// use mcrel_state::Path;
///
/// let path = Path::root().field("todos").index(0).field("done");
/// assert_eq!(path.len(), 3);
/// assert_eq!(path.to_string(), "$.todos[0].done");
/// ```
#[derive(Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Path(Vec<Seg>);

impl Path {
    /// Create an empty path (root).
    #[inline]
    pub fn root() -> Self {
        Self(Vec::new())
    }

    /// Create a path from a vector of segments.
    #[inline]
    pub fn from_segments(segments: Vec<Seg>) -> Self {
        Self(segments)
    }

    /// Append a field segment and return self (builder pattern).
    #[inline]
    pub fn field(mut self, name: impl Into<String>) -> Self {
        self.0.push(Seg::Field(name.into()));
        self
    }

    /// Append an index segment and return self (builder pattern).
    #[inline]
    pub fn index(mut self, i: usize) -> Self {
        self.0.push(Seg::Index(i));
        self
    }

    /// Append a map entry segment and return self (builder pattern).
    #[inline]
    pub fn entry(mut self, key: impl Into<Key>) -> Self {
        self.0.push(Seg::Entry(key.into()));
        self
    }

    /// Push a segment onto the path (mutating).
    #[inline]
    pub fn push(&mut self, seg: Seg) {
        self.0.push(seg);
    }

    /// Pop the last segment from the path.
    #[inline]
    pub fn pop(&mut self) -> Option<Seg> {
        self.0.pop()
    }

    /// Get the segments of this path.
    #[inline]
    pub fn segments(&self) -> &[Seg] {
        &self.0
    }

    /// Check if this path is empty (root).
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Get the number of segments in this path.
    #[inline]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Get the last segment.
    #[inline]
    pub fn last(&self) -> Option<&Seg> {
        self.0.last()
    }

    /// Get the parent path (path without the last segment).
    pub fn parent(&self) -> Option<Path> {
        if self.0.is_empty() {
            None
        } else {
            let mut p = self.clone();
            p.pop();
            Some(p)
        }
    }

    /// Check if this path starts with another path.
    #[inline]
    pub fn starts_with(&self, prefix: &Path) -> bool {
        self.0.starts_with(&prefix.0)
    }

    /// Iterate over the segments.
    #[inline]
    pub fn iter(&self) -> impl Iterator<Item = &Seg> {
        self.0.iter()
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "$")?;
        for seg in &self.0 {
            write!(f, "{}", seg)?;
        }
        Ok(())
    }
}

impl FromIterator<Seg> for Path {
    fn from_iter<I: IntoIterator<Item = Seg>>(iter: I) -> Self {
        Path(iter.into_iter().collect())
    }
}

impl<'a> IntoIterator for &'a Path {
    type Item = &'a Seg;
    type IntoIter = std::slice::Iter<'a, Seg>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl std::ops::Index<usize> for Path {
    type Output = Seg;

    fn index(&self, index: usize) -> &Self::Output {
        &self.0[index]
    }
}

/// Construct a `Path` from a sequence of segments.
///
/// String literals become field segments and integers become list indices.
/// Map entries have no literal form; push `Seg::Entry` explicitly.
///
/// # Examples
///
/// ```
/// use mcrel_state::path;
///
/// let p = path!("todos", 2, "title");
/// assert_eq!(p.to_string(), "$.todos[2].title");
/// ```
#[macro_export]
macro_rules! path {
    () => {
        $crate::Path::root()
    };
    ($($seg:expr),+ $(,)?) => {{
        let mut p = $crate::Path::root();
        $(
            p.push($crate::Seg::from($seg));
        )+
        p
    }};
}
