//! Merge policies
//!
//! A merge policy combines the tracked value with a newly arrived one. It is
//! called from both the push path and the refresh path without mutual
//! exclusion, so it must be pure.

use std::fmt;
use std::sync::Arc;

/// `(current, incoming) -> next`
pub struct MergePolicy<T>(Arc<dyn Fn(&T, T) -> T + Send + Sync>);

impl<T> MergePolicy<T> {
    /// Wrap a merge function
    pub fn new<F>(merge: F) -> Self
    where
        F: Fn(&T, T) -> T + Send + Sync + 'static,
    {
        Self(Arc::new(merge))
    }

    /// Incoming value wins
    pub fn replace() -> Self
    where
        T: 'static,
    {
        Self::new(|_current, incoming| incoming)
    }

    /// Produce the next tracked value
    pub fn apply(&self, current: &T, incoming: T) -> T {
        (self.0)(current, incoming)
    }
}

impl<T: 'static> Default for MergePolicy<T> {
    fn default() -> Self {
        Self::replace()
    }
}

impl<T> Clone for MergePolicy<T> {
    fn clone(&self) -> Self {
        Self(Arc::clone(&self.0))
    }
}

impl<T> fmt::Debug for MergePolicy<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("MergePolicy(..)")
    }
}
