//! Synchronized state
//!
//! One tracked value kept fresh from three sources: pushed stream messages,
//! periodic polling and manual refreshes. All three flow through a single
//! merge policy.

mod coordinator;
mod fetcher;
mod merge;
mod snapshot;

pub use coordinator::*;
pub use fetcher::*;
pub use merge::*;
pub use snapshot::*;
