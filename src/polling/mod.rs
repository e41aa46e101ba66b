//! Fixed-interval polling
//!
//! A recurring timer that invokes a refresh callback, independent of any
//! connection state.

mod scheduler;

pub use scheduler::*;
