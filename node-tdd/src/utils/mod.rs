//! Utility modules for Node TDD.

pub mod debounce;

pub use debounce::{Debouncer, DebouncerError};
