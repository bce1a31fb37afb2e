//! HTTP request handlers.

pub mod pages;
pub mod probe;

pub use pages::{index, not_found};
pub use probe::test_engine;
