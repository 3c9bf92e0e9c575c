//! Common test utilities for bangumi-dispatch integration tests

#[allow(dead_code)]
pub mod clients;
#[allow(dead_code)]
pub mod fixtures;

#[allow(unused_imports)]
pub use clients::*;
#[allow(unused_imports)]
pub use fixtures::*;
