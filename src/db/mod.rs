//! Database abstraction layer.
//!
//! Connection pool creation for the SQL extractor backends, and the
//! owned-or-borrowed pool handle they hold.

pub mod pool;

pub use pool::{DbPool, PoolHandle};
