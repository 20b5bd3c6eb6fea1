//! Task scheduler runner.
//!
//! Split into focused submodules:
//! - `core`: TaskScheduler struct, registration, and accessor methods
//! - `driver`: the per-task loop and single-run execution
//! - `shutdown`: bounded, idempotent disposal

mod core;
mod driver;
mod shutdown;

pub use self::core::{TaskScheduler, DEFAULT_SHUTDOWN_GRACE};
