//! Dmsg Testing Infrastructure
//!
//! Effect doubles and builders for driving the span subsystem in tests.
//!
//! # Usage
//!
//! Add this to your crate's `Cargo.toml` dev-dependencies:
//! ```toml
//! [dev-dependencies]
//! dmsg-testkit = { path = "../dmsg-testkit" }
//! ```
//!
//! Then in your tests:
//! ```rust,ignore
//! use dmsg_testkit::*;
//!
//! #[test]
//! fn my_test() {
//!     init_tracing();
//!     let transport = Arc::new(RecordingTransport::new());
//!     // ... build a service over `transport` and drive it
//!     assert!(transport.outstanding_refs().is_empty());
//! }
//! ```

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]

pub mod fixtures;
pub mod observer;
pub mod random;
pub mod transport;

pub use fixtures::*;
pub use observer::*;
pub use random::*;
pub use transport::*;

use tracing_subscriber::EnvFilter;

/// Install a test-friendly subscriber once; later calls are no-ops.
///
/// Verbosity follows `RUST_LOG` and defaults to `warn`.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_test_writer()
        .try_init();
}
