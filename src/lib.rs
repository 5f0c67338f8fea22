//! Workspace umbrella crate.
//!
//! Re-exports the `core-service` façade so host applications can depend on
//! a single crate and pick platform defaults through the `desktop-shims`
//! feature.

pub use core_service::*;
