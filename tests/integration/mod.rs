//! Integration tests
//!
//! Hub and client managers wired together in-process, the HTTP surface
//! driven through the router, and the local cache on disk.

pub mod cache_test;
#[cfg(feature = "ssr")]
pub mod endpoints_test;
#[cfg(feature = "ssr")]
pub mod http_transport_test;
#[cfg(feature = "ssr")]
pub mod persistence_test;
#[cfg(feature = "ssr")]
pub mod sync_scenarios_test;
