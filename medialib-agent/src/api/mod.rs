//! Control/diagnostics HTTP API
//!
//! Small read-mostly surface on port 8877. Only `scan_now`,
//! `clear_cache`, and `compact_cache` interact with the scan pipeline.

pub mod browse;
pub mod cache_admin;
pub mod health;
pub mod scan;
pub mod stats;

pub use browse::browse_routes;
pub use cache_admin::cache_admin_routes;
pub use health::health_routes;
pub use scan::scan_routes;
pub use stats::stats_routes;
