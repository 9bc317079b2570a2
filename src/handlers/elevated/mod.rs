// handlers/elevated/mod.rs - Global admin handlers
//
// Security Level: global role required
// Route Prefix: /api/v1 (settings, metrics)

pub mod metrics; // GET /api/v1/metrics
pub mod settings; // GET /api/v1/settings

pub use metrics::metrics;
pub use settings::settings;
