// Start of file: /src/api/middleware/mod.rs

/*
    * Request pipeline middleware: context, logging, in-flight tracking,
    * metrics and CORS.
*/

pub mod cors;
pub mod metrics;
pub mod request_context;
pub mod request_logging;
pub mod request_tracking;

pub use cors::cors_layer;
pub use metrics::record_metrics;
pub use request_context::request_context;
pub use request_logging::request_logging;
pub use request_tracking::request_tracking;

// End of file: /src/api/middleware/mod.rs
