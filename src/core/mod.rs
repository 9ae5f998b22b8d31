// Start of file: /src/core/mod.rs

/*
    * Service orchestration: injection, lifecycle, shutdown, the HTTP server,
    * health, discovery, events, metrics and logging setup.
*/

pub mod api_service;
pub mod discovery;
pub mod events;
pub mod injector;
pub mod lifecycle;
pub mod logging;
pub mod metrics;
pub mod server;
pub mod service_manager;
pub mod shutdown;

// End of file: /src/core/mod.rs
