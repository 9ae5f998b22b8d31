// Start of file: /src/api/mod.rs

/*
    * HTTP surface: class-based views, the built-in health and metrics
    * endpoints and the request middleware.
*/

pub mod health;
pub mod metrics;
pub mod middleware;
pub mod view;

pub use view::{ApiView, ViewRegistration};

// End of file: /src/api/mod.rs
