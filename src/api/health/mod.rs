/*
* Health endpoints: the root /health probe and the HealthCheckView mounted
* under /api/system.
*/

pub mod handler;
pub mod routes;

pub use routes::{health_routes, HealthCheckView};
