pub mod handler;
pub mod routes;

pub use routes::metrics_routes;
