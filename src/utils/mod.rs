// Start of file: /src/utils/mod.rs

/*
    * Re-exports for all utility modules like error handling,
    * response formats, request context, ids, hashing and time helpers.
*/

pub mod context;
pub mod crypto;
pub mod error_handler;
pub mod id_generator;
pub mod response_handler;
pub mod time;
pub mod utils;

// End of file: /src/utils/mod.rs
