// Start of file: /src/messaging/mod.rs

/*
    * In-process messaging: a bounded per-topic queue with async consumers.
*/

pub mod local;

pub use local::{LocalMessage, LocalQueue, QueueStatus};

// End of file: /src/messaging/mod.rs
