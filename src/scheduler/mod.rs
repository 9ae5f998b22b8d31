// Start of file: /src/scheduler/mod.rs

/*
    * Cron, interval and one-shot jobs on the tokio runtime.
*/

pub mod scheduler;

pub use scheduler::{Scheduler, SchedulerError, TaskInfo, TaskStatus, Trigger};

// End of file: /src/scheduler/mod.rs
