//! tests/global_errors.rs
//! Aggregates the error-envelope tests from the global_errors subdirectory.

#[cfg(test)]
mod global_errors {
    #[path = "../global_errors/404.rs"]
    mod e404;

    #[path = "../global_errors/405.rs"]
    mod e405;

    #[path = "../global_errors/408.rs"]
    mod e408;

    #[path = "../global_errors/409.rs"]
    mod e409;

    #[path = "../global_errors/413.rs"]
    mod e413;

    #[path = "../global_errors/500.rs"]
    mod e500;
}
