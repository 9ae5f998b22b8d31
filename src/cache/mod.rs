// Start of file: /src/cache/mod.rs

/*
    * In-process caching. The Redis-backed cache lives next to the other
    * external connections in `database::redis_manager`.
*/

pub mod local;

pub use local::LruCache;

use std::fmt::Display;

/// Memoization key: the namespace followed by each argument, joined by `:`.
pub fn make_key<I, D>(namespace: &str, args: I) -> String
where
    I: IntoIterator<Item = D>,
    D: Display,
{
    let mut key: String = namespace.to_string();
    for arg in args {
        key.push(':');
        key.push_str(&arg.to_string());
    }
    key
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_join_namespace_and_arguments() {
        assert_eq!(make_key("users", [7, 42]), "users:7:42");
        assert_eq!(make_key("config", Vec::<String>::new()), "config");
        assert_eq!(make_key("search", ["q=rust", "page=2"]), "search:q=rust:page=2");
    }
}

// End of file: /src/cache/mod.rs
