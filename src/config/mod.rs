// Start of file: /src/config/mod.rs

/*
* Re-export submodules related to settings loading, the config manager, and app state.
*/

pub mod manager;
pub mod settings;
pub mod state;

pub use manager::ConfigManager;
pub use settings::{ConfigSource, Settings};

// End of file: /src/config/mod.rs
