// Library root: service orchestration and web utilities on top of axum

pub mod api;
pub mod app;
pub mod cache;
pub mod cli;
pub mod config;
pub mod core;
pub mod database;
pub mod messaging;
pub mod scheduler;
pub mod utils;

pub use crate::api::view::{ApiView, ViewRegistration};
pub use crate::config::{state::AppState, ConfigManager, ConfigSource, Settings};
pub use crate::core::api_service::{ApiService, ApiServiceBuilder, ServiceModule, StartOptions};
pub use crate::core::events::EventBus;
pub use crate::core::injector::{Inject, Injectable, Injector, InjectorError, Module, Scope};
pub use crate::core::lifecycle::{ComponentType, LifecycleEventType, LifecycleManager};
pub use crate::core::logging::LoggingManager;
pub use crate::utils::context::RequestContext;
pub use crate::utils::error_handler::{ApiError, ApiErrorKind};
pub use crate::utils::response_handler::{ApiJson, ApiResponse, PaginatedData};
