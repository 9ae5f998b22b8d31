// Class-based views: a type owning its injected dependencies plus the routes
// it serves under a common path prefix.

use std::any::{type_name, TypeId};

use axum::Router;
use tracing::debug;

use crate::config::state::AppState;
use crate::core::injector::{Injectable, Injector, Scope};

pub trait ApiView: Injectable {
    /// Prefix all routes are nested under. Empty means the root.
    const PATH: &'static str = "";

    /// Routes relative to `PATH`. Handlers reach the view with `Inject<Self>`.
    fn routes() -> Router<AppState>;
}

/// Type-erased view entry collected by the service and discovery.
#[derive(Clone, Copy)]
pub struct ViewRegistration {
    pub name: &'static str,
    pub path: &'static str,
    pub type_id: TypeId,
    bind: fn(&Injector),
    routes: fn() -> Router<AppState>,
}

impl std::fmt::Debug for ViewRegistration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ViewRegistration")
            .field("name", &self.name)
            .field("path", &self.path)
            .finish()
    }
}

fn bind_view<V: ApiView>(injector: &Injector) {
    if !injector.has_binding::<V>() {
        injector.bind_injectable::<V>(Scope::Singleton);
    }
}

impl ViewRegistration {
    pub fn of<V: ApiView>() -> Self {
        Self {
            name: type_name::<V>(),
            path: V::PATH,
            type_id: TypeId::of::<V>(),
            bind: bind_view::<V>,
            routes: V::routes,
        }
    }

    /// Binds the view as a singleton unless something is already bound.
    pub fn bind(&self, injector: &Injector) {
        (self.bind)(injector);
    }

    /// The view's routes mounted under its path.
    pub fn router(&self) -> Router<AppState> {
        let routes: Router<AppState> = (self.routes)();
        let path: &str = self.path.trim_end_matches('/');

        debug!(view = self.name, path = if path.is_empty() { "/" } else { path }, "Mounting view");
        if path.is_empty() {
            routes
        } else {
            Router::new().nest(path, routes)
        }
    }
}
