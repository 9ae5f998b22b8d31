// Start of file: /src/core/injector.rs

// * A small type-keyed container used for constructor injection.
// * Bindings are keyed by TypeId and resolved to Arc<T>.

use std::{
    any::{type_name, Any, TypeId},
    collections::HashMap,
    fmt,
    ops::Deref,
    sync::Arc,
};

use axum::{extract::FromRequestParts, http::request::Parts};
use once_cell::sync::OnceCell;
use parking_lot::RwLock;
use thiserror::Error;
use tracing::debug;

use crate::config::state::AppState;
use crate::utils::error_handler::ApiError;

type Instance = Arc<dyn Any + Send + Sync>;
type Provider = Arc<dyn Fn(&Injector) -> anyhow::Result<Instance> + Send + Sync>;

/// How often a provider runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    /// Built on first lookup, then shared.
    Singleton,
    /// Built on every lookup.
    Transient,
}

#[derive(Clone)]
enum Binding {
    Instance(Instance),
    Singleton { provider: Provider, cell: Arc<OnceCell<Instance>> },
    Transient(Provider),
}

#[derive(Debug, Error)]
pub enum InjectorError {
    #[error("no binding registered for {0}")]
    Unbound(&'static str),
    #[error("failed to construct {type_name}: {message}")]
    Provider { type_name: &'static str, message: String },
    #[error("binding for {0} produced a value of another type")]
    TypeMismatch(&'static str),
}

/// Types that can build themselves from the container.
pub trait Injectable: Sized + Send + Sync + 'static {
    fn inject(injector: &Injector) -> anyhow::Result<Self>;
}

/// A unit of bindings installed into an injector.
pub trait Module: Send + Sync {
    fn name(&self) -> &str {
        type_name::<Self>()
    }

    fn configure(&self, injector: &Injector) -> anyhow::Result<()>;
}

#[derive(Default)]
pub struct Injector {
    bindings: RwLock<HashMap<TypeId, (&'static str, Binding)>>,
}

impl fmt::Debug for Injector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let bindings = self.bindings.read();
        let mut names: Vec<&str> = bindings.values().map(|(name, _)| *name).collect();
        names.sort_unstable();
        f.debug_struct("Injector").field("bindings", &names).finish()
    }
}

impl Injector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds an injector and installs `modules` in order.
    pub fn from_modules(modules: &[Arc<dyn Module>]) -> anyhow::Result<Self> {
        let injector: Injector = Injector::new();
        for module in modules {
            injector.install(module.as_ref())?;
        }
        Ok(injector)
    }

    pub fn install(&self, module: &dyn Module) -> anyhow::Result<()> {
        debug!(module = module.name(), "Installing module");
        module.configure(self)
    }

    fn insert<T: 'static>(&self, binding: Binding) {
        let name: &'static str = type_name::<T>();
        if self.bindings.write().insert(TypeId::of::<T>(), (name, binding)).is_some() {
            debug!(binding = name, "Replaced existing binding");
        }
    }

    pub fn bind_instance<T: Send + Sync + 'static>(&self, value: T) {
        self.bind_arc(Arc::new(value));
    }

    pub fn bind_arc<T: Send + Sync + 'static>(&self, value: Arc<T>) {
        self.insert::<T>(Binding::Instance(value));
    }

    pub fn bind_provider<T, F>(&self, scope: Scope, provider: F)
    where
        T: Send + Sync + 'static,
        F: Fn(&Injector) -> anyhow::Result<T> + Send + Sync + 'static,
    {
        let provider: Provider = Arc::new(move |injector: &Injector| {
            provider(injector).map(|value| Arc::new(value) as Instance)
        });

        let binding: Binding = match scope {
            Scope::Singleton => Binding::Singleton { provider, cell: Arc::new(OnceCell::new()) },
            Scope::Transient => Binding::Transient(provider),
        };
        self.insert::<T>(binding);
    }

    pub fn bind_injectable<T: Injectable>(&self, scope: Scope) {
        self.bind_provider::<T, _>(scope, T::inject);
    }

    pub fn has_binding<T: 'static>(&self) -> bool {
        self.bindings.read().contains_key(&TypeId::of::<T>())
    }

    pub fn binding_count(&self) -> usize {
        self.bindings.read().len()
    }

    /// Resolves `T`. The lock is released before providers run so they can
    /// resolve their own dependencies.
    pub fn get<T: Send + Sync + 'static>(&self) -> Result<Arc<T>, InjectorError> {
        let name: &'static str = type_name::<T>();
        let binding: Binding = self
            .bindings
            .read()
            .get(&TypeId::of::<T>())
            .map(|(_, binding)| binding.clone())
            .ok_or(InjectorError::Unbound(name))?;

        let provider_error = |err: anyhow::Error| InjectorError::Provider {
            type_name: name,
            message: format!("{err:#}"),
        };

        let instance: Instance = match binding {
            Binding::Instance(instance) => instance,
            Binding::Singleton { provider, cell } => cell
                .get_or_try_init(|| provider(self))
                .map_err(provider_error)?
                .clone(),
            Binding::Transient(provider) => provider(self).map_err(provider_error)?,
        };

        instance.downcast::<T>().map_err(|_| InjectorError::TypeMismatch(name))
    }

    pub fn try_get<T: Send + Sync + 'static>(&self) -> Option<Arc<T>> {
        self.get::<T>().ok()
    }
}

// ---------------------------------------------------------------------------
// Extractor
// ---------------------------------------------------------------------------

/// Handler argument resolved from the application injector.
pub struct Inject<T>(pub Arc<T>);

impl<T> Deref for Inject<T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl<T> FromRequestParts<AppState> for Inject<T>
where
    T: Send + Sync + 'static,
{
    type Rejection = ApiError;

    async fn from_request_parts(_parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        state.injector.get::<T>().map(Inject).map_err(ApiError::from)
    }
}


// End of file: /src/core/injector.rs
