// Start of file: /src/core/discovery.rs

// * Component discovery.
// * A package is a named registration function listing its views, services
// * and modules; discovering it collects those and binds them.

use std::{
    any::{type_name, TypeId},
    collections::{HashMap, HashSet},
    sync::Arc,
};

use anyhow::{anyhow, Result};
use parking_lot::RwLock;
use tracing::{debug, info, warn};

use crate::api::view::{ApiView, ViewRegistration};
use crate::core::injector::{Injectable, Injector, Module, Scope};

#[derive(Clone, Copy)]
pub struct ServiceRegistration {
    pub name: &'static str,
    pub type_id: TypeId,
    bind: fn(&Injector),
}

fn bind_service<S: Injectable>(injector: &Injector) {
    if !injector.has_binding::<S>() {
        injector.bind_injectable::<S>(Scope::Singleton);
    }
}

impl ServiceRegistration {
    pub fn of<S: Injectable>() -> Self {
        Self {
            name: type_name::<S>(),
            type_id: TypeId::of::<S>(),
            bind: bind_service::<S>,
        }
    }

    pub fn bind(&self, injector: &Injector) {
        (self.bind)(injector);
    }
}

/// Collects the components of one package.
#[derive(Default)]
pub struct PackageScanner {
    components: DiscoveredComponents,
}

impl PackageScanner {
    pub fn view<V: ApiView>(&mut self) -> &mut Self {
        self.components.add_view(ViewRegistration::of::<V>());
        self
    }

    pub fn service<S: Injectable>(&mut self) -> &mut Self {
        self.components.add_service(ServiceRegistration::of::<S>());
        self
    }

    pub fn module(&mut self, module: impl Module + 'static) -> &mut Self {
        self.components.modules.push(Arc::new(module));
        self
    }
}

/// Views, services and modules found so far; views and services are unique by type.
#[derive(Default, Clone)]
pub struct DiscoveredComponents {
    pub views: Vec<ViewRegistration>,
    pub services: Vec<ServiceRegistration>,
    pub modules: Vec<Arc<dyn Module>>,
}

impl DiscoveredComponents {
    fn add_view(&mut self, view: ViewRegistration) {
        if !self.views.iter().any(|known| known.type_id == view.type_id) {
            self.views.push(view);
        }
    }

    fn add_service(&mut self, service: ServiceRegistration) {
        if !self.services.iter().any(|known| known.type_id == service.type_id) {
            self.services.push(service);
        }
    }

    pub fn merge(&mut self, other: DiscoveredComponents) {
        other.views.into_iter().for_each(|view| self.add_view(view));
        other.services.into_iter().for_each(|service| self.add_service(service));
        self.modules.extend(other.modules);
    }

    pub fn is_empty(&self) -> bool {
        self.views.is_empty() && self.services.is_empty() && self.modules.is_empty()
    }
}

type PackageFn = Arc<dyn Fn(&mut PackageScanner) + Send + Sync>;

#[derive(Default)]
pub struct DiscoveryManager {
    packages: RwLock<HashMap<String, PackageFn>>,
    scanned: RwLock<HashSet<String>>,
}

impl DiscoveryManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_package<F>(&self, name: impl Into<String>, register: F)
    where
        F: Fn(&mut PackageScanner) + Send + Sync + 'static,
    {
        let name: String = name.into();
        debug!(package = %name, "Registered package");
        self.packages.write().insert(name, Arc::new(register));
    }

    pub fn package_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.packages.read().keys().cloned().collect();
        names.sort();
        names
    }

    pub fn is_scanned(&self, package: &str) -> bool {
        self.scanned.read().contains(package)
    }

    pub fn discover(&self, package: &str) -> Result<DiscoveredComponents> {
        let register: PackageFn = self
            .packages
            .read()
            .get(package)
            .cloned()
            .ok_or_else(|| anyhow!("package '{package}' is not registered"))?;

        let mut scanner: PackageScanner = PackageScanner::default();
        register(&mut scanner);
        self.scanned.write().insert(package.to_string());

        let found: DiscoveredComponents = scanner.components;
        info!(
            package,
            views = found.views.len(),
            services = found.services.len(),
            modules = found.modules.len(),
            "Discovered components"
        );
        Ok(found)
    }

    /// Unknown packages are logged and skipped.
    pub fn discover_all(&self, packages: &[String]) -> DiscoveredComponents {
        let mut all: DiscoveredComponents = DiscoveredComponents::default();
        for package in packages {
            match self.discover(package) {
                Ok(found) => all.merge(found),
                Err(err) => warn!(package = %package, error = %err, "Package discovery failed"),
            }
        }
        all
    }

    /// Installs modules, then binds services and views that are not bound yet.
    pub fn register_components(&self, injector: &Injector, components: &DiscoveredComponents) -> Result<()> {
        for module in &components.modules {
            injector.install(module.as_ref())?;
        }
        for service in &components.services {
            service.bind(injector);
        }
        for view in &components.views {
            view.bind(injector);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{routing::get, Router};

    use crate::config::state::AppState;

    struct Clock;

    impl Injectable for Clock {
        fn inject(_: &Injector) -> Result<Self> {
            Ok(Clock)
        }
    }

    struct ClockView {
        _clock: Arc<Clock>,
    }

    impl Injectable for ClockView {
        fn inject(injector: &Injector) -> Result<Self> {
            Ok(Self { _clock: injector.get::<Clock>()? })
        }
    }

    impl ApiView for ClockView {
        const PATH: &'static str = "/clock";

        fn routes() -> Router<AppState> {
            Router::new().route("/", get(|| async { "tick" }))
        }
    }

    struct Settings(&'static str);

    struct SettingsModule;

    impl Module for SettingsModule {
        fn configure(&self, injector: &Injector) -> Result<()> {
            injector.bind_instance(Settings("from-module"));
            Ok(())
        }
    }

    #[test]
    fn discovers_and_binds_package_components() {
        let discovery: DiscoveryManager = DiscoveryManager::new();
        discovery.register_package("clock", |scan: &mut PackageScanner| {
            scan.service::<Clock>().view::<ClockView>().view::<ClockView>().module(SettingsModule);
        });

        let found: DiscoveredComponents =
            discovery.discover_all(&["clock".to_string(), "missing".to_string()]);
        assert_eq!(found.views.len(), 1);
        assert_eq!(found.views[0].path, "/clock");
        assert!(discovery.is_scanned("clock"));
        assert!(!discovery.is_scanned("missing"));

        let injector: Injector = Injector::new();
        discovery.register_components(&injector, &found).unwrap();
        assert!(injector.get::<ClockView>().is_ok());
        assert_eq!(injector.get::<Settings>().unwrap().0, "from-module");
    }

    #[test]
    fn unknown_package_is_an_error() {
        let discovery: DiscoveryManager = DiscoveryManager::new();
        assert!(discovery.discover("nope").is_err());
        assert!(discovery.package_names().is_empty());
    }
}

// End of file: /src/core/discovery.rs
