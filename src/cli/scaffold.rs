// Start of file: /src/cli/scaffold.rs

/*
    * Project scaffolding for `fautil new` and `fautil generate`.
    * Templates are plain strings with `{{placeholder}}` markers.
*/

use std::{
    fs,
    io,
    path::{Path, PathBuf},
};

use thiserror::Error;
use tracing::{debug, info};

use super::utils::{get_project_name, is_valid_module_name, snake_to_pascal, to_snake};

#[derive(Debug, Error)]
pub enum ScaffoldError {
    #[error("path already exists: {0}")]
    AlreadyExists(PathBuf),

    #[error("not a project directory (no Cargo.toml in {0})")]
    NotAProject(PathBuf),

    #[error("cannot determine the project name from {0}")]
    UnknownProjectName(PathBuf),

    #[error("invalid name '{0}': use letters, digits and underscores, starting with a letter")]
    InvalidName(String),

    #[error("failed to write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// What `generate` writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum ComponentKind {
    View,
    Service,
    All,
}

impl ComponentKind {
    fn includes_view(self) -> bool {
        matches!(self, ComponentKind::View | ComponentKind::All)
    }

    fn includes_service(self) -> bool {
        matches!(self, ComponentKind::Service | ComponentKind::All)
    }
}

// ============================================================================
// Templates
// ============================================================================

const CARGO_TOML: &str = r#"[package]
name = "{{name}}"
version = "0.1.0"
edition = "2021"

[dependencies]
fautil = "0.1"
anyhow = "1.0"
axum = "0.8"
serde = { version = "1.0", features = ["derive"] }
serde_json = "1.0"
tokio = { version = "1", features = ["full"] }
"#;

const MAIN_RS: &str = r#"mod services;
mod views;

use fautil::{ApiService, ConfigSource, StartOptions};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let service = ApiService::builder("{{name}}")
        .config(ConfigSource::default().with_config_path("config.yaml"))
        .register_view::<views::hello::HelloView>()
        .build()
        .await?;

    service.start(StartOptions::default()).await
}
"#;

const VIEWS_MOD_RS: &str = "pub mod hello;\n";

const SERVICES_MOD_RS: &str = "pub mod greeting;\n";

const CONFIG_YAML: &str = r#"app:
  title: "{{pascal}}"
  version: "0.1.0"
  host: "127.0.0.1"
  port: 8000
  debug: true

middleware:
  enable_request_logging: true
  enable_metrics: true

log:
  level: "INFO"
"#;

const ENV_FILE: &str = "# Values here override defaults; config.yaml overrides both\nFAUTIL_APP__DEBUG=true\n";

const GITIGNORE: &str = "/target\n.env\n*.log\n";

const README_MD: &str = r#"# {{pascal}}

Built on fautil.

```sh
cargo run
curl http://127.0.0.1:8000/hello
```

Add components with `fautil generate --type view <name>`.
"#;

const VIEW_RS: &str = r#"use axum::{routing::get, Json, Router};
use fautil::{ApiView, AppState, Inject, Injectable, Injector};
use serde_json::{json, Value};

pub struct {{pascal}}View;

impl Injectable for {{pascal}}View {
    fn inject(_injector: &Injector) -> anyhow::Result<Self> {
        Ok(Self)
    }
}

impl ApiView for {{pascal}}View {
    const PATH: &'static str = "/{{name}}";

    fn routes() -> Router<AppState> {
        Router::new().route("/", get(index))
    }
}

async fn index(Inject(_view): Inject<{{pascal}}View>) -> Json<Value> {
    Json(json!({ "view": "{{name}}" }))
}
"#;

const SERVICE_RS: &str = r#"use fautil::{Injectable, Injector};

#[derive(Debug, Default)]
pub struct {{pascal}}Service;

impl Injectable for {{pascal}}Service {
    fn inject(_injector: &Injector) -> anyhow::Result<Self> {
        Ok(Self)
    }
}

impl {{pascal}}Service {
    pub fn name(&self) -> &'static str {
        "{{name}}"
    }
}
"#;

fn render(template: &str, name: &str) -> String {
    template
        .replace("{{pascal}}", &snake_to_pascal(name))
        .replace("{{name}}", name)
}

// ============================================================================
// File helpers
// ============================================================================

fn io_error(path: &Path) -> impl FnOnce(io::Error) -> ScaffoldError + '_ {
    move |source: io::Error| ScaffoldError::Io { path: path.to_path_buf(), source }
}

/// Writes a new file, creating parent directories. Never overwrites.
fn write_new(path: &Path, contents: &str) -> Result<(), ScaffoldError> {
    if path.exists() {
        return Err(ScaffoldError::AlreadyExists(path.to_path_buf()));
    }
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(io_error(parent))?;
    }
    fs::write(path, contents).map_err(io_error(path))?;
    debug!(path = %path.display(), "Created file");
    Ok(())
}

/// Appends `pub mod <module>;` to `mod.rs` unless it is already declared.
fn register_module(mod_file: &Path, module: &str) -> Result<(), ScaffoldError> {
    let line: String = format!("pub mod {module};");
    let mut contents: String = match fs::read_to_string(mod_file) {
        Ok(contents) => contents,
        Err(err) if err.kind() == io::ErrorKind::NotFound => String::new(),
        Err(err) => return Err(io_error(mod_file)(err)),
    };

    if contents.lines().any(|existing| existing.trim() == line) {
        return Ok(());
    }
    if !contents.is_empty() && !contents.ends_with('\n') {
        contents.push('\n');
    }
    contents.push_str(&line);
    contents.push('\n');

    fs::write(mod_file, contents).map_err(io_error(mod_file))
}

fn normalize_name(name: &str) -> Result<String, ScaffoldError> {
    let snake: String = to_snake(name);
    if !is_valid_module_name(&snake) {
        return Err(ScaffoldError::InvalidName(name.to_string()));
    }
    Ok(snake)
}

// ============================================================================
// Commands
// ============================================================================

/// Creates `<dir>/<name>` with a runnable project. Fails if it exists.
pub fn create_project(name: &str, dir: &Path) -> Result<PathBuf, ScaffoldError> {
    let crate_name: String = normalize_name(name)?;
    let root: PathBuf = dir.join(name);
    if root.exists() {
        return Err(ScaffoldError::AlreadyExists(root));
    }

    let files: [(PathBuf, String); 10] = [
        (root.join("Cargo.toml"), render(CARGO_TOML, &crate_name)),
        (root.join("src/main.rs"), render(MAIN_RS, &crate_name)),
        (root.join("src/views/mod.rs"), VIEWS_MOD_RS.to_string()),
        (root.join("src/views/hello.rs"), render(VIEW_RS, "hello")),
        (root.join("src/services/mod.rs"), SERVICES_MOD_RS.to_string()),
        (root.join("src/services/greeting.rs"), render(SERVICE_RS, "greeting")),
        (root.join("config.yaml"), render(CONFIG_YAML, &crate_name)),
        (root.join(".env"), ENV_FILE.to_string()),
        (root.join(".gitignore"), GITIGNORE.to_string()),
        (root.join("README.md"), render(README_MD, &crate_name)),
    ];

    for (path, contents) in &files {
        write_new(path, contents)?;
    }

    info!(project = %crate_name, path = %root.display(), "Project created");
    Ok(root)
}

pub fn generate_view(project_dir: &Path, name: &str) -> Result<PathBuf, ScaffoldError> {
    let module: String = normalize_name(name)?;
    let path: PathBuf = project_dir.join("src/views").join(format!("{module}.rs"));
    write_new(&path, &render(VIEW_RS, &module))?;
    register_module(&project_dir.join("src/views/mod.rs"), &module)?;
    Ok(path)
}

pub fn generate_service(project_dir: &Path, name: &str) -> Result<PathBuf, ScaffoldError> {
    let module: String = normalize_name(name)?;
    let path: PathBuf = project_dir.join("src/services").join(format!("{module}.rs"));
    write_new(&path, &render(SERVICE_RS, &module))?;
    register_module(&project_dir.join("src/services/mod.rs"), &module)?;
    Ok(path)
}

/// Generates components inside an existing project. Nothing is written when
/// any target file already exists.
pub fn generate(project_dir: &Path, kind: ComponentKind, name: &str) -> Result<Vec<PathBuf>, ScaffoldError> {
    if !project_dir.join("Cargo.toml").is_file() {
        return Err(ScaffoldError::NotAProject(project_dir.to_path_buf()));
    }
    let project: String =
        get_project_name(project_dir).ok_or_else(|| ScaffoldError::UnknownProjectName(project_dir.to_path_buf()))?;
    let module: String = normalize_name(name)?;

    let targets: [(bool, PathBuf); 2] = [
        (kind.includes_view(), project_dir.join("src/views").join(format!("{module}.rs"))),
        (kind.includes_service(), project_dir.join("src/services").join(format!("{module}.rs"))),
    ];
    if let Some((_, existing)) = targets.iter().find(|(wanted, path)| *wanted && path.exists()) {
        return Err(ScaffoldError::AlreadyExists(existing.clone()));
    }

    let mut written: Vec<PathBuf> = Vec::new();
    if kind.includes_view() {
        written.push(generate_view(project_dir, &module)?);
    }
    if kind.includes_service() {
        written.push(generate_service(project_dir, &module)?);
    }

    info!(project = %project, component = %module, ?kind, "Components generated");
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn creates_project_layout() {
        let dir = tempfile::tempdir().unwrap();
        let root: PathBuf = create_project("shop-api", dir.path()).unwrap();

        for file in ["Cargo.toml", "src/main.rs", "src/views/hello.rs", "src/services/greeting.rs", "config.yaml", ".env"] {
            assert!(root.join(file).is_file(), "missing {file}");
        }
        let manifest: String = fs::read_to_string(root.join("Cargo.toml")).unwrap();
        assert!(manifest.contains("name = \"shop_api\""));
        let view: String = fs::read_to_string(root.join("src/views/hello.rs")).unwrap();
        assert!(view.contains("pub struct HelloView;"));
        assert!(view.contains("const PATH: &'static str = \"/hello\";"));

        assert!(matches!(create_project("shop-api", dir.path()), Err(ScaffoldError::AlreadyExists(_))));
    }

    #[test]
    fn generates_and_registers_components() {
        let dir = tempfile::tempdir().unwrap();
        let root: PathBuf = create_project("shop", dir.path()).unwrap();

        let written: Vec<PathBuf> = generate(&root, ComponentKind::All, "OrderItem").unwrap();
        assert_eq!(written.len(), 2);

        let views_mod: String = fs::read_to_string(root.join("src/views/mod.rs")).unwrap();
        assert_eq!(views_mod, "pub mod hello;\npub mod order_item;\n");
        let service: String = fs::read_to_string(root.join("src/services/order_item.rs")).unwrap();
        assert!(service.contains("pub struct OrderItemService;"));

        assert!(matches!(
            generate(&root, ComponentKind::View, "order_item"),
            Err(ScaffoldError::AlreadyExists(_))
        ));
    }

    #[test]
    fn generate_requires_a_project() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            generate(dir.path(), ComponentKind::View, "orders"),
            Err(ScaffoldError::NotAProject(_))
        ));
    }

    #[test]
    fn rejects_invalid_names() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(create_project("9lives", dir.path()), Err(ScaffoldError::InvalidName(_))));
    }
}

// End of file: /src/cli/scaffold.rs
