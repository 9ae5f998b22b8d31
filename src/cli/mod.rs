// Start of file: /src/cli/mod.rs

/*
    * Command line interface: `new`, `generate` and `serve`.
*/

pub mod scaffold;
pub mod utils;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;

use crate::app::demo_service;
use crate::config::settings::ConfigSource;
use crate::core::api_service::{ApiService, StartOptions};
use crate::core::logging::init_tracing;

use scaffold::ComponentKind;

#[derive(Parser, Debug)]
#[command(name = "fautil", version, about = "Scaffold and run fautil services", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Create a new project
    New {
        /// Project name
        name: String,

        /// Directory the project is created in
        #[arg(long, default_value = ".")]
        dir: PathBuf,
    },

    /// Generate components inside the current project
    Generate {
        /// Component type
        #[arg(long = "type", value_enum, default_value = "all")]
        kind: ComponentKind,

        /// Component name
        name: String,
    },

    /// Run the demo service
    Serve {
        /// Configuration file or directory
        #[arg(short, long, env = "FAUTIL_CONFIG")]
        config: Option<PathBuf>,

        #[arg(long)]
        host: Option<String>,

        #[arg(short, long)]
        port: Option<u16>,
    },
}

pub async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::New { name, dir } => {
            init_tracing();
            let root: PathBuf = scaffold::create_project(&name, &dir)?;
            println!("Project {name} created at {}", root.display());
            println!("Start it with:\n  cd {}\n  cargo run", root.display());
        }
        Command::Generate { kind, name } => {
            init_tracing();
            let cwd: PathBuf = std::env::current_dir().context("Failed to read the current directory")?;
            for path in scaffold::generate(&cwd, kind, &name)? {
                println!("Generated {}", path.display());
            }
        }
        Command::Serve { config, host, port } => {
            let mut source: ConfigSource = ConfigSource::default();
            if let Some(path) = config {
                source = source.with_config_path(path);
            }

            let service: ApiService = demo_service(source).build().await?;
            info!(app = service.app_name(), "Serving demo application");
            service
                .start(StartOptions { host, port, ..StartOptions::default() })
                .await?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_generate_type() {
        let cli: Cli = Cli::parse_from(["fautil", "generate", "--type", "view", "orders"]);
        assert!(matches!(cli.command, Command::Generate { kind: ComponentKind::View, ref name } if name == "orders"));

        let cli: Cli = Cli::parse_from(["fautil", "generate", "orders"]);
        assert!(matches!(cli.command, Command::Generate { kind: ComponentKind::All, .. }));
    }

    #[test]
    fn parses_serve_overrides() {
        let cli: Cli = Cli::parse_from(["fautil", "serve", "--port", "9000", "--host", "0.0.0.0"]);
        match cli.command {
            Command::Serve { host, port, .. } => {
                assert_eq!(host.as_deref(), Some("0.0.0.0"));
                assert_eq!(port, Some(9000));
            }
            other => panic!("unexpected command {other:?}"),
        }
    }
}

// End of file: /src/cli/mod.rs
