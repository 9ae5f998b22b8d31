// Start of file: src/main.rs

use clap::Parser;

use fautil::cli::{run, Cli};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli: Cli = Cli::parse();
    run(cli).await
}

// End of file: src/main.rs
