//! BoardKit command-line entry point.

use anyhow::Context;
use boardkit_app::catalog::builtin_registry;
use boardkit_app::cli::Cli;
use boardkit_app::commands::Shell;
use boardkit_app::fixtures::FixtureFetch;
use boardkit_core::{EngineConfig, FetchCapability, FileStorage};
use clap::Parser;
use std::sync::Arc;

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    let mut config = EngineConfig::load_or_default(&cli.config)
        .with_context(|| format!("loading {}", cli.config.display()))?;
    if let Some(dir) = cli.data_dir.clone() {
        config.storage.directory = Some(dir);
    }

    let storage = match &config.storage.directory {
        Some(dir) => FileStorage::new(dir.clone()),
        None => FileStorage::default_location(),
    }
    .context("opening board storage")?;

    let fetch: Arc<dyn FetchCapability> = match &cli.fixtures {
        Some(path) => Arc::new(FixtureFetch::from_file(path)?),
        None => Arc::new(FixtureFetch::empty()),
    };

    let registry = builtin_registry();
    for diagnostic in registry.diagnostics().iter() {
        diagnostic.log();
    }
    log::debug!("Catalog has {} component types", registry.len());

    let mut shell = Shell::new(config, Arc::new(registry), storage, fetch, cli.format);
    let mut stdout = std::io::stdout().lock();
    shell.run(cli.command, &mut stdout).await
}
