use std::path::Path;

use anyhow::{Context, Result, bail};
use chrono::Utc;
use clap::{CommandFactory, Parser};
use ct_core::RunOptions;
use tracing_subscriber::EnvFilter;

use ct_cli::commands::{add, run, status};
use ct_cli::{Backend, Cli, Commands, Config, Store};

/// Load config and open the configured record store.
fn open_store(config_path: Option<&Path>) -> Result<(Store, Config)> {
    let config = Config::load_from(config_path).context("failed to load configuration")?;
    tracing::debug!(?config, "loaded configuration");
    config
        .engine
        .validate()
        .context("invalid engine configuration")?;

    let store = Store::open(&config)?;
    Ok((store, config))
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing with verbose flag support
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::from_default_env()
    };
    // Use try_init to avoid panic if tracing is already initialized (e.g., in tests)
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();

    let mut stdout = std::io::stdout().lock();
    match &cli.command {
        Some(Commands::Run {
            reason,
            full,
            dry_run,
            json,
        }) => {
            let (store, config) = open_store(cli.config.as_deref())?;
            let options = RunOptions {
                force_full: *full,
                dry_run: *dry_run,
            };
            run::run(
                &mut stdout,
                &store,
                &config.engine,
                reason.as_deref(),
                Utc::now(),
                options,
                *json,
            )?;
        }
        Some(Commands::Status) => {
            let (store, config) = open_store(cli.config.as_deref())?;
            let location = match config.backend {
                Backend::Sqlite => format!("sqlite ({})", config.database_path.display()),
                Backend::Notion => format!(
                    "notion ({})",
                    config.notion.database_id.as_deref().unwrap_or_default()
                ),
            };
            status::run(&mut stdout, &store, &config.engine, &location, Utc::now())?;
        }
        Some(Commands::Add { kind, date }) => {
            let (store, config) = open_store(cli.config.as_deref())?;
            let Some(db) = store.database() else {
                bail!("`ct add` only works with the sqlite backend; edit Notion records in Notion");
            };
            add::run(&mut stdout, db, &config.engine, *kind, *date, Utc::now())?;
        }
        None => {
            Cli::command().print_help()?;
        }
    }

    Ok(())
}
