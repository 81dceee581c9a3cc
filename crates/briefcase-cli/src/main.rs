//! Briefcase CLI - pull an Aggregate server into a local mirror and push the
//! mirror into a local record database.

mod cli;
mod commands;
mod error;


use briefcase_core::CancelToken;
use clap::Parser;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::EnvFilter;

use crate::cli::{Cli, Commands};
use crate::commands::common::{resolve_db_path, resolve_push_target, resolve_sync_config};
use crate::commands::forms::run_forms;
use crate::commands::pull::run_pull;
use crate::commands::push::run_push;
use crate::commands::reports::run_reports;
use crate::error::CliError;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        eprintln!("Error: {error}");
        std::process::exit(error.exit_code());
    }
}

async fn run() -> Result<(), CliError> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive(
                "briefcase=info"
                    .parse()
                    .unwrap_or_else(|_| LevelFilter::INFO.into()),
            ),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let db_path = resolve_db_path(cli.db_path);

    match cli.command {
        Commands::Pull { instances } => {
            let config = resolve_sync_config(&cli.connection)?;
            run_pull(&config, instances, interrupt_token()).await?;
        }
        Commands::Push => {
            let target = resolve_push_target(&cli.connection)?;
            run_push(&target, &db_path, interrupt_token()).await?;
        }
        Commands::Forms { json } => run_forms(json, &db_path)?,
        Commands::Reports { limit, json } => run_reports(limit, json, &db_path)?,
    }

    Ok(())
}

/// Token cancelled by the first Ctrl+C. A second one exits immediately.
fn interrupt_token() -> CancelToken {
    let token = CancelToken::new();
    let cancel = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_err() {
            return;
        }
        tracing::warn!("Interrupt received, stopping after the current operation");
        cancel.cancel();

        if tokio::signal::ctrl_c().await.is_ok() {
            std::process::exit(130);
        }
    });
    token
}
