use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(name = "briefcase")]
#[command(about = "Pull and push forms and submissions against an Aggregate server")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    #[command(flatten)]
    pub connection: ConnectionArgs,

    /// Optional path to the local record database
    #[arg(long, global = true, value_name = "PATH")]
    pub db_path: Option<PathBuf>,
}

/// Overrides for the `BRIEFCASE_*` environment variables.
#[derive(Args, Debug, Clone, Default)]
pub struct ConnectionArgs {
    /// Aggregate server base URL
    #[arg(long, global = true, value_name = "URL")]
    pub server: Option<String>,

    /// Account username
    #[arg(long, global = true, value_name = "NAME")]
    pub username: Option<String>,

    /// Account password
    #[arg(long, global = true, value_name = "PASSWORD")]
    pub password: Option<String>,

    /// Directory holding the local mirrors
    #[arg(long, global = true, value_name = "PATH")]
    pub storage_root: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Download forms, media and optionally submissions into the mirror
    Pull {
        /// Also walk and download each form's submissions
        #[arg(long)]
        instances: bool,
    },
    /// Ingest the mirror into the local record database
    Push,
    /// List forms held by the record database
    Forms {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// List operational reports recorded during push
    Reports {
        /// Number of reports to show
        #[arg(short, long, default_value = "20")]
        limit: usize,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}
