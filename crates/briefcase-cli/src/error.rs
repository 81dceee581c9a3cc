use std::io;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Core(#[from] briefcase_core::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
    #[error(
        "Server is not configured. Pass --server, --username and --password, or set BRIEFCASE_SERVER_URL, BRIEFCASE_USERNAME and BRIEFCASE_PASSWORD."
    )]
    NotConfigured,
    #[error("Username is not configured. Pass --username or set BRIEFCASE_USERNAME.")]
    UsernameRequired,
}

impl CliError {
    /// Process exit code for this error.
    pub const fn exit_code(&self) -> i32 {
        match self {
            Self::Core(briefcase_core::Error::Cancelled) => 130,
            _ => 1,
        }
    }
}
