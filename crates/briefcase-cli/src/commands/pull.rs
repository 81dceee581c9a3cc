use std::sync::Arc;

use briefcase_core::storage::LocalBlobStore;
use briefcase_core::transport::HttpTransport;
use briefcase_core::{CancelToken, SyncClient, SyncConfig};

use crate::commands::common::format_pull_summary;
use crate::error::CliError;

pub async fn run_pull(
    config: &SyncConfig,
    include_instances: bool,
    cancel: CancelToken,
) -> Result<(), CliError> {
    let transport = HttpTransport::new(Some(config.credentials.clone()), config.request_timeout)?;
    let blobs = LocalBlobStore::new(config.storage_root.clone());
    let client = SyncClient::from_config(config, Arc::new(transport), Arc::new(blobs))?
        .with_cancel_token(cancel);

    let report = client.pull(include_instances).await?;
    for line in format_pull_summary(&report) {
        println!("{line}");
    }
    Ok(())
}
