use std::path::Path;
use std::sync::Arc;

use briefcase_core::db::SqliteRecordStore;
use briefcase_core::mirror::MirrorLayout;
use briefcase_core::storage::LocalBlobStore;
use briefcase_core::sync::MirrorPusher;
use briefcase_core::{CancelToken, PushReport};

use crate::commands::common::{format_push_summary, open_record_database, PushTarget};
use crate::error::CliError;

pub async fn run_push(
    target: &PushTarget,
    db_path: &Path,
    cancel: CancelToken,
) -> Result<(), CliError> {
    let report = push_mirror(target, db_path, cancel).await?;
    for line in format_push_summary(&report) {
        println!("{line}");
    }
    Ok(())
}

/// Ingest the local mirror of `target`'s account into the database at
/// `db_path`.
pub async fn push_mirror(
    target: &PushTarget,
    db_path: &Path,
    cancel: CancelToken,
) -> Result<PushReport, CliError> {
    let db = open_record_database(db_path)?;
    let store = SqliteRecordStore::new(db.connection());
    let layout = MirrorLayout::for_user(&target.username)?;
    let blobs = LocalBlobStore::new(target.storage_root.clone());
    let pusher = MirrorPusher::new(Arc::new(blobs), layout).with_cancel_token(cancel);

    Ok(pusher.push(&store, &target.username).await?)
}
