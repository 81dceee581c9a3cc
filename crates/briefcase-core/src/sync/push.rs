//! Push of the local mirror into a record store.

use std::path::Path;
use std::sync::Arc;

use super::{CancelToken, PushReport, PushedDirectory, SyncClient};
use crate::db::RecordStore;
use crate::mirror::{
    ensure_segment, form_file_name, MirrorLayout, INSTANCES_DIR, SUBMISSION_FILE,
};
use crate::models::{Attachment, FormUpload};
use crate::storage::{BlobStore, DirListing};
use crate::xml::parse_submission_envelope;
use crate::Result;

/// Pushes a local mirror into a record store without any server access.
pub struct MirrorPusher {
    blobs: Arc<dyn BlobStore>,
    layout: MirrorLayout,
    cancel: CancelToken,
}

impl SyncClient {
    /// Ingest the mirror into `store`. See [`MirrorPusher::push`].
    pub async fn push(&self, store: &dyn RecordStore, owner: &str) -> Result<PushReport> {
        self.pusher().push(store, owner).await
    }

    /// Pusher sharing this client's blob store, layout and cancel token.
    pub fn pusher(&self) -> MirrorPusher {
        MirrorPusher::new(self.blobs.clone(), self.layout.clone())
            .with_cancel_token(self.cancel.clone())
    }
}

impl MirrorPusher {
    pub fn new(blobs: Arc<dyn BlobStore>, layout: MirrorLayout) -> Self {
        Self {
            blobs,
            layout,
            cancel: CancelToken::new(),
        }
    }

    #[must_use]
    pub fn with_cancel_token(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Ingest every mirrored form definition and instance into `store`.
    ///
    /// A form or instance that fails to ingest is recorded and skipped.
    pub async fn push(&self, store: &dyn RecordStore, owner: &str) -> Result<PushReport> {
        let mut report = PushReport::default();
        let root = self.layout.root();
        let listing = self.blobs.list_dir(root).await?;

        for dir_name in &listing.dirs {
            self.cancel.check()?;
            let form_dir = root.join(dir_name);
            let contents = match self.blobs.list_dir(&form_dir).await {
                Ok(contents) => contents,
                Err(error) => {
                    tracing::warn!("Cannot list {}: {error}", form_dir.display());
                    report.fail(form_dir.display().to_string(), error);
                    continue;
                }
            };

            let definition = form_file_name(dir_name);
            if contents.has_file(&definition) {
                self.push_form(store, &form_dir.join(&definition), &definition, &mut report)
                    .await;
            }

            if contents.has_dir(INSTANCES_DIR) {
                let instances = self
                    .push_instances(store, owner, &form_dir.join(INSTANCES_DIR), &mut report)
                    .await?;
                tracing::info!("Pushed {instances} instances from {dir_name}");
                report.directories.push(PushedDirectory {
                    form_dir: dir_name.clone(),
                    instances,
                });
            }
        }

        tracing::info!(
            "Push finished: {} forms, {} instances, {} failures",
            report.forms_pushed,
            report.instances_pushed(),
            report.failures.len()
        );
        Ok(report)
    }

    async fn push_form(
        &self,
        store: &dyn RecordStore,
        path: &Path,
        file_name: &str,
        report: &mut PushReport,
    ) {
        let result = match self.blobs.read(path).await {
            Ok(xml) => store.ingest_form(FormUpload {
                file_name: file_name.to_string(),
                xml,
            }),
            Err(error) => Err(error),
        };
        match result {
            Ok(form) => {
                tracing::info!("Published form {}", form.id_string);
                report.forms_pushed += 1;
            }
            Err(error) => {
                tracing::warn!("Form {} not published: {error}", path.display());
                report.fail(path.display().to_string(), error);
            }
        }
    }

    /// Returns the number of instances ingested from `instances_dir`.
    async fn push_instances(
        &self,
        store: &dyn RecordStore,
        owner: &str,
        instances_dir: &Path,
        report: &mut PushReport,
    ) -> Result<usize> {
        let listing = match self.blobs.list_dir(instances_dir).await {
            Ok(listing) => listing,
            Err(error) => {
                report.fail(instances_dir.display().to_string(), error);
                return Ok(0);
            }
        };

        let mut ingested = 0;
        for name in &listing.dirs {
            self.cancel.check()?;
            let instance_dir = instances_dir.join(name);
            let files = match self.blobs.list_dir(&instance_dir).await {
                Ok(files) if files.has_file(SUBMISSION_FILE) => files,
                Ok(_) => continue,
                Err(error) => {
                    report.fail(instance_dir.display().to_string(), error);
                    continue;
                }
            };

            match self.push_instance(store, owner, &instance_dir, &files).await {
                Ok(()) => ingested += 1,
                Err(error) => {
                    tracing::warn!("Instance {} not ingested: {error}", instance_dir.display());
                    report.fail(instance_dir.display().to_string(), error);
                }
            }
        }
        Ok(ingested)
    }

    async fn push_instance(
        &self,
        store: &dyn RecordStore,
        owner: &str,
        instance_dir: &Path,
        files: &DirListing,
    ) -> Result<()> {
        let document = self.blobs.read(&instance_dir.join(SUBMISSION_FILE)).await?;
        let envelope = parse_submission_envelope(&document)?;

        let mut attachments = Vec::new();
        for file_name in &envelope.media_files {
            if ensure_segment(file_name).is_err() || !files.has_file(file_name) {
                tracing::debug!("Attachment {file_name} not present in {}", instance_dir.display());
                continue;
            }
            let bytes = self.blobs.read(&instance_dir.join(file_name)).await?;
            attachments.push(Attachment::from_file(file_name.as_str(), bytes));
        }

        let instance = store.ingest_instance(owner, envelope.payload.as_bytes(), &attachments)?;
        tracing::debug!(
            "Ingested {} as instance {} with {} attachments",
            instance_dir.display(),
            instance.id,
            attachments.len()
        );
        Ok(())
    }
}
