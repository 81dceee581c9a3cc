//! Form catalog pull.

use super::{Mirrored, SyncClient, SyncReport, INITIAL_CURSOR};
use crate::models::RemoteFormRef;
use crate::transport::TransportRequest;
use crate::xml::{parse_form_list, parse_manifest};
use crate::{Error, Result};

impl SyncClient {
    /// Mirror every listed form, its media and optionally its instances.
    ///
    /// Fails only when the form list itself cannot be fetched or parsed, when
    /// a submission listing is unreachable, or on cancellation.
    pub async fn pull(&self, include_instances: bool) -> Result<SyncReport> {
        let mut report = SyncReport::default();

        let url = self.endpoints.form_list();
        let response = self.transport.send(TransportRequest::get(&url)).await?;
        if !response.is_success() {
            return Err(Error::Transport(format!(
                "form list {url} answered {}",
                response.status
            )));
        }
        let forms = parse_form_list(&response.body)?;
        report.forms_listed = forms.len();
        tracing::info!("Server lists {} forms", forms.len());

        for form in &forms {
            self.cancel.check()?;
            if form.is_excluded(&self.excluded_prefix) {
                tracing::debug!("Skipping excluded form {} ({})", form.id_string, form.name);
                report.forms_excluded += 1;
                continue;
            }
            self.pull_form(form, include_instances, &mut report).await?;
        }

        tracing::info!(
            "Pull finished: {} forms downloaded, {} cached, {} media files, {} instances, {} failures",
            report.forms_downloaded,
            report.forms_cached,
            report.media_downloaded,
            report.instances_downloaded,
            report.failures.len()
        );
        Ok(report)
    }

    async fn pull_form(
        &self,
        form: &RemoteFormRef,
        include_instances: bool,
        report: &mut SyncReport,
    ) -> Result<()> {
        let id = form.id_string.as_str();
        let (form_file, media_dir) = match self
            .layout
            .form_file(id)
            .and_then(|file| Ok((file, self.layout.form_media_dir(id)?)))
        {
            Ok(paths) => paths,
            Err(error) => {
                tracing::warn!("Skipping form: {error}");
                report.fail(id, error);
                return Ok(());
            }
        };

        match self
            .mirror_document(&form_file, &TransportRequest::get(&form.download_url))
            .await
        {
            Ok(Mirrored::Downloaded(_)) => {
                tracing::info!("Downloaded form {id}");
                report.forms_downloaded += 1;
            }
            Ok(Mirrored::Cached(_)) => {
                tracing::debug!("Form {id} already mirrored");
                report.forms_cached += 1;
            }
            Err(error) => {
                tracing::error!("Could not mirror form {id}: {error}");
                report.fail(id, error);
                return Ok(());
            }
        }

        if let Some(manifest_url) = &form.manifest_url {
            let Some(manifest) = self
                .fetch_with_retry(&TransportRequest::get(manifest_url))
                .await
            else {
                tracing::error!("Could not fetch manifest of form {id}, skipping its media and instances");
                report.manifests_skipped += 1;
                report.fail(id, format!("manifest {manifest_url} unavailable"));
                return Ok(());
            };

            match parse_manifest(&manifest) {
                Ok(entries) => self.sync_media(&entries, &media_dir, report).await?,
                Err(error) => {
                    tracing::warn!("Malformed manifest for form {id}, skipping its media and instances: {error}");
                    report.manifests_skipped += 1;
                    report.fail(id, error);
                    return Ok(());
                }
            }
        }

        if include_instances {
            self.pull_instances(id, INITIAL_CURSOR, self.page_size, report)
                .await?;
        }
        Ok(())
    }
}
