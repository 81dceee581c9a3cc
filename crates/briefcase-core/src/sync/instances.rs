//! Submission walk for one form.

use std::collections::HashSet;

use super::{Mirrored, SyncClient, SyncReport};
use crate::transport::TransportRequest;
use crate::xml::{parse_manifest, parse_submission_list};
use crate::{Error, Result};

/// Cursor a fresh walk starts from.
pub const INITIAL_CURSOR: &str = "0";

/// `formId` expression selecting one submission of a form.
pub fn submission_query(form_id: &str, submission_id: &str) -> String {
    format!("{form_id}[@version=null and @uiVersion=null]/{form_id}[@key={submission_id}]")
}

impl SyncClient {
    /// Walk the submission list of `form_id` from `start_cursor`.
    ///
    /// The walk ends when the server returns no cursor, the cursor it was
    /// sent, or a cursor already visited. Cursors compare as exact strings.
    pub async fn pull_instances(
        &self,
        form_id: &str,
        start_cursor: &str,
        page_size: u32,
        report: &mut SyncReport,
    ) -> Result<()> {
        let url = self.endpoints.submission_list();
        let mut cursor = start_cursor.to_string();
        let mut visited = HashSet::from([cursor.clone()]);

        loop {
            self.cancel.check()?;
            let request = TransportRequest::get(&url)
                .query("formId", form_id)
                .query("numEntries", page_size)
                .query("cursor", &cursor);
            let response = self.transport.send(request).await?;
            if !response.is_success() {
                return Err(Error::Transport(format!(
                    "submission list for {form_id} answered {}",
                    response.status
                )));
            }
            report.submission_pages += 1;

            let page = match parse_submission_list(&response.body) {
                Ok(page) => page,
                Err(error) => {
                    tracing::warn!("Malformed submission list for {form_id}, ending walk: {error}");
                    report.fail(format!("{form_id} cursor {cursor}"), error);
                    return Ok(());
                }
            };
            tracing::debug!("Form {form_id}: {} submissions at cursor {cursor}", page.ids.len());

            for submission_id in &page.ids {
                self.cancel.check()?;
                self.pull_instance(form_id, submission_id, report).await?;
            }

            match page.cursor {
                Some(next) if next != cursor => {
                    if !visited.insert(next.clone()) {
                        tracing::warn!("Form {form_id}: cursor {next} seen before, ending walk");
                        break;
                    }
                    cursor = next;
                }
                _ => break,
            }
        }
        Ok(())
    }

    async fn pull_instance(
        &self,
        form_id: &str,
        submission_id: &str,
        report: &mut SyncReport,
    ) -> Result<()> {
        let (submission_file, instance_dir) = match self
            .layout
            .submission_file(form_id, submission_id)
            .and_then(|file| Ok((file, self.layout.instance_dir(form_id, submission_id)?)))
        {
            Ok(paths) => paths,
            Err(error) => {
                tracing::warn!("Skipping submission: {error}");
                report.fail(submission_id, error);
                return Ok(());
            }
        };

        let request = TransportRequest::get(self.endpoints.download_submission())
            .query("formId", submission_query(form_id, submission_id));
        let document = match self.mirror_document(&submission_file, &request).await {
            Ok(mirrored) => {
                if matches!(mirrored, Mirrored::Downloaded(_)) {
                    tracing::debug!("Downloaded submission {submission_id}");
                    report.instances_downloaded += 1;
                } else {
                    report.instances_cached += 1;
                }
                mirrored.into_bytes()
            }
            Err(error) => {
                tracing::error!("Could not mirror submission {submission_id}: {error}");
                report.fail(submission_id, error);
                return Ok(());
            }
        };

        match parse_manifest(&document) {
            Ok(entries) => self.sync_media(&entries, &instance_dir, report).await,
            Err(error) => {
                tracing::warn!("Submission {submission_id} is not well-formed, skipping its media: {error}");
                report.fail(submission_id, error);
                Ok(())
            }
        }
    }
}
