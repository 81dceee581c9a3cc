//! Media attachment fetching for forms and instances.

use std::collections::HashSet;
use std::path::Path;

use futures::stream::{self, StreamExt};
use url::Url;

use super::{SyncClient, SyncReport};
use crate::mirror::media_path;
use crate::models::RemoteMediaRef;
use crate::retry::retry_until_some;
use crate::transport::TransportRequest;
use crate::Result;

/// What happened to one manifest entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum MediaOutcome {
    Cached,
    Downloaded,
    Failed(String),
}

impl SyncClient {
    /// Fetch every manifest entry missing under `destination`.
    ///
    /// Entries sharing a filename are fetched once. A failing file is
    /// recorded in `report` and the rest of the batch continues.
    pub(crate) async fn sync_media(
        &self,
        entries: &[RemoteMediaRef],
        destination: &Path,
        report: &mut SyncReport,
    ) -> Result<()> {
        let mut seen = HashSet::new();
        let unique: Vec<&RemoteMediaRef> = entries
            .iter()
            .filter(|entry| seen.insert(entry.filename.as_str()))
            .collect();

        let outcomes = if self.media_concurrency > 1 {
            stream::iter(unique)
                .map(|entry| async move { (entry, self.sync_media_file(entry, destination).await) })
                .buffer_unordered(self.media_concurrency)
                .collect::<Vec<_>>()
                .await
        } else {
            let mut outcomes = Vec::with_capacity(unique.len());
            for entry in unique {
                self.cancel.check()?;
                outcomes.push((entry, self.sync_media_file(entry, destination).await));
            }
            outcomes
        };

        for (entry, outcome) in outcomes {
            match outcome {
                MediaOutcome::Cached => report.media_cached += 1,
                MediaOutcome::Downloaded => report.media_downloaded += 1,
                MediaOutcome::Failed(reason) => {
                    report.fail(destination.join(&entry.filename).display().to_string(), reason);
                }
            }
        }
        self.cancel.check()
    }

    async fn sync_media_file(&self, entry: &RemoteMediaRef, destination: &Path) -> MediaOutcome {
        if self.cancel.is_cancelled() {
            return MediaOutcome::Failed("cancelled".to_string());
        }

        let path = match media_path(destination, &entry.filename) {
            Ok(path) => path,
            Err(error) => {
                tracing::warn!("Skipping media file: {error}");
                return MediaOutcome::Failed(error.to_string());
            }
        };

        match self.blobs.exists(&path).await {
            Ok(true) => return MediaOutcome::Cached,
            Ok(false) => {}
            Err(error) => return MediaOutcome::Failed(error.to_string()),
        }

        let url = entry.download_url.as_str();
        let Some(body) = retry_until_some(&self.retry, move || self.fetch_media(url)).await else {
            tracing::error!(
                "Giving up on {} after {} retries",
                path.display(),
                self.retry.max_retries()
            );
            return MediaOutcome::Failed(format!(
                "download failed after {} retries",
                self.retry.max_retries()
            ));
        };

        match self.blobs.write(&path, &body).await {
            Ok(()) => {
                tracing::debug!("Downloaded {}", path.display());
                MediaOutcome::Downloaded
            }
            Err(error) => {
                tracing::error!("Could not store {}: {error}", path.display());
                MediaOutcome::Failed(error.to_string())
            }
        }
    }

    /// One attempt: `HEAD`, then `GET` either the redirect target without
    /// credentials or the original URL with them.
    async fn fetch_media(&self, url: &str) -> Option<Vec<u8>> {
        let head = match self.transport.send(TransportRequest::head(url)).await {
            Ok(response) => response,
            Err(error) => {
                tracing::debug!("HEAD {url} failed: {error}");
                return None;
            }
        };

        let request = match head.redirect_target() {
            Some(location) => {
                let target = resolve_location(url, location);
                tracing::debug!("{url} redirects to {target}, fetching without credentials");
                TransportRequest::get(target).anonymous()
            }
            None => TransportRequest::get(url),
        };
        self.fetch_ok(request).await
    }
}

/// Resolve a possibly relative `Location` against the request URL.
fn resolve_location(base: &str, location: &str) -> String {
    Url::parse(base)
        .and_then(|base| base.join(location))
        .map_or_else(|_| location.to_string(), String::from)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relative_location_is_resolved_against_request() {
        assert_eq!(
            resolve_location("https://agg.example.com/view/binaryData?id=1", "/blob/abc"),
            "https://agg.example.com/blob/abc"
        );
        assert_eq!(
            resolve_location("https://agg.example.com/x", "https://s3.example.com/y?sig=1"),
            "https://s3.example.com/y?sig=1"
        );
    }
}
