//! Pull and push against an Aggregate server.
//!
//! [`SyncClient`] owns the injected collaborators and drives the form
//! catalog, the per-form submission walk, media fetching and push. Failures
//! local to one form, instance or media file are logged, collected into the
//! run report and skipped. Only configuration errors, cancellation and an
//! unreachable form or submission listing end a run early.

mod cancel;
mod forms;
mod instances;
mod media;
mod push;
mod report;

use std::path::Path;
use std::sync::Arc;

use crate::config::{SyncConfig, DEFAULT_EXCLUDED_PREFIX, DEFAULT_MEDIA_CONCURRENCY, DEFAULT_PAGE_SIZE};
use crate::mirror::MirrorLayout;
use crate::retry::{retry_until_some, RetryConfig};
use crate::storage::BlobStore;
use crate::transport::{ServerEndpoints, Transport, TransportRequest};
use crate::util::compact_text;
use crate::{Error, Result};

pub use cancel::CancelToken;
pub use instances::{submission_query, INITIAL_CURSOR};
pub use push::MirrorPusher;
pub use report::{PushReport, PushedDirectory, SyncFailure, SyncReport};

/// Sync engine for one account's mirror.
pub struct SyncClient {
    transport: Arc<dyn Transport>,
    blobs: Arc<dyn BlobStore>,
    layout: MirrorLayout,
    endpoints: ServerEndpoints,
    retry: RetryConfig,
    page_size: u32,
    excluded_prefix: String,
    media_concurrency: usize,
    cancel: CancelToken,
}

/// Where a mirrored document came from.
#[derive(Debug)]
enum Mirrored {
    Cached(Vec<u8>),
    Downloaded(Vec<u8>),
}

impl Mirrored {
    fn into_bytes(self) -> Vec<u8> {
        match self {
            Self::Cached(bytes) | Self::Downloaded(bytes) => bytes,
        }
    }
}

impl SyncClient {
    /// Client with default retry, paging and exclusion settings.
    pub fn new(
        transport: Arc<dyn Transport>,
        blobs: Arc<dyn BlobStore>,
        layout: MirrorLayout,
        endpoints: ServerEndpoints,
    ) -> Self {
        Self {
            transport,
            blobs,
            layout,
            endpoints,
            retry: RetryConfig::default(),
            page_size: DEFAULT_PAGE_SIZE,
            excluded_prefix: DEFAULT_EXCLUDED_PREFIX.to_string(),
            media_concurrency: DEFAULT_MEDIA_CONCURRENCY,
            cancel: CancelToken::new(),
        }
    }

    /// Client for `config`, with `blobs` rooted at the configured storage root.
    pub fn from_config(
        config: &SyncConfig,
        transport: Arc<dyn Transport>,
        blobs: Arc<dyn BlobStore>,
    ) -> Result<Self> {
        Ok(Self::new(transport, blobs, config.mirror_layout()?, config.endpoints()?)
            .with_retry(config.retry)
            .with_page_size(config.page_size)?
            .with_media_concurrency(config.media_concurrency)?
            .with_excluded_prefix(config.excluded_prefix.clone()))
    }

    #[must_use]
    pub const fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_page_size(mut self, page_size: u32) -> Result<Self> {
        if page_size == 0 {
            return Err(Error::Config("page size must be at least 1".to_string()));
        }
        self.page_size = page_size;
        Ok(self)
    }

    /// Fetch up to `concurrency` media files of one manifest at a time.
    pub fn with_media_concurrency(mut self, concurrency: usize) -> Result<Self> {
        if concurrency == 0 {
            return Err(Error::Config(
                "media concurrency must be at least 1".to_string(),
            ));
        }
        self.media_concurrency = concurrency;
        Ok(self)
    }

    /// Form names starting with `prefix` are skipped. Empty disables the filter.
    #[must_use]
    pub fn with_excluded_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.excluded_prefix = prefix.into();
        self
    }

    #[must_use]
    pub fn with_cancel_token(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub const fn layout(&self) -> &MirrorLayout {
        &self.layout
    }

    pub const fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }

    /// Send one request and keep the body of a 2xx response.
    async fn fetch_ok(&self, request: TransportRequest) -> Option<Vec<u8>> {
        let url = request.url.clone();
        match self.transport.send(request).await {
            Ok(response) if response.is_success() => Some(response.body),
            Ok(response) => {
                tracing::debug!(
                    "GET {url} answered {}: {}",
                    response.status,
                    compact_text(&String::from_utf8_lossy(&response.body))
                );
                None
            }
            Err(error) => {
                tracing::debug!("GET {url} failed: {error}");
                None
            }
        }
    }

    /// Fetch a 2xx body, retrying per the configured schedule.
    async fn fetch_with_retry(&self, request: &TransportRequest) -> Option<Vec<u8>> {
        retry_until_some(&self.retry, move || self.fetch_ok(request.clone())).await
    }

    /// Reuse the blob at `path`, or download it, trim it and store it there.
    async fn mirror_document(&self, path: &Path, request: &TransportRequest) -> Result<Mirrored> {
        if self.blobs.exists(path).await? {
            return Ok(Mirrored::Cached(self.blobs.read(path).await?));
        }

        let body = self.fetch_with_retry(request).await.ok_or_else(|| {
            Error::Transport(format!(
                "{} still failing after {} retries",
                request.url,
                self.retry.max_retries()
            ))
        })?;
        let body = body.trim_ascii().to_vec();
        self.blobs.write(path, &body).await?;
        Ok(Mirrored::Downloaded(body))
    }
}
