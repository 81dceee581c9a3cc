//! Run summaries.

use serde::Serialize;

/// One unit of work that failed without stopping the run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncFailure {
    /// Form id, submission id, media path or mirror path.
    pub resource: String,
    pub reason: String,
}

/// Outcome of one pull run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    pub forms_listed: usize,
    pub forms_excluded: usize,
    pub forms_downloaded: usize,
    pub forms_cached: usize,
    pub manifests_skipped: usize,
    pub media_downloaded: usize,
    pub media_cached: usize,
    pub submission_pages: usize,
    pub instances_downloaded: usize,
    pub instances_cached: usize,
    pub failures: Vec<SyncFailure>,
}

impl SyncReport {
    pub(crate) fn fail(&mut self, resource: impl Into<String>, reason: impl ToString) {
        self.failures.push(SyncFailure {
            resource: resource.into(),
            reason: reason.to_string(),
        });
    }

    pub fn has_failures(&self) -> bool {
        !self.failures.is_empty()
    }
}

/// Instances ingested from one form directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PushedDirectory {
    pub form_dir: String,
    pub instances: usize,
}

/// Outcome of one push run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PushReport {
    pub forms_pushed: usize,
    pub directories: Vec<PushedDirectory>,
    pub failures: Vec<SyncFailure>,
}

impl PushReport {
    pub(crate) fn fail(&mut self, resource: impl Into<String>, reason: impl ToString) {
        self.failures.push(SyncFailure {
            resource: resource.into(),
            reason: reason.to_string(),
        });
    }

    /// Instances ingested across all directories.
    pub fn instances_pushed(&self) -> usize {
        self.directories.iter().map(|dir| dir.instances).sum()
    }

    pub fn has_failures(&self) -> bool {
        !self.failures.is_empty()
    }
}
