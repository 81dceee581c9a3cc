//! Resources advertised by the remote server.
//!
//! These are parsed fresh from every listing response and never stored.

use serde::Serialize;

/// One form from the remote form list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RemoteFormRef {
    pub id_string: String,
    pub name: String,
    pub download_url: String,
    pub manifest_url: Option<String>,
}

impl RemoteFormRef {
    /// Whether the display name places this form in an excluded category.
    pub fn is_excluded(&self, excluded_prefix: &str) -> bool {
        !excluded_prefix.is_empty() && self.name.starts_with(excluded_prefix)
    }
}

/// One attachment listed by a form or instance manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RemoteMediaRef {
    pub filename: String,
    pub download_url: String,
}

/// One page of the remote submission list.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubmissionPage {
    /// Submission identifiers in server order.
    pub ids: Vec<String>,
    /// Cursor to request the next page with, when the server sent one.
    pub cursor: Option<String>,
}
