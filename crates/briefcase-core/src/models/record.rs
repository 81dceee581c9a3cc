//! Records held by the record store.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Generate a new time-sortable record identifier.
pub fn new_record_id() -> String {
    Uuid::now_v7().to_string()
}

/// A published form definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormRecord {
    pub id: String,
    pub id_string: String,
    pub title: String,
    /// Creation timestamp (Unix ms)
    pub created_at: i64,
}

/// A stored instance. Byte-identical submissions share one instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceRecord {
    pub id: String,
    pub owner: String,
    /// Linked form record id; `None` when the declared form is unknown.
    pub form_id: Option<String>,
    /// Non-authoritative content fingerprint, see [`crate::dedup`].
    pub fingerprint: i64,
    pub created_at: i64,
}

impl InstanceRecord {
    pub const fn is_linked(&self) -> bool {
        self.form_id.is_some()
    }
}

/// One receipt of an instance payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmissionRecord {
    pub id: String,
    pub instance_id: String,
    /// Receipt timestamp (Unix ms)
    pub posted_at: i64,
}

/// An operational report about a non-fatal data problem.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationalReport {
    pub id: i64,
    pub subject: String,
    pub detail: String,
    pub created_at: i64,
}

/// Form definition handed to the record store for publishing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormUpload {
    pub file_name: String,
    pub xml: Vec<u8>,
}

/// A file submitted alongside an instance payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    pub file_name: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

impl Attachment {
    /// Build an attachment, guessing the content type from the file name.
    pub fn from_file(file_name: impl Into<String>, bytes: Vec<u8>) -> Self {
        let file_name = file_name.into();
        let content_type = mime_guess::from_path(&file_name)
            .first_or_octet_stream()
            .essence_str()
            .to_string();
        Self {
            file_name,
            content_type,
            bytes,
        }
    }
}
