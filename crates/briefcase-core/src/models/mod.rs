//! Data models for Briefcase

mod record;
mod remote;

pub use record::{
    new_record_id, Attachment, FormRecord, FormUpload, InstanceRecord, OperationalReport,
    SubmissionRecord,
};
pub use remote::{RemoteFormRef, RemoteMediaRef, SubmissionPage};
