//! Local mirror layout.
//!
//! ```text
//! <root>/<formId>/<formId>.xml
//! <root>/<formId>/form-media/<mediaFilename>
//! <root>/<formId>/instances/<sanitizedSubmissionId>/submission.xml
//! <root>/<formId>/instances/<sanitizedSubmissionId>/<mediaFilename>
//! ```

use std::path::{Path, PathBuf};

use crate::{Error, Result};

pub const FORM_MEDIA_DIR: &str = "form-media";
pub const INSTANCES_DIR: &str = "instances";
pub const SUBMISSION_FILE: &str = "submission.xml";

/// Strip `:` from a submission identifier so it can be used as a directory.
pub fn sanitize_submission_id(submission_id: &str) -> String {
    submission_id.replace(':', "")
}

/// File name of a form definition inside its form directory.
pub fn form_file_name(id_string: &str) -> String {
    format!("{id_string}.xml")
}

/// Check that a server-supplied name is a single safe path segment.
pub fn ensure_segment(segment: &str) -> Result<&str> {
    let unsafe_segment = segment.is_empty()
        || segment == "."
        || segment == ".."
        || segment.contains('/')
        || segment.contains('\\')
        || segment.contains('\0');
    if unsafe_segment {
        return Err(Error::InvalidInput(format!(
            "unsafe path segment from server: {segment:?}"
        )));
    }
    Ok(segment)
}

/// Paths of one account's mirror, relative to the blob store root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MirrorLayout {
    root: PathBuf,
}

impl MirrorLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Mirror root for an account: `<username>/briefcase/forms`.
    pub fn for_user(username: &str) -> Result<Self> {
        let username = ensure_segment(username)?;
        Ok(Self::new(
            Path::new(username).join("briefcase").join("forms"),
        ))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn form_dir(&self, id_string: &str) -> Result<PathBuf> {
        Ok(self.root.join(ensure_segment(id_string)?))
    }

    pub fn form_file(&self, id_string: &str) -> Result<PathBuf> {
        Ok(self.form_dir(id_string)?.join(form_file_name(id_string)))
    }

    pub fn form_media_dir(&self, id_string: &str) -> Result<PathBuf> {
        Ok(self.form_dir(id_string)?.join(FORM_MEDIA_DIR))
    }

    pub fn instances_dir(&self, id_string: &str) -> Result<PathBuf> {
        Ok(self.form_dir(id_string)?.join(INSTANCES_DIR))
    }

    pub fn instance_dir(&self, id_string: &str, submission_id: &str) -> Result<PathBuf> {
        let sanitized = sanitize_submission_id(submission_id);
        Ok(self
            .instances_dir(id_string)?
            .join(ensure_segment(&sanitized)?))
    }

    pub fn submission_file(&self, id_string: &str, submission_id: &str) -> Result<PathBuf> {
        Ok(self
            .instance_dir(id_string, submission_id)?
            .join(SUBMISSION_FILE))
    }
}

/// Path of a media file inside a media destination directory.
pub fn media_path(destination: &Path, filename: &str) -> Result<PathBuf> {
    Ok(destination.join(ensure_segment(filename)?))
}
