//! Readers for the OpenRosa documents exchanged with the server.

use super::{parse_document, Element};
use crate::models::{RemoteFormRef, RemoteMediaRef, SubmissionPage};
use crate::{Error, Result};

/// Parse a `formList` response.
///
/// Entries lacking a form id or download URL are dropped. Category filtering
/// is left to the caller.
pub fn parse_form_list(input: &[u8]) -> Result<Vec<RemoteFormRef>> {
    let root = parse_document(input)?;
    if root.local_name() != "xforms" {
        tracing::warn!("Form list root is <{}>, expected <xforms>", root.name);
        return Ok(Vec::new());
    }

    let forms = root
        .child_elements()
        .filter(|element| element.local_name() == "xform")
        .filter_map(|xform| {
            let id_string = child_text(xform, "formID")?;
            let download_url = child_text(xform, "downloadUrl")?;
            Some(RemoteFormRef {
                name: child_text(xform, "name").unwrap_or_default(),
                manifest_url: child_text(xform, "manifestUrl"),
                id_string,
                download_url,
            })
        })
        .collect();
    Ok(forms)
}

/// Parse the `mediaFile` entries of a manifest or a submission document.
pub fn parse_manifest(input: &[u8]) -> Result<Vec<RemoteMediaRef>> {
    let root = parse_document(input)?;
    Ok(media_entries(&root))
}

/// Parse one `submissionList` page.
pub fn parse_submission_list(input: &[u8]) -> Result<SubmissionPage> {
    let root = parse_document(input)?;

    let ids = if root.local_name() == "idChunk" {
        root.descendants("id")
            .into_iter()
            .map(Element::text)
            .filter(|id| !id.is_empty())
            .collect()
    } else {
        Vec::new()
    };

    Ok(SubmissionPage {
        ids,
        cursor: root.descendant_text("resumptionCursor"),
    })
}

/// A downloaded submission split into its payload and attachment names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmissionEnvelope {
    /// Instance markup with the envelope elements removed.
    pub payload: String,
    /// File names listed by the envelope's `mediaFile` entries.
    pub media_files: Vec<String>,
}

/// Unwrap a stored `submission.xml`.
///
/// The server wraps each instance as `<submission><data>INSTANCE</data>
/// <mediaFile>...</mediaFile></submission>`; the payload is `INSTANCE`.
pub fn parse_submission_envelope(input: &[u8]) -> Result<SubmissionEnvelope> {
    let root = parse_document(input)?;
    let data = root
        .child_elements()
        .next()
        .ok_or_else(|| Error::Malformed(format!("<{}> has no payload element", root.name)))?;

    let payload = data.inner_markup().trim().to_string();
    if payload.is_empty() {
        return Err(Error::Malformed(format!(
            "<{}> payload element is empty",
            data.name
        )));
    }

    let media_files = root
        .descendants("mediaFile")
        .into_iter()
        .filter_map(|media| child_text(media, "filename"))
        .collect();

    Ok(SubmissionEnvelope {
        payload,
        media_files,
    })
}

/// Form id declared by an instance payload.
///
/// Uses the root element's `id` attribute and falls back to its name.
pub fn instance_form_id(input: &[u8]) -> Result<String> {
    let root = parse_document(input)?;
    Ok(root
        .attribute("id")
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .unwrap_or_else(|| root.local_name())
        .to_string())
}

fn media_entries(root: &Element) -> Vec<RemoteMediaRef> {
    root.descendants("mediaFile")
        .into_iter()
        .filter_map(|media| {
            Some(RemoteMediaRef {
                filename: child_text(media, "filename")?,
                download_url: child_text(media, "downloadUrl")?,
            })
        })
        .collect()
}

fn child_text(element: &Element, local_name: &str) -> Option<String> {
    element
        .child(local_name)
        .map(Element::text)
        .filter(|text| !text.is_empty())
}
