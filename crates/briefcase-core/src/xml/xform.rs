//! Form definition parsing.

use super::parse_document;
use crate::{Error, Result};

/// Identity extracted from a form definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormMetadata {
    pub id_string: String,
    pub title: String,
}

/// Extracts form identity from a definition document.
pub trait FormParser {
    fn parse_form(&self, xml: &[u8]) -> Result<FormMetadata>;
}

/// Parser for XForms definitions.
///
/// The id string comes from the primary instance's first element (its `id`
/// attribute, else its name). The title is the `title` element's text.
#[derive(Debug, Clone, Copy, Default)]
pub struct XFormParser;

impl FormParser for XFormParser {
    fn parse_form(&self, xml: &[u8]) -> Result<FormMetadata> {
        let root = parse_document(xml)?;

        let instance = root
            .descendants("instance")
            .into_iter()
            .next()
            .ok_or_else(|| Error::InvalidInput("form definition has no <instance>".to_string()))?;
        let data = instance.child_elements().next().ok_or_else(|| {
            Error::InvalidInput("form definition <instance> is empty".to_string())
        })?;

        let id_string = data
            .attribute("id")
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .unwrap_or_else(|| data.local_name())
            .to_string();
        let title = root.descendant_text("title").unwrap_or_default();

        Ok(FormMetadata { id_string, title })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const XFORM: &str = r#"<?xml version="1.0"?>
<h:html xmlns="http://www.w3.org/2002/xforms" xmlns:h="http://www.w3.org/1999/xhtml">
  <h:head>
    <h:title>Household survey</h:title>
    <model>
      <instance>
        <data id="household"><name/><photo/></data>
      </instance>
      <instance id="lookup"><root/></instance>
    </model>
  </h:head>
  <h:body/>
</h:html>"#;

    #[test]
    fn extracts_id_string_and_title() {
        let metadata = XFormParser.parse_form(XFORM.as_bytes()).unwrap();
        assert_eq!(
            metadata,
            FormMetadata {
                id_string: "household".to_string(),
                title: "Household survey".to_string(),
            }
        );
    }

    #[test]
    fn falls_back_to_instance_element_name() {
        let metadata = XFormParser
            .parse_form(b"<html><head><model><instance><visit/></instance></model></head></html>")
            .unwrap();
        assert_eq!(metadata.id_string, "visit");
        assert_eq!(metadata.title, "");
    }

    #[test]
    fn rejects_definition_without_instance() {
        assert!(matches!(
            XFormParser.parse_form(b"<html><head/></html>"),
            Err(Error::InvalidInput(_))
        ));
    }
}
