//! Minimal element tree over `quick-xml`.
//!
//! Every document the server returns is small enough to hold in memory, so
//! the sync code works on a parsed tree rather than on raw events. Parsing
//! doubles as the well-formedness check used to skip broken manifests and
//! listing pages.

mod openrosa;
mod xform;

use quick_xml::escape::{escape, partial_escape};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use crate::{Error, Result};

pub use openrosa::{
    instance_form_id, parse_form_list, parse_manifest, parse_submission_envelope,
    parse_submission_list, SubmissionEnvelope,
};
pub use xform::{FormMetadata, FormParser, XFormParser};

/// A node inside an element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    Element(Element),
    Text(String),
}

/// An element with its qualified name, attributes and children.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    pub name: String,
    pub attributes: Vec<(String, String)>,
    pub children: Vec<Node>,
}

impl Element {
    /// Name without any namespace prefix.
    pub fn local_name(&self) -> &str {
        local_part(&self.name)
    }

    /// Attribute value looked up by local name.
    pub fn attribute(&self, local_name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(key, _)| local_part(key) == local_name)
            .map(|(_, value)| value.as_str())
    }

    /// Direct child elements in document order.
    pub fn child_elements(&self) -> impl Iterator<Item = &Self> {
        self.children.iter().filter_map(|node| match node {
            Node::Element(element) => Some(element),
            Node::Text(_) => None,
        })
    }

    /// First direct child element with the given local name.
    pub fn child(&self, local_name: &str) -> Option<&Self> {
        self.child_elements()
            .find(|element| element.local_name() == local_name)
    }

    /// All descendant elements (excluding `self`) with the given local name,
    /// in document order.
    pub fn descendants(&self, local_name: &str) -> Vec<&Self> {
        let mut found = Vec::new();
        self.collect_descendants(local_name, &mut found);
        found
    }

    fn collect_descendants<'a>(&'a self, local_name: &str, found: &mut Vec<&'a Self>) {
        for child in self.child_elements() {
            if child.local_name() == local_name {
                found.push(child);
            }
            child.collect_descendants(local_name, found);
        }
    }

    /// Concatenated direct text content, trimmed.
    pub fn text(&self) -> String {
        let mut text = String::new();
        for node in &self.children {
            if let Node::Text(value) = node {
                text.push_str(value);
            }
        }
        text.trim().to_string()
    }

    /// Trimmed text of the first descendant with `local_name`, when non-empty.
    pub fn descendant_text(&self, local_name: &str) -> Option<String> {
        self.descendants(local_name)
            .first()
            .map(|element| element.text())
            .filter(|text| !text.is_empty())
    }

    /// Serialize this element, including its own tag.
    pub fn to_markup(&self) -> String {
        let mut out = String::new();
        self.write_markup(&mut out);
        out
    }

    /// Serialize only the children of this element.
    pub fn inner_markup(&self) -> String {
        let mut out = String::new();
        for child in &self.children {
            write_node(child, &mut out);
        }
        out
    }

    fn write_markup(&self, out: &mut String) {
        out.push('<');
        out.push_str(&self.name);
        for (key, value) in &self.attributes {
            out.push(' ');
            out.push_str(key);
            out.push_str("=\"");
            out.push_str(&escape(value.as_str()));
            out.push('"');
        }
        if self.children.is_empty() {
            out.push_str("/>");
            return;
        }
        out.push('>');
        for child in &self.children {
            write_node(child, out);
        }
        out.push_str("</");
        out.push_str(&self.name);
        out.push('>');
    }
}

fn write_node(node: &Node, out: &mut String) {
    match node {
        Node::Element(element) => element.write_markup(out),
        Node::Text(text) => out.push_str(&partial_escape(text.as_str())),
    }
}

fn local_part(name: &str) -> &str {
    name.rsplit_once(':').map_or(name, |(_, local)| local)
}

/// Parse a complete document and return its root element.
///
/// Fails with [`Error::Malformed`] unless the input is UTF-8 with exactly one
/// properly nested root element.
pub fn parse_document(input: &[u8]) -> Result<Element> {
    let text = std::str::from_utf8(input)
        .map_err(|error| Error::Malformed(format!("document is not UTF-8: {error}")))?;
    let mut reader = Reader::from_str(text);
    reader.config_mut().check_end_names = true;

    let mut builder = TreeBuilder::default();
    loop {
        match reader.read_event()? {
            Event::Start(start) => {
                let element = element_from_start(&start)?;
                builder.open(element)?;
            }
            Event::Empty(start) => {
                let element = element_from_start(&start)?;
                builder.open(element)?;
                builder.close()?;
            }
            Event::End(_) => builder.close()?,
            Event::Text(text) => {
                let value = text
                    .unescape()
                    .map_err(|error| Error::Malformed(error.to_string()))?;
                builder.text(value.into_owned())?;
            }
            Event::CData(data) => {
                let value = String::from_utf8(data.into_inner().into_owned()).map_err(|error| {
                    Error::Malformed(format!("CDATA section is not UTF-8: {error}"))
                })?;
                builder.text(value)?;
            }
            Event::Eof => break,
            Event::Decl(_) | Event::PI(_) | Event::Comment(_) | Event::DocType(_) => {}
        }
    }

    builder.finish()
}

fn element_from_start(start: &BytesStart<'_>) -> Result<Element> {
    let name = String::from_utf8_lossy(start.name().as_ref()).into_owned();
    let mut attributes = Vec::new();
    for attribute in start.attributes() {
        let attribute = attribute.map_err(|error| Error::Malformed(error.to_string()))?;
        let key = String::from_utf8_lossy(attribute.key.as_ref()).into_owned();
        let value = attribute
            .unescape_value()
            .map_err(|error| Error::Malformed(error.to_string()))?
            .into_owned();
        attributes.push((key, value));
    }
    Ok(Element {
        name,
        attributes,
        children: Vec::new(),
    })
}

#[derive(Default)]
struct TreeBuilder {
    stack: Vec<Element>,
    root: Option<Element>,
}

impl TreeBuilder {
    fn open(&mut self, element: Element) -> Result<()> {
        if self.stack.is_empty() && self.root.is_some() {
            return Err(Error::Malformed(format!(
                "unexpected second root element <{}>",
                element.name
            )));
        }
        self.stack.push(element);
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        let element = self
            .stack
            .pop()
            .ok_or_else(|| Error::Malformed("closing tag without opening tag".to_string()))?;
        match self.stack.last_mut() {
            Some(parent) => parent.children.push(Node::Element(element)),
            None => self.root = Some(element),
        }
        Ok(())
    }

    fn text(&mut self, value: String) -> Result<()> {
        match self.stack.last_mut() {
            Some(parent) => {
                parent.children.push(Node::Text(value));
                Ok(())
            }
            None if value.trim().is_empty() => Ok(()),
            None => Err(Error::Malformed(
                "text content outside of the root element".to_string(),
            )),
        }
    }

    fn finish(self) -> Result<Element> {
        if let Some(open) = self.stack.last() {
            return Err(Error::Malformed(format!("unclosed element <{}>", open.name)));
        }
        self.root
            .ok_or_else(|| Error::Malformed("document has no root element".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_nested_elements_with_attributes_and_text() {
        let root = parse_document(
            br#"<?xml version="1.0"?>
            <h:html xmlns:h="http://www.w3.org/1999/xhtml">
              <h:title>Water &amp; sanitation</h:title>
              <entry key="a" h:lang="en"/>
            </h:html>"#,
        )
        .unwrap();

        assert_eq!(root.local_name(), "html");
        assert_eq!(root.child("title").unwrap().text(), "Water & sanitation");
        let entry = root.child("entry").unwrap();
        assert_eq!(entry.attribute("key"), Some("a"));
        assert_eq!(entry.attribute("lang"), Some("en"));
        assert!(entry.children.is_empty());
    }

    #[test]
    fn rejects_mismatched_and_unclosed_tags() {
        assert!(matches!(
            parse_document(b"<a><b></a></b>"),
            Err(Error::Malformed(_))
        ));
        assert!(matches!(parse_document(b"<a><b>"), Err(Error::Malformed(_))));
        assert!(matches!(parse_document(b"</a>"), Err(Error::Malformed(_))));
    }

    #[test]
    fn rejects_missing_root_and_trailing_content() {
        assert!(matches!(parse_document(b""), Err(Error::Malformed(_))));
        assert!(matches!(
            parse_document(b"not markup at all"),
            Err(Error::Malformed(_))
        ));
        assert!(matches!(
            parse_document(b"<a/><b/>"),
            Err(Error::Malformed(_))
        ));
    }

    #[test]
    fn rejects_invalid_utf8() {
        assert!(matches!(
            parse_document(&[b'<', b'a', b'>', 0xff, b'<', b'/', b'a', b'>']),
            Err(Error::Malformed(_))
        ));
    }

    #[test]
    fn descendants_are_returned_in_document_order() {
        let root =
            parse_document(b"<r><id>1</id><list><id>2</id><id>3</id></list><id>4</id></r>").unwrap();
        let ids = root
            .descendants("id")
            .into_iter()
            .map(Element::text)
            .collect::<Vec<_>>();
        assert_eq!(ids, vec!["1", "2", "3", "4"]);
    }

    #[test]
    fn markup_round_trips_through_serializer() {
        let source = r#"<data id="f1"><name a="x &quot;y&quot;">A &lt; B</name><empty/></data>"#;
        let root = parse_document(source.as_bytes()).unwrap();
        assert_eq!(root.to_markup(), source);
        assert_eq!(
            root.inner_markup(),
            r#"<name a="x &quot;y&quot;">A &lt; B</name><empty/>"#
        );
    }

    #[test]
    fn cdata_is_kept_as_text() {
        let root = parse_document(b"<a><![CDATA[1 < 2]]></a>").unwrap();
        assert_eq!(root.text(), "1 < 2");
    }
}
