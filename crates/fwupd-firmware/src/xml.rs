//! A small element tree for XML builder documents.

use std::borrow::Cow;

use fwupd_common::xml::parse_uint;
use fwupd_errors::{FwupdError, Result};
use quick_xml::Reader;
use quick_xml::escape::unescape;
use quick_xml::events::{BytesStart, Event};

/// One element with its attributes, text and child elements.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct XmlNode {
    name: String,
    attrs: Vec<(String, String)>,
    text: String,
    children: Vec<XmlNode>,
}

fn decode<'a>(raw: &'a [u8], what: &str) -> Result<Cow<'a, str>> {
    let text = std::str::from_utf8(raw)
        .map_err(|e| FwupdError::invalid_data(format!("{what} is not UTF-8: {e}")))?;
    unescape(text).map_err(|e| FwupdError::invalid_data(format!("invalid escape in {what}: {e}")))
}

fn element(start: &BytesStart<'_>) -> Result<XmlNode> {
    let name = decode(start.name().as_ref(), "element name")?.into_owned();
    let mut attrs = Vec::new();
    for attr in start.attributes() {
        let attr = attr.map_err(|e| FwupdError::invalid_data(format!("invalid attribute on <{name}>: {e}")))?;
        let key = decode(attr.key.as_ref(), "attribute name")?.into_owned();
        let value = decode(attr.value.as_ref(), "attribute value")?.into_owned();
        attrs.push((key, value));
    }
    Ok(XmlNode {
        name,
        attrs,
        ..XmlNode::default()
    })
}

impl XmlNode {
    /// Parse a document and return its root element.
    ///
    /// # Errors
    ///
    /// Returns an invalid-data error for malformed XML, mismatched tags, or
    /// a document without a root element.
    pub fn parse(xml: &str) -> Result<Self> {
        let mut reader = Reader::from_str(xml);
        reader.config_mut().trim_text(true);
        let mut buf = Vec::new();
        let mut stack: Vec<XmlNode> = Vec::new();
        let mut root: Option<XmlNode> = None;

        loop {
            let event = reader
                .read_event_into(&mut buf)
                .map_err(|e| FwupdError::invalid_data(format!("invalid XML: {e}")))?;
            match event {
                Event::Start(start) => stack.push(element(&start)?),
                Event::Empty(start) => {
                    let node = element(&start)?;
                    match stack.last_mut() {
                        Some(parent) => parent.children.push(node),
                        None if root.is_none() => root = Some(node),
                        None => return Err(FwupdError::invalid_data("XML has more than one root")),
                    }
                }
                Event::Text(text) => {
                    if let Some(node) = stack.last_mut() {
                        node.text.push_str(&decode(text.as_ref(), "text")?);
                    }
                }
                Event::CData(data) => {
                    if let Some(node) = stack.last_mut() {
                        let text = std::str::from_utf8(data.as_ref())
                            .map_err(|e| FwupdError::invalid_data(format!("CDATA is not UTF-8: {e}")))?;
                        node.text.push_str(text);
                    }
                }
                Event::End(_) => {
                    let node = stack
                        .pop()
                        .ok_or_else(|| FwupdError::invalid_data("unbalanced closing tag"))?;
                    match stack.last_mut() {
                        Some(parent) => parent.children.push(node),
                        None if root.is_none() => root = Some(node),
                        None => return Err(FwupdError::invalid_data("XML has more than one root")),
                    }
                }
                Event::Eof => break,
                _ => {}
            }
            buf.clear();
        }
        if !stack.is_empty() {
            return Err(FwupdError::invalid_data("XML ended inside an element"));
        }
        root.ok_or_else(|| FwupdError::invalid_data("XML has no root element"))
    }

    /// Element name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Trimmed text content.
    pub fn text(&self) -> &str {
        self.text.trim()
    }

    /// Value of an attribute.
    pub fn attr(&self, key: &str) -> Option<&str> {
        self.attrs.iter().find(|(k, _)| k == key).map(|(_, v)| v.as_str())
    }

    /// Child elements in document order.
    pub fn children(&self) -> &[XmlNode] {
        &self.children
    }

    /// First child element called `name`.
    pub fn child(&self, name: &str) -> Option<&XmlNode> {
        self.children.iter().find(|c| c.name == name)
    }

    /// Text of the first child element called `key`.
    pub fn query_text(&self, key: &str) -> Option<&str> {
        self.child(key).map(XmlNode::text)
    }

    /// Numeric text of the first child element called `key`.
    ///
    /// # Errors
    ///
    /// Returns an invalid-data error naming the key if the text is not a
    /// number.
    pub fn query_uint(&self, key: &str) -> Result<Option<u64>> {
        self.query_text(key)
            .map(|text| parse_uint(text).map_err(|e| e.prefixed(format!("<{key}>"))))
            .transpose()
    }

    /// Boolean text of the first child element called `key`.
    pub fn query_bool(&self, key: &str) -> Option<bool> {
        self.query_text(key).map(|text| text == "true")
    }
}
