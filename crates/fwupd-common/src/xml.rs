//! Indented XML output shared by the chunk and firmware exporters.
//!
//! Numeric keys use the "omit if zero" convention: a value of zero is not
//! written at all, anything else is written as lowercase hex.

use fwupd_errors::{FwupdError, Result};
use quick_xml::Writer;
use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};

fn xml_error(e: impl core::fmt::Display) -> FwupdError {
    FwupdError::internal(format!("failed to write XML: {e}"))
}

/// Streaming builder for small XML documents.
pub struct XmlBuilder {
    writer: Writer<Vec<u8>>,
}

impl Default for XmlBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl XmlBuilder {
    /// Create a builder indenting by two spaces.
    pub fn new() -> Self {
        Self {
            writer: Writer::new_with_indent(Vec::new(), b' ', 2),
        }
    }

    /// Open an element.
    ///
    /// # Errors
    ///
    /// Returns an internal error if the writer fails.
    pub fn open(&mut self, name: &str) -> Result<()> {
        self.open_with_attrs(name, &[])
    }

    /// Open an element with attributes.
    ///
    /// # Errors
    ///
    /// Returns an internal error if the writer fails.
    pub fn open_with_attrs(&mut self, name: &str, attrs: &[(&str, &str)]) -> Result<()> {
        let start = BytesStart::new(name).with_attributes(attrs.iter().copied());
        self.writer.write_event(Event::Start(start)).map_err(xml_error)
    }

    /// Close an element.
    ///
    /// # Errors
    ///
    /// Returns an internal error if the writer fails.
    pub fn close(&mut self, name: &str) -> Result<()> {
        self.writer
            .write_event(Event::End(BytesEnd::new(name)))
            .map_err(xml_error)
    }

    /// Write `<key attrs...>text</key>`.
    ///
    /// # Errors
    ///
    /// Returns an internal error if the writer fails.
    pub fn text_with_attrs(&mut self, key: &str, text: &str, attrs: &[(&str, &str)]) -> Result<()> {
        self.open_with_attrs(key, attrs)?;
        self.writer
            .write_event(Event::Text(BytesText::new(text)))
            .map_err(xml_error)?;
        self.close(key)
    }

    /// Write `<key>value</key>` unless the value is empty.
    ///
    /// # Errors
    ///
    /// Returns an internal error if the writer fails.
    pub fn insert_kv(&mut self, key: &str, value: Option<&str>) -> Result<()> {
        match value {
            Some(value) if !value.is_empty() => self.text_with_attrs(key, value, &[]),
            _ => Ok(()),
        }
    }

    /// Write `<key>0x..</key>` unless the value is zero.
    ///
    /// # Errors
    ///
    /// Returns an internal error if the writer fails.
    pub fn insert_kx(&mut self, key: &str, value: u64) -> Result<()> {
        if value == 0 {
            return Ok(());
        }
        self.text_with_attrs(key, &format!("0x{value:x}"), &[])
    }

    /// Write `<key>true</key>` when set.
    ///
    /// # Errors
    ///
    /// Returns an internal error if the writer fails.
    pub fn insert_kb(&mut self, key: &str, value: bool) -> Result<()> {
        if !value {
            return Ok(());
        }
        self.text_with_attrs(key, "true", &[])
    }

    /// Finish the document.
    ///
    /// # Errors
    ///
    /// Returns an invalid-data error if the output is not UTF-8.
    pub fn finish(self) -> Result<String> {
        String::from_utf8(self.writer.into_inner())
            .map_err(|e| FwupdError::invalid_data(format!("XML is not UTF-8: {e}")))
    }
}

/// Parse `0x`-prefixed hex or decimal text as used by XML builder files.
///
/// # Errors
///
/// Returns an invalid-data error if the text is not a number.
pub fn parse_uint(text: &str) -> Result<u64> {
    let text = text.trim();
    let parsed = match text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => text.parse::<u64>(),
    };
    parsed.map_err(|e| FwupdError::invalid_data(format!("cannot parse {text}: {e}")))
}
