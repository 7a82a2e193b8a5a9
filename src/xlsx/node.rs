// SPDX-License-Identifier: MIT
//
// Copyright 2026, xlsx-csv contributors.

//! Materialization of one xml element into an owned tree.
//!
//! The row decoder, the shared string loader and the style parser all stream
//! their part with a pull parser and only build an [`XmlNode`] for the
//! element they are interested in (`row`, `si`, `cellXfs`...), so memory
//! stays bounded by the size of that element.

use std::collections::HashMap;
use std::io::BufRead;

use quick_xml::escape::resolve_predefined_entity;
use quick_xml::events::{BytesRef, BytesStart, Event};
use quick_xml::Reader as XmlReader;

use super::XlsxError;

/// An owned xml element with its text, attributes and children
///
/// - attribute names are lowercased and keep their namespace prefix
///   (`r:id`), namespace declarations (`xmlns`, `xmlns:x`) are not attributes
/// - children are grouped by their lowercased local name, each group keeps
///   document order
/// - whitespace only text is `None`, never an empty string
#[derive(Debug, Clone, Default, PartialEq)]
pub struct XmlNode {
    name: String,
    text: Option<String>,
    raw_text: String,
    attributes: HashMap<String, String>,
    children: HashMap<String, Vec<XmlNode>>,
}

impl XmlNode {
    /// Reads the element opened by `start` and all its descendants.
    ///
    /// `xml` must be positioned right after `start`. On success it is
    /// positioned right after the matching end tag.
    pub fn read<R: BufRead>(
        xml: &mut XmlReader<R>,
        start: &BytesStart<'_>,
    ) -> Result<XmlNode, XlsxError> {
        let mut node = XmlNode::from_start(xml, start)?;
        let mut buf = Vec::with_capacity(256);
        loop {
            buf.clear();
            match xml.read_event_into(&mut buf)? {
                Event::Start(ref e) => {
                    let child = XmlNode::read(xml, e)?;
                    node.push_child(child);
                }
                Event::Empty(ref e) => {
                    let child = XmlNode::from_start(xml, e)?;
                    node.push_child(child);
                }
                Event::Text(t) => node.raw_text.push_str(&t.xml10_content()?),
                Event::CData(t) => node.raw_text.push_str(&t.decode()?),
                Event::GeneralRef(e) => push_entity(&e, &mut node.raw_text)?,
                Event::End(_) => break,
                Event::Eof => return Err(XlsxError::UnclosedElement(node.name)),
                _ => (),
            }
        }
        let trimmed = node.raw_text.trim();
        if !trimmed.is_empty() {
            node.text = Some(trimmed.to_owned());
        }
        Ok(node)
    }

    /// Name and attributes only, used for self closing elements
    fn from_start<R>(xml: &XmlReader<R>, start: &BytesStart<'_>) -> Result<XmlNode, XlsxError> {
        let decoder = xml.decoder();
        let mut attributes = HashMap::new();
        for a in start.attributes() {
            let a = a?;
            if a.key.as_namespace_binding().is_some() {
                continue;
            }
            let key = decoder.decode(a.key.as_ref())?.to_lowercase();
            let value = a.decode_and_unescape_value(decoder)?;
            attributes.insert(key, value.trim().to_owned());
        }
        Ok(XmlNode {
            name: decoder.decode(start.name().as_ref())?.to_lowercase(),
            attributes,
            ..Default::default()
        })
    }

    fn push_child(&mut self, child: XmlNode) {
        let key = match child.name.rsplit_once(':') {
            Some((_, local)) => local.to_owned(),
            None => child.name.clone(),
        };
        self.children.entry(key).or_default().push(child);
    }

    /// Lowercased qualified name of the element
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Trimmed text content, `None` if empty or whitespace only
    pub fn text(&self) -> Option<&str> {
        self.text.as_deref()
    }

    /// Untrimmed text content, needed to join rich text runs
    pub(crate) fn raw_text(&self) -> &str {
        &self.raw_text
    }

    /// Attribute value by (lowercase) name
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }

    /// All attributes, in no particular order
    pub fn attributes(&self) -> impl Iterator<Item = (&str, &str)> {
        self.attributes
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Children with the given (lowercase, local) tag name, in document order
    pub fn children(&self, tag: &str) -> &[XmlNode] {
        self.children.get(tag).map(Vec::as_slice).unwrap_or_default()
    }

    /// First child with the given tag name
    pub fn child(&self, tag: &str) -> Option<&XmlNode> {
        self.children(tag).first()
    }
}

/// Pushes a resolved `&...;` reference
fn push_entity(e: &BytesRef<'_>, buf: &mut String) -> Result<(), XlsxError> {
    if let Some(ch) = e.resolve_char_ref()? {
        buf.push(ch);
        return Ok(());
    }
    let name = e.decode()?;
    match resolve_predefined_entity(&name) {
        Some(s) => buf.push_str(s),
        None => return Err(XlsxError::UnknownEntity(name.into_owned())),
    }
    Ok(())
}
