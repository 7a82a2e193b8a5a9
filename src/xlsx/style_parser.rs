// SPDX-License-Identifier: MIT
//
// Copyright 2026, xlsx-csv contributors.

use std::collections::BTreeMap;
use std::io::BufRead;

use log::{debug, warn};
use quick_xml::events::Event;

use super::{xml_reader, XlsxError, XmlNode};
use crate::formats::{detect_format_kind, FormatKind};

/// Format kinds of the cell formats (`cellXfs`) of a workbook
///
/// Indexed by the position of the `xf` entry, which is what the `s`
/// attribute of a cell refers to. Built once, read only afterwards.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StyleTable {
    kinds: Vec<FormatKind>,
}

impl StyleTable {
    /// Format kind of the cell format at `index`, `Other` if unknown
    pub fn kind(&self, index: usize) -> FormatKind {
        self.kinds.get(index).copied().unwrap_or_default()
    }

    /// Number of cell formats
    pub fn len(&self) -> usize {
        self.kinds.len()
    }

    /// Is the table empty
    pub fn is_empty(&self) -> bool {
        self.kinds.is_empty()
    }
}

impl From<Vec<FormatKind>> for StyleTable {
    fn from(kinds: Vec<FormatKind>) -> Self {
        StyleTable { kinds }
    }
}

/// Reads the styles part into a [`StyleTable`]
///
/// Custom number formats (`numFmts`) are classified first, then every
/// `cellXfs/xf` applying a number format gets the kind of its `numFmtId`.
/// Built-in ids without a custom definition are `Other`.
pub fn read_style_table<R: BufRead>(reader: R) -> Result<StyleTable, XlsxError> {
    let mut xml = xml_reader(reader);
    let mut number_formats = BTreeMap::new();
    let mut kinds = Vec::new();
    let mut buf = Vec::with_capacity(1024);
    loop {
        buf.clear();
        match xml.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) if e.local_name().as_ref() == b"numFmt" => {
                let node = XmlNode::read(&mut xml, e)?;
                let id = node.attribute("numfmtid").unwrap_or_default();
                match atoi_simd::parse::<u32>(id.as_bytes()) {
                    Ok(id) => {
                        let code = node.attribute("formatcode").unwrap_or_default();
                        number_formats.insert(id, detect_format_kind(code));
                    }
                    Err(_) => warn!("ignoring number format with invalid id '{id}'"),
                }
            }
            Ok(Event::Start(ref e)) if e.local_name().as_ref() == b"cellXfs" => {
                let node = XmlNode::read(&mut xml, e)?;
                kinds = node
                    .children("xf")
                    .iter()
                    .map(|xf| xf_format_kind(xf, &number_formats))
                    .collect();
                break;
            }
            Ok(Event::Eof) => {
                warn!("styles part has no cellXfs");
                break;
            }
            Err(e) => return Err(XlsxError::Xml(e)),
            _ => (),
        }
    }
    debug!(
        "read {} number formats and {} cell formats",
        number_formats.len(),
        kinds.len()
    );
    Ok(StyleTable { kinds })
}

fn xf_format_kind(xf: &XmlNode, number_formats: &BTreeMap<u32, FormatKind>) -> FormatKind {
    if !matches!(xf.attribute("applynumberformat"), Some("1" | "true")) {
        return FormatKind::Other;
    }
    xf.attribute("numfmtid")
        .and_then(|id| atoi_simd::parse::<u32>(id.as_bytes()).ok())
        .and_then(|id| number_formats.get(&id).copied())
        .unwrap_or_default()
}
