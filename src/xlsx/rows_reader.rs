// SPDX-License-Identifier: MIT
//
// Copyright 2026, xlsx-csv contributors.

use std::io::BufRead;

use log::{debug, warn};
use quick_xml::events::Event;

use super::{read_string, xml_reader, CellAddress, SharedStrings, StyleTable, XlReader};
use super::{XlsxError, XmlNode, MAX_COLUMNS, MAX_ROWS};
use crate::config::ConversionConfig;
use crate::formats::{format_excel_serial, FormatKind};

/// A decoded worksheet row
///
/// `fields[0]` is column `A` whatever the cells physically present in the
/// worksheet.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RowRecord {
    number: u32,
    fields: Vec<String>,
}

impl RowRecord {
    /// Creates a new row, `number` is 1 based
    pub fn new(number: u32, fields: Vec<String>) -> Self {
        RowRecord { number, fields }
    }

    fn blank(number: u32, len: usize) -> Self {
        RowRecord {
            number,
            fields: vec![String::new(); len],
        }
    }

    /// Row number, 1 based
    pub fn number(&self) -> u32 {
        self.number
    }

    /// Decoded fields
    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    /// Consumes the row into its fields
    pub fn into_fields(self) -> Vec<String> {
        self.fields
    }

    /// True if every field is empty
    pub fn is_blank(&self) -> bool {
        self.fields.iter().all(String::is_empty)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DecoderState {
    BeforeFirstRow,
    InRow,
    Done,
}

/// Streams the rows of a worksheet part as dense, column aligned records
///
/// Rows and cells omitted by the worksheet (because they are empty) are
/// restored: a row number gap yields blank rows with the field count of the
/// row that follows, a column gap yields empty fields.
pub struct RowDecoder<'a, R: BufRead> {
    xml: XlReader<R>,
    strings: &'a SharedStrings,
    styles: &'a StyleTable,
    config: &'a ConversionConfig,
    state: DecoderState,
    /// Next row number to emit, 1 based
    next_row: u32,
    /// Decoded row waiting for the blank rows preceding it
    pending: Option<RowRecord>,
    buf: Vec<u8>,
}

impl<'a, R: BufRead> RowDecoder<'a, R> {
    /// Creates a decoder over a worksheet part
    pub fn new(
        reader: R,
        strings: &'a SharedStrings,
        styles: &'a StyleTable,
        config: &'a ConversionConfig,
    ) -> Self {
        RowDecoder {
            xml: xml_reader(reader),
            strings,
            styles,
            config,
            state: DecoderState::BeforeFirstRow,
            next_row: 1,
            pending: None,
            buf: Vec::with_capacity(1024),
        }
    }

    /// Next row of the worksheet, `None` once all rows have been read
    pub fn next_row(&mut self) -> Result<Option<RowRecord>, XlsxError> {
        if self.pending.is_none() {
            if self.state == DecoderState::Done {
                return Ok(None);
            }
            match self.read_row()? {
                Some(row) => {
                    self.state = DecoderState::InRow;
                    self.pending = Some(row);
                }
                None => {
                    debug!("worksheet done after {} rows", self.next_row - 1);
                    self.state = DecoderState::Done;
                    return Ok(None);
                }
            }
        }
        let row = match self.pending.take() {
            Some(row) if row.number > self.next_row => {
                let blank = RowRecord::blank(self.next_row, row.fields.len());
                self.pending = Some(row);
                blank
            }
            Some(row) => row,
            None => return Err(XlsxError::Unexpected("no pending row")),
        };
        self.next_row = row.number + 1;
        Ok(Some(row))
    }

    fn read_row(&mut self) -> Result<Option<RowRecord>, XlsxError> {
        let node = loop {
            self.buf.clear();
            match self.xml.read_event_into(&mut self.buf) {
                Ok(Event::Start(ref e)) if e.local_name().as_ref() == b"row" => {
                    break XmlNode::read(&mut self.xml, e)?;
                }
                Ok(Event::End(ref e)) if e.local_name().as_ref() == b"sheetData" => {
                    return Ok(None)
                }
                Ok(Event::Eof) => return Ok(None),
                Err(e) => return Err(XlsxError::Xml(e)),
                _ => (),
            }
        };
        self.decode_row(&node).map(Some)
    }

    fn decode_row(&self, row: &XmlNode) -> Result<RowRecord, XlsxError> {
        let r = row.attribute("r").ok_or(XlsxError::MissingAttribute {
            node: "row",
            attr: "r",
        })?;
        let number = atoi_simd::parse::<u32>(r.as_bytes())
            .ok()
            .filter(|n| *n > 0)
            .ok_or_else(|| XlsxError::RowNumber(r.to_owned()))?;
        if number > MAX_ROWS {
            warn!("row {number} is above the maximum number of rows ({MAX_ROWS})");
        }
        if number < self.next_row {
            return Err(XlsxError::RowOutOfOrder {
                row: number,
                expected: self.next_row,
            });
        }

        let cells = row.children("c");
        let mut fields = Vec::with_capacity(cells.len());
        for cell in cells {
            let value = self.decode_cell(cell);
            match cell.attribute("r") {
                Some(r) => {
                    let column = CellAddress::parse(r.as_bytes())?.column;
                    if column >= MAX_COLUMNS {
                        return Err(XlsxError::ColumnOutOfRange(r.to_owned()));
                    }
                    let column = column as usize;
                    if column < fields.len() {
                        return Err(XlsxError::CellOutOfOrder(r.to_owned()));
                    }
                    // columns omitted by the worksheet
                    fields.resize(column, String::new());
                }
                None if value.is_some() => {
                    return Err(XlsxError::MissingAttribute {
                        node: "c",
                        attr: "r",
                    })
                }
                None => (),
            }
            fields.push(value.unwrap_or_default());
        }
        Ok(RowRecord { number, fields })
    }

    /// Display value of a cell, `None` if it has no value
    fn decode_cell(&self, cell: &XmlNode) -> Option<String> {
        let cell_type = cell.attribute("t");
        if cell_type == Some("inlineStr") {
            if let Some(is) = cell.child("is") {
                return Some(read_string(is));
            }
        }
        let raw = cell.child("v")?.text().unwrap_or_default();
        if cell_type == Some("s") {
            return Some(self.strings.resolve(raw).to_owned());
        }
        let kind = cell
            .attribute("s")
            .and_then(|s| atoi_simd::parse::<usize>(s.as_bytes()).ok())
            .map_or(FormatKind::Other, |idx| self.styles.kind(idx));
        Some(format_value(raw, kind, self.config))
    }
}

fn format_value(raw: &str, kind: FormatKind, config: &ConversionConfig) -> String {
    let pattern = match kind {
        FormatKind::Date => config.date_format(),
        FormatKind::DateTime => config.datetime_format(),
        FormatKind::Other => return raw.to_owned(),
    };
    format_excel_serial(raw, pattern).unwrap_or_else(|| {
        warn!("cannot read '{raw}' as a date serial, keeping raw value");
        raw.to_owned()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode_with(
        sheet: &str,
        strings: &SharedStrings,
        styles: &StyleTable,
    ) -> Result<Vec<Vec<String>>, XlsxError> {
        let config = ConversionConfig::default();
        let mut decoder = RowDecoder::new(sheet.as_bytes(), strings, styles, &config);
        let mut rows = Vec::new();
        let mut expected = 1;
        while let Some(row) = decoder.next_row()? {
            assert_eq!(row.number(), expected);
            expected += 1;
            rows.push(row.into_fields());
        }
        assert_eq!(decoder.next_row()?, None);
        Ok(rows)
    }

    fn decode(sheet_data: &str) -> Result<Vec<Vec<String>>, XlsxError> {
        let sheet = format!(
            r#"<?xml version="1.0" encoding="UTF-8"?>
<worksheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main">
<dimension ref="A1:C5"/><sheetData>{sheet_data}</sheetData></worksheet>"#
        );
        decode_with(&sheet, &SharedStrings::default(), &StyleTable::default())
    }

    fn row(fields: &[&str]) -> Vec<String> {
        fields.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_shared_string_and_styles() {
        let strings = SharedStrings::from(vec!["A".to_owned(), "B".to_owned(), "Hello".to_owned()]);
        let styles = StyleTable::from(vec![
            FormatKind::Other,
            FormatKind::Date,
            FormatKind::DateTime,
        ]);
        let sheet = r#"<worksheet><sheetData>
            <row r="1">
                <c r="A1" t="s"><v>2</v></c>
                <c r="B1" s="1"><v>44197</v></c>
                <c r="C1" s="2"><v>44197.5</v></c>
                <c r="D1" s="0"><v>44197</v></c>
                <c r="E1" t="s"><v>7</v></c>
                <c r="F1"><v>1.5</v></c>
                <c r="G1" s="1" t="str"><v>not a date</v></c>
            </row>
        </sheetData></worksheet>"#;
        let rows = decode_with(sheet, &strings, &styles).unwrap();
        assert_eq!(
            rows,
            vec![row(&[
                "Hello",
                "01.01.2021",
                "01.01.2021 12:00",
                "44197",
                "7",
                "1.5",
                "not a date"
            ])]
        );
    }

    #[test]
    fn test_row_gaps_are_blank_rows() {
        let rows = decode(
            r#"<row r="1"><c r="A1"><v>1</v></c></row>
               <row r="3"><c r="A3"><v>3</v></c><c r="B3"><v>3</v></c></row>
               <row r="5"><c r="C5"><v>5</v></c></row>"#,
        )
        .unwrap();
        assert_eq!(
            rows,
            vec![
                row(&["1"]),
                row(&["", ""]),
                row(&["3", "3"]),
                row(&["", "", ""]),
                row(&["", "", "5"]),
            ]
        );
    }

    #[test]
    fn test_blank_row_records() {
        let sheet = r#"<worksheet><sheetData>
            <row r="2"><c r="A2"><v>a</v></c><c r="B2"/></row>
            <row r="3"><c r="A3"/></row>
        </sheetData></worksheet>"#;
        let config = ConversionConfig::default();
        let (strings, styles) = (SharedStrings::default(), StyleTable::default());
        let mut decoder = RowDecoder::new(sheet.as_bytes(), &strings, &styles, &config);

        let first = decoder.next_row().unwrap().unwrap();
        assert_eq!(first, RowRecord::new(1, row(&["", ""])));
        assert!(first.is_blank());
        let second = decoder.next_row().unwrap().unwrap();
        assert_eq!(second, RowRecord::new(2, row(&["a", ""])));
        assert!(!second.is_blank());
        let third = decoder.next_row().unwrap().unwrap();
        assert_eq!(third.number(), 3);
        assert!(third.is_blank());
        assert_eq!(decoder.next_row().unwrap(), None);
    }

    #[test]
    fn test_leading_blank_rows() {
        let rows = decode(r#"<row r="3"><c r="B3"><v>x</v></c></row>"#).unwrap();
        assert_eq!(rows, vec![row(&["", ""]), row(&["", ""]), row(&["", "x"])]);
    }

    #[test]
    fn test_column_gaps_past_z() {
        let rows = decode(r#"<row r="1"><c r="Y1"><v>y</v></c><c r="AB1"><v>ab</v></c></row>"#)
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].len(), 28);
        assert_eq!(rows[0][24], "y");
        assert_eq!(rows[0][27], "ab");
        assert!(rows[0][..24].iter().all(String::is_empty));
        assert!(rows[0][25..27].iter().all(String::is_empty));
    }

    #[test]
    fn test_cells_without_value() {
        let rows = decode(
            r#"<row r="1"><c r="A1"><v>a</v></c><c r="C1" s="0"/><c><f>SUM(A1)</f></c><c r="F1"><v>f</v></c><c r="H1"/></row>"#,
        )
        .unwrap();
        assert_eq!(rows, vec![row(&["a", "", "", "", "", "f", "", ""])]);
    }

    #[test]
    fn test_empty_rows() {
        let rows = decode(r#"<row r="1"/><row r="2" spans="1:1"></row><row r="4"/>"#).unwrap();
        assert_eq!(rows, vec![row(&[]), row(&[]), row(&[]), row(&[])]);
    }

    #[test]
    fn test_inline_strings_and_entities() {
        let rows = decode(
            r#"<row r="1"><c r="A1" t="inlineStr"><is><t>a &amp; b</t></is></c><c r="B1" t="str"><v>x&lt;y</v></c></row>"#,
        )
        .unwrap();
        assert_eq!(rows, vec![row(&["a & b", "x<y"])]);
    }

    #[test]
    fn test_namespaced_worksheet() {
        let sheet = r#"<x:worksheet xmlns:x="http://schemas.openxmlformats.org/spreadsheetml/2006/main"><x:sheetData>
            <x:row r="2"><x:c r="B2"><x:v>1</x:v></x:c></x:row>
        </x:sheetData></x:worksheet>"#;
        let rows = decode_with(sheet, &SharedStrings::default(), &StyleTable::default()).unwrap();
        assert_eq!(rows, vec![row(&["", ""]), row(&["", "1"])]);
    }

    #[test]
    fn test_no_sheet_data() {
        assert!(decode("").unwrap().is_empty());
        let rows = decode_with("<worksheet/>", &SharedStrings::default(), &StyleTable::default());
        assert!(rows.unwrap().is_empty());
    }

    #[test]
    fn test_malformed_rows() {
        assert!(matches!(
            decode(r#"<row><c r="A1"><v>1</v></c></row>"#),
            Err(XlsxError::MissingAttribute { node: "row", .. })
        ));
        assert!(matches!(
            decode(r#"<row r="x1"><c r="A1"><v>1</v></c></row>"#),
            Err(XlsxError::RowNumber(_))
        ));
        assert!(matches!(
            decode(r#"<row r="0"/>"#),
            Err(XlsxError::RowNumber(_))
        ));
        assert!(matches!(
            decode(r#"<row r="2"/><row r="2"/>"#),
            Err(XlsxError::RowOutOfOrder { row: 2, expected: 3 })
        ));
        assert!(matches!(
            decode(r#"<row r="1"><c><v>1</v></c></row>"#),
            Err(XlsxError::MissingAttribute { node: "c", .. })
        ));
        assert!(matches!(
            decode(r#"<row r="1"><c r="B1"><v>1</v></c><c r="A1"><v>1</v></c></row>"#),
            Err(XlsxError::CellOutOfOrder(_))
        ));
        assert!(matches!(
            decode(r#"<row r="1"><c r="XFE1"><v>1</v></c></row>"#),
            Err(XlsxError::ColumnOutOfRange(_))
        ));
        assert!(decode(r#"<row r="1"><c r="A1"><v>1</c></row>"#).is_err());
    }
}
