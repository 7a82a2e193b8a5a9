mod node;
mod rows_reader;
mod style_parser;

use std::fmt;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use log::{debug, warn};
use quick_xml::events::Event;
use quick_xml::Reader as XmlReader;
use tempfile::TempDir;
use zip::read::ZipArchive;
use zip::result::ZipError;

use crate::errors::Error;

pub use node::XmlNode;
pub use rows_reader::{RowDecoder, RowRecord};
pub use style_parser::{read_style_table, StyleTable};

pub(crate) type XlReader<R> = XmlReader<R>;

/// Maximum number of rows allowed in an xlsx file
pub const MAX_ROWS: u32 = 1_048_576;

/// Maximum number of columns allowed in an xlsx file
pub const MAX_COLUMNS: u32 = 16_384;

/// Path of the shared strings part inside the package
pub const SHARED_STRINGS_PART: &str = "xl/sharedStrings.xml";

/// Path of the styles part inside the package
pub const STYLES_PART: &str = "xl/styles.xml";

/// Path of the `n`th (1 based) worksheet part inside the package
pub fn worksheet_part(sheet: usize) -> String {
    format!("xl/worksheets/sheet{sheet}.xml")
}

/// An enum for errors raised while reading the xml parts of a package
#[derive(Debug)]
pub enum XlsxError {
    /// Io error
    Io(std::io::Error),
    /// Xml error
    Xml(quick_xml::Error),
    /// Xml attribute error
    XmlAttr(quick_xml::events::attributes::AttrError),
    /// XML Encoding error
    Encoding(quick_xml::encoding::EncodingError),
    /// Unexpected end of xml
    XmlEof(&'static str),
    /// Element not closed before the end of the part
    UnclosedElement(String),
    /// Entity reference which is neither a character nor a predefined entity
    UnknownEntity(String),
    /// Required attribute missing
    MissingAttribute {
        /// node name
        node: &'static str,
        /// attribute name
        attr: &'static str,
    },
    /// Expecting alphanumeric character
    Alphanumeric(u8),
    /// Numeric column
    NumericColumn(u8),
    /// There is no column component in the range string
    RangeWithoutColumnComponent,
    /// There is no row component in the range string
    RangeWithoutRowComponent,
    /// Row 'r' attribute is not a positive integer
    RowNumber(String),
    /// Row numbers must strictly increase
    RowOutOfOrder {
        /// row number found
        row: u32,
        /// smallest row number expected
        expected: u32,
    },
    /// Cell columns must strictly increase within a row
    CellOutOfOrder(String),
    /// Cell beyond the last column of a worksheet (`XFD`)
    ColumnOutOfRange(String),
    /// Unexpected error
    Unexpected(&'static str),
}

from_err!(std::io::Error, XlsxError, Io);
from_err!(quick_xml::Error, XlsxError, Xml);
from_err!(
    quick_xml::events::attributes::AttrError,
    XlsxError,
    XmlAttr
);
from_err!(quick_xml::encoding::EncodingError, XlsxError, Encoding);

impl fmt::Display for XlsxError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            XlsxError::Io(e) => write!(f, "I/O error: {e}"),
            XlsxError::Xml(e) => write!(f, "Xml error: {e}"),
            XlsxError::XmlAttr(e) => write!(f, "Xml attribute error: {e}"),
            XlsxError::Encoding(e) => write!(f, "XML encoding error: {e}"),
            XlsxError::XmlEof(e) => write!(f, "Unexpected end of xml, expecting '</{e}>'"),
            XlsxError::UnclosedElement(e) => write!(f, "Element '{e}' is never closed"),
            XlsxError::UnknownEntity(e) => write!(f, "Unknown entity reference '&{e};'"),
            XlsxError::MissingAttribute { node, attr } => {
                write!(f, "Node '{node}' is missing the '{attr}' attribute")
            }
            XlsxError::Alphanumeric(e) => {
                write!(f, "Expecting alphanumeric character, got {e:X}")
            }
            XlsxError::NumericColumn(e) => write!(
                f,
                "Numeric character is not allowed for column name, got {e}",
            ),
            XlsxError::RangeWithoutColumnComponent => {
                write!(f, "Range is missing the expected column component.")
            }
            XlsxError::RangeWithoutRowComponent => {
                write!(f, "Range is missing the expected row component.")
            }
            XlsxError::RowNumber(e) => write!(f, "Invalid row number '{e}'"),
            XlsxError::RowOutOfOrder { row, expected } => {
                write!(f, "Row {row} found while expecting row {expected} or later")
            }
            XlsxError::CellOutOfOrder(e) => {
                write!(f, "Cell '{e}' is not after the previous cell of its row")
            }
            XlsxError::ColumnOutOfRange(e) => {
                write!(f, "Cell '{e}' is beyond column {MAX_COLUMNS}")
            }
            XlsxError::Unexpected(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for XlsxError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            XlsxError::Io(e) => Some(e),
            XlsxError::Xml(e) => Some(e),
            XlsxError::XmlAttr(e) => Some(e),
            XlsxError::Encoding(e) => Some(e),
            _ => None,
        }
    }
}

/// An extracted spreadsheet package
///
/// The archive is unpacked once into a temporary directory owned by this
/// value. The directory is unique per package and removed when the value is
/// dropped, whatever the outcome of the conversions made with it.
#[derive(Debug)]
pub struct Package {
    dir: TempDir,
    /// Names of the extracted entries, as found in the archive
    names: Vec<String>,
}

impl Package {
    /// Extracts the package found at `path`.
    pub fn extract<P: AsRef<Path>>(path: P) -> Result<Package, Error> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(Error::InputNotFound(path.to_path_buf()));
        }
        let file = File::open(path).map_err(ZipError::Io)?;
        let mut zip = ZipArchive::new(file)?;
        let names = zip.file_names().map(str::to_owned).collect::<Vec<_>>();
        let dir = tempfile::Builder::new()
            .prefix("xlsx_to_csv")
            .tempdir()
            .map_err(|source| Error::DirectoryCreate {
                path: std::env::temp_dir(),
                source,
            })?;
        zip.extract(dir.path())?;
        debug!(
            "extracted {} entries of '{}' into '{}'",
            names.len(),
            path.display(),
            dir.path().display()
        );
        Ok(Package { dir, names })
    }

    /// Working directory holding the extracted parts
    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Location of an extracted part, matched case insensitively
    pub fn part_path(&self, name: &str) -> Option<PathBuf> {
        let actual = self.names.iter().find(|n| n.eq_ignore_ascii_case(name))?;
        Some(self.dir.path().join(actual))
    }

    /// Opens an extracted part for streaming
    pub fn open_part(&self, name: &str) -> Result<Option<BufReader<File>>, XlsxError> {
        match self.part_path(name) {
            Some(path) => Ok(Some(BufReader::new(File::open(path)?))),
            None => Ok(None),
        }
    }

    /// Removes the working directory, reporting any failure
    pub fn close(self) -> std::io::Result<()> {
        self.dir.close()
    }
}

/// Wraps a part into a pull parser configured for spreadsheet parts
pub(crate) fn xml_reader<R: BufRead>(reader: R) -> XlReader<R> {
    let mut r = XmlReader::from_reader(reader);
    let config = r.config_mut();
    config.check_end_names = true;
    config.trim_text(false);
    config.check_comments = false;
    config.expand_empty_elements = true;
    r
}

/// Ordered table of the package shared strings
///
/// Index in the table is the id cells of type `s` refer to.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SharedStrings {
    strings: Vec<String>,
}

impl SharedStrings {
    /// Number of strings
    pub fn len(&self) -> usize {
        self.strings.len()
    }

    /// Is the table empty
    pub fn is_empty(&self) -> bool {
        self.strings.is_empty()
    }

    /// String at `idx`
    pub fn get(&self, idx: usize) -> Option<&str> {
        self.strings.get(idx).map(String::as_str)
    }

    /// Resolves a shared string reference as found in a `v` node.
    ///
    /// A reference which is not a valid index is kept as literal text.
    pub fn resolve<'a>(&'a self, raw: &'a str) -> &'a str {
        match atoi_simd::parse::<usize>(raw.as_bytes())
            .ok()
            .and_then(|idx| self.get(idx))
        {
            Some(s) => s,
            None => {
                warn!(
                    "shared string '{raw}' out of range ({} strings), keeping raw value",
                    self.len()
                );
                raw
            }
        }
    }
}

impl From<Vec<String>> for SharedStrings {
    fn from(strings: Vec<String>) -> Self {
        SharedStrings { strings }
    }
}

/// Reads the shared strings part, in document order
pub fn read_shared_strings<R: BufRead>(reader: R) -> Result<SharedStrings, XlsxError> {
    let mut xml = xml_reader(reader);
    let mut strings = Vec::new();
    let mut buf = Vec::with_capacity(1024);
    loop {
        buf.clear();
        match xml.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) if e.local_name().as_ref() == b"si" => {
                let node = XmlNode::read(&mut xml, e)?;
                strings.push(read_string(&node));
            }
            Ok(Event::End(ref e)) if e.local_name().as_ref() == b"sst" => break,
            Ok(Event::Eof) => return Err(XlsxError::XmlEof("sst")),
            Err(e) => return Err(XlsxError::Xml(e)),
            _ => (),
        }
    }
    debug!("read {} shared strings", strings.len());
    Ok(SharedStrings { strings })
}

/// Text of either a simple or a richtext string node (`si` or `is`)
pub(crate) fn read_string(node: &XmlNode) -> String {
    if let Some(t) = node.child("t") {
        return t.text().unwrap_or_default().to_owned();
    }
    // richtext has multiple <r> runs, phonetic <rPh> runs are skipped
    let mut value = String::new();
    for run in node.children("r") {
        if let Some(t) = run.child("t") {
            value.push_str(t.raw_text());
        }
    }
    value.trim().to_owned()
}

/// A cell position, 0 based
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CellAddress {
    /// Row index, `0` is row `1`
    pub row: u32,
    /// Column index, `0` is column `A`
    pub column: u32,
}

impl CellAddress {
    /// Parses a cell reference such as `C7`
    pub fn parse(range: &[u8]) -> Result<CellAddress, XlsxError> {
        let (row, column) = get_row_column(range)?;
        Ok(CellAddress { row, column })
    }

    /// Column letters of this address
    pub fn column_name(&self) -> Result<String, XlsxError> {
        column_number_to_name(self.column)
    }
}

impl FromStr for CellAddress {
    type Err = XlsxError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        CellAddress::parse(s.as_bytes())
    }
}

impl fmt::Display for CellAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let column = self.column_name().map_err(|_| fmt::Error)?;
        write!(f, "{}{}", column, self.row + 1)
    }
}

/// Converts a text range name into its position (row, column) (0 based index).
/// If the row or column component in the range is missing, an Error is returned.
pub(crate) fn get_row_column(range: &[u8]) -> Result<(u32, u32), XlsxError> {
    let (row, col) = get_row_and_optional_column(range)?;
    let col = col.ok_or(XlsxError::RangeWithoutColumnComponent)?;
    Ok((row, col))
}

/// Converts a text range name into its position (row, column) (0 based index).
/// If the row component in the range is missing, an Error is returned.
/// If the column component in the range is missing, an None is returned for the column.
fn get_row_and_optional_column(range: &[u8]) -> Result<(u32, Option<u32>), XlsxError> {
    let (mut row, mut col) = (0u32, 0u32);
    let mut pow = 1u32;
    let mut readrow = true;
    for c in range.iter().rev() {
        match *c {
            c @ b'0'..=b'9' => {
                if readrow {
                    row = ((c - b'0') as u32)
                        .checked_mul(pow)
                        .and_then(|d| row.checked_add(d))
                        .ok_or(XlsxError::Unexpected("row number overflow"))?;
                    pow = pow.saturating_mul(10);
                } else {
                    return Err(XlsxError::NumericColumn(c));
                }
            }
            c @ (b'A'..=b'Z' | b'a'..=b'z') => {
                if readrow {
                    if row == 0 {
                        return Err(XlsxError::RangeWithoutRowComponent);
                    }
                    pow = 1;
                    readrow = false;
                }
                let digit = (c.to_ascii_uppercase() - b'A') as u32 + 1;
                col = digit
                    .checked_mul(pow)
                    .and_then(|d| col.checked_add(d))
                    .ok_or(XlsxError::Unexpected("column number overflow"))?;
                pow = pow.saturating_mul(26);
            }
            _ => return Err(XlsxError::Alphanumeric(*c)),
        }
    }
    let row = row
        .checked_sub(1)
        .ok_or(XlsxError::RangeWithoutRowComponent)?;
    if row >= MAX_ROWS {
        warn!("row {} is above the maximum number of rows ({MAX_ROWS})", row + 1);
    }
    Ok((row, col.checked_sub(1)))
}

/// Converts column letters (`A`, `AB`...) into a 0 based column index
pub fn column_name_to_number(name: &str) -> Result<u32, XlsxError> {
    if name.is_empty() {
        return Err(XlsxError::RangeWithoutColumnComponent);
    }
    let mut col = 0u32;
    for c in name.bytes() {
        if !c.is_ascii_alphabetic() {
            return Err(XlsxError::Alphanumeric(c));
        }
        col = col
            .checked_mul(26)
            .and_then(|n| n.checked_add((c.to_ascii_uppercase() - b'A') as u32 + 1))
            .ok_or(XlsxError::Unexpected("column number overflow"))?;
    }
    Ok(col - 1)
}

/// Convert the 0 based column index to Excelsheet column title.
/// If the column number not in 1~16384, an Error is returned.
pub fn column_number_to_name(num: u32) -> Result<String, XlsxError> {
    if num >= MAX_COLUMNS {
        return Err(XlsxError::Unexpected("column number overflow"));
    }
    let mut col: Vec<u8> = Vec::new();
    let mut num = num + 1;
    while num > 0 {
        let integer = ((num - 1) % 26 + 65) as u8;
        col.push(integer);
        num = (num - 1) / 26;
    }
    col.reverse();
    Ok(col.into_iter().map(char::from).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::io::Write;
    use zip::write::SimpleFileOptions;
    use zip::ZipWriter;

    #[test]
    fn test_cell_address() {
        assert_eq!(get_row_column(b"A1").unwrap(), (0, 0));
        assert_eq!(get_row_column(b"C107").unwrap(), (106, 2));
        assert_eq!(
            "C7".parse::<CellAddress>().unwrap(),
            CellAddress { row: 6, column: 2 }
        );
        assert_eq!(
            CellAddress::parse(b"XFD1048576").unwrap(),
            CellAddress {
                row: 1_048_575,
                column: 16_383
            }
        );
        assert_eq!(CellAddress { row: 26, column: 27 }.to_string(), "AB27");
    }

    #[test]
    fn test_cell_address_errors() {
        assert!(matches!(
            get_row_column(b"12"),
            Err(XlsxError::RangeWithoutColumnComponent)
        ));
        assert!(matches!(
            get_row_column(b"AB"),
            Err(XlsxError::RangeWithoutRowComponent)
        ));
        assert!(matches!(
            get_row_column(b"A1B2"),
            Err(XlsxError::NumericColumn(b'1'))
        ));
        assert!(matches!(
            get_row_column(b"A-1"),
            Err(XlsxError::Alphanumeric(b'-'))
        ));
        assert!(get_row_column(b"A99999999999").is_err());
    }

    #[rstest]
    #[case(0, "A")]
    #[case(25, "Z")]
    #[case(26, "AA")]
    #[case(27, "AB")]
    #[case(701, "ZZ")]
    #[case(702, "AAA")]
    #[case(MAX_COLUMNS - 1, "XFD")]
    fn test_column_names(#[case] number: u32, #[case] name: &str) {
        assert_eq!(column_number_to_name(number).unwrap(), name);
        assert_eq!(column_name_to_number(name).unwrap(), number);
        assert_eq!(
            column_name_to_number(&name.to_ascii_lowercase()).unwrap(),
            number
        );
    }

    #[test]
    fn test_column_name_errors() {
        assert!(column_number_to_name(MAX_COLUMNS).is_err());
        assert!(column_name_to_number("").is_err());
        assert!(column_name_to_number("A1").is_err());
    }

    #[test]
    fn test_read_shared_strings_with_namespaced_si_name() {
        let shared_strings_data = br#"<?xml version="1.0" encoding="utf-8"?>
<x:sst count="1187" uniqueCount="1187" xmlns:x="http://schemas.openxmlformats.org/spreadsheetml/2006/main">
    <x:si>
        <x:t>String 1</x:t>
    </x:si>
    <x:si>
        <x:r>
            <x:rPr>
                <x:sz val="11"/>
            </x:rPr>
            <x:t>String </x:t>
        </x:r>
        <x:r>
            <x:t>2</x:t>
        </x:r>
        <x:rPh sb="0" eb="1">
            <x:t>phonetic</x:t>
        </x:rPh>
    </x:si>
    <x:si>
        <x:r>
            <x:t>String 3</x:t>
        </x:r>
    </x:si>
    <x:si/>
</x:sst>"#;

        let strings = read_shared_strings(&shared_strings_data[..]).unwrap();
        assert_eq!(strings.len(), 4);
        assert_eq!(strings.get(0), Some("String 1"));
        assert_eq!(strings.get(1), Some("String 2"));
        assert_eq!(strings.get(2), Some("String 3"));
        assert_eq!(strings.get(3), Some(""));
        assert_eq!(strings.get(4), None);
    }

    #[test]
    fn test_shared_strings_keep_order_and_duplicates() {
        let data = b"<sst><si><t>b</t></si><si><t>a</t></si><si><t>b</t></si></sst>";
        let strings = read_shared_strings(&data[..]).unwrap();
        assert_eq!(
            strings,
            SharedStrings::from(vec!["b".to_owned(), "a".to_owned(), "b".to_owned()])
        );
    }

    #[test]
    fn test_shared_strings_errors() {
        assert!(read_shared_strings(&b"<sst><si><t>a</si></sst>"[..]).is_err());
        assert!(matches!(
            read_shared_strings(&b"<sst><si><t>a</t></si>"[..]),
            Err(XlsxError::XmlEof("sst"))
        ));
    }

    #[test]
    fn test_resolve_shared_string() {
        let strings = SharedStrings::from(vec!["A".to_owned(), "B".to_owned(), "Hello".to_owned()]);
        assert_eq!(strings.resolve("2"), "Hello");
        assert_eq!(strings.resolve("3"), "3");
        assert_eq!(strings.resolve("x"), "x");
        assert_eq!(strings.resolve(""), "");
    }

    fn write_package(path: &Path, parts: &[(&str, &str)]) {
        let file = File::create(path).unwrap();
        let mut zip_writer = ZipWriter::new(file);
        let options =
            SimpleFileOptions::default().compression_method(zip::CompressionMethod::Stored);
        for (name, content) in parts {
            zip_writer.start_file(*name, options).unwrap();
            zip_writer.write_all(content.as_bytes()).unwrap();
        }
        zip_writer.finish().unwrap();
    }

    #[test]
    fn test_package_extract() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("book.xlsx");
        write_package(
            &path,
            &[
                ("xl/sharedstrings.xml", "<sst><si><t>x</t></si></sst>"),
                ("xl/worksheets/sheet1.xml", "<worksheet/>"),
            ],
        );

        let package = Package::extract(&path).unwrap();
        let work_dir = package.path().to_path_buf();
        assert!(work_dir.is_dir());

        let strings = package.open_part(SHARED_STRINGS_PART).unwrap().unwrap();
        assert_eq!(read_shared_strings(strings).unwrap().get(0), Some("x"));
        assert!(package.part_path(&worksheet_part(1)).unwrap().is_file());
        assert!(package.part_path(&worksheet_part(2)).is_none());
        assert!(package.open_part(STYLES_PART).unwrap().is_none());

        drop(package);
        assert!(!work_dir.exists());
    }

    #[test]
    fn test_packages_do_not_share_directories() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("book.xlsx");
        write_package(&path, &[("xl/worksheets/sheet1.xml", "<worksheet/>")]);

        let first = Package::extract(&path).unwrap();
        let second = Package::extract(&path).unwrap();
        assert_ne!(first.path(), second.path());
        first.close().unwrap();
        assert!(second.path().is_dir());
    }

    #[test]
    fn test_package_errors() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            Package::extract(dir.path().join("missing.xlsx")),
            Err(Error::InputNotFound(_))
        ));

        let path = dir.path().join("not_a_zip.xlsx");
        std::fs::write(&path, b"definitely not a zip archive").unwrap();
        assert!(matches!(
            Package::extract(&path),
            Err(Error::Extraction(_))
        ));
    }
}
