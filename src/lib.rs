//! Rust xlsx to csv converter
//!
//! # Status
//!
//! **xlsx-csv** is a pure Rust library converting one worksheet of an xlsx
//! package into a csv file.
//!
//! Rows are streamed: the worksheet is never loaded as a whole, only the
//! shared strings and the cell formats are kept in memory. Cell values are
//! decoded the way a spreadsheet displays them: shared strings are resolved
//! and numbers formatted as dates are written as dates. Rows and columns
//! omitted by the worksheet because they are empty are restored, so line `n`
//! of the csv is row `n` of the worksheet and field `n` is column `n`.
//!
//! # Examples
//! ```no_run
//! use xlsx_csv::{ConversionConfig, XlsxToCsv};
//!
//! let mut converter = XlsxToCsv::new("book.xlsx");
//!
//! // first worksheet with default settings (`;` separated, dd.mm.yyyy dates)
//! converter.convert("out/sheet1.csv", 1).expect("cannot convert sheet 1");
//!
//! // the package is extracted once, other sheets reuse it
//! let config = ConversionConfig::default()
//!     .with_delimiter(',')
//!     .with_date_format("%Y-%m-%d")
//!     .with_datetime_format("%Y-%m-%d %H:%M:%S");
//! converter
//!     .convert_with("out/sheet2.csv", 2, &config)
//!     .expect("cannot convert sheet 2");
//! ```
#![deny(missing_docs)]

#[macro_use]
mod utils;
mod config;
mod csv;
mod errors;
mod formats;
mod xlsx;

use std::fs::{self, File};
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use log::{debug, warn};

pub use crate::config::ConversionConfig;
pub use crate::csv::{escape_field, CsvWriter};
pub use crate::errors::Error;
pub use crate::formats::{detect_format_kind, format_excel_serial, FormatKind};
pub use crate::xlsx::{
    column_name_to_number, column_number_to_name, read_shared_strings, read_style_table,
    worksheet_part, CellAddress, Package, RowDecoder, RowRecord, SharedStrings, StyleTable,
    XlsxError, XmlNode, MAX_COLUMNS, MAX_ROWS, SHARED_STRINGS_PART, STYLES_PART,
};

/// Result type of all conversions
pub type Result<T> = std::result::Result<T, Error>;

/// Converts the worksheets of one xlsx file
///
/// The package is extracted on the first conversion into a working
/// directory of its own, then reused by the next conversions. The directory
/// is removed when the converter is dropped.
#[derive(Debug)]
pub struct XlsxToCsv {
    source: PathBuf,
    package: Option<Package>,
}

impl XlsxToCsv {
    /// Creates a converter for the xlsx file at `path`. Nothing is read yet.
    pub fn new<P: AsRef<Path>>(path: P) -> XlsxToCsv {
        XlsxToCsv {
            source: path.as_ref().to_path_buf(),
            package: None,
        }
    }

    /// Converts the `sheet`th worksheet (1 based) into a csv file at `dest`
    /// with the default [`ConversionConfig`]
    pub fn convert<P: AsRef<Path>>(&mut self, dest: P, sheet: usize) -> Result<()> {
        self.convert_with(dest, sheet, &ConversionConfig::default())
    }

    /// Converts the `sheet`th worksheet (1 based) into a csv file at `dest`
    pub fn convert_with<P: AsRef<Path>>(
        &mut self,
        dest: P,
        sheet: usize,
        config: &ConversionConfig,
    ) -> Result<()> {
        let dest = dest.as_ref();
        config.validate()?;
        let package = self.unpack()?;

        let worksheet = package
            .open_part(&worksheet_part(sheet))?
            .ok_or(Error::WorksheetNotFound(sheet))?;
        let strings = match package.open_part(SHARED_STRINGS_PART)? {
            Some(part) => read_shared_strings(part)?,
            None => {
                warn!("package has no shared strings");
                SharedStrings::default()
            }
        };
        let styles = match package.open_part(STYLES_PART)? {
            Some(part) => read_style_table(part)?,
            None => {
                warn!("package has no styles");
                StyleTable::default()
            }
        };

        if let Some(dir) = dest.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir).map_err(|source| Error::DirectoryCreate {
                path: dir.to_path_buf(),
                source,
            })?;
        }
        let write_error = |source| Error::OutputWrite {
            path: dest.to_path_buf(),
            source,
        };
        let file = File::create(dest).map_err(write_error)?;
        let mut writer = CsvWriter::new(BufWriter::new(file), config);

        let mut rows = RowDecoder::new(worksheet, &strings, &styles, config);
        let mut count = 0usize;
        while let Some(row) = rows.next_row()? {
            writer.write_row(row.fields()).map_err(write_error)?;
            count += 1;
        }
        writer.flush().map_err(write_error)?;
        debug!("wrote {count} rows of sheet {sheet} to '{}'", dest.display());
        Ok(())
    }

    /// Extracted package, extracting it on first call
    fn unpack(&mut self) -> Result<&Package> {
        let package = match self.package.take() {
            Some(package) => package,
            None => Package::extract(&self.source)?,
        };
        Ok(self.package.insert(package))
    }

    /// Removes the working directory now, reporting any failure.
    ///
    /// Dropping the converter also removes it, silently.
    pub fn close(mut self) -> std::io::Result<()> {
        match self.package.take() {
            Some(package) => package.close(),
            None => Ok(()),
        }
    }
}

/// Converts the `sheet`th worksheet (1 based) of the xlsx file at `src` into
/// a csv file at `dest`
pub fn convert_xlsx_to_csv<P, Q>(
    src: P,
    dest: Q,
    sheet: usize,
    config: &ConversionConfig,
) -> Result<()>
where
    P: AsRef<Path>,
    Q: AsRef<Path>,
{
    XlsxToCsv::new(src).convert_with(dest, sheet, config)
}
