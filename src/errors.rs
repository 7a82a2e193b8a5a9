//! Error management module
//!
//! Provides all conversion errors. Every error is fatal: a conversion
//! either fully succeeds or stops at the first error.

use std::fmt;
use std::path::PathBuf;

use zip::result::ZipError;

use crate::xlsx::XlsxError;

/// A struct to handle any error of a conversion
#[derive(Debug)]
pub enum Error {
    /// The spreadsheet package does not exist
    InputNotFound(PathBuf),
    /// The package cannot be opened or is not a valid archive
    Extraction(ZipError),
    /// A working or destination directory cannot be created
    DirectoryCreate {
        /// directory
        path: PathBuf,
        /// underlying error
        source: std::io::Error,
    },
    /// The csv file cannot be created or written
    OutputWrite {
        /// csv path
        path: PathBuf,
        /// underlying error
        source: std::io::Error,
    },
    /// A worksheet, shared strings or styles part is malformed
    Xml(XlsxError),
    /// The requested worksheet is not part of the package
    WorksheetNotFound(usize),
    /// Invalid conversion settings
    Config(&'static str),
}

from_err!(ZipError, Error, Extraction);
from_err!(XlsxError, Error, Xml);

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::InputNotFound(p) => write!(f, "File not found '{}'", p.display()),
            Error::Extraction(e) => write!(f, "Cannot extract package: {e}"),
            Error::DirectoryCreate { path, source } => {
                write!(f, "Directory '{}' was not created: {source}", path.display())
            }
            Error::OutputWrite { path, source } => {
                write!(f, "Unable to write csv file '{}': {source}", path.display())
            }
            Error::Xml(e) => write!(f, "Xlsx error: {e}"),
            Error::WorksheetNotFound(n) => write!(f, "Worksheet {n} not found"),
            Error::Config(e) => write!(f, "Invalid configuration: {e}"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Extraction(e) => Some(e),
            Error::DirectoryCreate { source, .. } => Some(source),
            Error::OutputWrite { source, .. } => Some(source),
            Error::Xml(e) => Some(e),
            _ => None,
        }
    }
}
