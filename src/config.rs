//! Conversion settings

use chrono::format::{Item, StrftimeItems};

use crate::errors::Error;

/// Settings of one conversion: csv characters and date patterns
///
/// Date patterns use the chrono strftime syntax.
///
/// # Examples
/// ```
/// use xlsx_csv::ConversionConfig;
///
/// let config = ConversionConfig::default()
///     .with_delimiter(',')
///     .with_date_format("%Y-%m-%d");
/// assert!(config.validate().is_ok());
/// assert_eq!(config.quote(), '"');
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversionConfig {
    delimiter: char,
    quote: char,
    escape: char,
    date_format: String,
    datetime_format: String,
}

impl Default for ConversionConfig {
    fn default() -> Self {
        ConversionConfig {
            delimiter: ';',
            quote: '"',
            escape: '\\',
            date_format: "%d.%m.%Y".to_owned(),
            datetime_format: "%d.%m.%Y %H:%M".to_owned(),
        }
    }
}

impl ConversionConfig {
    /// Field separator
    pub fn delimiter(&self) -> char {
        self.delimiter
    }

    /// Character wrapping fields which need quoting
    pub fn quote(&self) -> char {
        self.quote
    }

    /// Escape character
    pub fn escape(&self) -> char {
        self.escape
    }

    /// Pattern of cells formatted as dates
    pub fn date_format(&self) -> &str {
        &self.date_format
    }

    /// Pattern of cells formatted as dates with a time of day
    pub fn datetime_format(&self) -> &str {
        &self.datetime_format
    }

    /// Sets the field separator
    pub fn with_delimiter(mut self, delimiter: char) -> Self {
        self.delimiter = delimiter;
        self
    }

    /// Sets the quote character
    pub fn with_quote(mut self, quote: char) -> Self {
        self.quote = quote;
        self
    }

    /// Sets the escape character
    pub fn with_escape(mut self, escape: char) -> Self {
        self.escape = escape;
        self
    }

    /// Sets the date pattern
    pub fn with_date_format<S: Into<String>>(mut self, format: S) -> Self {
        self.date_format = format.into();
        self
    }

    /// Sets the datetime pattern
    pub fn with_datetime_format<S: Into<String>>(mut self, format: S) -> Self {
        self.datetime_format = format.into();
        self
    }

    /// Checks the settings can produce a readable csv
    pub fn validate(&self) -> Result<(), Error> {
        if self.delimiter == self.quote {
            return Err(Error::Config("delimiter and quote must differ"));
        }
        if matches!(self.delimiter, '\n' | '\r') || matches!(self.quote, '\n' | '\r') {
            return Err(Error::Config("delimiter and quote cannot be line breaks"));
        }
        if !is_valid_pattern(&self.date_format) {
            return Err(Error::Config("invalid date format"));
        }
        if !is_valid_pattern(&self.datetime_format) {
            return Err(Error::Config("invalid datetime format"));
        }
        Ok(())
    }
}

fn is_valid_pattern(pattern: &str) -> bool {
    !pattern.is_empty() && StrftimeItems::new(pattern).all(|item| !matches!(item, Item::Error))
}
