//! Csv serialization of decoded rows

use std::borrow::Cow;
use std::io::{self, Write};

use crate::config::ConversionConfig;

/// Writes rows as csv lines terminated by `\n`
///
/// A field is wrapped in quotes when it contains the delimiter, the quote,
/// the escape character, a null byte, a space, a tab or a line break. Quotes
/// inside a quoted field are doubled, except the ones already preceded by the
/// escape character.
pub struct CsvWriter<W: Write> {
    inner: W,
    delimiter: char,
    quote: char,
    escape: char,
    line: String,
}

impl<W: Write> CsvWriter<W> {
    /// Creates a writer using the characters of `config`
    pub fn new(inner: W, config: &ConversionConfig) -> Self {
        CsvWriter {
            inner,
            delimiter: config.delimiter(),
            quote: config.quote(),
            escape: config.escape(),
            line: String::with_capacity(1024),
        }
    }

    /// Writes one line
    pub fn write_row<S: AsRef<str>>(&mut self, fields: &[S]) -> io::Result<()> {
        self.line.clear();
        for (i, field) in fields.iter().enumerate() {
            if i > 0 {
                self.line.push(self.delimiter);
            }
            let field = escape_field(field.as_ref(), self.delimiter, self.quote, self.escape);
            self.line.push_str(&field);
        }
        self.line.push('\n');
        self.inner.write_all(self.line.as_bytes())
    }

    /// Flushes the underlying writer
    pub fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }

    /// Unwraps the underlying writer
    pub fn into_inner(self) -> W {
        self.inner
    }
}

fn needs_quotes(field: &str, delimiter: char, quote: char, escape: char) -> bool {
    field.chars().any(|c| {
        matches!(c, ' ' | '\t' | '\n' | '\r' | '\0') || c == delimiter || c == quote || c == escape
    })
}

/// Quotes a field if needed
pub fn escape_field(field: &str, delimiter: char, quote: char, escape: char) -> Cow<'_, str> {
    if !needs_quotes(field, delimiter, quote, escape) {
        return Cow::Borrowed(field);
    }
    let mut doubled = String::with_capacity(2 * quote.len_utf8());
    doubled.push(quote);
    doubled.push(quote);
    let mut fixed = field.replace(quote, &doubled);
    if quote != escape {
        let mut escaped = String::with_capacity(escape.len_utf8() + quote.len_utf8());
        escaped.push(escape);
        escaped.push(quote);
        fixed = fixed.replace(&escaped, escape.encode_utf8(&mut [0; 4]));
    }
    let mut quoted = String::with_capacity(fixed.len() + 2 * quote.len_utf8());
    quoted.push(quote);
    quoted.push_str(&fixed);
    quoted.push(quote);
    Cow::Owned(quoted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn line(fields: &[&str], config: &ConversionConfig) -> String {
        let mut writer = CsvWriter::new(Vec::new(), config);
        writer.write_row(fields).unwrap();
        String::from_utf8(writer.into_inner()).unwrap()
    }

    #[rstest]
    #[case("plain", "plain")]
    #[case("", "")]
    #[case("12.5", "12.5")]
    #[case("a;b", "\"a;b\"")]
    #[case("say \"hi\"", "\"say \"\"hi\"\"\"")]
    #[case("two\nlines", "\"two\nlines\"")]
    #[case("cr\r", "\"cr\r\"")]
    #[case("tab\there", "\"tab\there\"")]
    #[case("with space", "\"with space\"")]
    #[case("nul\0", "\"nul\0\"")]
    #[case("back\\slash", "\"back\\slash\"")]
    #[case("esc\\\"aped", "\"esc\\\"aped\"")]
    #[case("a,b", "a,b")]
    fn test_escape_field(#[case] field: &str, #[case] expected: &str) {
        assert_eq!(escape_field(field, ';', '"', '\\'), expected);
    }

    #[test]
    fn test_quote_equals_escape() {
        assert_eq!(escape_field("a\"b", ';', '"', '"'), "\"a\"\"b\"");
    }

    #[test]
    fn test_write_row() {
        let config = ConversionConfig::default();
        assert_eq!(line(&["a", "b c", "", "d"], &config), "a;\"b c\";;d\n");
        assert_eq!(line(&[], &config), "\n");
        assert_eq!(line(&["", ""], &config), ";\n");
    }

    #[test]
    fn test_custom_characters() {
        let config = ConversionConfig::default()
            .with_delimiter('\t')
            .with_quote('\'');
        assert_eq!(line(&["a;b", "it's", "x"], &config), "a;b\t'it''s'\tx\n");
        let config = ConversionConfig::default().with_delimiter(',');
        assert_eq!(line(&["a,b", "a;b"], &config), "\"a,b\",a;b\n");
    }
}
