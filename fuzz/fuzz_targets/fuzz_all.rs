#![no_main]
use libfuzzer_sys::fuzz_target;
use xlsx_csv::{
    read_shared_strings, read_style_table, ConversionConfig, CsvWriter, RowDecoder,
    SharedStrings, StyleTable,
};

fuzz_target!(|data: &[u8]| {
    // the same bytes are read as each of the three parts
    let strings = read_shared_strings(data).unwrap_or_default();
    let styles = read_style_table(data).unwrap_or_default();
    let config = ConversionConfig::default();
    let mut writer = CsvWriter::new(std::io::sink(), &config);
    for (strings, styles) in [
        (&strings, &styles),
        (&SharedStrings::default(), &StyleTable::default()),
    ] {
        let mut rows = RowDecoder::new(data, strings, styles, &config);
        while let Ok(Some(row)) = rows.next_row() {
            if writer.write_row(row.fields()).is_err() {
                return;
            }
        }
    }
});
