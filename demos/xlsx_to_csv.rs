use std::env;
use std::path::PathBuf;
use std::process;

use xlsx_csv::{ConversionConfig, XlsxToCsv};

// usage: xlsx_to_csv <file.xlsx> [sheet number] [output.csv]
//
// converts one worksheet (the first by default) into a csv next to the
// xlsx file, silently overriding any existing file
fn main() {
    env_logger::init();

    let mut args = env::args().skip(1);
    let sce = match args.next() {
        Some(file) => PathBuf::from(file),
        None => {
            eprintln!("Please provide an xlsx file to convert");
            process::exit(2);
        }
    };
    match sce.extension().and_then(|s| s.to_str()) {
        Some("xlsx") | Some("xlsm") => (),
        _ => {
            eprintln!("Expecting an xlsx file");
            process::exit(2);
        }
    }
    let sheet = match args.next().map(|s| s.parse::<usize>()) {
        None => 1,
        Some(Ok(n)) if n > 0 => n,
        Some(_) => {
            eprintln!("Expecting a sheet number (1 based) as second argument");
            process::exit(2);
        }
    };
    let dest = args
        .next()
        .map(PathBuf::from)
        .unwrap_or_else(|| sce.with_extension("csv"));

    let mut converter = XlsxToCsv::new(&sce);
    if let Err(e) = converter.convert_with(&dest, sheet, &ConversionConfig::default()) {
        eprintln!("{e}");
        process::exit(1);
    }
    println!("sheet {sheet} written to {}", dest.display());
}
