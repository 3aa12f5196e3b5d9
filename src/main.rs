//! relay – command-line HTML → PDF converter.
//!
//! Usage:
//!   relay <input.html> [output.pdf] [--engine NAME] [--config FILE]
//!         [--landscape] [--title T] [--page-size S]
//!         [--owner-password P] [--user-password P] [--crypto NAME]
//!
//! If `output.pdf` is omitted the PDF is written next to the input file with
//! the same stem (e.g. `report.html` → `report.pdf`).

use std::{env, fs, path::PathBuf, process};

use pdf_relay::{ErrorClass, Options, Pdf};
use serde_json::Value;

fn main() {
    env_logger::init();

    let args: Vec<String> = env::args().collect();

    let mut input_path: Option<PathBuf> = None;
    let mut output_path: Option<PathBuf> = None;
    let mut config_path: Option<PathBuf> = None;
    let mut options = Options::new();
    let mut positional = 0usize;

    let mut iter = args.iter().skip(1);
    while let Some(arg) = iter.next() {
        let key = match arg.as_str() {
            "--landscape" | "-l" => {
                options.insert("orientation".into(), "landscape".into());
                continue;
            }
            "--help" | "-h" => {
                print_usage(&args[0]);
                process::exit(0);
            }
            "--config" | "-c" => {
                config_path = Some(PathBuf::from(flag_value(&mut iter, arg, &args[0])));
                continue;
            }
            "--engine" | "-e" => "engine",
            "--title" | "-t" => "title",
            "--page-size" => "pageSize",
            "--crypto" => "crypto",
            "--owner-password" => "ownerPassword",
            "--user-password" => "userPassword",
            other if other.starts_with('-') => {
                eprintln!("Unknown flag: {other}");
                print_usage(&args[0]);
                process::exit(1);
            }
            path => {
                if positional == 0 {
                    input_path = Some(PathBuf::from(path));
                } else if positional == 1 {
                    output_path = Some(PathBuf::from(path));
                } else {
                    eprintln!("Unexpected argument: {path}");
                    print_usage(&args[0]);
                    process::exit(1);
                }
                positional += 1;
                continue;
            }
        };
        let value = flag_value(&mut iter, arg, &args[0]);
        options.insert(key.into(), value.into());
    }

    let input = match input_path {
        Some(p) => p,
        None => {
            eprintln!("Error: no input file specified.");
            print_usage(&args[0]);
            process::exit(1);
        }
    };

    // Default output: same directory + same stem as input, but with .pdf
    let output = output_path.unwrap_or_else(|| {
        let mut o = input.clone();
        o.set_extension("pdf");
        o
    });

    let html = match fs::read_to_string(&input) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Error reading '{}': {e}", input.display());
            process::exit(1);
        }
    };

    let defaults = match config_path {
        Some(path) => read_defaults(&path),
        None => Options::new(),
    };

    // A password on the command line means protection.
    if options.contains_key("ownerPassword") || options.contains_key("userPassword") {
        options.insert("protect".into(), true.into());
        if !options.contains_key("crypto") && !defaults.contains_key("crypto") {
            options.insert("crypto".into(), "Pdftk".into());
        }
    }
    if !options.contains_key("engine") && !defaults.contains_key("engine") {
        options.insert("engine".into(), "Builtin".into());
    }
    if !options.contains_key("title") && !defaults.contains_key("title") {
        if let Some(stem) = input.file_stem().and_then(|s| s.to_str()) {
            options.insert("title".into(), stem.into());
        }
    }

    let pdf = match Pdf::builder().defaults(defaults).options(options).build() {
        Ok(pdf) => pdf,
        Err(e) => fail(&e),
    };

    match pdf.write(&output, true, &html) {
        Ok(()) => {
            let size = fs::metadata(&output).map(|m| m.len()).unwrap_or(0);
            eprintln!(
                "Wrote '{}' ({size} bytes, engine {})",
                output.display(),
                pdf.engine().name()
            );
        }
        Err(e) => fail(&e),
    }
}

fn flag_value<'a>(iter: &mut impl Iterator<Item = &'a String>, flag: &str, prog: &str) -> String {
    match iter.next() {
        Some(v) => v.clone(),
        None => {
            eprintln!("Missing value for {flag}");
            print_usage(prog);
            process::exit(1);
        }
    }
}

fn read_defaults(path: &PathBuf) -> Options {
    let text = match fs::read_to_string(path) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Error reading '{}': {e}", path.display());
            process::exit(1);
        }
    };
    match serde_json::from_str::<Value>(&text) {
        Ok(Value::Object(map)) => map,
        Ok(_) => {
            eprintln!("Error: '{}' must hold a JSON object", path.display());
            process::exit(1);
        }
        Err(e) => {
            eprintln!("Error parsing '{}': {e}", path.display());
            process::exit(1);
        }
    }
}

fn fail(error: &pdf_relay::PdfError) -> ! {
    match error.class() {
        ErrorClass::Misconfigured => eprintln!("Configuration problem: {error}"),
        ErrorClass::RenderFailed => eprintln!("Rendering failed: {error}"),
    }
    if let Some(detail) = error.diagnostics() {
        log::debug!("{detail}");
    }
    process::exit(match error.class() {
        ErrorClass::Misconfigured => 2,
        ErrorClass::RenderFailed => 1,
    });
}

fn print_usage(prog: &str) {
    eprintln!("relay – HTML to PDF converter (pdf-relay)");
    eprintln!();
    eprintln!("Usage:");
    eprintln!("  {prog} <input.html> [output.pdf] [flags]");
    eprintln!();
    eprintln!("Arguments:");
    eprintln!("  <input.html>        HTML file to convert");
    eprintln!("  [output.pdf]        Output path  (default: same stem as input with .pdf)");
    eprintln!();
    eprintln!("Flags:");
    eprintln!("  --engine, -e NAME   Render engine: Builtin (default), WkHtmlToPdf, PrinceXml, PdfReactor");
    eprintln!("  --config, -c FILE   JSON file with default options");
    eprintln!("  --title, -t T       Document title (default: input filename stem)");
    eprintln!("  --page-size S       Page size, e.g. A4 or Letter");
    eprintln!("  --landscape, -l     Landscape orientation");
    eprintln!("  --owner-password P  Protect the PDF with an owner password");
    eprintln!("  --user-password P   Protect the PDF with a user password");
    eprintln!("  --crypto NAME       Crypto engine used for protection (default: Pdftk)");
    eprintln!("  --help              Print this message");
    eprintln!();
    eprintln!("Set RUST_LOG=debug to see the commands that run.");
}
