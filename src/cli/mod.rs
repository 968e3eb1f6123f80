//! The polfmt command-line interface.
//!
//! Reads one policy file, parses it, and prints either the canonical
//! rendering or the parse tree. Syntax errors are printed to stderr in
//! their diagnostic format and exit with code 1.

use crate::cli::args::PolfmtArgs;
use crate::{parser, printer};
use clap::Parser;
use std::{fs, process};

pub mod args;

/// The main entry point for the CLI.
pub fn run() {
    let args = PolfmtArgs::parse();

    let source = match fs::read_to_string(&args.file) {
        Ok(source) => source,
        Err(e) => {
            eprintln!("Error: Can't read {}: {}", args.file.display(), e);
            process::exit(1);
        }
    };
    let file = args.file.to_string_lossy();

    let list = match parser::parse_file(&source, &file) {
        Ok(list) => list,
        Err(e) => {
            eprintln!("{e}");
            process::exit(1);
        }
    };

    if args.ast {
        match serde_json::to_string_pretty(&list) {
            Ok(json) => println!("{json}"),
            Err(e) => {
                eprintln!("Error: {e}");
                process::exit(1);
            }
        }
    } else {
        print!("{}", printer::render(&list, &source));
    }
}
