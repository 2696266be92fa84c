mod init_parser;

use std::{io, path::PathBuf, process::exit};

use utils::{keys, logging, Error};

const EXIT_SUCCESS: i32 = 0;
const EXIT_USAGE: i32 = 62;
const EXIT_FILE_EXISTS: i32 = 63;
const EXIT_FILE_CREATION: i32 = 64;

fn main() {
    logging::init();

    let base = match init_parser::cli() {
        Ok(matches) => matches
            .value_of("path")
            .map(PathBuf::from)
            .unwrap_or_else(|| exit(EXIT_USAGE)),
        Err(e) if e.kind() == clap::error::ErrorKind::DisplayHelp => e.exit(),
        Err(_) => {
            println!("Usage:  init <filename>");
            exit(EXIT_USAGE);
        }
    };

    match keys::provision(&base) {
        Ok(_) => {
            println!("Successfully initialized bank state");
            exit(EXIT_SUCCESS);
        }
        Err(Error::Io(e)) if e.kind() == io::ErrorKind::AlreadyExists => {
            println!("Error: one of the files already exists");
            exit(EXIT_FILE_EXISTS);
        }
        Err(e) => {
            eprintln!("Error creating initialization files: {}", e);
            exit(EXIT_FILE_CREATION);
        }
    }
}
