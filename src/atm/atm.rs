mod atm_parser;

use std::{
    io::{self, BufRead, Write},
    path::PathBuf,
    process::exit,
};

use tracing::{error, info};
use zeroize::Zeroizing;

use utils::{
    atm_client::{Atm, PIN_PROMPT},
    card::CardStore,
    config::Config,
    keys::{KeyMaterial, ATM_EXTENSION},
    logging,
    transport::DatagramLink,
    validate_functions::validate_init_file,
};

const EXIT_USAGE: i32 = 62;
const EXIT_FILE_OPEN: i32 = 64;

fn flush() {
    let _ = io::stdout().flush();
}

/// One line from stdin, `None` at end of input.
fn read_line(stdin: &io::Stdin) -> Option<String> {
    let mut line = String::new();
    match stdin.lock().read_line(&mut line) {
        Ok(0) | Err(_) => None,
        Ok(_) => Some(line),
    }
}

fn main() {
    logging::init();

    let (init_file, config_path) = match atm_parser::cli() {
        Ok(matches) => {
            let init_file = matches
                .value_of("init-file")
                .map(PathBuf::from)
                .unwrap_or_else(|| exit(EXIT_USAGE));
            let config_path = matches.value_of("config").map(PathBuf::from);
            (init_file, config_path)
        }
        Err(e) if e.kind() == clap::error::ErrorKind::DisplayHelp => e.exit(),
        Err(_) => {
            println!("Usage:  atm <init-file>");
            exit(EXIT_USAGE);
        }
    };

    if !validate_init_file(&init_file, ATM_EXTENSION) {
        eprintln!("Error: {} is not a {} file", init_file.display(), ATM_EXTENSION);
        exit(EXIT_FILE_OPEN);
    }

    let keys = KeyMaterial::load(&init_file).unwrap_or_else(|e| {
        eprintln!("Error opening ATM initialization file: {}", e);
        exit(EXIT_FILE_OPEN);
    });

    let config = Config::resolve(config_path.as_deref()).unwrap_or_else(|e| {
        eprintln!("{}", e);
        exit(EXIT_USAGE);
    });

    let link = DatagramLink::from_config(&config).unwrap_or_else(|e| {
        error!(addr = %config.atm_addr, error = %e, "cannot bind ATM socket");
        exit(EXIT_FILE_OPEN);
    });
    info!(atm = %config.atm_addr, router = %config.router_addr, "atm ready");

    let mut atm = Atm::with_max_attempts(keys, CardStore::new(&config.card_dir), link, config.max_attempts)
        .unwrap_or_else(|e| {
            error!(error = %e, "cannot start ATM");
            exit(EXIT_FILE_OPEN);
        });
    let stdin = io::stdin();

    print!("{}", atm.prompt());
    flush();

    while let Some(line) = read_line(&stdin) {
        let output = atm.process_command(&line, || {
            print!("{}", PIN_PROMPT);
            flush();
            read_line(&stdin).map(Zeroizing::new)
        });
        for out in output {
            println!("{}", out);
        }
        print!("{}", atm.prompt());
        flush();
    }
}
