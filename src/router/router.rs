mod router_parser;

use std::{
    path::PathBuf,
    process::exit,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};

use tracing::{error, info, warn};

use utils::{config::Config, logging, transport::Relay};

const EXIT_USAGE: i32 = 62;
const EXIT_FAILURE: i32 = 64;

fn main() {
    logging::init();

    let config_path = match router_parser::cli() {
        Ok(matches) => matches.value_of("config").map(PathBuf::from),
        Err(e) if e.kind() == clap::error::ErrorKind::DisplayHelp => e.exit(),
        Err(_) => {
            println!("Usage:  router [-c <config>]");
            exit(EXIT_USAGE);
        }
    };

    let config = Config::resolve(config_path.as_deref()).unwrap_or_else(|e| {
        eprintln!("{}", e);
        exit(EXIT_USAGE);
    });

    let relay = Relay::from_config(&config).unwrap_or_else(|e| {
        error!(addr = %config.router_addr, error = %e, "cannot bind router socket");
        exit(EXIT_FAILURE);
    });

    let running = Arc::new(AtomicBool::new(true));
    let flag = Arc::clone(&running);
    if let Err(e) = ctrlc::set_handler(move || flag.store(false, Ordering::SeqCst)) {
        warn!(error = %e, "cannot install signal handler");
    }

    info!(
        router = %config.router_addr,
        atm = %config.atm_addr,
        bank = %config.bank_addr,
        "relaying"
    );
    if let Err(e) = relay.run(&running) {
        error!(error = %e, "relay stopped");
        exit(EXIT_FAILURE);
    }
    info!("router stopped");
}
