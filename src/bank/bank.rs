mod bank_parser;

use std::{
    io::{self, BufRead, Write},
    net::{SocketAddr, UdpSocket},
    path::PathBuf,
    process::exit,
    sync::mpsc::{self, Sender},
    thread,
};

use tracing::{debug, error, info, warn};

use utils::{
    bank_server::Bank,
    card::CardStore,
    config::Config,
    keys::{KeyMaterial, BANK_EXTENSION},
    logging,
    transport::RECV_BUFFER_SIZE,
    validate_functions::validate_init_file,
};

const EXIT_USAGE: i32 = 62;
const EXIT_FILE_OPEN: i32 = 64;

const PROMPT: &str = "BANK: ";

/// Everything the dispatcher reacts to, one at a time.
enum Event {
    Console(String),
    Datagram(Vec<u8>, SocketAddr),
    Shutdown,
}

fn show_prompt() {
    print!("{}", PROMPT);
    let _ = io::stdout().flush();
}

fn spawn_console(events: Sender<Event>) {
    thread::spawn(move || {
        let stdin = io::stdin();
        let mut line = String::new();
        loop {
            line.clear();
            match stdin.lock().read_line(&mut line) {
                Ok(0) => {
                    info!("console closed, still serving datagrams");
                    return;
                }
                Ok(_) => {
                    if events.send(Event::Console(line.clone())).is_err() {
                        return;
                    }
                }
                Err(e) => {
                    warn!(error = %e, "console read failed");
                    return;
                }
            }
        }
    });
}

fn spawn_socket(socket: UdpSocket, events: Sender<Event>) {
    thread::spawn(move || {
        let mut buf = vec![0u8; RECV_BUFFER_SIZE];
        loop {
            match socket.recv_from(&mut buf) {
                Ok((n, src)) => {
                    if events.send(Event::Datagram(buf[..n].to_vec(), src)).is_err() {
                        return;
                    }
                }
                Err(e) => {
                    error!(error = %e, "socket receive failed");
                    let _ = events.send(Event::Shutdown);
                    return;
                }
            }
        }
    });
}

fn main() {
    logging::init();

    let (init_file, config_path) = match bank_parser::cli() {
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
            println!("Usage:  bank <init-file>");
            exit(EXIT_USAGE);
        }
    };

    if !validate_init_file(&init_file, BANK_EXTENSION) {
        eprintln!("Error: {} is not a {} file", init_file.display(), BANK_EXTENSION);
        exit(EXIT_FILE_OPEN);
    }

    let keys = KeyMaterial::load(&init_file).unwrap_or_else(|e| {
        eprintln!("Error opening bank initialization file: {}", e);
        exit(EXIT_FILE_OPEN);
    });

    let config = Config::resolve(config_path.as_deref()).unwrap_or_else(|e| {
        eprintln!("{}", e);
        exit(EXIT_USAGE);
    });

    let socket = UdpSocket::bind(config.bank_addr).unwrap_or_else(|e| {
        error!(addr = %config.bank_addr, error = %e, "cannot bind bank socket");
        exit(EXIT_FILE_OPEN);
    });
    let reader = socket.try_clone().unwrap_or_else(|e| {
        error!(error = %e, "cannot clone bank socket");
        exit(EXIT_FILE_OPEN);
    });
    info!(bank = %config.bank_addr, cards = %config.card_dir.display(), "bank ready");

    let mut bank = Bank::new(keys, CardStore::new(&config.card_dir));

    let (events, inbox) = mpsc::channel();
    let on_signal = events.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        let _ = on_signal.send(Event::Shutdown);
    }) {
        warn!(error = %e, "cannot install signal handler");
    }
    spawn_console(events.clone());
    spawn_socket(reader, events);

    show_prompt();
    for event in inbox {
        match event {
            Event::Console(line) => {
                if let Some(reply) = bank.handle_local(&line) {
                    println!("{}", reply);
                }
                show_prompt();
            }
            Event::Datagram(bytes, src) => match bank.handle_datagram(&bytes) {
                Ok(reply) => {
                    if let Err(e) = socket.send_to(&reply, src) {
                        warn!(%src, error = %e, "reply not sent");
                    }
                }
                Err(e) => debug!(%src, error = %e, "datagram dropped"),
            },
            Event::Shutdown => {
                info!("shutting down");
                break;
            }
        }
    }
}
