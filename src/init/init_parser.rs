use clap::{App, Arg};

pub fn cli() -> Result<clap::ArgMatches, clap::Error> {
    let matches = App::new("init")
        .about("Provision a matching <path>.bank and <path>.atm key pair")
        .arg(Arg::with_name("path").required(true).index(1))
        .try_get_matches();
    matches
}
