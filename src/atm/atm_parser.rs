use clap::{App, Arg};

pub fn cli() -> Result<clap::ArgMatches, clap::Error> {
    let matches = App::new("atm")
        .about("ATM console talking to the bank through the router")
        .arg(
            Arg::with_name("init-file")
                .help("Key file written by init, ending in .atm")
                .required(true)
                .index(1),
        )
        .arg(
            Arg::with_name("config")
                .short('c')
                .long("config")
                .takes_value(true)
                .required(false),
        )
        .try_get_matches();
    matches
}
