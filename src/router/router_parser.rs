use clap::{App, Arg};

pub fn cli() -> Result<clap::ArgMatches, clap::Error> {
    let matches = App::new("router")
        .about("Forward datagrams between the ATM and the bank")
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
