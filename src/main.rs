#![recursion_limit = "1024"] // for error_chain

#[macro_use]
extern crate log;
#[macro_use]
extern crate error_chain;

#[macro_use]
mod errors;
mod cache;
mod character;
mod cli;
mod logger;
mod mesh;
mod pose;
mod reshape;
mod skeleton;
mod skinning;
mod solve;
mod taxonomy;
mod util;
mod version;

#[cfg(test)]
mod fixtures;

use std::process::exit;

fn main() {
    let matches = cli::app().get_matches();
    logger::init(logger::level_for(
        matches.occurrences_of("verbose"),
        matches.is_present("quiet"),
    ));

    if let Err(e) = cli::run(&matches) {
        error!("{}", e);
        for cause in e.iter().skip(1) {
            error!("caused by: {}", cause);
        }
        exit(1);
    }
}
