use clap::Parser;
use expando::{handle_command, init_logging, Expando};
use std::process;

fn main() {
    let args = Expando::parse();
    init_logging(args.verbose);

    if let Err(e) = handle_command(args.commands) {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}
