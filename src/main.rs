use clap::Parser;
use transfers::app::{run, TransfersAppArguments};

fn main() {
    let args = TransfersAppArguments::parse();
    if let Err(e) = run(&args.app) {
        log::error!("transfers failed: {e}");
        eprintln!("{e}");
        std::process::exit(1);
    }
}
