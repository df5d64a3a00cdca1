//! The `waymark` binary.

use clap::Parser;
use waymark_config::CliArgs;

fn main() {
    let args = CliArgs::parse();

    match waymark_app::run(&args) {
        Ok(()) => {}
        Err(e) => {
            eprintln!("waymark: {e}");
            std::process::exit(1);
        }
    }
}
