use clap::Parser;
use cli::Cli;

mod cli;

fn main() {
    anchor_weave::log::init();
    let program = Cli::parse();
    if let Err(e) = program.run() {
        log::error!("{e}");
        std::process::exit(e.exit_code());
    }
}
