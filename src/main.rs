use clap::Parser;
use oitrader::cli::{run, Cli};

fn main() -> std::process::ExitCode {
    run(Cli::parse())
}
