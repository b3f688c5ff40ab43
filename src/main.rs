use clap::Parser;
use ruletrader::cli::{Cli, run};

fn main() -> std::process::ExitCode {
    let cli = Cli::parse();
    let level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();
    run(cli)
}
