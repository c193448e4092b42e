//! converge CLI: declarative state convergence.

use clap::Parser;
use converge::cli::Cli;

fn init_tracing(level: &str) {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("converge={}", level).into()),
        )
        .with_writer(std::io::stderr)
        .init();
}

fn main() {
    let cli = Cli::parse();
    init_tracing(&cli.log_level);
    if let Err(e) = converge::cli::dispatch(cli.command, &cli.config) {
        eprintln!("error: {}", e);
        std::process::exit(1);
    }
}
