use std::path::PathBuf;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use diffdrive_runtime::runtime::{InputSource, RunOptions};

/// Differential drivetrain control loop on a simulated base
#[derive(Debug, Parser)]
#[command(version, about)]
struct Cli {
    /// JSON drivetrain config; defaults are used when omitted
    #[arg(long)]
    config: Option<PathBuf>,

    /// Command source
    #[arg(long, value_enum, default_value_t = InputSource::Stdin)]
    input: InputSource,

    /// Stop after this many control cycles
    #[arg(long)]
    cycles: Option<u64>,
}

#[tokio::main]
async fn main() {
    // Setup logging (set RUST_LOG=info or debug)
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse().unwrap()))
        .init(); // installs the subscriber globally

    let cli = Cli::parse();
    let options = RunOptions {
        config_path: cli.config,
        input: cli.input,
        max_cycles: cli.cycles,
    };

    if let Err(e) = diffdrive_runtime::runtime::run(options).await {
        eprintln!("Runtime error: {}", e);
        std::process::exit(1);
    }
}
