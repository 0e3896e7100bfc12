//! The Meridian node driver: parses flags, loads genesis data, opens the
//! controller and idles until interrupted.
//!
//! Exit codes: 0 on success, 1 for invalid arguments, 2 for unexpected
//! runtime failures.

use anyhow::{Context, Result};
use clap::Parser;
use meridian_controller::Controller;
use meridian_state::ForkResolutionAlgorithm;
use std::path::PathBuf;
use std::process::ExitCode;

mod genesis;

#[derive(Parser, Debug)]
#[clap(
    name = "meridian",
    version,
    about = "The Meridian blockchain execution engine."
)]
struct Cli {
    /// Base directory for node data.
    #[clap(long, default_value = ".meridian")]
    basedir: PathBuf,

    /// Log level filter (error, warn, info, debug, trace).
    #[clap(long, default_value = "info")]
    log_level: String,

    /// State directory, relative to the base directory unless absolute.
    #[clap(long, default_value = "chain")]
    statedir: PathBuf,

    /// Genesis data file (JSON). A development genesis key is derived when
    /// omitted.
    #[clap(long)]
    genesis: Option<PathBuf>,

    /// Wipe all state and restart from genesis.
    #[clap(long)]
    reset: bool,

    /// Fork resolution algorithm.
    #[clap(long, default_value = "fifo")]
    fork_algorithm: String,

    /// Compute bandwidth limit for read-only program calls.
    #[clap(long, default_value_t = 10_000_000)]
    read_compute_limit: u64,
}

fn parse_fork_algorithm(name: &str) -> Result<ForkResolutionAlgorithm> {
    match name {
        "fifo" => Ok(ForkResolutionAlgorithm::Fifo),
        other => anyhow::bail!("unknown fork algorithm '{other}'"),
    }
}

fn run(cli: Cli, algorithm: ForkResolutionAlgorithm) -> Result<()> {
    let statedir = if cli.statedir.is_absolute() {
        cli.statedir.clone()
    } else {
        cli.basedir.join(&cli.statedir)
    };

    let genesis_data = match &cli.genesis {
        Some(path) => genesis::load(path)
            .with_context(|| format!("failed to load genesis data from {}", path.display()))?,
        None => {
            log::warn!("no genesis file given; deriving the development genesis key");
            genesis::development()
        }
    };

    let controller = Controller::new(cli.read_compute_limit)
        .map_err(|e| anyhow::anyhow!("failed to construct controller: {e}"))?;

    controller
        .open(Some(statedir), &genesis_data, algorithm, cli.reset)
        .map_err(|e| anyhow::anyhow!("failed to open controller: {e}"))?;

    let head = controller.head();
    log::info!(
        "node ready - height: {}, id: {}",
        head.height,
        hex::encode(head.id)
    );
    log::info!("running until interrupted");

    loop {
        std::thread::park();
    }
}

fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(error) => {
            // Help and version output are not failures.
            if error.use_stderr() {
                let _ = error.print();
                return ExitCode::from(1);
            }
            let _ = error.print();
            return ExitCode::SUCCESS;
        }
    };

    let algorithm = match parse_fork_algorithm(&cli.fork_algorithm) {
        Ok(algorithm) => algorithm,
        Err(error) => {
            eprintln!("error: {error}");
            return ExitCode::from(1);
        }
    };

    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", &cli.log_level);
    }
    env_logger::init();

    match run(cli, algorithm) {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            log::error!("{error:#}");
            ExitCode::from(2)
        }
    }
}
