//! `rank-exchange`: run the two-rank exchange.
//!
//! Under MPI (built with `--features mpi`):
//!
//! ```text
//! mpiexec -n 2 rank-exchange --seed X
//! ```
//!
//! Without a launcher, or with `--local`, both ranks run as threads of this
//! process.

use std::path::PathBuf;
use std::process::ExitCode;
use std::thread;

use anyhow::{anyhow, bail, Context as _};
use clap::Parser;
use rank_exchange::harness::{self, HarnessConfig, Report};
use rank_exchange::{launcher, LocalWorld, TransferUnit};
use tracing::{error, info};
use tracing_subscriber::util::{SubscriberInitExt, TryInitError};
use tracing_subscriber::{fmt, layer::SubscriberExt, EnvFilter};

#[derive(Debug, Parser)]
#[command(version, about = "Hand one byte from rank 0's file to rank 1's file")]
struct Cli {
    /// Directory holding rank0.txt and rank1.txt
    #[arg(long, env = "RANKX_DIR", default_value = ".")]
    dir: PathBuf,

    /// Initial buffer value: decimal (88), hex (0x58) or one ASCII character (X)
    #[arg(long, env = "RANKX_SEED", default_value = "0")]
    seed: TransferUnit,

    /// Run both ranks as threads of this process instead of under a launcher
    #[arg(long)]
    local: bool,
}

/// `RUST_LOG` wins; otherwise `RANKX_LOG` picks the crate's level.
/// `LOG_FORMAT=json` switches to JSON lines. Logs go to stderr.
fn init_tracing() {
    // Nothing is logged without a subscriber, so say so on stderr directly
    if let Err(e) = install_tracing() {
        eprintln!("rank-exchange: logging disabled: {e}");
    }
}

fn install_tracing() -> Result<(), TryInitError> {
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        let level = match std::env::var("RANKX_LOG").as_deref() {
            Ok("trace") => "trace",
            Ok("debug") => "debug",
            Ok("warn" | "warning") => "warn",
            Ok("error") => "error",
            _ => "info",
        };
        EnvFilter::new(format!("rank_exchange={level}"))
    };

    let registry = tracing_subscriber::registry().with(filter);
    if std::env::var("LOG_FORMAT").as_deref() == Ok("json") {
        registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .try_init()
    } else {
        registry
            .with(fmt::layer().with_writer(std::io::stderr))
            .try_init()
    }
}

fn main() -> ExitCode {
    init_tracing();
    let cli = Cli::parse();

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %format!("{e:#}"), "exchange failed");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &Cli) -> anyhow::Result<()> {
    let config = HarnessConfig::default()
        .with_dir(&cli.dir)
        .with_seed(cli.seed);

    match launcher::detect() {
        Some(kind) if !cli.local => {
            if let Some(size) = launcher::world_size() {
                if size != harness::WORLD_SIZE {
                    bail!(rank_exchange::Error::InvalidWorldSize {
                        size,
                        expected: harness::WORLD_SIZE,
                    });
                }
            }
            info!(launcher = ?kind, rank = ?launcher::world_rank(), job = ?launcher::job_id(), "started by launcher");
            run_launched(&config)
        }
        _ => run_local(&config),
    }
}

#[cfg(feature = "mpi")]
fn run_launched(config: &HarnessConfig) -> anyhow::Result<()> {
    use rank_exchange::MpiTransport;

    let context = rank_exchange::Context::init_mpi().context("MPI initialization failed")?;
    match MpiTransport::version() {
        Ok(version) => info!(
            mpi = version.lines().next().unwrap_or_default(),
            built_against = option_env!("RANKX_MPI_VERSION").unwrap_or("unknown"),
            rank = context.rank(),
            "MPI runtime"
        ),
        Err(e) => tracing::warn!(error = %e, "could not query the MPI library version"),
    }

    let start = MpiTransport::wtime();
    let report = harness::execute(context, config)?;
    info!(elapsed_s = MpiTransport::wtime() - start, "exchange finished");
    print_report(&report);
    Ok(())
}

#[cfg(not(feature = "mpi"))]
fn run_launched(_config: &HarnessConfig) -> anyhow::Result<()> {
    bail!("started by an MPI launcher, but this build has no MPI support; rebuild with `--features mpi` or pass --local")
}

fn run_local(config: &HarnessConfig) -> anyhow::Result<()> {
    info!(dir = %config.dir.display(), seed = %config.seed, "running both ranks in-process");
    let contexts = LocalWorld::bootstrap(harness::WORLD_SIZE)?;

    let reports = thread::scope(|s| {
        let handles: Vec<_> = contexts
            .into_iter()
            .map(|context| {
                let rank = context.rank();
                let handle = thread::Builder::new()
                    .name(format!("rank-{rank}"))
                    .spawn_scoped(s, move || harness::execute(context, config));
                (rank, handle)
            })
            .collect();

        handles
            .into_iter()
            .map(|(rank, handle)| {
                handle
                    .with_context(|| format!("failed to spawn rank {rank}"))?
                    .join()
                    .map_err(|_| anyhow!("rank {rank} panicked"))?
                    .with_context(|| format!("rank {rank} failed"))
            })
            .collect::<Vec<_>>()
    });

    let mut failed = false;
    for report in reports {
        match report {
            Ok(report) => print_report(&report),
            Err(e) => {
                error!(error = %format!("{e:#}"), "participant failed");
                failed = true;
            }
        }
    }
    if failed {
        bail!("exchange did not complete on every rank");
    }
    Ok(())
}

fn print_report(report: &Report) {
    println!(
        "rank {} ({:?}) wrote {} to {}",
        report.role.rank(),
        report.role,
        report.buffer,
        report.path.display()
    );
}
