//! The rank exchange under MPI, with verification.
//!
//! Rank 0 seeds its buffer with 'X', the harness runs, and rank 1 checks its
//! file holds the byte.
//!
//! Run with: mpiexec -n 2 ./target/debug/examples/exchange

use rank_exchange::harness::{self, HarnessConfig};
use rank_exchange::{Context, Result, TransferUnit};

fn main() -> Result<()> {
    let context = Context::init_mpi()?;
    let rank = context.rank();

    let dir = std::env::temp_dir().join("rank-exchange-demo");
    std::fs::create_dir_all(&dir).map_err(|e| rank_exchange::Error::io(&dir, e))?;
    let config = HarnessConfig::default()
        .with_dir(&dir)
        .with_seed(TransferUnit(b'X'));

    let report = harness::execute(context, &config)?;
    println!(
        "Rank {rank}: {:?} wrote {} to {}",
        report.role,
        report.buffer,
        report.path.display()
    );

    if rank == 1 {
        let written = std::fs::read(&report.path).map_err(|e| rank_exchange::Error::io(&report.path, e))?;
        assert_eq!(written, vec![0x58], "receiver file should hold 'X'");
        println!("\nExchange test passed!");
    }

    Ok(())
}
