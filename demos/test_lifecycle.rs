//! Integration test for the MPI context lifecycle.
//!
//! Exercises Context::init_mpi, version, wtime, is_initialized, is_finalized,
//! thread_level, processor_name and finalize.
//!
//! Run with: mpiexec -n 2 ./target/debug/examples/test_lifecycle

use rank_exchange::{Context, Error, MpiTransport, ThreadLevel};

fn main() {
    let context = Context::init_mpi().expect("MPI init failed");

    assert!(
        MpiTransport::is_initialized(),
        "is_initialized should be true after init"
    );
    println!("PASS: is_initialized");

    assert!(
        !MpiTransport::is_finalized(),
        "is_finalized should be false before teardown"
    );
    println!("PASS: is_finalized (false before teardown)");

    // A second init in the same process is refused
    assert!(matches!(
        Context::init_mpi(),
        Err(Error::AlreadyInitialized)
    ));
    println!("PASS: second init refused");

    let level = context.transport().thread_level();
    assert!(level >= ThreadLevel::Single);
    println!("PASS: thread_level = {level:?}");

    let version = MpiTransport::version().expect("version() failed");
    assert!(!version.is_empty(), "version string should not be empty");
    println!("PASS: version = {}", version.lines().next().unwrap_or_default());

    let t1 = MpiTransport::wtime();
    let t2 = MpiTransport::wtime();
    assert!(t2 >= t1, "wtime should be monotonic");
    println!("PASS: wtime = {t1}");

    let world = context.world();
    let rank = world.rank();
    let size = world.size();
    assert_eq!(size, 2, "run with exactly 2 processes");
    assert!(rank >= 0 && rank < size, "rank should be in [0, size)");
    println!("PASS: world rank={rank} size={size}");

    let name = world.processor_name().expect("processor_name failed");
    assert!(!name.is_empty(), "processor_name should not be empty");
    println!("PASS: processor_name = {name}");

    context.finalize().expect("finalize failed");
    assert!(MpiTransport::is_finalized(), "is_finalized should be true after teardown");
    println!("PASS: is_finalized (true after teardown)");

    assert!(matches!(Context::init_mpi(), Err(Error::NotSupported(_))));
    println!("PASS: init after finalize refused");

    if rank == 0 {
        println!("\n========================================");
        println!("All lifecycle tests passed!");
        println!("========================================");
    }
}
