//! Receive-side protocol checks under MPI.
//!
//! Rank 0 sends one TransferUnit. Rank 1 first declares the receive as i32
//! (the wrong type), then as two units (the wrong count), and checks both are
//! rejected without consuming the message; the correct receive then completes
//! the rendezvous.
//!
//! A second message of four bytes, received as one i32, is accepted: MPI only
//! lets the receive compare element sizes, not element types.
//!
//! Run with: mpiexec -n 2 ./target/debug/examples/test_mismatch

use rank_exchange::{Context, DatatypeTag, Error, TransferUnit};

fn main() {
    let context = Context::init_mpi().expect("MPI init failed");
    let world = context.world();
    assert_eq!(world.size(), 2, "run with exactly 2 processes");

    if world.rank() == 0 {
        world
            .send(&[TransferUnit(b'X')], 1, 0)
            .expect("send failed");
        world
            .send(&[1u8, 0, 0, 0], 1, 0)
            .expect("second send failed");
    } else {
        let mut wide = [0i32];
        match world.recv(&mut wide, 0, 0) {
            Err(Error::DatatypeMismatch {
                expected: DatatypeTag::I32,
                ..
            }) => println!("PASS: i32 receive rejected"),
            other => panic!("expected DatatypeMismatch, got {other:?}"),
        }

        let mut two = [TransferUnit::SENTINEL; 2];
        match world.recv(&mut two, 0, 0) {
            Err(Error::CountMismatch {
                expected: 2,
                actual: 1,
            }) => println!("PASS: two-unit receive rejected"),
            other => panic!("expected CountMismatch, got {other:?}"),
        }

        let mut unit = [TransferUnit::SENTINEL];
        let status = world.recv(&mut unit, 0, 0).expect("recv failed");
        assert_eq!(unit[0], TransferUnit(b'X'));
        assert_eq!(status.count, 1);
        println!("PASS: matching receive got {}", unit[0]);

        let mut word = [0i32];
        let status = world.recv(&mut word, 0, 0).expect("recv failed");
        assert_eq!(status.count, 1);
        assert_eq!(word[0], i32::from_ne_bytes([1, 0, 0, 0]));
        println!("PASS: four bytes pass as one i32 (size-only check)");
    }

    context.finalize().expect("finalize failed");
}
