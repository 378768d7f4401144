//! End-to-end exchanges over the in-process world.

use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use rank_exchange::harness::{self, HarnessConfig, Report, Role};
use rank_exchange::{
    Context, DatatypeTag, Error, LocalTransport, LocalWorld, Result, Status, TransferUnit,
    Transport,
};

/// Transfer and teardown counts for one participant.
#[derive(Default)]
struct Counters {
    sends: AtomicUsize,
    recvs: AtomicUsize,
    finalizes: AtomicUsize,
}

impl Counters {
    fn snapshot(&self) -> (usize, usize, usize) {
        (
            self.sends.load(Ordering::SeqCst),
            self.recvs.load(Ordering::SeqCst),
            self.finalizes.load(Ordering::SeqCst),
        )
    }
}

/// A local transport that counts what passes through it.
struct Counted {
    inner: LocalTransport,
    counters: Arc<Counters>,
}

impl Transport for Counted {
    fn rank(&self) -> i32 {
        self.inner.rank()
    }

    fn size(&self) -> i32 {
        self.inner.size()
    }

    fn processor_name(&self) -> Result<String> {
        self.inner.processor_name()
    }

    fn send_bytes(
        &self,
        payload: &[u8],
        datatype: DatatypeTag,
        count: usize,
        dest: i32,
        tag: i32,
    ) -> Result<()> {
        self.counters.sends.fetch_add(1, Ordering::SeqCst);
        self.inner.send_bytes(payload, datatype, count, dest, tag)
    }

    fn recv_bytes(
        &self,
        buf: &mut [u8],
        datatype: DatatypeTag,
        count: usize,
        source: i32,
        tag: i32,
    ) -> Result<Status> {
        self.counters.recvs.fetch_add(1, Ordering::SeqCst);
        self.inner.recv_bytes(buf, datatype, count, source, tag)
    }

    fn finalize(&mut self) -> Result<()> {
        self.counters.finalizes.fetch_add(1, Ordering::SeqCst);
        self.inner.finalize()
    }
}

fn counted_world(size: i32) -> (Vec<Context<Counted>>, Vec<Arc<Counters>>) {
    LocalWorld::transports(size)
        .unwrap()
        .into_iter()
        .map(|inner| {
            let counters = Arc::new(Counters::default());
            let context = Context::new(Counted {
                inner,
                counters: Arc::clone(&counters),
            });
            (context, counters)
        })
        .unzip()
}

/// Run every context's participant on its own thread; results by rank.
fn run_all<T: Transport + Send + 'static>(
    contexts: Vec<Context<T>>,
    config: &HarnessConfig,
) -> Vec<Result<Report>> {
    thread::scope(|s| {
        let handles: Vec<_> = contexts
            .into_iter()
            .map(|context| s.spawn(move || harness::execute(context, config)))
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    })
}

fn run_pair(config: &HarnessConfig) -> (Report, Report) {
    let mut results = run_all(LocalWorld::bootstrap(2).unwrap(), config).into_iter();
    let sender = results.next().unwrap().unwrap();
    let receiver = results.next().unwrap().unwrap();
    (sender, receiver)
}

fn file_bytes(dir: &Path, rank: i32) -> Vec<u8> {
    fs::read(dir.join(format!("rank{rank}.txt"))).unwrap()
}

#[test]
fn seeded_byte_reaches_receiver_file() {
    let dir = tempfile::tempdir().unwrap();
    let config = HarnessConfig::default()
        .with_dir(dir.path())
        .with_seed(TransferUnit(b'X'));

    let (sender, receiver) = run_pair(&config);

    assert_eq!(sender.role, Role::Sender);
    assert_eq!(sender.buffer, TransferUnit(0x58));
    assert_eq!(sender.status, None);

    assert_eq!(receiver.role, Role::Receiver);
    assert_eq!(receiver.buffer, TransferUnit(0x58));
    assert_eq!(
        receiver.status,
        Some(Status {
            source: 0,
            tag: 0,
            count: 1
        })
    );

    assert_eq!(file_bytes(dir.path(), 0), vec![0x58]);
    assert_eq!(file_bytes(dir.path(), 1), vec![0x58]);
}

#[test]
fn empty_sender_file_transfers_the_sentinel() {
    let dir = tempfile::tempdir().unwrap();
    let config = HarnessConfig::default().with_dir(dir.path());

    let (sender, receiver) = run_pair(&config);

    assert_eq!(sender.read, None);
    assert_eq!(receiver.read, None);
    assert_eq!(receiver.buffer, TransferUnit::SENTINEL);
    assert_eq!(file_bytes(dir.path(), 1), vec![0x00]);
}

#[test]
fn every_byte_value_reaches_the_receiver() {
    let dir = tempfile::tempdir().unwrap();
    for value in 0..=u8::MAX {
        let config = HarnessConfig::default()
            .with_dir(dir.path())
            .with_seed(TransferUnit(value));

        let (_, receiver) = run_pair(&config);

        assert_eq!(receiver.buffer, TransferUnit(value), "value {value:#04x}");
        assert_eq!(file_bytes(dir.path(), 1), vec![value], "value {value:#04x}");
    }
}

#[test]
fn prior_file_contents_are_discarded() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("rank0.txt"), b"stale sender state").unwrap();
    fs::write(dir.path().join("rank1.txt"), b"stale receiver state").unwrap();
    let config = HarnessConfig::default()
        .with_dir(dir.path())
        .with_seed(TransferUnit(b'q'));

    let (sender, receiver) = run_pair(&config);

    // The stale bytes are truncated away before the read
    assert_eq!(sender.read, None);
    assert_eq!(receiver.read, None);
    assert_eq!(file_bytes(dir.path(), 0), b"q".to_vec());
    assert_eq!(file_bytes(dir.path(), 1), b"q".to_vec());
}

#[test]
fn one_send_and_one_receive_per_run() {
    let dir = tempfile::tempdir().unwrap();

    for (run, seed) in [b'a', b'b'].into_iter().enumerate() {
        let (contexts, counters) = counted_world(2);
        let config = HarnessConfig::default()
            .with_dir(dir.path())
            .with_seed(TransferUnit(seed));

        let results = run_all(contexts, &config);
        assert!(results.iter().all(|r| r.is_ok()), "run {run}: {results:?}");

        assert_eq!(counters[0].snapshot(), (1, 0, 1), "run {run} sender");
        assert_eq!(counters[1].snapshot(), (0, 1, 1), "run {run} receiver");
        assert_eq!(file_bytes(dir.path(), 1), vec![seed], "run {run}");
    }
}

#[test]
fn world_of_three_is_rejected_before_any_transfer() {
    let dir = tempfile::tempdir().unwrap();
    let config = HarnessConfig::default().with_dir(dir.path());
    let (contexts, counters) = counted_world(3);

    for result in run_all(contexts, &config) {
        assert!(matches!(
            result,
            Err(Error::InvalidWorldSize {
                size: 3,
                expected: 2
            })
        ));
    }
    for c in &counters {
        assert_eq!(c.snapshot(), (0, 0, 1));
    }
    assert!(!dir.path().join("rank0.txt").exists());
}

#[test]
fn world_of_one_is_rejected() {
    let (contexts, counters) = counted_world(1);
    let config = HarnessConfig::default();
    let results = run_all(contexts, &config);
    assert!(matches!(
        results[0],
        Err(Error::InvalidWorldSize { size: 1, .. })
    ));
    assert_eq!(counters[0].snapshot(), (0, 0, 1));
}

#[test]
fn unopenable_file_tears_down_both_ranks() {
    let dir = tempfile::tempdir().unwrap();
    let config = HarnessConfig::default().with_dir(dir.path().join("does-not-exist"));
    let (contexts, counters) = counted_world(2);

    let results = run_all(contexts, &config);

    assert!(matches!(results[0], Err(Error::Io { .. })));
    // Neither rank gets past the file open, so no rendezvous is attempted
    assert!(matches!(results[1], Err(Error::Io { .. })));
    assert_eq!(counters[0].snapshot(), (0, 0, 1));
    assert_eq!(counters[1].snapshot(), (0, 0, 1));
}

#[test]
fn receiver_sees_disconnect_when_sender_fails() {
    let dir = tempfile::tempdir().unwrap();
    let config = HarnessConfig::default().with_dir(dir.path());
    let mut contexts = LocalWorld::bootstrap(2).unwrap();
    let receiver = contexts.pop().unwrap();
    let sender = contexts.pop().unwrap();

    // The sender gives up before the rendezvous
    drop(sender);

    match harness::execute(receiver, &config) {
        Err(Error::PeerDisconnected { peer }) => assert_eq!(peer, 0),
        other => panic!("expected PeerDisconnected, got {other:?}"),
    }
    // The receiver still wrote nothing past the truncate
    assert_eq!(file_bytes(dir.path(), 1), Vec::<u8>::new());
}

#[test]
fn custom_tag_is_used_on_both_sides() {
    let dir = tempfile::tempdir().unwrap();
    let config = HarnessConfig::default()
        .with_dir(dir.path())
        .with_tag(7)
        .with_seed(TransferUnit(0xab));

    let (_, receiver) = run_pair(&config);

    assert_eq!(receiver.status.map(|s| s.tag), Some(7));
    assert_eq!(receiver.buffer, TransferUnit(0xab));
}

#[test]
fn receive_declared_as_i32_is_a_protocol_error() {
    let mut contexts = LocalWorld::bootstrap(2).unwrap();
    let one = contexts.pop().unwrap();
    let zero = contexts.pop().unwrap();
    let sent = AtomicBool::new(false);

    thread::scope(|s| {
        let sender = s.spawn(|| {
            let result = zero.world().send(&[TransferUnit(b'X')], 1, 0);
            sent.store(true, Ordering::SeqCst);
            result
        });

        let mut buf = [0i32];
        let err = one.world().recv(&mut buf, 0, 0).unwrap_err();
        assert!(err.is_protocol_error());
        assert!(matches!(
            err,
            Error::DatatypeMismatch {
                expected: DatatypeTag::I32,
                found: Some(DatatypeTag::U8)
            }
        ));
        assert_eq!(buf, [0]);

        // Nothing matched yet, so the synchronous send is still waiting
        thread::sleep(Duration::from_millis(200));
        assert!(!sent.load(Ordering::SeqCst));

        let mut unit = [TransferUnit::SENTINEL];
        one.world().recv(&mut unit, 0, 0).unwrap();
        sender.join().unwrap().unwrap();
        assert_eq!(unit, [TransferUnit(b'X')]);
    });
}

#[test]
fn receive_with_wrong_count_is_a_protocol_error() {
    let mut contexts = LocalWorld::bootstrap(2).unwrap();
    let one = contexts.pop().unwrap();
    let zero = contexts.pop().unwrap();

    thread::scope(|s| {
        let sender = s.spawn(|| zero.world().send(&[TransferUnit(1), TransferUnit(2)], 1, 0));
        let mut buf = [TransferUnit::SENTINEL];
        let err = one.world().recv(&mut buf, 0, 0).unwrap_err();
        assert!(matches!(
            err,
            Error::CountMismatch {
                expected: 1,
                actual: 2
            }
        ));

        // The receiver gives up; the sender learns it was never matched
        one.finalize().unwrap();
        assert!(matches!(
            sender.join().unwrap(),
            Err(Error::PeerDisconnected { peer: 1 })
        ));
    });
}

#[test]
fn sender_does_not_report_success_when_the_receive_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let sender_config = HarnessConfig::default()
        .with_dir(dir.path())
        .with_seed(TransferUnit(b'X'));
    let receiver_config = sender_config.clone().with_tag(1);
    let (contexts, counters) = counted_world(2);
    let mut contexts = contexts.into_iter();
    let zero = contexts.next().unwrap();
    let one = contexts.next().unwrap();

    let (sender, receiver) = thread::scope(|s| {
        let sender = s.spawn(|| harness::execute(zero, &sender_config));
        let receiver = s.spawn(|| harness::execute(one, &receiver_config));
        (sender.join().unwrap(), receiver.join().unwrap())
    });

    assert!(matches!(
        receiver,
        Err(Error::TagMismatch {
            expected: 1,
            actual: 0
        })
    ));
    assert!(matches!(sender, Err(Error::PeerDisconnected { peer: 1 })));
    // Neither side wrote its buffer back
    assert_eq!(file_bytes(dir.path(), 0), Vec::<u8>::new());
    assert_eq!(file_bytes(dir.path(), 1), Vec::<u8>::new());
    assert_eq!(counters[0].snapshot(), (1, 0, 1));
    assert_eq!(counters[1].snapshot(), (0, 1, 1));
}
