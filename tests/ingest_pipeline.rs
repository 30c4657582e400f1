use daq_window::{
    BoundedVec, BoxedSink, DispatchReport, Dispatcher, IngestError, IngestResult, ListElement422,
    ManualClock, PacketSource, ReplaySource, SinkFactory, SinkFormat, WindowEngine, WriterConfig,
};
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

type FileEngine = WindowEngine<ListElement422, BoundedVec<ListElement422>, BoxedSink, ManualClock>;

fn packet(digitizer_id: u32, events: &[(u16, u32)]) -> String {
    let events: Vec<String> = events
        .iter()
        .map(|(channel, t)| {
            format!(
                r#"{{"local_time":{},"channel":{},"charge":1}}"#,
                t, channel
            )
        })
        .collect();
    format!(
        r#"{{"digitizer_id":{},"events":[{}]}}"#,
        digitizer_id,
        events.join(",")
    )
}

fn file_engine_factory(output_dir: PathBuf) -> impl FnMut(u32) -> IngestResult<FileEngine> {
    move |digitizer_id| {
        let sink = SinkFactory::create(SinkFormat::Jsonl, &output_dir, digitizer_id).map_err(
            |e| IngestError::Setup {
                digitizer_id,
                message: e.to_string(),
            },
        )?;
        WindowEngine::with_clock(
            sink,
            digitizer_id,
            2,
            || BoundedVec::new(3),
            ManualClock::new(5_000),
        )
        .map_err(|e| IngestError::Setup {
            digitizer_id,
            message: e.to_string(),
        })
    }
}

async fn replay(session: &Path, output_dir: PathBuf) -> DispatchReport {
    let config = WriterConfig {
        output_dir: output_dir.clone(),
        queue_depth: 4,
        poll_interval_ms: 10,
        ..WriterConfig::default()
    };
    let token = CancellationToken::new();
    let (tx, rx) = crossbeam::channel::bounded(config.queue_depth);

    let dispatcher = Dispatcher::new(
        file_engine_factory(output_dir),
        config.dispatch_config(),
        token.clone(),
    );
    let handle = std::thread::spawn(move || dispatcher.run(rx));

    let mut source = ReplaySource::new(session.to_path_buf());
    source.run(tx, token).await.unwrap();

    tokio::task::spawn_blocking(move || handle.join().unwrap())
        .await
        .unwrap()
}

/// (count, timestamp) of every line written for one digitizer
fn written_batches(path: &Path) -> Vec<(u64, u64)> {
    std::fs::read_to_string(path)
        .unwrap()
        .lines()
        .map(|line| {
            let value: serde_json::Value = serde_json::from_str(line).unwrap();
            (
                value["count"].as_u64().unwrap(),
                value["timestamp"].as_u64().unwrap(),
            )
        })
        .collect()
}

#[tokio::test]
async fn test_replay_writes_one_file_per_digitizer() {
    let temp_dir = TempDir::new().unwrap();
    let session = temp_dir.path().join("session.jsonl");
    let output_dir = temp_dir.path().join("out");

    let lines = [
        packet(1, &[(0, 10), (0, 20), (1, 15)]),
        packet(2, &[(1, 7), (5, 8)]),
        packet(1, &[(0, 30), (0, 40)]),
        packet(1, &[(0, 2), (1, 1)]),
    ];
    std::fs::write(&session, lines.join("\n")).unwrap();

    let report = replay(&session, output_dir.clone()).await;
    assert!(report.is_success());
    assert_eq!(report.packets_routed, 4);
    assert_eq!(report.events_processed(), 8);

    let (id, first) = &report.workers[0];
    assert_eq!(*id, 1);
    let first = first.as_ref().unwrap();
    assert_eq!(first.engine.overflow_flushes, 1);
    assert_eq!(first.engine.swaps, 1);

    let (id, second) = &report.workers[1];
    assert_eq!(*id, 2);
    assert_eq!(second.as_ref().unwrap().engine.events_rejected, 1);

    // Overflow flush, swap delivery of the first epoch, then the terminal
    // flush of the second epoch and the empty next window.
    assert_eq!(
        written_batches(&output_dir.join("digitizer_1.jsonl")),
        vec![(3, 0), (2, 0), (2, 5_000), (0, 0)]
    );
    assert_eq!(
        written_batches(&output_dir.join("digitizer_2.jsonl")),
        vec![(1, 0), (0, 0)]
    );
}

#[tokio::test]
async fn test_unwritable_output_fails_setup() {
    let temp_dir = TempDir::new().unwrap();
    let session = temp_dir.path().join("session.jsonl");
    std::fs::write(&session, format!("{}\n{}\n", packet(3, &[(0, 1)]), packet(3, &[(0, 2)])))
        .unwrap();

    // A regular file where the output directory should be.
    let blocker = temp_dir.path().join("out");
    std::fs::write(&blocker, b"").unwrap();

    let report = replay(&session, blocker).await;
    assert!(!report.is_success());
    assert_eq!(report.packets_routed, 0);
    assert_eq!(report.packets_dropped, 2);
    assert!(matches!(
        report.workers[0],
        (3, Err(IngestError::Setup { digitizer_id: 3, .. }))
    ));
}
