use std::collections::HashSet;
use std::io;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tempfile::TempDir;

use logpipe::config::DAY_MS;
use logpipe::clock::local_day_start_ms;
use logpipe::mock::{EngineCall, MemorySink, MockEngine};
use logpipe::{
    CapacityProbe, Clock, EngineCommand, ExportPayload, LogConfig, LogPipeline, ManualClock,
    PipelineOptions,
};

struct Roomy;

impl CapacityProbe for Roomy {
    fn available_bytes(&self, _path: &Path) -> io::Result<u64> {
        Ok(u64::MAX)
    }
}

fn test_config(dir: &TempDir) -> LogConfig {
    let logs = dir.path().join("logs");
    std::fs::create_dir_all(&logs).unwrap();
    LogConfig::new(dir.path().join("cache"), logs, [1u8; 16], [2u8; 16])
}

/// Clock parked mid-day so tests never cross a real boundary.
fn midday_clock() -> Arc<ManualClock> {
    let now = chrono::Local::now().timestamp_millis();
    Arc::new(ManualClock::new(local_day_start_ms(now) + DAY_MS / 2))
}

fn start_pipeline(
    dir: &TempDir,
    engine: Arc<MockEngine>,
    sink: Arc<MemorySink>,
    clock: Arc<ManualClock>,
) -> LogPipeline {
    let options = PipelineOptions::new(test_config(dir), engine, sink)
        .with_clock(clock)
        .with_probe(Arc::new(Roomy));
    LogPipeline::start(options)
}

async fn settle() {
    tokio::time::sleep(Duration::from_millis(100)).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_producers_keep_per_producer_order() {
    let _ = tracing_subscriber::fmt().try_init();

    let dir = TempDir::new().unwrap();
    let engine = Arc::new(MockEngine::new());
    let sink = Arc::new(MemorySink::new());
    let pipeline = Arc::new(start_pipeline(&dir, engine.clone(), sink, midday_clock()));

    let mut producers = Vec::new();
    for p in 0..4 {
        let pipeline = pipeline.clone();
        producers.push(std::thread::spawn(move || {
            for n in 0..50 {
                pipeline.write(format!("p{}:{}", p, n), 1);
            }
        }));
    }
    for producer in producers {
        producer.join().unwrap();
    }
    settle().await;

    let contents: Vec<String> = engine
        .calls()
        .into_iter()
        .filter_map(|c| match c {
            EngineCall::Write { content, .. } => Some(content),
            _ => None,
        })
        .collect();
    assert_eq!(contents.len(), 200);

    // Every producer's writes appear as an in-order subsequence.
    for p in 0..4 {
        let seen: Vec<&String> = contents
            .iter()
            .filter(|c| c.starts_with(&format!("p{}:", p)))
            .collect();
        let expected: Vec<String> = (0..50).map(|n| format!("p{}:{}", p, n)).collect();
        assert_eq!(seen.len(), 50);
        for (got, want) in seen.iter().zip(&expected) {
            assert_eq!(*got, want);
        }
    }

    // The worker never issued two engine calls at once.
    assert!(!engine.overlap_detected());

    pipeline.quit(false);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_write_then_export_round_trip() {
    let _ = tracing_subscriber::fmt().try_init();

    let dir = TempDir::new().unwrap();
    let engine = Arc::new(MockEngine::persisting());
    let sink = Arc::new(MemorySink::new());
    let clock = midday_clock();
    let t0 = clock.now_ms();
    let pipeline = start_pipeline(&dir, engine, sink.clone(), clock.clone());

    pipeline.write("wanted one", 101);
    clock.advance(100);
    pipeline.write("wrong type", 202);
    clock.advance(100);
    pipeline.write("wanted two", 101);
    clock.advance(5_000);
    pipeline.write("outside window", 101);
    settle().await;

    let id = pipeline.submit_export(HashSet::from([101]), t0, t0 + 1_000);
    settle().await;

    let delivered = sink.delivered();
    assert_eq!(delivered.len(), 1);
    assert_eq!(delivered[0].0, id);
    match &delivered[0].1 {
        ExportPayload::Text(text) => {
            let lines: Vec<&str> = text.lines().collect();
            assert_eq!(lines.len(), 2);
            assert!(lines[0].contains("wanted one"));
            assert!(lines[1].contains("wanted two"));
        }
        other => panic!("expected text payload, got {:?}", other),
    }

    pipeline.shutdown(false).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_day_rotation_visible_in_export() {
    let _ = tracing_subscriber::fmt().try_init();

    let dir = TempDir::new().unwrap();
    let engine = Arc::new(MockEngine::persisting());
    let sink = Arc::new(MemorySink::new());
    let clock = midday_clock();
    let t0 = clock.now_ms();
    let pipeline = start_pipeline(&dir, engine.clone(), sink.clone(), clock.clone());

    pipeline.write("yesterday's record", 1);
    settle().await;
    clock.advance(DAY_MS);
    pipeline.write("today's record", 1);
    settle().await;

    assert_eq!(engine.open_tokens().len(), 2);

    // A window spanning both days delivers both raw files.
    pipeline.submit_export(HashSet::new(), t0 - 1, t0 + DAY_MS + 1);
    settle().await;

    match &sink.delivered()[0].1 {
        ExportPayload::Files(files) => assert_eq!(files.len(), 2),
        other => panic!("expected files payload, got {:?}", other),
    }

    pipeline.shutdown(false).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_write_error_carries_source_chain() {
    let _ = tracing_subscriber::fmt().try_init();

    let dir = TempDir::new().unwrap();
    let engine = Arc::new(MockEngine::new());
    let sink = Arc::new(MemorySink::new());
    let pipeline = start_pipeline(&dir, engine.clone(), sink, midday_clock());

    let root = io::Error::new(io::ErrorKind::NotFound, "missing segment");
    let wrapped = anyhow::Error::from(root).context("cache reload failed");
    let error: &(dyn std::error::Error + 'static) = wrapped.as_ref();
    pipeline.write_error("startup", 9, error);
    settle().await;

    let calls = engine.calls();
    let content = calls
        .iter()
        .find_map(|c| match c {
            EngineCall::Write { content, .. } => Some(content.clone()),
            _ => None,
        })
        .unwrap();
    assert!(content.starts_with("startup: cache reload failed"));
    assert!(content.contains("missing segment"));

    pipeline.shutdown(false).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_status_listener_sees_write_failures() {
    let _ = tracing_subscriber::fmt().try_init();

    let dir = TempDir::new().unwrap();
    let engine = Arc::new(MockEngine::new());
    engine.script_write_codes([logpipe::engine::codes::WRITE_FAIL_ALLOC]);
    let sink = Arc::new(MemorySink::new());
    let pipeline = start_pipeline(&dir, engine, sink, midday_clock());

    let events: Arc<Mutex<Vec<(EngineCommand, i32)>>> = Arc::new(Mutex::new(Vec::new()));
    let recorder = events.clone();
    pipeline.set_status_listener(Box::new(move |command, code| {
        recorder.lock().push((command, code));
    }));

    pipeline.write("will fail", 1);
    pipeline.write("will succeed", 1);
    settle().await;

    assert_eq!(
        events.lock().as_slice(),
        &[(
            EngineCommand::Write,
            logpipe::engine::codes::WRITE_FAIL_ALLOC
        )]
    );

    pipeline.shutdown(false).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_quit_is_idempotent_and_stops_ingestion() {
    let _ = tracing_subscriber::fmt().try_init();

    let dir = TempDir::new().unwrap();
    let engine = Arc::new(MockEngine::new());
    let sink = Arc::new(MemorySink::new());
    let pipeline = start_pipeline(&dir, engine.clone(), sink, midday_clock());

    pipeline.write("before quit", 1);
    settle().await;

    pipeline.quit(true);
    pipeline.quit(true);
    pipeline.quit(false);
    pipeline.write("after quit", 1);
    settle().await;

    assert_eq!(engine.write_count(), 1);
    let flushes = engine
        .calls()
        .iter()
        .filter(|c| matches!(c, EngineCall::Flush))
        .count();
    assert_eq!(flushes, 1);
}

struct SlowDecoder;

impl logpipe::LogDecoder for SlowDecoder {
    fn decode(&self, path: &Path) -> anyhow::Result<String> {
        std::thread::sleep(Duration::from_millis(300));
        Ok(std::fs::read_to_string(path)?)
    }
}

fn start_slow_export_pipeline(
    dir: &TempDir,
    sink: Arc<MemorySink>,
    clock: Arc<ManualClock>,
) -> LogPipeline {
    let engine = Arc::new(MockEngine::persisting());
    let options = PipelineOptions::new(test_config(dir), engine, sink)
        .with_clock(clock)
        .with_probe(Arc::new(Roomy))
        .with_decoder(Arc::new(SlowDecoder));
    LogPipeline::start(options)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_exports_keep_running_after_quit() {
    let _ = tracing_subscriber::fmt().try_init();

    let dir = TempDir::new().unwrap();
    let sink = Arc::new(MemorySink::new());
    let clock = midday_clock();
    let t0 = clock.now_ms();
    let pipeline = start_slow_export_pipeline(&dir, sink.clone(), clock);

    pipeline.write("recorded before shutdown", 1);
    settle().await;

    // Ingestion stops, but the already-submitted export is independent of
    // the worker and still delivers.
    pipeline.submit_export(HashSet::new(), t0 - 1, t0 + 1_000);
    tokio::time::sleep(Duration::from_millis(20)).await;
    pipeline.quit(false);

    tokio::time::sleep(Duration::from_millis(600)).await;
    assert_eq!(sink.delivered().len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_cancel_all_exports_prevents_delivery() {
    let _ = tracing_subscriber::fmt().try_init();

    let dir = TempDir::new().unwrap();
    let sink = Arc::new(MemorySink::new());
    let clock = midday_clock();
    let t0 = clock.now_ms();
    let pipeline = start_slow_export_pipeline(&dir, sink.clone(), clock);

    pipeline.write("to be abandoned", 1);
    settle().await;

    pipeline.submit_export(HashSet::new(), t0 - 1, t0 + 1_000);
    tokio::time::sleep(Duration::from_millis(20)).await;
    pipeline.cancel_all_exports();

    tokio::time::sleep(Duration::from_millis(600)).await;
    assert!(sink.delivered().is_empty());

    pipeline.shutdown(false).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_export_recent_covers_requested_days() {
    let _ = tracing_subscriber::fmt().try_init();

    let dir = TempDir::new().unwrap();
    let engine = Arc::new(MockEngine::persisting());
    let sink = Arc::new(MemorySink::new());
    let clock = midday_clock();
    let pipeline = start_pipeline(&dir, engine, sink.clone(), clock.clone());

    pipeline.write("day one", 1);
    settle().await;
    clock.advance(DAY_MS);
    pipeline.write("day two", 1);
    settle().await;

    // Two days back from "now" spans both day files.
    pipeline.export_recent(2);
    settle().await;

    match &sink.delivered()[0].1 {
        ExportPayload::Files(files) => assert_eq!(files.len(), 2),
        other => panic!("expected files payload, got {:?}", other),
    }

    pipeline.shutdown(false).await;
}
