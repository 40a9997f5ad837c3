use std::sync::atomic::Ordering;
use std::sync::Arc;

use raftkv_load::{
    BenchmarkRunner, BindingRegistry, NoProgress, ReadMode, TraceConfig, TraceLoadPhase,
    TraceWorkload,
};
use tokio_util::sync::CancellationToken;

mod common;

use common::{serve, test_config, FakeState};

const TRACE: &str = "0,a,1,10,c1,set,0\n\
    1,b,1,5,c1,get,0\n\
    2,a,1,0,c1,gets,0\n\
    3,c,1,0,c2,incr,0\n\
    4,b,1,0,c1,delete,0\n";

#[tokio::test]
async fn load_phase_then_replay() {
    let state = Arc::new(FakeState::default());
    let endpoint = serve(Arc::clone(&state)).await;
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("trace.csv");
    std::fs::write(&path, TRACE).unwrap();

    let mut config = test_config(&endpoint, 1, 1000);
    config.collect_cache_hits = true;
    config.reset_cache_hits = true;
    let trace_config = TraceConfig::new(path.display().to_string());
    config.trace = Some(trace_config.clone());
    let trace = Arc::new(TraceWorkload::open(&trace_config).await.unwrap());
    assert_eq!(5, trace.len());
    assert_eq!(3, trace.unique_key_count());

    let runner = BenchmarkRunner::new(config, BindingRegistry::with_defaults());
    let cancel = CancellationToken::new();
    let load = TraceLoadPhase::new(Arc::clone(&trace));
    let report = runner
        .run("load", &load, 3, &NoProgress, &cancel)
        .await
        .unwrap();
    assert_eq!(3, report.submitted);
    assert_eq!(Some(10), state.value(b"a").map(|v| v.len()));
    assert_eq!(Some(5), state.value(b"b").map(|v| v.len()));
    assert_eq!(Some(100), state.value(b"c").map(|v| v.len()));

    let report = runner
        .run("replay", &*trace, 1000, &NoProgress, &cancel)
        .await
        .unwrap();
    assert!(report.exhausted);
    assert_eq!(5, report.submitted);
    assert_eq!(3, report.reads);
    assert_eq!(0, report.read_errors);
    // The set, the incr write, and the delete.
    assert_eq!(3, report.sent);
    assert_eq!(Some(0), report.cache_hits_before);
    assert_eq!(Some(3), report.cache_hit_delta());
    assert_eq!(3, state.gets.load(Ordering::Acquire));
    assert_eq!(Some(b"1".to_vec()), state.value(b"c"));
    assert_eq!(None, state.value(b"b"));
}

#[tokio::test]
async fn write_mode_replays_reads_as_updates() {
    let state = Arc::new(FakeState::default());
    let endpoint = serve(Arc::clone(&state)).await;
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("trace.csv");
    std::fs::write(&path, "0,a,1,1,c1,set,0\n1,a,1,1,c1,get,0\n").unwrap();

    let mut trace_config = TraceConfig::new(path.display().to_string());
    trace_config.read_mode = ReadMode::Write;
    let trace = TraceWorkload::open(&trace_config).await.unwrap();
    let runner = BenchmarkRunner::new(
        test_config(&endpoint, 2, 2),
        BindingRegistry::with_defaults(),
    );
    let report = runner
        .run("replay", &trace, 2, &NoProgress, &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(2, report.submitted);
    assert_eq!(0, report.reads);
    assert_eq!(2, state.stream_puts.load(Ordering::Acquire));
    assert_eq!(0, state.gets.load(Ordering::Acquire));
    assert!(state.value(b"a").is_some());
}

#[tokio::test]
async fn skip_mode_drops_reads() {
    let state = Arc::new(FakeState::default());
    let endpoint = serve(Arc::clone(&state)).await;
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("trace.csv");
    std::fs::write(&path, TRACE).unwrap();

    let mut trace_config = TraceConfig::new(path.display().to_string());
    trace_config.read_mode = ReadMode::Skip;
    let trace = TraceWorkload::open(&trace_config).await.unwrap();
    let runner = BenchmarkRunner::new(
        test_config(&endpoint, 1, 100),
        BindingRegistry::with_defaults(),
    );
    let report = runner
        .run("replay", &trace, 100, &NoProgress, &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(2, report.skipped);
    assert_eq!(3, report.submitted);
    // The incr reads a key that was never loaded, so its write is skipped.
    assert_eq!(1, report.reads);
    assert_eq!(1, report.read_errors);
    assert_eq!(2, report.sent);
    assert_eq!(None, state.value(b"c"));
}
