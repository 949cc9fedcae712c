use std::{
    sync::{Arc, atomic::Ordering},
    time::Duration,
};

use chrono::Utc;
use serde_json::Value;
use tempfile::NamedTempFile;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::{DIAGNOSTIC_TAIL_LINES, DiagnosticTail, Pipeline, PipelineOptions, looks_like_failure};
use crate::{
    activity::{ActivityStore, LogLevel},
    error::PipelineError,
    hub::EventHub,
    model::StreamDefinition,
    registry::{Process, ProcessRegistry, Status},
    testing::{Behaviour, FakeLauncher},
};

struct Harness {
    pipeline: Pipeline,
    registry: Arc<ProcessRegistry>,
    hub: Arc<EventHub>,
    activity: Arc<ActivityStore>,
    launcher: Arc<FakeLauncher>,
    media: NamedTempFile,
}

fn harness(launcher: FakeLauncher) -> Harness {
    harness_with(launcher, PipelineOptions {
        grace_period: Duration::from_millis(200),
        vacate_timeout: Duration::from_millis(300),
        vacate_poll: Duration::from_millis(10),
        ..PipelineOptions::default()
    })
}

fn harness_with(launcher: FakeLauncher, options: PipelineOptions) -> Harness {
    let registry = Arc::new(ProcessRegistry::new());
    let hub = Arc::new(EventHub::new());
    let activity = Arc::new(ActivityStore::new());
    let launcher = Arc::new(launcher);
    let pipeline = Pipeline::with_options(
        Arc::clone(&registry),
        Arc::clone(&hub),
        activity.clone(),
        launcher.clone(),
        options,
    );
    Harness {
        pipeline,
        registry,
        hub,
        activity,
        launcher,
        media: NamedTempFile::new().unwrap(),
    }
}

fn stream() -> StreamDefinition {
    let now = Utc::now();
    StreamDefinition {
        id: Uuid::new_v4(),
        name: "test".into(),
        video_id: Some(Uuid::new_v4()),
        destinations: vec!["rtmp://a.example/live/key".into()],
        bitrate: 2500,
        resolution: "1280x720".into(),
        fps: 30,
        loop_input: true,
        status: "idle".into(),
        created_at: now,
        updated_at: now,
    }
}

async fn wait_empty(registry: &ProcessRegistry) {
    for _ in 0..200 {
        if registry.is_empty().await {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("registry still holds {:?}", registry.stream_ids().await);
}

async fn wait_exited(process: &Process) {
    tokio::time::timeout(Duration::from_secs(2), process.exited().cancelled())
        .await
        .expect("process never exited");
}

/// Next message of the given envelope type, skipping everything else.
async fn next_of(rx: &mut UnboundedReceiver<Arc<str>>, kind: &str) -> Value {
    loop {
        let msg = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("timed out waiting for event")
            .expect("hub closed");
        let value: Value = serde_json::from_str(&msg).unwrap();
        if value["type"] == kind {
            return value["payload"].clone();
        }
    }
}

fn events(activity: &ActivityStore) -> Vec<String> {
    let mut entries = activity.list(500);
    entries.reverse();
    entries.into_iter().map(|e| e.event).collect()
}

#[tokio::test]
async fn test_start_then_clean_exit_stops() {
    let h = harness(FakeLauncher::new(Behaviour::ExitOnInterrupt));
    let (_, mut rx) = h.hub.subscribe();
    let s = stream();

    h.pipeline.start(&s, h.media.path()).await.unwrap();

    let process = h.registry.get(s.id).await.unwrap();
    assert_eq!(process.status(), Status::Running);
    assert_eq!(next_of(&mut rx, "stream_status").await["status"], "running");

    h.launcher.last().exit(true, Some(0));

    assert_eq!(next_of(&mut rx, "stream_status").await["status"], "stopped");
    wait_exited(&process).await;
    assert!(!h.registry.contains(s.id).await);
    assert_eq!(process.status(), Status::Stopped);
    assert!(events(&h.activity).contains(&"pipeline_stopped".to_string()));
}

#[tokio::test]
async fn test_failed_exit_reports_error() {
    let h = harness(FakeLauncher::new(Behaviour::ExitOnInterrupt));
    let (_, mut rx) = h.hub.subscribe();
    let s = stream();

    h.pipeline.start(&s, h.media.path()).await.unwrap();
    h.launcher.last().exit(false, Some(1));

    assert_eq!(next_of(&mut rx, "stream_status").await["status"], "running");
    assert_eq!(next_of(&mut rx, "stream_status").await["status"], "error");
    wait_empty(&h.registry).await;

    let log = next_of(&mut rx, "stream_log").await;
    assert_eq!(log["event"], "pipeline_error");
    assert_eq!(log["level"], "error");
}

#[tokio::test]
async fn test_sequential_start_stop_cycles() {
    let h = harness(FakeLauncher::new(Behaviour::ExitOnInterrupt));
    let s = stream();
    let cancel = CancellationToken::new();

    for _ in 0..2 {
        h.pipeline.start(&s, h.media.path()).await.unwrap();
        assert!(h.registry.contains(s.id).await);

        h.pipeline.stop(s.id, &cancel).await.unwrap();
        wait_empty(&h.registry).await;
    }

    assert_eq!(h.launcher.count(), 2);
    assert_eq!(h.launcher.last().kills.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_stop_marks_interrupted_exit_as_stopped() {
    let h = harness(FakeLauncher::new(Behaviour::ExitOnInterrupt));
    let (_, mut rx) = h.hub.subscribe();
    let s = stream();

    h.pipeline.start(&s, h.media.path()).await.unwrap();
    let process = h.registry.get(s.id).await.unwrap();
    h.pipeline
        .stop(s.id, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(next_of(&mut rx, "stream_status").await["status"], "running");
    assert_eq!(next_of(&mut rx, "stream_status").await["status"], "stopping");
    assert_eq!(next_of(&mut rx, "stream_status").await["status"], "stopped");
    assert_eq!(process.status(), Status::Stopped);
}

#[tokio::test]
async fn test_double_start_is_rejected() {
    let h = harness(FakeLauncher::new(Behaviour::ExitOnInterrupt));
    let s = stream();

    h.pipeline.start(&s, h.media.path()).await.unwrap();
    let first = h.registry.get(s.id).await.unwrap();

    let err = h.pipeline.start(&s, h.media.path()).await.unwrap_err();
    assert!(matches!(err, PipelineError::AlreadyRunning(id) if id == s.id));

    assert_eq!(h.launcher.count(), 1);
    let current = h.registry.get(s.id).await.unwrap();
    assert!(Arc::ptr_eq(&first, &current));
    assert_eq!(current.status(), Status::Running);
}

#[tokio::test]
async fn test_missing_media_is_rejected() {
    let h = harness(FakeLauncher::new(Behaviour::ExitOnInterrupt));
    let s = stream();
    let dir = tempfile::tempdir().unwrap();

    let err = h
        .pipeline
        .start(&s, &dir.path().join("missing.mp4"))
        .await
        .unwrap_err();

    assert!(matches!(err, PipelineError::MediaNotFound { .. }));
    assert_eq!(h.launcher.count(), 0);
    assert!(h.registry.is_empty().await);
    assert!(events(&h.activity).contains(&"video_missing".to_string()));
}

#[tokio::test]
async fn test_empty_destinations_never_launch() {
    let h = harness(FakeLauncher::new(Behaviour::ExitOnInterrupt));
    let mut s = stream();
    s.destinations.clear();

    let err = h.pipeline.start(&s, h.media.path()).await.unwrap_err();

    assert!(matches!(err, PipelineError::Command(_)));
    assert_eq!(h.launcher.count(), 0);
    assert!(h.registry.is_empty().await);
}

#[tokio::test]
async fn test_launch_failure_rolls_back_registration() {
    let h = harness(FakeLauncher::failing());
    let s = stream();

    let err = h.pipeline.start(&s, h.media.path()).await.unwrap_err();

    assert!(matches!(err, PipelineError::Launch(_)));
    assert!(h.registry.is_empty().await);
    assert!(events(&h.activity).contains(&"pipeline_start_failed".to_string()));
}

#[tokio::test]
async fn test_stop_without_process_is_noop() {
    let h = harness(FakeLauncher::new(Behaviour::ExitOnInterrupt));

    h.pipeline
        .stop(Uuid::new_v4(), &CancellationToken::new())
        .await
        .unwrap();

    assert!(h.registry.is_empty().await);
    assert!(h.activity.is_empty());
}

#[tokio::test]
async fn test_stop_kills_after_grace_period() {
    let h = harness(FakeLauncher::new(Behaviour::Stubborn));
    let s = stream();

    h.pipeline.start(&s, h.media.path()).await.unwrap();
    h.pipeline
        .stop(s.id, &CancellationToken::new())
        .await
        .unwrap();

    let encoder = h.launcher.last();
    assert_eq!(encoder.interrupts.load(Ordering::SeqCst), 1);
    assert_eq!(encoder.kills.load(Ordering::SeqCst), 1);
    assert!(events(&h.activity).contains(&"pipeline_kill".to_string()));
}

#[tokio::test]
async fn test_undeliverable_interrupt_escalates_to_kill() {
    let h = harness(FakeLauncher::new(Behaviour::NoInterrupt));
    let s = stream();

    h.pipeline.start(&s, h.media.path()).await.unwrap();
    h.pipeline
        .stop(s.id, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(h.launcher.last().kills.load(Ordering::SeqCst), 1);
    wait_empty(&h.registry).await;
}

#[tokio::test]
async fn test_stop_honours_cancellation() {
    let h = harness_with(
        FakeLauncher::new(Behaviour::Stubborn),
        PipelineOptions {
            grace_period: Duration::from_secs(30),
            ..PipelineOptions::default()
        },
    );
    let s = stream();
    h.pipeline.start(&s, h.media.path()).await.unwrap();

    let cancel = CancellationToken::new();
    cancel.cancel();
    let err = h.pipeline.stop(s.id, &cancel).await.unwrap_err();

    assert!(matches!(err, PipelineError::Cancelled));
    assert_eq!(h.launcher.last().kills.load(Ordering::SeqCst), 0);
    let process = h.registry.get(s.id).await.unwrap();
    assert_eq!(process.status(), Status::Stopping);
}

#[tokio::test]
async fn test_reload_replaces_process() {
    let h = harness(FakeLauncher::new(Behaviour::ExitOnInterrupt));
    let s = stream();
    h.pipeline.start(&s, h.media.path()).await.unwrap();
    let before = h.registry.get(s.id).await.unwrap();

    h.pipeline
        .reload(&s, h.media.path(), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(h.launcher.count(), 2);
    let after = h.registry.get(s.id).await.unwrap();
    assert!(!Arc::ptr_eq(&before, &after));
    assert_eq!(before.status(), Status::Stopped);
    assert_eq!(after.status(), Status::Running);

    let events = events(&h.activity);
    let reload = events.iter().position(|e| e == "pipeline_reload").unwrap();
    let reloaded = events.iter().position(|e| e == "pipeline_reloaded").unwrap();
    assert!(reload < reloaded);
}

#[tokio::test]
async fn test_reload_times_out_without_starting() {
    let h = harness(FakeLauncher::new(Behaviour::Stubborn));
    let s = stream();
    h.pipeline.start(&s, h.media.path()).await.unwrap();

    let err = h
        .pipeline
        .reload(&s, h.media.path(), &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, PipelineError::VacateTimeout(id) if id == s.id));
    assert_eq!(h.launcher.count(), 1);
    assert!(events(&h.activity).contains(&"pipeline_reload_failed".to_string()));
}

#[tokio::test]
async fn test_reload_aborts_when_stop_fails() {
    let h = harness_with(
        FakeLauncher::new(Behaviour::Stubborn),
        PipelineOptions {
            grace_period: Duration::from_secs(30),
            ..PipelineOptions::default()
        },
    );
    let s = stream();
    h.pipeline.start(&s, h.media.path()).await.unwrap();

    let cancel = CancellationToken::new();
    cancel.cancel();
    let err = h
        .pipeline
        .reload(&s, h.media.path(), &cancel)
        .await
        .unwrap_err();

    assert!(matches!(err, PipelineError::ReloadStop(_)));
    assert_eq!(h.launcher.count(), 1);
}

#[tokio::test]
async fn test_monitor_forwards_progress_and_failures() {
    let h = harness(FakeLauncher::new(Behaviour::ExitOnInterrupt));
    let (_, mut rx) = h.hub.subscribe();
    let s = stream();
    h.pipeline.start(&s, h.media.path()).await.unwrap();
    let process = h.registry.get(s.id).await.unwrap();

    let encoder = h.launcher.last();
    encoder.write_line("Input #0, mov,mp4, from 'in.mp4':").await;
    encoder
        .write_line("[tee @ 0x1] Slave muxer #0 failed: Connection refused")
        .await;
    encoder
        .write_line("frame=  120 fps= 30 q=28.0 size=512kB time=00:00:04.00 bitrate=1048.6kbits/s speed=1.01x")
        .await;

    let progress = next_of(&mut rx, "stream_progress").await;
    assert_eq!(progress["stream_id"], s.id.to_string());
    assert_eq!(progress["progress"]["frame"], 120);
    assert_eq!(process.last_progress().unwrap().time, "00:00:04.00");

    encoder.exit(true, Some(0));
    wait_empty(&h.registry).await;

    let failures: Vec<_> = h
        .activity
        .list(500)
        .into_iter()
        .filter(|e| e.event == "stderr")
        .collect();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].level, LogLevel::Error);
    assert_eq!(failures[0].stream_id, Some(s.id));
    assert!(failures[0].message.contains("Connection refused"));
}

#[tokio::test]
async fn test_stop_all_empties_registry() {
    let h = harness(FakeLauncher::new(Behaviour::ExitOnInterrupt));
    let a = stream();
    let b = stream();
    h.pipeline.start(&a, h.media.path()).await.unwrap();
    h.pipeline.start(&b, h.media.path()).await.unwrap();

    h.pipeline.stop_all(&CancellationToken::new()).await;

    wait_empty(&h.registry).await;
}

#[test]
fn test_looks_like_failure() {
    assert!(looks_like_failure("Error opening input file"));
    assert!(looks_like_failure("rtmp://x: Connection failed"));
    assert!(looks_like_failure("Invalid data found when processing input"));
    assert!(looks_like_failure("Cannot open connection"));
    assert!(looks_like_failure("[aac] an error occurred"));
    assert!(!looks_like_failure("Stream mapping:"));
    assert!(!looks_like_failure("   "));
    assert!(!looks_like_failure("errors=0"));
}

#[tokio::test]
async fn test_stop_skips_log_when_not_launched() {
    let h = harness(FakeLauncher::new(Behaviour::ExitOnInterrupt));
    let id = Uuid::new_v4();
    h.registry.register(id).await;

    let err = h.pipeline.stop(id, &CancellationToken::new()).await.unwrap_err();
    assert!(matches!(err, PipelineError::NotLaunched(got) if got == id));
    assert!(!events(&h.activity).contains(&"pipeline_stopping".to_string()));
}

#[tokio::test]
async fn test_stop_leaves_terminal_process_alone() {
    let h = harness(FakeLauncher::new(Behaviour::Stubborn));
    let (_, mut rx) = h.hub.subscribe();
    let s = stream();
    h.pipeline.start(&s, h.media.path()).await.unwrap();
    assert_eq!(next_of(&mut rx, "stream_status").await["status"], "running");

    let process = h.registry.get(s.id).await.unwrap();
    process.set_status(Status::Stopped);
    h.pipeline.stop(s.id, &CancellationToken::new()).await.unwrap();

    let encoder = h.launcher.last();
    assert_eq!(encoder.interrupts.load(Ordering::SeqCst), 0);
    assert!(!events(&h.activity).contains(&"pipeline_stopping".to_string()));
    assert_eq!(process.status(), Status::Stopped);

    encoder.exit(true, Some(0));
    wait_exited(&process).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_stop_racing_exit_ends_terminal() {
    let h = Arc::new(harness(FakeLauncher::new(Behaviour::ExitOnInterrupt)));
    let s = stream();

    for _ in 0..200 {
        let (_, mut rx) = h.hub.subscribe();
        h.pipeline.start(&s, h.media.path()).await.unwrap();
        let process = h.registry.get(s.id).await.unwrap();

        let stopper = {
            let h = Arc::clone(&h);
            let id = s.id;
            tokio::spawn(async move { h.pipeline.stop(id, &CancellationToken::new()).await })
        };
        h.launcher.last().exit(true, Some(0));
        stopper.await.unwrap().unwrap();
        wait_exited(&process).await;

        let mut last = None;
        while let Ok(msg) = rx.try_recv() {
            let value: Value = serde_json::from_str(&msg).unwrap();
            if value["type"] == "stream_status" {
                last = Some(value["payload"]["status"].clone());
            }
        }
        assert_eq!(last, Some(Value::from("stopped")));
        assert_eq!(process.status(), Status::Stopped);
    }
    assert!(h.registry.is_empty().await);
}

#[test]
fn test_diagnostic_tail_keeps_last_lines() {
    let mut tail = DiagnosticTail::default();
    for n in 1..=12 {
        tail.push(format!("line {}", n));
    }

    let expected: Vec<String> = (3..=12).map(|n| format!("line {}", n)).collect();
    assert_eq!(DIAGNOSTIC_TAIL_LINES, 10);
    assert_eq!(tail.render(), expected.join("\n"));
}
