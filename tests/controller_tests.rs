// SPDX-License-Identifier: GPL-3.0-only

//! Integration tests for the pipeline lifecycle

mod common;

use camera_tx::controller::{ControllerSettings, EncoderErrorPolicy, Tick};
use camera_tx::pipeline::{PipelineEvent, StageKind};
use camera_tx::storage::{self, ConfigPersister};
use camera_tx::{
    ChangeClass, ConfigUpdate, ExitReason, LifecycleController, LifecycleState, StreamConfig,
};
use common::{FakeBackend, fast_settings};
use serde_json::json;
use std::sync::Arc;
use tempfile::TempDir;

fn update(value: serde_json::Value) -> ConfigUpdate {
    ConfigUpdate::from_value(&value).unwrap()
}

fn started(backend: &Arc<FakeBackend>, settings: ControllerSettings) -> LifecycleController {
    let mut controller = LifecycleController::new(
        backend.clone(),
        StreamConfig::default(),
        ConfigPersister::disabled(),
        settings,
    );
    controller.start().unwrap();
    controller
}

fn encoder_error() -> PipelineEvent {
    PipelineEvent::Error {
        source: StageKind::Encode.element_name().to_string(),
        message: "encoder hung".to_string(),
        debug: Some("driver timeout".to_string()),
    }
}

#[test]
fn test_start_runs_pipeline() {
    let backend = FakeBackend::new();
    let controller = started(&backend, fast_settings());

    assert_eq!(controller.state(), LifecycleState::Running);
    let status = controller.handle().status();
    assert_eq!(status.encoder.as_deref(), Some("v4l2h264enc"));
    assert!(backend.latest().is_started());
}

#[test]
fn test_start_failure_leaves_controller_stopped() {
    let backend = FakeBackend::new();
    backend.mark_broken("libcamerasrc");
    let mut controller = LifecycleController::new(
        backend.clone(),
        StreamConfig::default(),
        ConfigPersister::disabled(),
        fast_settings(),
    );

    assert!(controller.start().is_err());
    assert_eq!(controller.state(), LifecycleState::Stopped);
}

#[test]
fn test_host_change_patches_live_sink_without_rebuild() {
    let backend = FakeBackend::new();
    let mut controller = started(&backend, fast_settings());
    let handle = controller.handle();
    let pipeline = backend.latest();
    pipeline.stream(30, 1000);

    let class = handle.apply_update(&update(json!({"host": "10.0.0.5"})));
    assert_eq!(class, ChangeClass::ConnectionOnly);
    assert_eq!(
        pipeline.property(StageKind::Transmit, "host").as_deref(),
        Some("10.0.0.5")
    );

    assert_eq!(controller.tick(), Tick::Idle);
    assert_eq!(backend.pipeline_count(), 1);
    assert_eq!(controller.state(), LifecycleState::Running);

    // Counters keep going
    pipeline.stream(10, 1000);
    assert_eq!(handle.stats().frame_count, 40);
}

#[test]
fn test_resolution_change_rebuilds_and_resets_stats() {
    let backend = FakeBackend::new();
    let mut controller = started(&backend, fast_settings());
    let handle = controller.handle();
    let first = backend.latest();
    first.stream(50, 1000);
    assert_eq!(handle.stats().frame_count, 50);

    let class = handle.apply_update(&update(json!({"width": 1920, "height": 1080})));
    assert_eq!(class, ChangeClass::TopologyChanging);
    assert!(handle.status().restart_pending);

    assert_eq!(controller.tick(), Tick::Rebuilt);
    assert_eq!(controller.state(), LifecycleState::Running);
    assert_eq!(backend.pipeline_count(), 2);
    assert!(first.is_stopped());
    assert!(first.is_dropped());

    let second = backend.latest();
    let format = second.format().unwrap();
    assert_eq!((format.width, format.height), (1920, 1080));
    assert_eq!(handle.stats().frame_count, 0);
    assert_eq!(handle.stats().total_bytes, 0);

    let config = handle.config();
    assert_eq!((config.width, config.height), (1920, 1080));
    assert!(!handle.status().restart_pending);
}

#[test]
fn test_same_update_twice_is_noop() {
    let backend = FakeBackend::new();
    let mut controller = started(&backend, fast_settings());
    let handle = controller.handle();

    let body = update(json!({"framerate": 25}));
    assert_eq!(handle.apply_update(&body), ChangeClass::TopologyChanging);
    assert_eq!(controller.tick(), Tick::Rebuilt);

    assert_eq!(handle.apply_update(&body), ChangeClass::None);
    assert_eq!(controller.tick(), Tick::Idle);
    assert_eq!(backend.pipeline_count(), 2);
}

#[test]
fn test_updates_coalesce_into_one_rebuild() {
    let backend = FakeBackend::new();
    let mut controller = started(&backend, fast_settings());
    let handle = controller.handle();

    handle.apply_update(&update(json!({"width": 640, "height": 480})));
    handle.apply_update(&update(json!({"encoder": "x264enc"})));
    handle.apply_update(&update(json!({"framerate": 15})));

    assert_eq!(controller.tick(), Tick::Rebuilt);
    assert_eq!(controller.tick(), Tick::Idle);
    assert_eq!(backend.pipeline_count(), 2);

    let latest = backend.latest();
    let format = latest.format().unwrap();
    assert_eq!((format.width, format.height, format.framerate), (640, 480, 15));
    assert_eq!(latest.implementation(StageKind::Encode).as_deref(), Some("x264enc"));
}

#[test]
fn test_failed_rebuild_is_fatal() {
    let backend = FakeBackend::new();
    let mut controller = started(&backend, fast_settings());
    let handle = controller.handle();

    backend.mark_broken("v4l2src");
    handle.apply_update(&update(json!({"src": "v4l2"})));

    assert!(matches!(controller.tick(), Tick::Exit(ExitReason::BuildFailed(_))));
    assert_eq!(controller.state(), LifecycleState::Stopped);
}

#[test]
fn test_failed_rebuild_retries_with_defaults_when_enabled() {
    let backend = FakeBackend::new();
    let settings = ControllerSettings {
        retry_with_defaults: true,
        ..fast_settings()
    };
    let mut controller = started(&backend, settings);
    let handle = controller.handle();

    backend.mark_broken("v4l2src");
    handle.apply_update(&update(json!({"src": "v4l2", "host": "10.1.1.1"})));

    assert_eq!(controller.tick(), Tick::Rebuilt);
    assert_eq!(controller.state(), LifecycleState::Running);
    let config = handle.config();
    assert_eq!(config.source, camera_tx::SourceKind::Libcamera);
    assert_eq!(config.host, "10.1.1.1");
}

#[test]
fn test_fatal_error_tears_down_and_exits() {
    let backend = FakeBackend::new();
    let mut controller = started(&backend, fast_settings());
    let pipeline = backend.latest();

    pipeline.push_event(PipelineEvent::Error {
        source: "source".to_string(),
        message: "camera unplugged".to_string(),
        debug: None,
    });

    assert_eq!(controller.tick(), Tick::Event);
    assert!(controller.handle().is_terminating());

    assert_eq!(
        controller.tick(),
        Tick::Exit(ExitReason::RuntimeError("camera unplugged".to_string()))
    );
    assert!(pipeline.is_stopped());
    assert!(pipeline.is_dropped());
    assert_eq!(controller.state(), LifecycleState::Stopped);
}

#[test]
fn test_end_of_stream_exits() {
    let backend = FakeBackend::new();
    let mut controller = started(&backend, fast_settings());
    backend.latest().push_event(PipelineEvent::EndOfStream);

    assert_eq!(controller.run(), ExitReason::EndOfStream);
    assert!(backend.latest().is_dropped());
}

#[test]
fn test_shutdown_request_exits_run_loop() {
    let backend = FakeBackend::new();
    let mut controller = started(&backend, fast_settings());
    controller.handle().request_shutdown();

    let reason = controller.run();
    assert_eq!(reason, ExitReason::Shutdown);
    assert!(!reason.is_failure());
    assert!(backend.latest().is_dropped());
}

#[test]
fn test_warnings_do_not_stop_stream() {
    let backend = FakeBackend::new();
    let mut controller = started(&backend, fast_settings());
    backend.latest().push_event(PipelineEvent::Warning {
        source: "convert".to_string(),
        message: "dropping frames".to_string(),
        debug: None,
    });

    assert_eq!(controller.tick(), Tick::Event);
    assert!(!controller.handle().is_terminating());
    assert_eq!(controller.state(), LifecycleState::Running);
}

#[test]
fn test_encoder_error_terminates_by_default() {
    let backend = FakeBackend::new();
    let mut controller = started(&backend, fast_settings());
    backend.latest().push_event(encoder_error());

    assert_eq!(controller.tick(), Tick::Event);
    assert!(matches!(controller.tick(), Tick::Exit(ExitReason::RuntimeError(_))));
    assert_eq!(backend.pipeline_count(), 1);
}

#[test]
fn test_encoder_error_falls_back_when_configured() {
    let backend = FakeBackend::new();
    let settings = ControllerSettings {
        encoder_error_policy: EncoderErrorPolicy::Fallback,
        ..fast_settings()
    };
    let mut controller = started(&backend, settings);
    backend.latest().push_event(encoder_error());

    assert_eq!(controller.tick(), Tick::Event);
    assert_eq!(controller.tick(), Tick::Rebuilt);
    assert_eq!(
        controller.handle().status().encoder.as_deref(),
        Some("omxh264enc")
    );

    // The configured encoder itself is untouched
    assert_eq!(controller.handle().config().encoder, "v4l2h264enc");
}

#[test]
fn test_quiesce_timeout_still_releases() {
    let backend = FakeBackend::new();
    let mut controller = started(&backend, fast_settings());
    let first = backend.latest();
    backend
        .settings
        .fail_stop
        .store(true, std::sync::atomic::Ordering::SeqCst);

    controller.handle().request_restart();
    assert_eq!(controller.tick(), Tick::Rebuilt);
    assert!(first.is_dropped());
}

#[test]
fn test_destination_change_during_rebuild_reaches_new_sink() {
    let backend = FakeBackend::new();
    let mut controller = started(&backend, fast_settings());
    let handle = controller.handle();

    handle.apply_update(&update(json!({"width": 1920, "height": 1080})));
    let during = handle.clone();
    backend.on_next_build(move || {
        assert_eq!(
            during.apply_update(&update(json!({"host": "10.9.9.9"}))),
            ChangeClass::ConnectionOnly
        );
    });

    assert_eq!(controller.tick(), Tick::Rebuilt);
    assert_eq!(
        backend.latest().property(StageKind::Transmit, "host").as_deref(),
        Some("10.9.9.9")
    );
    assert_eq!(controller.tick(), Tick::Idle);
    assert_eq!(backend.pipeline_count(), 2);
}

#[test]
fn test_topology_change_during_rebuild_triggers_another() {
    let backend = FakeBackend::new();
    let mut controller = started(&backend, fast_settings());
    let handle = controller.handle();

    handle.apply_update(&update(json!({"width": 1920, "height": 1080})));
    let during = handle.clone();
    backend.on_next_build(move || {
        during.apply_update(&update(json!({"framerate": 15})));
    });

    assert_eq!(controller.tick(), Tick::Rebuilt);
    assert!(handle.status().restart_pending);
    assert_eq!(backend.latest().format().unwrap().framerate, 30);

    assert_eq!(controller.tick(), Tick::Rebuilt);
    assert_eq!(backend.pipeline_count(), 3);
    let format = backend.latest().format().unwrap();
    assert_eq!((format.width, format.height, format.framerate), (1920, 1080, 15));
    assert!(!handle.status().restart_pending);
}

#[test]
fn test_concurrent_updates_persist_latest_config() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("config.json");
    let backend = FakeBackend::new();
    let mut controller = LifecycleController::new(
        backend.clone(),
        StreamConfig::default(),
        ConfigPersister::new(path.clone()),
        fast_settings(),
    );
    controller.start().unwrap();
    let handle = controller.handle();

    let workers: Vec<_> = (0..8u16)
        .map(|worker| {
            let handle = handle.clone();
            std::thread::spawn(move || {
                for round in 0..25u16 {
                    let port = 6000 + worker * 100 + round;
                    handle.apply_update(&update(json!({"port": port})));
                }
            })
        })
        .collect();
    for worker in workers {
        worker.join().unwrap();
    }

    assert_eq!(storage::load_config(&path).unwrap(), handle.config());
}

#[test]
fn test_shutdown_requested_during_start_is_honoured() {
    let backend = FakeBackend::new();
    let mut controller = LifecycleController::new(
        backend.clone(),
        StreamConfig::default(),
        ConfigPersister::disabled(),
        fast_settings(),
    );
    let handle = controller.handle();
    backend.on_next_build(move || handle.request_shutdown());

    controller.start().unwrap();
    assert_eq!(controller.tick(), Tick::Exit(ExitReason::Shutdown));
    assert!(backend.latest().is_dropped());
}
