use tokio::sync::broadcast;
use tokio::time::{sleep, timeout, Duration};

use switchscan::backends::VirtualSource;
use switchscan::calibration::{calibration_grid, GRID_POINTS};
use switchscan::host::{HostCall, ScanNotice};
use switchscan::{
    spawn_engine, Action, Device, DeviceEvent, DeviceRegistry, DeviceStatus, DeviceType,
    Dispatched, EngineConfig, EngineHandle, EventPayload, InputEngine, InputError, MemoryStore,
    RawSignal, RecordingHost, ScanState, StaticPairing,
};

const TIMEOUT_MS: u64 = 10_000;

fn switch(id: &str) -> Device {
    Device::new(id, "Switch box", DeviceType::Switch)
}

fn eye(id: &str) -> Device {
    Device::new(id, "Eye tracker", DeviceType::EyeTracker)
}

fn build(devices: &[Device], config: EngineConfig) -> (InputEngine, RecordingHost) {
    let host = RecordingHost::new(["T1", "T2", "T3"]);
    let mut registry = DeviceRegistry::new(MemoryStore::new());
    for d in devices {
        registry.pair(d.clone()).expect("pair");
    }
    let engine = InputEngine::new(config, registry, host.clone(), StaticPairing::allow_all())
        .expect("engine");
    (engine, host)
}

async fn activate(handle: &EngineHandle, id: &str) {
    handle.connect(id).await.expect("connect");
    handle.set_active(id).await.expect("set active");
}

async fn next_event(rx: &mut broadcast::Receiver<DeviceEvent>) -> DeviceEvent {
    timeout(Duration::from_millis(TIMEOUT_MS), rx.recv())
        .await
        .expect("event timed out")
        .expect("event stream closed")
}

#[tokio::test(start_paused = true)]
async fn automatic_scan_advances_on_the_timer() {
    let (engine, host) = build(&[switch("sw")], EngineConfig::default());
    let (handle, task) = spawn_engine(engine);
    activate(&handle, "sw").await;
    assert_eq!(host.highlighted().as_deref(), Some("T1"));

    sleep(Duration::from_millis(2500)).await;
    let status = handle.scanning_status().await.unwrap();
    assert_eq!(status.state, ScanState::Scanning { index: 2 });
    assert_eq!(host.highlighted().as_deref(), Some("T3"));

    handle
        .submit_raw("sw", RawSignal::KeyPressed { key: "Space".into() })
        .await
        .unwrap();
    sleep(Duration::from_millis(1)).await;
    assert_eq!(host.activations(), vec!["T3".to_string()]);

    handle.shutdown().await;
    task.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn scan_exhausts_after_loop_count() {
    let (engine, host) = build(&[switch("sw")], EngineConfig::default());
    let (handle, task) = spawn_engine(engine);
    activate(&handle, "sw").await;

    // 3 targets × 3 loops at 1 s per step
    sleep(Duration::from_millis(9500)).await;
    assert_eq!(
        handle.scanning_status().await.unwrap().state,
        ScanState::Idle
    );
    assert_eq!(host.notices(), vec![ScanNotice::Exhausted { cycles: 3 }]);

    let highlights = host.highlight_count();
    sleep(Duration::from_millis(5000)).await;
    assert_eq!(host.highlight_count(), highlights);

    handle.shutdown().await;
    task.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn disconnect_mid_scan_stops_the_timer() {
    let (engine, host) = build(&[switch("sw")], EngineConfig::default());
    let (handle, task) = spawn_engine(engine);
    activate(&handle, "sw").await;

    sleep(Duration::from_millis(1500)).await;
    handle.disconnect("sw").await.unwrap();
    let highlights = host.highlight_count();
    assert!(host.notices().contains(&ScanNotice::Interrupted {
        device_id: "sw".into()
    }));

    sleep(Duration::from_millis(5000)).await;
    assert_eq!(host.highlight_count(), highlights);
    assert_eq!(
        handle.scanning_status().await.unwrap().state,
        ScanState::Idle
    );

    handle.shutdown().await;
    task.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn selection_rearms_after_delay() {
    let (engine, host) = build(&[switch("sw")], EngineConfig::default());
    let (handle, task) = spawn_engine(engine);
    activate(&handle, "sw").await;

    assert_eq!(
        handle.dispatch(Action::Select).await.unwrap(),
        Dispatched::Selected("T1".into())
    );
    assert!(matches!(
        handle.scanning_status().await.unwrap().state,
        ScanState::Paused { .. }
    ));

    sleep(Duration::from_millis(800)).await;
    assert_eq!(
        handle.scanning_status().await.unwrap().state,
        ScanState::Scanning { index: 0 }
    );

    handle.shutdown().await;
    task.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn subscribers_see_lifecycle_and_input() {
    let (engine, _host) = build(&[switch("sw")], EngineConfig::default());
    let (handle, task) = spawn_engine(engine);
    let mut rx = handle.subscribe();

    activate(&handle, "sw").await;
    let ev = next_event(&mut rx).await;
    assert_eq!(ev.payload(), &EventPayload::Status(DeviceStatus::Connected));

    handle
        .submit_raw("sw", RawSignal::KeyPressed { key: "Enter".into() })
        .await
        .unwrap();
    let ev = next_event(&mut rx).await;
    assert_eq!(ev.device_id(), "sw");
    assert!(matches!(ev.payload(), EventPayload::Switch { pressed: true, .. }));

    handle.shutdown().await;
    task.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn attached_source_is_polled_each_frame() {
    let (engine, host) = build(&[switch("sw")], EngineConfig::default());
    let (handle, task) = spawn_engine(engine);
    activate(&handle, "sw").await;

    let source = VirtualSource::new("sw", "Virtual switch");
    let feeder = source.feeder();
    let poller = handle.attach_source(source);
    assert_eq!(poller.device_id(), "sw");

    feeder.key("Enter");
    feeder.key("Space");
    sleep(Duration::from_millis(50)).await;
    assert_eq!(feeder.pending(), 0);
    assert_eq!(host.activations(), vec!["T2".to_string()]);

    handle.shutdown().await;
    task.await.unwrap();
    sleep(Duration::from_millis(50)).await;
    assert!(poller.is_finished());
}

#[tokio::test(start_paused = true)]
async fn calibration_commits_through_the_handle() {
    let mut config = EngineConfig::default();
    config.calibration.min_samples = 2;
    config.calibration.settle_ms = 0;
    let grid = calibration_grid(config.screen, config.calibration.margin_px);
    let (engine, host) = build(&[eye("et")], config);
    let (handle, task) = spawn_engine(engine);
    handle.connect("et").await.unwrap();

    let runner = handle.clone();
    let run = tokio::spawn(async move { runner.calibrate("et").await });
    sleep(Duration::from_millis(10)).await;

    let status = handle.calibration_status("et").await.unwrap();
    assert_eq!(status.in_progress.map(|p| p.point_index), Some(0));

    for (x, y) in grid {
        for _ in 0..2 {
            handle
                .submit_raw("et", RawSignal::PointerMoved { x, y })
                .await
                .unwrap();
        }
    }
    let outcome = timeout(Duration::from_millis(TIMEOUT_MS), run)
        .await
        .expect("calibration timed out")
        .unwrap()
        .unwrap();
    assert_eq!(outcome.calibration.points.len(), GRID_POINTS);
    assert!(outcome.warning.is_none());
    assert_eq!(host.calls().last(), Some(&HostCall::HideCalibration));

    let status = handle.calibration_status("et").await.unwrap();
    assert!(status.in_progress.is_none());
    assert!((status.committed.aggregate_accuracy - 1.0).abs() < 1e-4);

    handle.shutdown().await;
    task.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn cancelled_calibration_keeps_previous_record() {
    let (engine, _host) = build(&[eye("et")], EngineConfig::default());
    let (handle, task) = spawn_engine(engine);
    handle.connect("et").await.unwrap();
    let before = handle.calibration_status("et").await.unwrap().committed;

    let runner = handle.clone();
    let run = tokio::spawn(async move { runner.calibrate("et").await });
    sleep(Duration::from_millis(10)).await;
    assert!(handle.cancel_calibration().await.unwrap());

    let err = run.await.unwrap().unwrap_err();
    assert!(matches!(err, InputError::CalibrationAborted { .. }));
    assert_eq!(
        handle.calibration_status("et").await.unwrap().committed,
        before
    );

    handle.shutdown().await;
    task.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn silent_calibration_point_times_out() {
    let (engine, _host) = build(&[eye("et")], EngineConfig::default());
    let (handle, task) = spawn_engine(engine);
    handle.connect("et").await.unwrap();

    let err = timeout(Duration::from_millis(TIMEOUT_MS), handle.calibrate("et"))
        .await
        .expect("deadline never fired")
        .unwrap_err();
    assert!(matches!(err, InputError::CalibrationAborted { .. }));

    handle.shutdown().await;
    task.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn closed_engine_rejects_commands() {
    let (engine, _host) = build(&[switch("sw")], EngineConfig::default());
    let (handle, task) = spawn_engine(engine);
    handle.shutdown().await;
    let engine = task.await.unwrap();
    assert!(engine.active_device().is_none());

    assert!(matches!(
        handle.try_submit_raw("sw", RawSignal::KeyPressed { key: "Space".into() }),
        Err(InputError::EngineClosed)
    ));
    assert!(matches!(
        handle.list_devices().await,
        Err(InputError::EngineClosed)
    ));
}
