use tempfile::TempDir;

use switchscan::settings::{ScanSettingsPatch, SettingsPatch, SwitchPatch};
use switchscan::{
    spawn_engine, Device, DeviceRegistry, DeviceStatus, DeviceType, EngineConfig, InputEngine,
    JsonFileStore, RecordingHost, ScanMode, StaticPairing,
};

fn open(dir: &TempDir) -> DeviceRegistry {
    DeviceRegistry::load(JsonFileStore::new(dir.path().join("devices.json"))).expect("load catalog")
}

#[tokio::test(start_paused = true)]
async fn paired_devices_and_settings_survive_restart() {
    let dir = TempDir::new().expect("temp dir");

    let engine = InputEngine::new(
        EngineConfig::default(),
        open(&dir),
        RecordingHost::new(["a", "b"]),
        StaticPairing::allow_all(),
    )
    .unwrap();
    let (handle, task) = spawn_engine(engine);
    handle
        .pair(Device::new("sw", "Switch box", DeviceType::Switch))
        .await
        .unwrap();
    handle
        .pair(Device::new("et", "Eye tracker", DeviceType::EyeTracker))
        .await
        .unwrap();
    handle.connect("sw").await.unwrap();
    handle
        .update_settings(
            "sw",
            SettingsPatch::Switch(SwitchPatch {
                scan_settings: Some(ScanSettingsPatch {
                    mode: Some(ScanMode::Step),
                    scan_speed_ms: Some(1500),
                    ..ScanSettingsPatch::default()
                }),
                ..SwitchPatch::default()
            }),
        )
        .await
        .unwrap();
    handle.unpair("et").await.unwrap();
    handle.shutdown().await;
    task.await.unwrap();

    let registry = open(&dir);
    assert_eq!(registry.list_devices().len(), 1);
    let sw = registry.get("sw").expect("switch persisted");
    assert_eq!(sw.status, DeviceStatus::Disconnected);
    let scan = &sw.settings.as_switch().expect("switch settings").scan_settings;
    assert_eq!(scan.mode, ScanMode::Step);
    assert_eq!(scan.scan_speed_ms, 1500);
    assert!(registry.active_id().is_none());
}

#[test]
fn corrupt_catalog_is_a_persistence_error() {
    let dir = TempDir::new().expect("temp dir");
    let path = dir.path().join("devices.json");
    std::fs::write(&path, "{ not json").unwrap();
    let err = DeviceRegistry::load(JsonFileStore::new(path)).unwrap_err();
    assert!(matches!(err, switchscan::InputError::Persistence { .. }));
}
