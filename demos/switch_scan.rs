//! Drives a scan with a virtual switch box and prints what the host sees.
//!
//! RUST_LOG=switchscan=debug cargo run --example switch_scan

use std::time::Duration;

use switchscan::backends::{probe_devices, VirtualSource};
use switchscan::host::HostCall;
use switchscan::{
    spawn_engine, Device, DeviceRegistry, DeviceType, EngineConfig, InputEngine, MemoryStore,
    RecordingHost, StaticPairing,
};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let host = RecordingHost::new(["hello", "yes", "no", "thank you"]);
    let mut registry = DeviceRegistry::new(MemoryStore::new());
    for d in probe_devices() {
        println!("- found {d}");
        registry.upsert_discovered(d).expect("record discovered device");
    }
    registry
        .pair(Device::new("virtual:switch", "Virtual switch box", DeviceType::Switch))
        .expect("pair virtual switch");

    let mut config = EngineConfig::default();
    config.scan.rearm_delay_ms = 500;
    let engine = InputEngine::new(config, registry, host.clone(), StaticPairing::allow_all())
        .expect("build engine");
    let (handle, task) = spawn_engine(engine);

    handle.connect("virtual:switch").await.expect("connect");
    handle.set_active("virtual:switch").await.expect("activate");

    let source = VirtualSource::new("virtual:switch", "Virtual switch box");
    let switch = source.feeder();
    let poller = handle.attach_source(source);

    // Let the highlight walk to "no", then press Space (select).
    tokio::time::sleep(Duration::from_millis(2100)).await;
    switch.key("Space");
    tokio::time::sleep(Duration::from_millis(1200)).await;
    // Enter moves the highlight by hand.
    switch.key("Enter");
    switch.key("Space");
    tokio::time::sleep(Duration::from_millis(100)).await;

    let status = handle.scanning_status().await.expect("status");
    println!("Scan: {:?} over {} target(s)", status.state, status.target_count);
    for call in host.calls() {
        match call {
            HostCall::Activate(t) => println!("activated {t}"),
            HostCall::Highlight(t, true) => println!("  highlight {t}"),
            HostCall::Notice(n) => println!("  notice {n:?}"),
            _ => {}
        }
    }

    poller.stop();
    handle.shutdown().await;
    task.await.expect("engine task");
}
