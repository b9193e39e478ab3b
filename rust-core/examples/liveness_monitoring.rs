/// Liveness example: heartbeat, power loss and boot-time reconciliation
use std::sync::Arc;
use std::time::Duration;

use safewatch::location::FixedLocationProvider;
use safewatch::{
    Collaborators, KeyValueStore, ManualClock, MemoryStore, MonitorConfig, SafetyMonitor,
    ShutdownVerdict,
};

fn main() {
    println!("=== Safewatch: Liveness Example ===\n");

    // State that survives "reboots"
    let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
    let clock = Arc::new(ManualClock::new(1_700_000_000_000));

    let power_on = || {
        SafetyMonitor::new(
            MonitorConfig::default(),
            Collaborators {
                store: Arc::clone(&store),
                locations: Arc::new(FixedLocationProvider::new(6.9271, 79.8612, clock.clone())),
                clock: clock.clone(),
                ..Collaborators::in_memory()
            },
        )
    };

    // Run 1: first boot, one heartbeat, then the battery is pulled
    let monitor = power_on();
    smol::block_on(async {
        let report = monitor.on_boot().await;
        println!("Run 1 boot verdict: {:?}", report.verdict);
        let heartbeat = monitor.start_heartbeat();
        smol::Timer::after(Duration::from_millis(100)).await;
        heartbeat.stop().await;
    });
    drop(monitor);
    println!("Run 1: heartbeat written, power lost without a shutdown signal");

    // Run 2: 90 minutes later, three 30-minute cadences missed
    clock.advance(90 * 60 * 1000);
    let monitor = power_on();
    let report = smol::block_on(monitor.on_boot());
    smol::block_on(monitor.flush());
    println!("\nRun 2 boot verdict: {:?}", report.verdict);
    if report.verdict == ShutdownVerdict::Forced {
        println!("Forced shutdown detected");
    }

    let status = monitor.forced_shutdown_status();
    if let Some(message) = &status.message {
        println!("\n{message}");
    }
    monitor.acknowledge_forced_shutdown();

    // Run 2 shuts down properly this time
    monitor.on_shutdown_signal();
    smol::block_on(monitor.flush());
    drop(monitor);

    // Run 3: any gap is fine after an orderly shutdown
    clock.advance(24 * 60 * 60 * 1000);
    let monitor = power_on();
    let report = smol::block_on(monitor.on_boot());
    println!("\nRun 3 boot verdict: {:?}", report.verdict);
}
