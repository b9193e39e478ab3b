/// Basic usage example: feed accelerometer samples, get activations
use std::sync::Arc;

use safewatch::notify::BufferedSink;
use safewatch::{
    ActivationEvent, Collaborators, MonitorConfig, SafetyMonitor, SensorSample, SinkMessage,
};

fn main() {
    println!("=== Safewatch: Basic Example ===\n");

    // Strict preset: four hits above 10 g within 2 seconds
    let sink = Arc::new(BufferedSink::new());
    let monitor = SafetyMonitor::new(
        MonitorConfig::strict(),
        Collaborators {
            sink: sink.clone(),
            ..Collaborators::in_memory()
        },
    );

    // Simulated accelerometer stream (m/s²): handling, then a deliberate shake
    let t0 = 1_700_000_000_000u64;
    let samples = vec![
        // Phone in hand (0-1 seconds)
        (t0, [0.3, 0.2, 9.8]),
        (t0 + 200, [1.1, -0.4, 9.6]),
        (t0 + 400, [2.5, 0.8, 10.2]),
        // Dropped on a table: one spike, not a gesture
        (t0 + 600, [5.0, 3.0, 60.0]),
        (t0 + 800, [0.1, 0.0, 9.8]),
        // Deliberate shake (3-4 seconds)
        (t0 + 3000, [110.0, 20.0, 9.8]),
        (t0 + 3150, [-115.0, -25.0, 9.8]),
        (t0 + 3300, [108.0, 30.0, 9.8]),
        (t0 + 3450, [-120.0, -10.0, 9.8]),
        // Still shaking, but inside the cooldown
        (t0 + 3600, [112.0, 15.0, 9.8]),
        (t0 + 3750, [-109.0, -20.0, 9.8]),
    ];

    println!("Processing {} samples...", samples.len());

    let mut activations = 0;
    for (timestamp, accel) in samples {
        if let Some(event) = monitor.on_sensor_sample(&SensorSample::new(timestamp, accel)) {
            activations += 1;
            print_event(&event, activations);
        }
    }

    // Wait for the location capture and notification tasks
    smol::block_on(monitor.flush());

    println!("\n=== UI events ===");
    for message in sink.drain() {
        match message {
            SinkMessage::Activation { activation_type, time, .. } => {
                println!("activation: {activation_type} at {time}")
            }
            SinkMessage::Location { lat, lon, .. } => println!("location: {lat}, {lon}"),
        }
    }

    println!("\n=== Summary ===");
    println!("Total activations: {}", activations);
    println!("Logged events: {}", monitor.activation_log().len());
}

fn print_event(event: &ActivationEvent, num: usize) {
    println!("\n--- Activation {} ---", num);
    println!("Type: {}", event.activation_type);
    println!("Time: {}", safewatch::clock::format_timestamp(event.time_ms));
    match event.location {
        Some(loc) => println!("Location: {}, {}", loc.lat, loc.lon),
        None => println!("Location: not cached yet"),
    }
}
