//! Heart rate monitoring example
//!
//! Connects to the first band found, prints its stats and streams heart
//! rate readings until Ctrl+C.
//!
//! Run with: cargo run --example heart_rate_monitor

use miband_rust_ble::{
    AlertMode, Error, MemoryHealthRecords, MiBand, Reading, Result, SessionConfig, SessionState,
};
use std::sync::Arc;
use std::time::Duration;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging (minimal)
    tracing_subscriber::fmt().with_env_filter("warn").init();

    println!("Heart Rate Monitor");
    println!("==================\n");
    println!("Looking for bands...\n");

    let records = MemoryHealthRecords::new();
    let band = MiBand::new(SessionConfig::default(), Arc::new(records.clone())).await?;
    band.start_scan().await?;

    // Wait for a band to be discovered
    tokio::time::sleep(Duration::from_secs(5)).await;

    let devices = band.discovered_devices().await?;
    let first = devices.first().ok_or(Error::DeviceIndexOutOfRange { index: 0, count: 0 })?;
    println!("Found band: {}", first);
    println!("Connecting...\n");

    let mut readings = band.subscribe_readings();
    band.connect(0).await?;

    while band.state().await? != SessionState::Ready {
        tokio::time::sleep(Duration::from_millis(200)).await;
    }

    println!("Connected! Monitoring heart rate...");
    println!("Press Ctrl+C to exit.\n");

    band.set_alert(AlertMode::Mild).await?;
    band.start_monitoring_heart_rate().await?;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                println!("\n\nExiting...");
                break;
            }
            reading = readings.recv() => match reading {
                Ok(Reading::HeartRate(heart_rate)) if heart_rate.is_measurement() => {
                    println!("Heart rate: {}", heart_rate);
                }
                Ok(Reading::HeartRate(_)) => println!("Heart rate: measuring..."),
                Ok(other) => println!("{}", other),
                Err(_) => break,
            },
        }
    }

    band.stop_monitoring_heart_rate().await?;
    band.disconnect().await?;
    band.shutdown().await?;

    println!("Recorded {} heart rate samples", records.len());

    Ok(())
}
